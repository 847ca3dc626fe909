//! Persisted per-platform sets of already-handled message identifiers.
//!
//! The ledger only saves repeated work. The content store's unique key is
//! what actually prevents duplicate records, so losing a ledger file costs
//! redundant classification, never correctness.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::Platform;

/// Namespace for identifiers handed to the classifier
pub const PROCESSED_NAMESPACE: &str = "processed";
/// Namespace for highlights already posted
pub const PUBLISHED_NAMESPACE: &str = "published";

/// On-disk shape of one platform's ledger
#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    ids: BTreeSet<String>,
}

/// Grow-only identifier sets keyed by platform
#[derive(Debug)]
pub struct DedupLedger {
    dir: PathBuf,
    namespace: String,
    entries: BTreeMap<Platform, BTreeSet<String>>,
}

impl DedupLedger {
    /// Empty ledger backed by `<dir>/<namespace>_<platform>.json`
    pub fn new(dir: impl Into<PathBuf>, namespace: &str) -> Self {
        Self {
            dir: dir.into(),
            namespace: namespace.to_string(),
            entries: BTreeMap::new(),
        }
    }

    /// Create a ledger and load whatever state exists on disk
    pub fn open(dir: impl Into<PathBuf>, namespace: &str) -> Result<Self> {
        let mut ledger = Self::new(dir, namespace);
        ledger.load_state()?;
        if ledger.is_empty() {
            debug!(namespace, dir = %ledger.dir.display(), "Starting with an empty dedup ledger");
        }
        Ok(ledger)
    }

    /// Reload every platform file; missing files mean an empty set.
    ///
    /// Loaded ids are merged into memory, so the ledger never shrinks.
    pub fn load_state(&mut self) -> Result<()> {
        for platform in Platform::ALL {
            let path = self.file_path(platform);
            let raw = match fs::read_to_string(&path) {
                Ok(raw) => raw,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            match serde_json::from_str::<LedgerFile>(&raw) {
                Ok(file) => {
                    let set = self.entries.entry(platform).or_default();
                    set.extend(file.ids);
                    info!(
                        platform = %platform,
                        namespace = %self.namespace,
                        ids = set.len(),
                        "Loaded dedup ledger"
                    );
                }
                Err(e) => {
                    // The store's unique key still protects against duplicates
                    warn!(
                        platform = %platform,
                        path = %path.display(),
                        error = %e,
                        "Ignoring unreadable dedup ledger"
                    );
                }
            }
        }
        Ok(())
    }

    /// Write every platform's set to disk
    pub fn persist_state(&self) -> Result<()> {
        for platform in self.entries.keys() {
            self.persist_platform(*platform)?;
        }
        Ok(())
    }

    /// Atomically rewrite one platform's file
    pub fn persist_platform(&self, platform: Platform) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let file = LedgerFile {
            ids: self.entries.get(&platform).cloned().unwrap_or_default(),
        };
        let path = self.file_path(platform);
        let tmp = path.with_extension("json.tmp");

        fs::write(&tmp, serde_json::to_vec_pretty(&file)?)?;
        fs::rename(&tmp, &path)?;

        debug!(platform = %platform, ids = file.ids.len(), path = %path.display(), "Persisted dedup ledger");
        Ok(())
    }

    /// Whether an identifier was already handled
    #[must_use]
    pub fn is_processed(&self, platform: Platform, id: &str) -> bool {
        self.entries
            .get(&platform)
            .is_some_and(|ids| ids.contains(id))
    }

    /// Record an identifier in memory; returns false if it was already present
    pub fn mark_processed(&mut self, platform: Platform, id: &str) -> bool {
        self.entries
            .entry(platform)
            .or_default()
            .insert(id.to_string())
    }

    /// Record an identifier and persist the platform file when it is new
    pub fn mark_and_persist(&mut self, platform: Platform, id: &str) -> Result<bool> {
        let added = self.mark_processed(platform, id);
        if added {
            self.persist_platform(platform)?;
        }
        Ok(added)
    }

    /// Number of identifiers recorded for a platform
    #[must_use]
    pub fn len(&self, platform: Platform) -> usize {
        self.entries.get(&platform).map_or(0, BTreeSet::len)
    }

    /// True when no platform has any identifiers
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.values().all(BTreeSet::is_empty)
    }

    fn file_path(&self, platform: Platform) -> PathBuf {
        self.dir
            .join(format!("{}_{}.json", self.namespace, platform.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut ledger = DedupLedger::new(dir.path(), PROCESSED_NAMESPACE);

        assert!(ledger.mark_processed(Platform::Discord, "1"));
        assert!(!ledger.mark_processed(Platform::Discord, "1"));
        assert_eq!(ledger.len(Platform::Discord), 1);
        assert!(!ledger.is_processed(Platform::Bluesky, "1"));
    }

    #[test]
    fn test_file_format() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut ledger = DedupLedger::new(dir.path(), PROCESSED_NAMESPACE);
        ledger.mark_and_persist(Platform::X, "b").expect("persist");
        ledger.mark_and_persist(Platform::X, "a").expect("persist");

        let raw = fs::read_to_string(dir.path().join("processed_x.json")).expect("read");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(value, serde_json::json!({ "ids": ["a", "b"] }));
        assert!(!dir.path().join("processed_x.json.tmp").exists());
    }

    #[test]
    fn test_reload_after_restart() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let mut ledger = DedupLedger::new(dir.path(), PUBLISHED_NAMESPACE);
            ledger.mark_and_persist(Platform::Bluesky, "post-1").expect("persist");
        }

        let reopened = DedupLedger::open(dir.path(), PUBLISHED_NAMESPACE).expect("open");
        assert!(reopened.is_processed(Platform::Bluesky, "post-1"));

        let other_namespace = DedupLedger::open(dir.path(), PROCESSED_NAMESPACE).expect("open");
        assert!(other_namespace.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("processed_discord.json"), "not json").expect("write");

        let ledger = DedupLedger::open(dir.path(), PROCESSED_NAMESPACE).expect("open");
        assert_eq!(ledger.len(Platform::Discord), 0);
    }
}
