//! Bulk import of Discord JSON exports into the content store.

use std::fs;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::db::ContentStore;
use crate::error::{PulseError, Result};
use crate::models::{Message, Platform};

/// Totals for one import run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Export files read
    pub files: usize,
    /// Files skipped as relationship or unknown exports
    pub skipped_files: usize,
    /// Messages written
    pub imported: usize,
    /// Entries that failed to parse or store
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExportKind {
    Messages,
    Relationships,
    Unknown,
}

fn export_kind(path: &Path) -> ExportKind {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .to_lowercase();
    if name.contains("message") {
        ExportKind::Messages
    } else if name.contains("relationship") {
        ExportKind::Relationships
    } else {
        ExportKind::Unknown
    }
}

/// Import a single export file or every `.json` export in a directory
pub fn import_path(store: &dyn ContentStore, path: &Path) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();

    if path.is_file() {
        let (imported, failed) = import_file(store, path)?;
        summary.files = 1;
        summary.imported = imported;
        summary.failed = failed;
        return Ok(summary);
    }

    let mut files: Vec<_> = fs::read_dir(path)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json")))
        .collect();
    files.sort();

    for file in files {
        match export_kind(&file) {
            ExportKind::Messages => match import_file(store, &file) {
                Ok((imported, failed)) => {
                    summary.files += 1;
                    summary.imported += imported;
                    summary.failed += failed;
                }
                Err(e) if e.is_connectivity() => return Err(e),
                Err(e) => {
                    error!(file = %file.display(), error = %e, "Failed to read export file");
                    summary.skipped_files += 1;
                }
            },
            ExportKind::Relationships => {
                info!(file = %file.display(), "Skipping relationship export");
                summary.skipped_files += 1;
            }
            ExportKind::Unknown => {
                warn!(file = %file.display(), "Skipping unrecognized export file");
                summary.skipped_files += 1;
            }
        }
    }

    info!(
        files = summary.files,
        imported = summary.imported,
        failed = summary.failed,
        skipped_files = summary.skipped_files,
        "Import complete"
    );
    Ok(summary)
}

/// Import one message export; returns `(imported, failed)`
pub fn import_file(store: &dyn ContentStore, path: &Path) -> Result<(usize, usize)> {
    let raw = fs::read_to_string(path)?;
    let messages = parse_export(&raw)?;
    let mut imported = 0;
    let mut failed = 0;

    for message in &messages {
        match store.upsert_message(message) {
            Ok(()) => {
                imported += 1;
                debug!(message_id = %message.message_id, "Imported message");
            }
            Err(e) if e.is_connectivity() => return Err(e),
            Err(e) => {
                failed += 1;
                error!(file = %path.display(), message_id = %message.message_id, error = %e, "Failed to import message");
            }
        }
    }
    Ok((imported, failed))
}

/// Parse a Discord export holding one message object or an array of them.
///
/// Entries without an id are dropped.
pub fn parse_export(raw: &str) -> Result<Vec<Message>> {
    let value: Value = serde_json::from_str(raw)?;
    let entries = match value {
        Value::Array(items) => items,
        Value::Object(_) => vec![value],
        other => {
            return Err(PulseError::Other(format!(
                "Expected a message object or array, found {}",
                json_kind(&other)
            )))
        }
    };

    Ok(entries.iter().filter_map(exported_message).collect())
}

fn exported_message(entry: &Value) -> Option<Message> {
    let id = scalar_string(entry.get("id")?)?;
    let content = entry.get("content").and_then(Value::as_str).unwrap_or_default();
    let mut message = Message::new(Platform::Discord, id, content);

    if let Some(channel) = entry.get("channel_id").and_then(scalar_string) {
        message = message.with_context(channel);
    }
    let author = entry
        .pointer("/author/id")
        .or_else(|| entry.get("user_id"))
        .and_then(scalar_string);
    if let Some(author) = author {
        message = message.with_author(author);
    }
    if let Some(timestamp) = entry.get("timestamp").and_then(Value::as_str).and_then(parse_timestamp) {
        message = message.with_timestamp(timestamp);
    }
    Some(message)
}

/// Snowflakes show up as both strings and numbers in exports
fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>().ok().or_else(|| {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    })
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
