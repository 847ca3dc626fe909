//! Platform collectors and publishers.
//!
//! Each platform module owns its REST client and normalizes responses into
//! [`Message`] before anything else sees them.

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::error::{PulseError, Result};
use crate::ledger::DedupLedger;
use crate::models::{Message, Platform};

pub mod bluesky;
pub mod discord;
pub mod x;

pub use bluesky::BlueskyClient;
pub use discord::DiscordClient;
pub use x::XClient;

/// Snippet length in composed posts
pub const SNIPPET_CHARS: usize = 50;

/// Where to collect from on platforms that need a target
#[derive(Debug, Clone, Default)]
pub struct CollectContext {
    /// Channel or thread to read
    pub channel_id: Option<String>,
}

/// Fetches recent messages from one platform
#[async_trait]
pub trait Collector: Send + Sync {
    /// Platform this collector reads
    fn platform(&self) -> Platform;

    /// Fetch up to `limit` recent messages, already normalized
    async fn fetch(&self, context: &CollectContext, limit: usize) -> Result<Vec<Message>>;
}

/// Posts composed text to one platform
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Platform this publisher posts to
    fn platform(&self) -> Platform;

    /// Post a single text
    async fn publish(&self, text: &str) -> Result<()>;
}

/// What a collection failure turns into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackSource {
    /// Deterministic placeholder messages, so dry runs exercise the pipeline
    Synthetic,
    /// Nothing; the failure is logged and the platform sits this cycle out
    Empty,
}

/// Collector for a platform that could not be reached at startup
pub struct OfflineCollector {
    platform: Platform,
}

impl OfflineCollector {
    /// Collector whose every fetch fails
    #[must_use]
    pub const fn new(platform: Platform) -> Self {
        Self { platform }
    }
}

#[async_trait]
impl Collector for OfflineCollector {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn fetch(&self, _context: &CollectContext, _limit: usize) -> Result<Vec<Message>> {
        Err(PulseError::Other(format!("{} is offline", self.platform)))
    }
}

/// Fetch from a collector and drop anything the ledger has already seen.
///
/// Never fails: a fetch error becomes the `fallback` batch.
pub async fn collect_new(
    collector: &dyn Collector,
    context: &CollectContext,
    ledger: &DedupLedger,
    limit: usize,
    fallback: FallbackSource,
) -> Vec<Message> {
    let platform = collector.platform();

    let fetched = match collector.fetch(context, limit).await {
        Ok(messages) => messages,
        Err(e) => match fallback {
            FallbackSource::Synthetic => {
                warn!(platform = %platform, error = %e, "Collection failed; using synthetic messages");
                synthetic_messages(platform, limit)
            }
            FallbackSource::Empty => {
                error!(platform = %platform, error = %e, "Collection failed");
                Vec::new()
            }
        },
    };

    let fetched_count = fetched.len();
    let mut seen = HashSet::new();
    let fresh: Vec<Message> = fetched
        .into_iter()
        .filter(|message| message.platform == platform)
        .filter(|message| !ledger.is_processed(platform, &message.message_id))
        .filter(|message| seen.insert(message.message_id.clone()))
        .collect();

    debug!(
        platform = %platform,
        fetched = fetched_count,
        fresh = fresh.len(),
        "Collected messages"
    );
    fresh
}

const SYNTHETIC_CONTENT: &[&str] = &[
    "Loving the energy in this community today, everyone is so helpful!",
    "The latest update is broken again and support has been awful.",
    "Great discussion tonight about open source tooling and community events.",
];

/// Fixed placeholder batch for a platform; identical on every call
#[must_use]
pub fn synthetic_messages(platform: Platform, limit: usize) -> Vec<Message> {
    SYNTHETIC_CONTENT
        .iter()
        .take(limit)
        .enumerate()
        .map(|(i, content)| {
            Message::new(platform, format!("synthetic-{}-{}", platform.as_str(), i + 1), *content)
                .with_author("synthetic")
        })
        .collect()
}

/// First [`SNIPPET_CHARS`] characters, with `...` when content was cut
#[must_use]
pub fn snippet(content: &str) -> String {
    if content.chars().count() > SNIPPET_CHARS {
        let head: String = content.chars().take(SNIPPET_CHARS).collect();
        format!("{head}...")
    } else {
        content.to_string()
    }
}

/// Text posted for one highlight
#[must_use]
pub fn compose_summary(tag: &str, platform: Platform, content: &str, confidence: f64, topics: &str) -> String {
    format!(
        "{tag}: {} buzzing about {topics}: '{}' (Score: {confidence:.2})",
        platform.display_name(),
        snippet(content)
    )
}

/// Turn a non-success HTTP response into a [`PulseError::PlatformApi`]
pub(crate) async fn check_status(platform: Platform, resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(PulseError::PlatformApi {
        platform,
        status: status.as_u16(),
        message: body,
    })
}

/// Shared HTTP client settings for platform APIs
pub(crate) fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .user_agent(concat!("pulse-check/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedCollector {
        platform: Platform,
        messages: Vec<Message>,
    }

    #[async_trait]
    impl Collector for FixedCollector {
        fn platform(&self) -> Platform {
            self.platform
        }

        async fn fetch(&self, _context: &CollectContext, _limit: usize) -> Result<Vec<Message>> {
            Ok(self.messages.clone())
        }
    }

    #[test]
    fn test_snippet_boundaries() {
        let fifty = "a".repeat(50);
        assert_eq!(snippet(&fifty), fifty);

        let fifty_one = "b".repeat(51);
        let cut = snippet(&fifty_one);
        assert_eq!(cut.chars().count(), 53);
        assert_eq!(cut, format!("{}...", "b".repeat(50)));
    }

    #[test]
    fn test_compose_summary() {
        let text = compose_summary("PulseCheck", Platform::Discord, "so happy here", 0.956, "happy");
        assert_eq!(
            text,
            "PulseCheck: Discord buzzing about happy: 'so happy here' (Score: 0.96)"
        );
    }

    #[test]
    fn test_synthetic_messages_are_deterministic() {
        assert_eq!(
            synthetic_messages(Platform::Bluesky, 10),
            synthetic_messages(Platform::Bluesky, 10)
        );
        assert_eq!(synthetic_messages(Platform::X, 2).len(), 2);
    }

    #[tokio::test]
    async fn test_collect_filters_ledger_and_duplicates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut ledger = DedupLedger::new(dir.path(), crate::ledger::PROCESSED_NAMESPACE);
        ledger.mark_processed(Platform::Discord, "1");

        let collector = FixedCollector {
            platform: Platform::Discord,
            messages: vec![
                Message::new(Platform::Discord, "1", "seen before"),
                Message::new(Platform::Discord, "2", "new"),
                Message::new(Platform::Discord, "2", "new again"),
            ],
        };

        let fresh = collect_new(
            &collector,
            &CollectContext::default(),
            &ledger,
            10,
            FallbackSource::Empty,
        )
        .await;
        let ids: Vec<_> = fresh.iter().map(|m| m.message_id.as_str()).collect();
        assert_eq!(ids, vec!["2"]);
    }

    #[tokio::test]
    async fn test_fallback_strategies() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = DedupLedger::new(dir.path(), crate::ledger::PROCESSED_NAMESPACE);
        let offline = OfflineCollector::new(Platform::X);
        let context = CollectContext::default();

        let live = collect_new(&offline, &context, &ledger, 10, FallbackSource::Empty).await;
        assert!(live.is_empty());

        let dry = collect_new(&offline, &context, &ledger, 10, FallbackSource::Synthetic).await;
        assert_eq!(dry, synthetic_messages(Platform::X, 10));
    }
}
