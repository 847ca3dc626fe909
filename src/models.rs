//! Data models for messages, sentiment records and selection
//!
//! Every platform-specific payload is normalized into [`Message`] at the
//! collector boundary; nothing downstream sees platform SDK shapes.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Sentinel topic string used when no keyword survives filtering
pub const GENERAL_TOPIC: &str = "general";

/// An external social service messages are collected from or published to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Discord channels
    Discord,
    /// Bluesky (AT protocol) mentions and replies
    Bluesky,
    /// X mentions
    X,
}

impl Platform {
    /// All supported platforms, in a stable order
    pub const ALL: [Self; 3] = [Self::Discord, Self::Bluesky, Self::X];

    /// Lowercase identifier used in storage, config and file names
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Discord => "discord",
            Self::Bluesky => "bluesky",
            Self::X => "x",
        }
    }

    /// Capitalized name used in composed posts
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Discord => "Discord",
            Self::Bluesky => "Bluesky",
            Self::X => "X",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "discord" => Ok(Self::Discord),
            "bluesky" | "bsky" => Ok(Self::Bluesky),
            "x" | "twitter" => Ok(Self::X),
            other => Err(format!("Unknown platform: {other}")),
        }
    }
}

impl ToSql for Platform {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Platform {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str()?.parse().map_err(|_| FromSqlError::InvalidType)
    }
}

/// Binary sentiment label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sentiment {
    /// Positive sentiment
    Positive,
    /// Negative sentiment
    Negative,
}

impl Sentiment {
    /// Uppercase label as stored in the database
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "POSITIVE",
            Self::Negative => "NEGATIVE",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sentiment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "POSITIVE" => Ok(Self::Positive),
            "NEGATIVE" => Ok(Self::Negative),
            other => Err(format!("Unknown sentiment label: {other}")),
        }
    }
}

impl ToSql for Sentiment {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Sentiment {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str()?.parse().map_err(|_| FromSqlError::InvalidType)
    }
}

/// One ingested unit of content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Platform the message came from
    pub platform: Platform,
    /// Identifier, unique within the platform
    pub message_id: String,
    /// Text content, may be empty
    pub content: String,
    /// Author identifier, if the platform exposes one
    pub author_id: Option<String>,
    /// Channel or thread identifier
    pub context_id: Option<String>,
    /// When the message was created on the platform
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    /// Create a message with no optional metadata
    pub fn new(platform: Platform, message_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            platform,
            message_id: message_id.into(),
            content: content.into(),
            author_id: None,
            context_id: None,
            timestamp: None,
        }
    }

    /// Set the creation timestamp
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Set the author identifier
    #[must_use]
    pub fn with_author(mut self, author_id: impl Into<String>) -> Self {
        self.author_id = Some(author_id.into());
        self
    }

    /// Set the channel/thread identifier
    #[must_use]
    pub fn with_context(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = Some(context_id.into());
        self
    }

    /// True when there is nothing worth scoring
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// Result of scoring a single piece of text
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    /// Predicted label
    pub label: Sentiment,
    /// Model confidence in `[0.0, 1.0]`
    pub confidence: f64,
}

/// Classification result persisted per `(message_id, platform)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentRecord {
    /// Identifier of the scored message
    pub message_id: String,
    /// Platform of the scored message
    pub platform: Platform,
    /// Sentiment label
    pub sentiment: Sentiment,
    /// Confidence in `[0.0, 1.0]`
    pub confidence: f64,
    /// Comma-joined keywords, or [`GENERAL_TOPIC`]
    pub topics: String,
    /// Optional opaque payload
    pub metadata: Option<serde_json::Value>,
}

impl SentimentRecord {
    /// Build a record for a message from a classification and its topics
    #[must_use]
    pub fn from_classification(message: &Message, classification: Classification, topics: String) -> Self {
        Self {
            message_id: message.message_id.clone(),
            platform: message.platform,
            sentiment: classification.label,
            confidence: classification.confidence,
            topics,
            metadata: None,
        }
    }
}

/// A stored message joined with its sentiment record
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMessage {
    /// The source message
    pub message: Message,
    /// Its classification
    pub record: SentimentRecord,
}

/// Ordering of selection results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionOrder {
    /// Highest confidence first, newest first among equal confidence
    #[default]
    ConfidenceThenRecency,
    /// Newest first
    Recency,
}

/// Parameters for picking publishable highlights
#[derive(Debug, Clone)]
pub struct SelectionQuery {
    /// Platform to select from
    pub platform: Platform,
    /// Only messages strictly newer than this
    pub since: DateTime<Utc>,
    /// Only records with confidence strictly above this
    pub min_confidence: f64,
    /// Maximum rows returned
    pub limit: usize,
    /// Result ordering
    pub order: SelectionOrder,
}

impl SelectionOrder {
    /// Sort in place the way the store orders selection results
    pub fn sort(self, items: &mut [ScoredMessage]) {
        match self {
            Self::ConfidenceThenRecency => items.sort_by(|a, b| {
                b.record
                    .confidence
                    .total_cmp(&a.record.confidence)
                    .then_with(|| b.message.timestamp.cmp(&a.message.timestamp))
            }),
            Self::Recency => items.sort_by(|a, b| b.message.timestamp.cmp(&a.message.timestamp)),
        }
    }
}

impl SelectionQuery {
    /// Same filter the store applies, for records held in memory
    #[must_use]
    pub fn matches(&self, item: &ScoredMessage) -> bool {
        item.record.platform == self.platform
            && item.record.sentiment == Sentiment::Positive
            && item.record.confidence > self.min_confidence
            && item.message.timestamp.is_some_and(|t| t > self.since)
    }
}

/// Whether a cycle stops after storing or goes on to publish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Collect, classify and store only
    Collect,
    /// Also select highlights and publish them
    #[default]
    Publish,
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "collect" => Ok(Self::Collect),
            "publish" => Ok(Self::Publish),
            other => Err(format!("Unknown run mode: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_round_trip_names() {
        for platform in Platform::ALL {
            assert_eq!(platform.as_str().parse::<Platform>(), Ok(platform));
        }
        assert_eq!("Twitter".parse::<Platform>(), Ok(Platform::X));
        assert!("myspace".parse::<Platform>().is_err());
    }

    #[test]
    fn test_sentiment_labels() {
        assert_eq!("positive".parse::<Sentiment>(), Ok(Sentiment::Positive));
        assert_eq!(Sentiment::Negative.to_string(), "NEGATIVE");
    }

    #[test]
    fn test_blank_message() {
        assert!(Message::new(Platform::Discord, "1", "   ").is_blank());
        assert!(!Message::new(Platform::Discord, "1", "hi").is_blank());
    }

    fn scored(id: &str, sentiment: Sentiment, confidence: f64, age_hours: i64) -> ScoredMessage {
        let message = Message::new(Platform::X, id, id).with_timestamp(Utc::now() - chrono::Duration::hours(age_hours));
        let record = SentimentRecord::from_classification(
            &message,
            Classification {
                label: sentiment,
                confidence,
            },
            GENERAL_TOPIC.to_string(),
        );
        ScoredMessage { message, record }
    }

    #[test]
    fn test_query_matches_like_the_store() {
        let query = SelectionQuery {
            platform: Platform::X,
            since: Utc::now() - chrono::Duration::days(1),
            min_confidence: 0.8,
            limit: 10,
            order: SelectionOrder::ConfidenceThenRecency,
        };

        assert!(query.matches(&scored("ok", Sentiment::Positive, 0.9, 1)));
        assert!(!query.matches(&scored("floor", Sentiment::Positive, 0.8, 1)));
        assert!(!query.matches(&scored("neg", Sentiment::Negative, 0.99, 1)));
        assert!(!query.matches(&scored("old", Sentiment::Positive, 0.99, 48)));

        let mut untimed = scored("untimed", Sentiment::Positive, 0.99, 1);
        untimed.message.timestamp = None;
        assert!(!query.matches(&untimed));
    }

    #[test]
    fn test_order_sorts_like_the_store() {
        let mut items = vec![
            scored("mid", Sentiment::Positive, 0.9, 3),
            scored("top", Sentiment::Positive, 0.97, 5),
            scored("mid_newer", Sentiment::Positive, 0.9, 2),
        ];

        SelectionOrder::ConfidenceThenRecency.sort(&mut items);
        let ids: Vec<&str> = items.iter().map(|i| i.message.message_id.as_str()).collect();
        assert_eq!(ids, ["top", "mid_newer", "mid"]);

        SelectionOrder::Recency.sort(&mut items);
        let ids: Vec<&str> = items.iter().map(|i| i.message.message_id.as_str()).collect();
        assert_eq!(ids, ["mid_newer", "mid", "top"]);
    }
}
