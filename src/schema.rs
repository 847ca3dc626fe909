//! Database schema definitions
//!
//! This module provides constants for table and column names used with rusqlite.

/// Platform messages table schema
pub mod platform_messages {
    /// Table name
    pub const TABLE: &str = "platform_messages";
    /// Primary key column
    pub const ID: &str = "id";
    /// Platform name column
    pub const PLATFORM: &str = "platform";
    /// Platform-unique message identifier column
    pub const MESSAGE_ID: &str = "message_id";
    /// Message text content column
    pub const CONTENT: &str = "content";
    /// Creation timestamp on the platform
    pub const TIMESTAMP: &str = "timestamp";
    /// Channel or thread identifier column
    pub const CONTEXT_ID: &str = "context_id";
    /// Author identifier column
    pub const AUTHOR_ID: &str = "author_id";
    /// Local ingestion timestamp column
    pub const COLLECTED_AT: &str = "collected_at";
}

/// Sentiment records table schema
pub mod sentiment_records {
    /// Table name
    pub const TABLE: &str = "sentiment_records";
    /// Primary key column
    pub const ID: &str = "id";
    /// Scored message identifier column
    pub const MESSAGE_ID: &str = "message_id";
    /// Platform name column
    pub const PLATFORM: &str = "platform";
    /// Sentiment label column
    pub const SENTIMENT: &str = "sentiment";
    /// Classifier confidence column
    pub const CONFIDENCE: &str = "confidence";
    /// Comma-joined topics column
    pub const TOPICS: &str = "topics";
    /// Optional JSON payload column
    pub const METADATA: &str = "metadata";
    /// Last write timestamp column
    pub const UPDATED_AT: &str = "updated_at";
}
