//! PulseCheck - Social Pulse Monitor
//!
//! Collects messages from Discord, Bluesky and X, scores their sentiment,
//! extracts topics, stores the results, and republishes the most positive
//! recent highlights.
//!
//! # Features
//!
//! - Concurrent per-platform collection with a persisted dedup ledger
//! - Lexicon sentiment model, or a transformer behind `advanced-nlp`
//! - Keyword topic extraction
//! - Idempotent SQLite content store
//! - Dry-run mode that touches no persistent state
//! - Discord export import, backlog analysis and text reports

/// Offline classification passes over the store
pub mod backlog;
/// Sentiment model adapter
pub mod classifier;
/// Configuration management
pub mod config;
/// Database operations and connection pooling
pub mod db;
/// Error types
pub mod error;
/// Discord export import
pub mod import;
/// Persisted dedup ledger
pub mod ledger;
/// Logging setup and utilities
pub mod logging;
/// Metrics collection
pub mod metrics;
/// Data models and structures
pub mod models;
/// Text cleaning and topic extraction
pub mod nlp;
/// Cycle orchestration
pub mod pipeline;
/// Platform collectors and publishers
pub mod platforms;
/// Reports and diagnostics
pub mod report;
/// Database schema definitions
pub mod schema;
/// Per-platform authentication state
pub mod session;

// Re-export key components for easier access
pub use classifier::SentimentAnalyzer;
pub use db::{ContentStore, Database};
pub use error::{PulseError, Result};
pub use models::{Message, Platform, Sentiment, SentimentRecord};
pub use nlp::TopicExtractor;
pub use pipeline::{CycleSchedule, Pipeline, StopCondition};
