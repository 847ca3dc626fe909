//! Human-readable sentiment reports and store diagnostics.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::db::{ContentStore, Database};
use crate::error::{PulseError, Result};
use crate::models::{Platform, ScoredMessage, SelectionOrder, SelectionQuery, Sentiment};
use crate::platforms::snippet;

const RULE_WIDTH: usize = 80;

/// Knobs for [`build_report`]
#[derive(Debug, Clone, Copy)]
pub struct ReportOptions {
    /// Look-back window in days
    pub days: i64,
    /// Confidence a post must exceed
    pub min_confidence: f64,
    /// Posts listed per platform
    pub top_n: usize,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            days: 30,
            min_confidence: 0.8,
            top_n: 10,
        }
    }
}

/// Top positive posts per platform over the look-back window
pub fn build_report(store: &dyn ContentStore, options: ReportOptions, now: DateTime<Utc>) -> Result<String> {
    let since = Some(options.days)
        .filter(|days| *days > 0)
        .and_then(Duration::try_days)
        .and_then(|window| now.checked_sub_signed(window))
        .ok_or_else(|| PulseError::InvalidConfig(format!("report window of {} days is out of range", options.days)))?;
    let rule = "-".repeat(RULE_WIDTH);
    let mut out = String::new();

    let _ = writeln!(out, "PulseCheck Sentiment Report - Generated {}", now.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(
        out,
        "Top {} positive sentiment posts from the last {} days",
        options.top_n, options.days
    );
    let _ = writeln!(out, "{}\n", "=".repeat(RULE_WIDTH));

    for platform in Platform::ALL {
        let posts = store.select_top_positive(&SelectionQuery {
            platform,
            since,
            min_confidence: options.min_confidence,
            limit: options.top_n,
            order: SelectionOrder::ConfidenceThenRecency,
        })?;

        let _ = writeln!(out, "{} POSTS:", platform.display_name().to_uppercase());
        let _ = writeln!(out, "{rule}\n");
        if posts.is_empty() {
            let _ = writeln!(out, "No {} posts found.\n", platform.display_name());
            continue;
        }

        for (rank, post) in posts.iter().enumerate() {
            write_entry(&mut out, rank + 1, post);
            let _ = writeln!(out, "{rule}\n");
        }
    }

    out.push_str("End of Report\n");
    Ok(out)
}

fn write_entry(out: &mut String, rank: usize, post: &ScoredMessage) {
    let message = &post.message;
    let timestamp = message
        .timestamp
        .map_or_else(|| "unknown".to_string(), |t| t.to_rfc3339());
    let _ = writeln!(out, "#{rank} Message ID: {}", message.message_id);
    let _ = writeln!(out, "Timestamp: {timestamp}");
    let _ = writeln!(out, "Author: {}", message.author_id.as_deref().unwrap_or("N/A"));
    let _ = writeln!(
        out,
        "Sentiment: {} (Confidence: {:.2})",
        post.record.sentiment, post.record.confidence
    );
    let _ = writeln!(out, "Topics: {}", post.record.topics);
    let _ = writeln!(out, "Content: {}", message.content);
}

/// Build the report and write it to `path`
pub fn write_report(store: &dyn ContentStore, options: ReportOptions, path: &Path) -> Result<String> {
    let report = build_report(store, options, Utc::now())?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, &report)?;
    info!(path = %path.display(), "Sentiment report written");
    Ok(report)
}

/// Distribution of stored sentiment
#[derive(Debug, Clone)]
pub struct SentimentStats {
    /// Records in the store
    pub total: u64,
    /// Records per label
    pub by_sentiment: BTreeMap<Sentiment, u64>,
    /// Positive records above the floor
    pub confident_positive: u64,
    /// Confidence floor used
    pub floor: f64,
    /// Most recent confident positives
    pub recent: Vec<ScoredMessage>,
}

impl SentimentStats {
    /// Query the store; `floor` defines "high confidence"
    pub fn gather(db: &Database, floor: f64) -> Result<Self> {
        Ok(Self {
            total: db.count_records()?,
            by_sentiment: db.count_by_sentiment()?,
            confident_positive: db.count_confident_positive(floor)?,
            floor,
            recent: db.recent_positive(floor, 5)?,
        })
    }

    /// Share of records with a label, in percent
    #[must_use]
    pub fn percentage(&self, sentiment: Sentiment) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let count = self.by_sentiment.get(&sentiment).copied().unwrap_or_default();
        count as f64 / self.total as f64 * 100.0
    }

    /// Write the statistics to the log
    pub fn log(&self) {
        info!(total = self.total, "Total sentiment records");
        for (sentiment, count) in &self.by_sentiment {
            info!(
                sentiment = %sentiment,
                count,
                "{sentiment}: {count} records ({:.2}%)",
                self.percentage(*sentiment)
            );
        }
        info!(
            count = self.confident_positive,
            "Positive sentiment with confidence > {}", self.floor
        );
        for (rank, post) in self.recent.iter().enumerate() {
            info!(
                platform = %post.message.platform,
                message_id = %post.message.message_id,
                "{}. [{}] {} (Confidence: {:.2})",
                rank + 1,
                post.message.platform,
                snippet(&post.message.content),
                post.record.confidence
            );
        }
    }
}
