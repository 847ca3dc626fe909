//! Offline passes over the content store: classify unscored messages and
//! refresh topics on existing records.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::classifier::SentimentAnalyzer;
use crate::db::{ContentStore, Database};
use crate::error::Result;
use crate::models::SentimentRecord;
use crate::nlp::TopicExtractor;

/// Totals for one backlog pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BacklogSummary {
    /// Batches fetched from the store
    pub batches: usize,
    /// Records written
    pub classified: usize,
    /// Messages the model could not score
    pub failed: usize,
}

/// Classify stored messages that have no sentiment record, `batch_size` at a time.
///
/// Empty content is never selected. A message that fails classification is
/// logged and left unscored; the pass ends once a batch makes no progress.
pub fn analyze_backlog(
    db: &Database,
    analyzer: &SentimentAnalyzer,
    topics: &TopicExtractor,
    batch_size: usize,
) -> Result<BacklogSummary> {
    let mut summary = BacklogSummary::default();
    let mut failed_ids = HashSet::new();

    loop {
        let batch = db.unscored_messages(batch_size)?;
        if batch.is_empty() {
            break;
        }
        summary.batches += 1;

        let mut progressed = 0;
        for message in &batch {
            let classification = match analyzer.classify(&message.content) {
                Ok(classification) => classification,
                Err(e) => {
                    if failed_ids.insert((message.platform, message.message_id.clone())) {
                        warn!(platform = %message.platform, message_id = %message.message_id, error = %e, "Backlog classification failed");
                    }
                    continue;
                }
            };

            let record = SentimentRecord::from_classification(message, classification, topics.extract_topics(&message.content));
            match db.upsert_sentiment(&record) {
                Ok(()) => progressed += 1,
                Err(e) if e.is_connectivity() => return Err(e),
                Err(e) => {
                    failed_ids.insert((message.platform, message.message_id.clone()));
                    warn!(platform = %message.platform, message_id = %message.message_id, error = %e, "Failed to store backlog record");
                }
            }
        }

        summary.classified += progressed;
        info!(batch = summary.batches, size = batch.len(), classified = progressed, "Processed backlog batch");
        if progressed == 0 {
            break;
        }
    }

    summary.failed = failed_ids.len();
    info!(classified = summary.classified, failed = summary.failed, "Backlog analysis complete");
    Ok(summary)
}

/// Re-extract topics for every record; returns how many changed
pub fn backfill_topics(db: &Database, topics: &TopicExtractor) -> Result<usize> {
    let mut updated = 0;
    for scored in db.scored_messages()? {
        let fresh = topics.extract_topics(&scored.message.content);
        if fresh == scored.record.topics {
            continue;
        }
        let record = SentimentRecord {
            topics: fresh,
            ..scored.record
        };
        db.upsert_sentiment(&record)?;
        updated += 1;
    }
    info!(updated, "Topic backfill complete");
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::LexiconModel;
    use crate::models::{Message, Platform, GENERAL_TOPIC};

    fn tools() -> (SentimentAnalyzer, TopicExtractor) {
        let analyzer = SentimentAnalyzer::new(Box::new(LexiconModel::new().expect("model")), 512);
        let topics = TopicExtractor::new(2, 95, &[]).expect("topics");
        (analyzer, topics)
    }

    #[test]
    fn test_backlog_classifies_unscored_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("pulse.db").to_string_lossy()).expect("db");
        for (id, content) in [("1", "great community"), ("2", ""), ("3", "terrible outage"), ("4", "wonderful people")] {
            db.upsert_message(&Message::new(Platform::Discord, id, content)).expect("insert");
        }

        let (analyzer, topics) = tools();
        let summary = analyze_backlog(&db, &analyzer, &topics, 2).expect("backlog");

        assert_eq!(summary.classified, 3);
        assert_eq!(summary.failed, 0);
        assert_eq!(db.count_records().expect("count"), 3);
        let scored = db.scored_messages().expect("scored");
        assert!(scored.iter().all(|s| s.message.message_id != "2"));

        let again = analyze_backlog(&db, &analyzer, &topics, 2).expect("backlog");
        assert_eq!(again.classified, 0);
    }

    #[test]
    fn test_backfill_rewrites_topics() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("pulse.db").to_string_lossy()).expect("db");
        let message = Message::new(Platform::Bluesky, "p1", "gardening gardening tomatoes");
        db.upsert_message(&message).expect("insert");
        db.upsert_sentiment(&SentimentRecord {
            message_id: "p1".to_string(),
            platform: Platform::Bluesky,
            sentiment: crate::models::Sentiment::Positive,
            confidence: 0.9,
            topics: GENERAL_TOPIC.to_string(),
            metadata: None,
        })
        .expect("record");

        let (_, topics) = tools();
        assert_eq!(backfill_topics(&db, &topics).expect("backfill"), 1);
        let scored = db.scored_messages().expect("scored");
        assert_eq!(scored[0].record.topics, "gardening, tomatoes");
        assert_eq!(backfill_topics(&db, &topics).expect("backfill"), 0);
    }
}
