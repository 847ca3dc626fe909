//! Content store behaviour against a real SQLite file

use chrono::{Duration, Utc};
use pulse_check::db::{ContentStore, Database};
use pulse_check::error::PulseError;
use pulse_check::models::{
    Message, Platform, SelectionOrder, SelectionQuery, Sentiment, SentimentRecord, GENERAL_TOPIC,
};
use tempfile::TempDir;

fn open_store() -> (TempDir, Database) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let url = format!("sqlite:{}", dir.path().join("pulse.db").display());
    let db = Database::new(&url).expect("Failed to open store");
    (dir, db)
}

fn record(platform: Platform, id: &str, sentiment: Sentiment, confidence: f64) -> SentimentRecord {
    SentimentRecord {
        message_id: id.to_string(),
        platform,
        sentiment,
        confidence,
        topics: GENERAL_TOPIC.to_string(),
        metadata: None,
    }
}

fn query(platform: Platform, limit: usize) -> SelectionQuery {
    SelectionQuery {
        platform,
        since: Utc::now() - Duration::days(7),
        min_confidence: 0.8,
        limit,
        order: SelectionOrder::ConfidenceThenRecency,
    }
}

#[test]
fn test_upsert_is_idempotent() {
    let (_dir, db) = open_store();
    let message = Message::new(Platform::Discord, "42", "hello");

    db.upsert_message(&message).expect("first insert");
    db.upsert_message(&message).expect("second insert");
    db.upsert_sentiment(&record(Platform::Discord, "42", Sentiment::Positive, 0.6))
        .expect("first record");
    db.upsert_sentiment(&record(Platform::Discord, "42", Sentiment::Positive, 0.95))
        .expect("second record");

    assert_eq!(db.count_messages().expect("count"), 1);
    assert_eq!(db.count_records().expect("count"), 1);
    let stored = db.scored_messages().expect("scored");
    assert!((stored[0].record.confidence - 0.95).abs() < f64::EPSILON);
}

#[test]
fn test_same_id_on_different_platforms() {
    let (_dir, db) = open_store();
    db.upsert_message(&Message::new(Platform::Discord, "7", "a")).expect("insert");
    db.upsert_message(&Message::new(Platform::X, "7", "b")).expect("insert");
    db.upsert_sentiment(&record(Platform::Discord, "7", Sentiment::Positive, 0.9)).expect("record");
    db.upsert_sentiment(&record(Platform::X, "7", Sentiment::Negative, 0.9)).expect("record");

    assert_eq!(db.count_messages().expect("count"), 2);
    assert_eq!(db.count_records().expect("count"), 2);
}

#[test]
fn test_invalid_records_are_rejected() {
    let (_dir, db) = open_store();

    let err = db
        .upsert_sentiment(&record(Platform::Bluesky, "p", Sentiment::Positive, 1.01))
        .expect_err("confidence above 1");
    assert!(matches!(err, PulseError::InvalidRecord { .. }));

    let mut long_topics = record(Platform::Bluesky, "p", Sentiment::Positive, 0.9);
    long_topics.topics = "t".repeat(101);
    assert!(db.upsert_sentiment(&long_topics).is_err());
    assert_eq!(db.count_records().expect("count"), 0);
}

#[test]
fn test_selection_filters_and_orders() {
    let (_dir, db) = open_store();
    let now = Utc::now();
    let rows = [
        ("old", Sentiment::Positive, 0.99, now - Duration::days(8)),
        ("neg", Sentiment::Negative, 0.99, now - Duration::hours(1)),
        ("floor", Sentiment::Positive, 0.8, now - Duration::hours(1)),
        ("mid", Sentiment::Positive, 0.9, now - Duration::hours(3)),
        ("top", Sentiment::Positive, 0.97, now - Duration::hours(5)),
        ("mid_newer", Sentiment::Positive, 0.9, now - Duration::hours(2)),
    ];
    for (id, sentiment, confidence, timestamp) in rows {
        db.upsert_message(&Message::new(Platform::Discord, id, id).with_timestamp(timestamp))
            .expect("insert");
        db.upsert_sentiment(&record(Platform::Discord, id, sentiment, confidence))
            .expect("record");
    }
    db.upsert_message(&Message::new(Platform::Discord, "untimed", "x")).expect("insert");
    db.upsert_sentiment(&record(Platform::Discord, "untimed", Sentiment::Positive, 0.99))
        .expect("record");

    let selected = db.select_top_positive(&query(Platform::Discord, 10)).expect("select");
    let ids: Vec<&str> = selected.iter().map(|s| s.message.message_id.as_str()).collect();
    assert_eq!(ids, vec!["top", "mid_newer", "mid"]);

    let limited = db.select_top_positive(&query(Platform::Discord, 1)).expect("select");
    assert_eq!(limited.len(), 1);

    let by_recency = db
        .select_top_positive(&SelectionQuery {
            order: SelectionOrder::Recency,
            ..query(Platform::Discord, 10)
        })
        .expect("select");
    let ids: Vec<&str> = by_recency.iter().map(|s| s.message.message_id.as_str()).collect();
    assert_eq!(ids, vec!["mid_newer", "mid", "top"]);

    assert!(db.select_top_positive(&query(Platform::X, 10)).expect("select").is_empty());
}

#[test]
fn test_count_by_sentiment() {
    let (_dir, db) = open_store();
    for (id, sentiment) in [("1", Sentiment::Positive), ("2", Sentiment::Positive), ("3", Sentiment::Negative)] {
        db.upsert_message(&Message::new(Platform::Bluesky, id, "text")).expect("insert");
        db.upsert_sentiment(&record(Platform::Bluesky, id, sentiment, 0.9)).expect("record");
    }

    let counts = db.count_by_sentiment().expect("counts");
    assert_eq!(counts.get(&Sentiment::Positive), Some(&2));
    assert_eq!(counts.get(&Sentiment::Negative), Some(&1));
}
