use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::error::{PulseError, Result};
use crate::models::{
    Message, Platform, ScoredMessage, SelectionOrder, SelectionQuery, Sentiment, SentimentRecord,
};
use crate::schema::{platform_messages as pm, sentiment_records as sr};

// Type alias for the database connection pool
/// Pool of SQLite connections
pub type DbPool = Pool<SqliteConnectionManager>;
/// Connection checked out of [`DbPool`]
pub type DbConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Upper bound on the stored topics column
const MAX_TOPICS_COLUMN: usize = 100;

/// Durable storage of raw messages and their sentiment records.
///
/// Implementations must treat `(message_id, platform)` as the idempotency
/// key: writing the same key twice never yields two records.
pub trait ContentStore: Send + Sync {
    /// Insert a message; an existing `(platform, message_id)` row is left untouched
    fn upsert_message(&self, message: &Message) -> Result<()>;

    /// Insert a record, or overwrite sentiment/confidence/topics/metadata of the existing one
    fn upsert_sentiment(&self, record: &SentimentRecord) -> Result<()>;

    /// Recent high-confidence positive items for one platform
    fn select_top_positive(&self, query: &SelectionQuery) -> Result<Vec<ScoredMessage>>;

    /// Number of records per sentiment label
    fn count_by_sentiment(&self) -> Result<BTreeMap<Sentiment, u64>>;
}

/// Database manager for handling connections and operations
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Create a new database connection pool and run migrations
    pub fn new(database_url: &str) -> Result<Self> {
        Self::with_pool_settings(database_url, 10, Duration::from_secs(30))
    }

    /// Create a pool sized and timed from configuration
    pub fn from_config(config: &DatabaseConfig) -> Result<Self> {
        Self::with_pool_settings(
            &config.url,
            config.max_connections,
            Duration::from_secs(config.connection_timeout_secs),
        )
    }

    fn with_pool_settings(database_url: &str, max_connections: u32, timeout: Duration) -> Result<Self> {
        let path = sqlite_path(database_url);

        // Create parent directory if it doesn't exist
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let manager = SqliteConnectionManager::file(path)
            .with_init(|conn| conn.busy_timeout(Duration::from_secs(5)));
        let pool = Pool::builder()
            .max_size(max_connections)
            .connection_timeout(timeout)
            .build(manager)?;

        let conn = pool.get()?;
        Self::run_migrations(&conn)?;
        info!(path, "Content store ready");

        Ok(Self { pool })
    }

    /// Run database migrations
    fn run_migrations(conn: &Connection) -> Result<()> {
        conn.execute_batch(include_str!(
            "../migrations/2026-10-01-000000_create_tables/up.sql"
        ))?;
        conn.execute_batch(include_str!(
            "../migrations/2026-10-02-000000_sentiment_records/up.sql"
        ))?;
        Ok(())
    }

    /// Get a connection from the pool
    pub fn get_connection(&self) -> Result<DbConnection> {
        Ok(self.pool.get()?)
    }

    /// Total number of sentiment records
    pub fn count_records(&self) -> Result<u64> {
        let conn = self.get_connection()?;
        let total: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", sr::TABLE), [], |row| {
            row.get(0)
        })?;
        Ok(u64::try_from(total).unwrap_or_default())
    }

    /// Number of stored messages
    pub fn count_messages(&self) -> Result<u64> {
        let conn = self.get_connection()?;
        let total: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", pm::TABLE), [], |row| {
            row.get(0)
        })?;
        Ok(u64::try_from(total).unwrap_or_default())
    }

    /// Number of positive records with confidence strictly above `floor`
    pub fn count_confident_positive(&self, floor: f64) -> Result<u64> {
        let conn = self.get_connection()?;
        let total: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE {} = ? AND {} > ?",
                sr::TABLE,
                sr::SENTIMENT,
                sr::CONFIDENCE
            ),
            params![Sentiment::Positive, floor],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(total).unwrap_or_default())
    }

    /// Most recent confident positives across all platforms
    pub fn recent_positive(&self, floor: f64, limit: usize) -> Result<Vec<ScoredMessage>> {
        let conn = self.get_connection()?;
        let query = format!(
            "{} WHERE s.{} = ? AND s.{} > ? ORDER BY m.{} DESC LIMIT ?",
            scored_select(),
            sr::SENTIMENT,
            sr::CONFIDENCE,
            pm::TIMESTAMP
        );

        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map(params![Sentiment::Positive, floor, sql_limit(limit)], map_scored)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Stored messages that have no sentiment record yet, oldest first
    pub fn unscored_messages(&self, limit: usize) -> Result<Vec<Message>> {
        let conn = self.get_connection()?;
        let query = format!(
            "SELECT m.{}, m.{}, m.{}, m.{}, m.{}, m.{} FROM {} m \
             LEFT JOIN {} s ON s.{} = m.{} AND s.{} = m.{} \
             WHERE s.{} IS NULL AND m.{} IS NOT NULL AND trim(m.{}) != '' \
             ORDER BY m.{} ASC LIMIT ?",
            pm::PLATFORM,
            pm::MESSAGE_ID,
            pm::CONTENT,
            pm::TIMESTAMP,
            pm::CONTEXT_ID,
            pm::AUTHOR_ID,
            pm::TABLE,
            sr::TABLE,
            sr::MESSAGE_ID,
            pm::MESSAGE_ID,
            sr::PLATFORM,
            pm::PLATFORM,
            sr::ID,
            pm::CONTENT,
            pm::CONTENT,
            pm::ID
        );

        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map(params![sql_limit(limit)], |row| map_message(row, 0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Every stored message joined with its record
    pub fn scored_messages(&self) -> Result<Vec<ScoredMessage>> {
        let conn = self.get_connection()?;
        let query = format!("{} ORDER BY s.{} ASC", scored_select(), sr::ID);
        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map([], map_scored)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

impl ContentStore for Database {
    fn upsert_message(&self, message: &Message) -> Result<()> {
        let conn = self.get_connection()?;

        let inserted = conn.execute(
            &format!(
                "INSERT INTO {} ({}, {}, {}, {}, {}, {}, {}) VALUES (?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT ({}, {}) DO NOTHING",
                pm::TABLE,
                pm::PLATFORM,
                pm::MESSAGE_ID,
                pm::CONTENT,
                pm::TIMESTAMP,
                pm::CONTEXT_ID,
                pm::AUTHOR_ID,
                pm::COLLECTED_AT,
                pm::PLATFORM,
                pm::MESSAGE_ID
            ),
            params![
                message.platform,
                message.message_id,
                message.content,
                message.timestamp,
                message.context_id,
                message.author_id,
                Utc::now()
            ],
        )?;

        debug!(
            platform = %message.platform,
            message_id = %message.message_id,
            inserted = inserted > 0,
            "Upserted message"
        );
        Ok(())
    }

    fn upsert_sentiment(&self, record: &SentimentRecord) -> Result<()> {
        validate_record(record)?;
        let metadata = record
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let conn = self.get_connection()?;
        conn.execute(
            &format!(
                "INSERT INTO {table} ({mid}, {plat}, {sent}, {conf}, {top}, {meta}, {upd}) \
                 VALUES (?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT ({mid}, {plat}) DO UPDATE SET \
                 {sent} = excluded.{sent}, {conf} = excluded.{conf}, {top} = excluded.{top}, \
                 {meta} = excluded.{meta}, {upd} = excluded.{upd}",
                table = sr::TABLE,
                mid = sr::MESSAGE_ID,
                plat = sr::PLATFORM,
                sent = sr::SENTIMENT,
                conf = sr::CONFIDENCE,
                top = sr::TOPICS,
                meta = sr::METADATA,
                upd = sr::UPDATED_AT
            ),
            params![
                record.message_id,
                record.platform,
                record.sentiment,
                record.confidence,
                record.topics,
                metadata,
                Utc::now()
            ],
        )?;

        debug!(
            platform = %record.platform,
            message_id = %record.message_id,
            sentiment = %record.sentiment,
            confidence = record.confidence,
            "Upserted sentiment record"
        );
        Ok(())
    }

    fn select_top_positive(&self, query: &SelectionQuery) -> Result<Vec<ScoredMessage>> {
        let conn = self.get_connection()?;

        let order = match query.order {
            SelectionOrder::ConfidenceThenRecency => {
                format!("s.{} DESC, m.{} DESC", sr::CONFIDENCE, pm::TIMESTAMP)
            }
            SelectionOrder::Recency => format!("m.{} DESC", pm::TIMESTAMP),
        };
        let sql = format!(
            "{} WHERE s.{} = ? AND s.{} = ? AND s.{} > ? AND m.{} IS NOT NULL AND m.{} > ? \
             ORDER BY {} LIMIT ?",
            scored_select(),
            sr::PLATFORM,
            sr::SENTIMENT,
            sr::CONFIDENCE,
            pm::TIMESTAMP,
            pm::TIMESTAMP,
            order
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                query.platform,
                Sentiment::Positive,
                query.min_confidence,
                query.since,
                sql_limit(query.limit)
            ],
            map_scored,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn count_by_sentiment(&self) -> Result<BTreeMap<Sentiment, u64>> {
        let conn = self.get_connection()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {}, COUNT(*) FROM {} GROUP BY {}",
            sr::SENTIMENT,
            sr::TABLE,
            sr::SENTIMENT
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, Sentiment>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let (sentiment, count) = row?;
            counts.insert(sentiment, u64::try_from(count).unwrap_or_default());
        }
        Ok(counts)
    }
}

/// Accept `sqlite:path`, `sqlite://path` or a bare path
fn sqlite_path(database_url: &str) -> &str {
    database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url)
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn validate_record(record: &SentimentRecord) -> Result<()> {
    let reject = |reason: String| PulseError::InvalidRecord {
        platform: record.platform,
        message_id: record.message_id.clone(),
        reason,
    };

    if !(0.0..=1.0).contains(&record.confidence) {
        return Err(reject(format!("confidence {} outside [0, 1]", record.confidence)));
    }
    if record.topics.chars().count() > MAX_TOPICS_COLUMN {
        return Err(reject(format!(
            "topics longer than {MAX_TOPICS_COLUMN} characters"
        )));
    }
    Ok(())
}

/// Shared projection for message + record joins; message columns come first
fn scored_select() -> String {
    format!(
        "SELECT m.{}, m.{}, m.{}, m.{}, m.{}, m.{}, s.{}, s.{}, s.{}, s.{}, s.{}, s.{} \
         FROM {} s JOIN {} m ON s.{} = m.{} AND s.{} = m.{}",
        pm::PLATFORM,
        pm::MESSAGE_ID,
        pm::CONTENT,
        pm::TIMESTAMP,
        pm::CONTEXT_ID,
        pm::AUTHOR_ID,
        sr::MESSAGE_ID,
        sr::PLATFORM,
        sr::SENTIMENT,
        sr::CONFIDENCE,
        sr::TOPICS,
        sr::METADATA,
        sr::TABLE,
        pm::TABLE,
        sr::MESSAGE_ID,
        pm::MESSAGE_ID,
        sr::PLATFORM,
        pm::PLATFORM
    )
}

/// Map six message columns starting at `offset`
fn map_message(row: &Row, offset: usize) -> rusqlite::Result<Message> {
    Ok(Message {
        platform: row.get(offset)?,
        message_id: row.get(offset + 1)?,
        content: row.get::<_, Option<String>>(offset + 2)?.unwrap_or_default(),
        timestamp: row.get::<_, Option<DateTime<Utc>>>(offset + 3)?,
        context_id: row.get(offset + 4)?,
        author_id: row.get(offset + 5)?,
    })
}

/// Map six sentiment record columns starting at `offset`
fn map_sentiment_record(row: &Row, offset: usize) -> rusqlite::Result<SentimentRecord> {
    let metadata = row
        .get::<_, Option<String>>(offset + 5)?
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(offset + 5, Type::Text, Box::new(e)))?;

    Ok(SentimentRecord {
        message_id: row.get(offset)?,
        platform: row.get(offset + 1)?,
        sentiment: row.get(offset + 2)?,
        confidence: row.get(offset + 3)?,
        topics: row.get(offset + 4)?,
        metadata,
    })
}

fn map_scored(row: &Row) -> rusqlite::Result<ScoredMessage> {
    Ok(ScoredMessage {
        message: map_message(row, 0)?,
        record: map_sentiment_record(row, 6)?,
    })
}

/// Open the content store described by configuration.
///
/// Failure here happens before any cycle and is fatal for the process.
pub fn establish_connection(config: &DatabaseConfig) -> Result<Database> {
    let database = Database::from_config(config)?;
    info!(
        messages = database.count_messages()?,
        records = database.count_records()?,
        "Connected to content store"
    );
    Ok(database)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use tempfile::TempDir;

    fn temp_db() -> (TempDir, Database) {
        let dir = tempfile::tempdir().expect("Failed to create temp directory");
        let url = format!("sqlite://{}", dir.path().join("pulse.db").display());
        let db = Database::new(&url).expect("Failed to create database");
        (dir, db)
    }

    #[test]
    fn test_sqlite_path_prefixes() {
        assert_eq!(sqlite_path("sqlite:data/pulse.db"), "data/pulse.db");
        assert_eq!(sqlite_path("sqlite:///tmp/pulse.db"), "/tmp/pulse.db");
        assert_eq!(sqlite_path("pulse.db"), "pulse.db");
    }

    #[test]
    fn test_message_insert_is_not_mutated() {
        let (_dir, db) = temp_db();
        let original = Message::new(Platform::Discord, "42", "first version");
        db.upsert_message(&original).expect("insert");
        db.upsert_message(&Message::new(Platform::Discord, "42", "second version"))
            .expect("second insert");

        assert_eq!(db.count_messages().expect("count"), 1);
        let unscored = db.unscored_messages(10).expect("unscored");
        assert_eq!(unscored[0].content, "first version");
    }

    #[test]
    fn test_rejects_out_of_range_confidence() {
        let (_dir, db) = temp_db();
        let record = SentimentRecord {
            message_id: "m1".to_string(),
            platform: Platform::X,
            sentiment: Sentiment::Positive,
            confidence: 1.2,
            topics: "general".to_string(),
            metadata: None,
        };
        assert!(matches!(
            db.upsert_sentiment(&record),
            Err(PulseError::InvalidRecord { .. })
        ));
        assert_eq!(db.count_records().expect("count"), 0);
    }

    #[test]
    fn test_metadata_round_trip() {
        let (_dir, db) = temp_db();
        let record = SentimentRecord {
            message_id: "at://did:plc:abc/app.bsky.feed.post/1".to_string(),
            platform: Platform::Bluesky,
            sentiment: Sentiment::Negative,
            confidence: 0.7,
            topics: "weather".to_string(),
            metadata: Some(serde_json::json!({ "likes": 3 })),
        };
        db.upsert_message(&Message::new(Platform::Bluesky, &record.message_id, "rainy again"))
            .expect("insert");
        db.upsert_sentiment(&record).expect("upsert");

        let stored = db.scored_messages().expect("scored");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].record, record);
    }

    #[test]
    fn test_recency_order() {
        let (_dir, db) = temp_db();
        let now = Utc::now();
        for (id, hours, confidence) in [("old", 5, 0.99), ("new", 1, 0.85)] {
            let message = Message::new(Platform::Discord, id, "so happy")
                .with_timestamp(now - ChronoDuration::hours(hours));
            db.upsert_message(&message).expect("message");
            db.upsert_sentiment(&SentimentRecord {
                message_id: id.to_string(),
                platform: Platform::Discord,
                sentiment: Sentiment::Positive,
                confidence,
                topics: "happy".to_string(),
                metadata: None,
            })
            .expect("record");
        }

        let query = SelectionQuery {
            platform: Platform::Discord,
            since: now - ChronoDuration::days(1),
            min_confidence: 0.8,
            limit: 10,
            order: SelectionOrder::Recency,
        };
        let ids: Vec<_> = db
            .select_top_positive(&query)
            .expect("select")
            .into_iter()
            .map(|s| s.message.message_id)
            .collect();
        assert_eq!(ids, vec!["new", "old"]);

        let by_confidence = SelectionQuery {
            order: SelectionOrder::ConfidenceThenRecency,
            ..query
        };
        let ids: Vec<_> = db
            .select_top_positive(&by_confidence)
            .expect("select")
            .into_iter()
            .map(|s| s.message.message_id)
            .collect();
        assert_eq!(ids, vec!["old", "new"]);
    }
}
