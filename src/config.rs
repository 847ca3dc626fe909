use anyhow::Result;
use chrono::{DateTime, Utc};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::models::{Platform, RunMode, SelectionOrder};

/// Longest selection window accepted, in days
pub const MAX_WINDOW_DAYS: i64 = 3650;

/// Application configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// SQLite store
    pub database: DatabaseConfig,
    /// Log level, format and file output
    pub logging: LoggingConfig,
    /// Sentiment model and topic extraction
    pub classifier: ClassifierConfig,
    /// Cycle behaviour
    pub pipeline: PipelineConfig,
    /// Look-back windows
    pub selection: SelectionConfig,
    /// Source to target publication routes
    pub routes: Vec<PublishRoute>,
    /// Per-platform credentials and endpoints
    pub platforms: PlatformsConfig,
}

/// Content store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection string, `sqlite:` prefixed or a bare path
    pub url: String,
    /// Pool size
    pub max_connections: u32,
    /// Seconds to wait for a pooled connection
    pub connection_timeout_secs: u64,
}

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `trace`, `debug`, `info`, `warn` or `error`
    pub level: String,
    /// Daily-rolling JSON log file, when set
    pub file_path: Option<String>,
    /// Console format
    pub format: String, // "json" or "text"
}

/// Sentiment model and topic settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Characters handed to the sentiment model; longer content is truncated
    pub max_input_chars: usize,
    /// Topics kept per record
    pub max_topics: usize,
    /// Topic string length cap
    pub max_topic_chars: usize,
    /// Filler words removed on top of the English stopword list
    pub extra_stopwords: Vec<String>,
    /// Rows per backlog batch
    pub batch_size: usize,
}

/// Cycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Log side effects instead of performing them
    pub dry_run: bool,
    /// Stop after storing, or also publish
    pub mode: RunMode,
    /// Highlights published per source platform per cycle
    pub posts_per_platform: usize,
    /// Records must be strictly above this to be published
    pub confidence_floor: f64,
    /// Selection ordering
    pub order: SelectionOrder,
    /// Messages fetched per platform per cycle
    pub collect_limit: usize,
    /// Seconds between steady-state cycles
    pub interval_secs: u64,
    /// Seconds between warm-up cycles
    pub warmup_interval_secs: u64,
    /// Cycles run at the warm-up interval
    pub warmup_cycles: u32,
    /// Prefix of composed posts
    pub summary_tag: String,
    /// Directory of the dedup ledger files
    pub ledger_dir: String,
    /// Discord channel read by the collector
    pub channel_id: Option<String>,
}

/// Look-back windows for highlight selection, per platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Discord look-back in days
    pub discord_window_days: i64,
    /// Bluesky look-back in days
    pub bluesky_window_days: i64,
    /// X look-back in days
    pub x_window_days: i64,
}

impl SelectionConfig {
    /// Configured look-back in days for a platform
    #[must_use]
    pub const fn window_days(&self, platform: Platform) -> i64 {
        match platform {
            Platform::Discord => self.discord_window_days,
            Platform::Bluesky => self.bluesky_window_days,
            Platform::X => self.x_window_days,
        }
    }

    /// Look-back window for a platform; `None` when it does not fit a duration
    #[must_use]
    pub fn window_for(&self, platform: Platform) -> Option<chrono::Duration> {
        chrono::Duration::try_days(self.window_days(platform))
    }

    /// Oldest timestamp selectable for a platform as of `now`
    #[must_use]
    pub fn window_start(&self, platform: Platform, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        now.checked_sub_signed(self.window_for(platform)?)
    }
}

/// Where highlights selected from `source` get posted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishRoute {
    /// Platform the highlights come from
    pub source: Platform,
    /// Platform they are posted to
    pub target: Platform,
}

/// Settings for each platform
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformsConfig {
    /// Discord settings
    pub discord: DiscordConfig,
    /// Bluesky settings
    pub bluesky: BlueskyConfig,
    /// X settings
    pub x: XConfig,
}

/// Discord bot settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Bot token
    pub token: Option<String>,
    /// Channel highlights are posted to
    pub announce_channel_id: Option<String>,
    /// REST base URL
    pub api_base: String,
}

/// Bluesky account settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueskyConfig {
    /// Account handle
    pub handle: Option<String>,
    /// App password
    pub app_password: Option<String>,
    /// PDS base URL
    pub service_url: String,
}

/// X account settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XConfig {
    /// OAuth 2.0 user-context access token
    pub bearer_token: Option<String>,
    /// API v2 base URL
    pub api_base: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: None,
            announce_channel_id: None,
            api_base: "https://discord.com/api/v10".to_string(),
        }
    }
}

impl Default for BlueskyConfig {
    fn default() -> Self {
        Self {
            handle: None,
            app_password: None,
            service_url: "https://bsky.social".to_string(),
        }
    }
}

impl Default for XConfig {
    fn default() -> Self {
        Self {
            bearer_token: None,
            api_base: "https://api.twitter.com/2".to_string(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite:data/pulse.db".to_string(),
                max_connections: 4,
                connection_timeout_secs: 30,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: None,
                format: "text".to_string(),
            },
            classifier: ClassifierConfig {
                max_input_chars: 512,
                max_topics: 2,
                max_topic_chars: 95,
                extra_stopwords: crate::nlp::DEFAULT_FILLER_WORDS
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
                batch_size: 100,
            },
            pipeline: PipelineConfig {
                dry_run: false,
                mode: RunMode::Publish,
                posts_per_platform: 5,
                confidence_floor: 0.8,
                order: SelectionOrder::ConfidenceThenRecency,
                collect_limit: 50,
                interval_secs: 300,
                warmup_interval_secs: 30,
                warmup_cycles: 3,
                summary_tag: "PulseCheck".to_string(),
                ledger_dir: "data/ledger".to_string(),
                channel_id: None,
            },
            selection: SelectionConfig {
                discord_window_days: 7,
                bluesky_window_days: 1,
                x_window_days: 1,
            },
            routes: vec![
                PublishRoute {
                    source: Platform::Discord,
                    target: Platform::X,
                },
                PublishRoute {
                    source: Platform::Bluesky,
                    target: Platform::Bluesky,
                },
                PublishRoute {
                    source: Platform::X,
                    target: Platform::X,
                },
            ],
            platforms: PlatformsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence
    pub fn load() -> Result<Self> {
        let config = Config::builder()
            // Start with default values
            .add_source(Config::try_from(&Self::default())?)
            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(File::with_name("pulse_check").required(false))
            // Add environment variables with prefix
            .add_source(
                Environment::with_prefix("PULSE_CHECK")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("Failed to deserialize configuration: {}", e))?;

        // Validate configuration
        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate database config
        if self.database.max_connections == 0 {
            return Err(anyhow::anyhow!("max_connections must be greater than 0"));
        }
        if self.database.connection_timeout_secs == 0 {
            return Err(anyhow::anyhow!("connection_timeout_secs must be greater than 0"));
        }

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            ));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log format: {}. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            ));
        }

        // Validate classifier config
        if self.classifier.max_input_chars == 0 {
            return Err(anyhow::anyhow!("max_input_chars must be greater than 0"));
        }
        if self.classifier.max_topics == 0 {
            return Err(anyhow::anyhow!("max_topics must be greater than 0"));
        }
        if self.classifier.max_topic_chars == 0 || self.classifier.max_topic_chars > 100 {
            return Err(anyhow::anyhow!("max_topic_chars must be between 1 and 100"));
        }
        if self.classifier.batch_size == 0 {
            return Err(anyhow::anyhow!("batch_size must be greater than 0"));
        }

        // Validate pipeline config
        if !(0.0..=1.0).contains(&self.pipeline.confidence_floor) {
            return Err(anyhow::anyhow!("confidence_floor must be within [0, 1]"));
        }
        if self.pipeline.posts_per_platform == 0 {
            return Err(anyhow::anyhow!("posts_per_platform must be greater than 0"));
        }
        if self.pipeline.collect_limit == 0 {
            return Err(anyhow::anyhow!("collect_limit must be greater than 0"));
        }
        if self.pipeline.interval_secs == 0 || self.pipeline.warmup_interval_secs == 0 {
            return Err(anyhow::anyhow!("cycle intervals must be greater than 0"));
        }
        if self.pipeline.ledger_dir.trim().is_empty() {
            return Err(anyhow::anyhow!("ledger_dir must not be empty"));
        }

        // Validate selection windows
        for platform in Platform::ALL {
            let days = self.selection.window_days(platform);
            if !(1..=MAX_WINDOW_DAYS).contains(&days) {
                return Err(anyhow::anyhow!(
                    "{} selection window must be between 1 and {} days, got {}",
                    platform,
                    MAX_WINDOW_DAYS,
                    days
                ));
            }
        }

        Ok(())
    }

    /// Get database URL from environment or config
    pub fn get_database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| self.database.url.clone())
    }

    /// Get log level from environment or config
    pub fn get_log_level(&self) -> String {
        std::env::var("RUST_LOG").unwrap_or_else(|_| self.logging.level.clone())
    }

    /// Discord bot token from environment or config
    pub fn discord_token(&self) -> Option<String> {
        credential("DISCORD_TOKEN", self.platforms.discord.token.as_ref())
    }

    /// Bluesky handle and app password from environment or config
    pub fn bluesky_credentials(&self) -> Option<(String, String)> {
        let handle = credential("BLUESKY_HANDLE", self.platforms.bluesky.handle.as_ref())?;
        let password = credential("BLUESKY_PASSWORD", self.platforms.bluesky.app_password.as_ref())?;
        Some((handle, password))
    }

    /// X access token from environment or config
    pub fn x_bearer_token(&self) -> Option<String> {
        credential("X_BEARER_TOKEN", self.platforms.x.bearer_token.as_ref())
    }
}

/// Environment wins over config; placeholder values count as absent
fn credential(env_key: &str, configured: Option<&String>) -> Option<String> {
    std::env::var(env_key)
        .ok()
        .or_else(|| configured.cloned())
        .filter(|value| is_real_credential(value))
}

/// Rejects blanks and template placeholders such as `YOUR_X_API_KEY_HERE`
#[must_use]
pub fn is_real_credential(value: &str) -> bool {
    let trimmed = value.trim();
    !trimmed.is_empty() && !trimmed.starts_with("YOUR_")
}
