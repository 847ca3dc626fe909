//! X API v2 client using a user-context bearer token.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::{check_status, http_client, CollectContext, Collector, Publisher};
use crate::config::XConfig;
use crate::error::{PulseError, Result};
use crate::models::{Message, Platform};

/// `max_results` bounds for the mentions timeline
const MIN_PAGE: usize = 5;
const MAX_PAGE: usize = 100;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct User {
    id: String,
    username: String,
}

#[derive(Debug, Deserialize)]
struct Tweet {
    id: String,
    text: String,
    author_id: Option<String>,
    conversation_id: Option<String>,
    created_at: Option<DateTime<Utc>>,
}

impl From<Tweet> for Message {
    fn from(tweet: Tweet) -> Self {
        let mut message = Self::new(Platform::X, tweet.id, tweet.text);
        message.author_id = tweet.author_id;
        message.context_id = tweet.conversation_id;
        message.timestamp = tweet.created_at;
        message
    }
}

/// Authenticated X account
pub struct XClient {
    http: Client,
    api_base: String,
    token: String,
    user_id: String,
}

impl XClient {
    /// Resolve the account behind the token via `/users/me`
    pub async fn connect(config: &XConfig, token: String) -> Result<Self> {
        let http = http_client()?;
        let api_base = config.api_base.trim_end_matches('/').to_string();

        let resp = http
            .get(format!("{api_base}/users/me"))
            .bearer_auth(&token)
            .send()
            .await?;
        let me: Envelope<User> = check_status(Platform::X, resp).await?.json().await?;
        let me = me.data.ok_or_else(|| PulseError::PlatformApi {
            platform: Platform::X,
            status: 200,
            message: "users/me returned no data".to_string(),
        })?;
        info!(user = %me.username, "Authenticated with X");

        Ok(Self {
            http,
            api_base,
            token,
            user_id: me.id,
        })
    }
}

#[async_trait]
impl Collector for XClient {
    fn platform(&self) -> Platform {
        Platform::X
    }

    async fn fetch(&self, _context: &CollectContext, limit: usize) -> Result<Vec<Message>> {
        let resp = self
            .http
            .get(format!("{}/users/{}/mentions", self.api_base, self.user_id))
            .bearer_auth(&self.token)
            .query(&[
                ("max_results", limit.clamp(MIN_PAGE, MAX_PAGE).to_string()),
                ("tweet.fields", "created_at,author_id,conversation_id".to_string()),
            ])
            .send()
            .await?;
        let page: Envelope<Vec<Tweet>> = check_status(Platform::X, resp).await?.json().await?;
        let tweets = page.data.unwrap_or_default();
        debug!(count = tweets.len(), "Fetched X mentions");

        Ok(tweets.into_iter().take(limit).map(Message::from).collect())
    }
}

#[async_trait]
impl Publisher for XClient {
    fn platform(&self) -> Platform {
        Platform::X
    }

    async fn publish(&self, text: &str) -> Result<()> {
        let resp = self
            .http
            .post(format!("{}/tweets", self.api_base))
            .bearer_auth(&self.token)
            .json(&json!({ "text": text }))
            .send()
            .await?;
        check_status(Platform::X, resp).await?;
        info!("Posted highlight to X");
        Ok(())
    }
}
