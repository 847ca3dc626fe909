//! Bluesky (AT Protocol) client over XRPC.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{check_status, http_client, CollectContext, Collector, Publisher};
use crate::config::BlueskyConfig;
use crate::error::Result;
use crate::models::{Message, Platform};

/// Notification reasons that carry someone else's post text
const CONVERSATION_REASONS: &[&str] = &["mention", "reply", "quote"];

const MAX_PAGE: usize = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    access_jwt: String,
    did: String,
    handle: String,
}

#[derive(Debug, Deserialize)]
struct NotificationPage {
    #[serde(default)]
    notifications: Vec<Notification>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Notification {
    uri: String,
    author: Author,
    reason: String,
    #[serde(default)]
    record: Value,
    indexed_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct Author {
    did: String,
}

impl Notification {
    fn into_message(self) -> Message {
        let text = self.record.get("text").and_then(Value::as_str).unwrap_or_default();
        let created = self
            .record
            .get("createdAt")
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse::<DateTime<Utc>>().ok())
            .unwrap_or(self.indexed_at);

        let mut message = Message::new(Platform::Bluesky, self.uri, text)
            .with_author(self.author.did)
            .with_timestamp(created);
        if let Some(root) = self.record.pointer("/reply/root/uri").and_then(Value::as_str) {
            message = message.with_context(root);
        }
        message
    }
}

/// Logged-in Bluesky session
pub struct BlueskyClient {
    http: Client,
    service_url: String,
    access_jwt: String,
    did: String,
}

impl BlueskyClient {
    /// Create a session with a handle and app password
    pub async fn login(config: &BlueskyConfig, handle: &str, app_password: &str) -> Result<Self> {
        let http = http_client()?;
        let service_url = config.service_url.trim_end_matches('/').to_string();

        let resp = http
            .post(format!("{service_url}/xrpc/com.atproto.server.createSession"))
            .json(&json!({ "identifier": handle, "password": app_password }))
            .send()
            .await?;
        let session: SessionResponse = check_status(Platform::Bluesky, resp).await?.json().await?;
        info!(handle = %session.handle, "Authenticated with Bluesky");

        Ok(Self {
            http,
            service_url,
            access_jwt: session.access_jwt,
            did: session.did,
        })
    }
}

#[async_trait]
impl Collector for BlueskyClient {
    fn platform(&self) -> Platform {
        Platform::Bluesky
    }

    async fn fetch(&self, _context: &CollectContext, limit: usize) -> Result<Vec<Message>> {
        let resp = self
            .http
            .get(format!("{}/xrpc/app.bsky.notification.listNotifications", self.service_url))
            .bearer_auth(&self.access_jwt)
            .query(&[("limit", limit.clamp(1, MAX_PAGE))])
            .send()
            .await?;
        let page: NotificationPage = check_status(Platform::Bluesky, resp).await?.json().await?;
        debug!(count = page.notifications.len(), "Fetched Bluesky notifications");

        Ok(page
            .notifications
            .into_iter()
            .filter(|n| CONVERSATION_REASONS.contains(&n.reason.as_str()))
            .filter(|n| n.author.did != self.did)
            .map(Notification::into_message)
            .collect())
    }
}

#[async_trait]
impl Publisher for BlueskyClient {
    fn platform(&self) -> Platform {
        Platform::Bluesky
    }

    async fn publish(&self, text: &str) -> Result<()> {
        let record = json!({
            "$type": "app.bsky.feed.post",
            "text": text,
            "createdAt": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        });
        let resp = self
            .http
            .post(format!("{}/xrpc/com.atproto.repo.createRecord", self.service_url))
            .bearer_auth(&self.access_jwt)
            .json(&json!({
                "repo": self.did,
                "collection": "app.bsky.feed.post",
                "record": record,
            }))
            .send()
            .await?;
        check_status(Platform::Bluesky, resp).await?;
        info!("Posted highlight to Bluesky");
        Ok(())
    }
}
