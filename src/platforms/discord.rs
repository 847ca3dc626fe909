//! Discord REST client: reads a channel, posts to an announce channel.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::{check_status, http_client, CollectContext, Collector, Publisher};
use crate::config::DiscordConfig;
use crate::error::{PulseError, Result};
use crate::models::{Message, Platform};

/// Discord caps message history pages at 100
const MAX_PAGE: usize = 100;

/// Discord API message object
#[derive(Debug, Deserialize)]
struct DiscordMessage {
    id: String,
    channel_id: String,
    author: DiscordUser,
    #[serde(default)]
    content: String,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct DiscordUser {
    id: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    bot: bool,
}

/// Authenticated bot connection
pub struct DiscordClient {
    http: Client,
    api_base: String,
    token: String,
    announce_channel_id: Option<String>,
    bot_user_id: String,
}

impl DiscordClient {
    /// Verify the bot token against `/users/@me`
    pub async fn connect(config: &DiscordConfig, token: String) -> Result<Self> {
        let http = http_client()?;
        let api_base = config.api_base.trim_end_matches('/').to_string();

        let resp = http
            .get(format!("{api_base}/users/@me"))
            .header("Authorization", format!("Bot {token}"))
            .send()
            .await?;
        let me: DiscordUser = check_status(Platform::Discord, resp).await?.json().await?;
        info!(user = %me.username, "Authenticated with Discord");

        Ok(Self {
            http,
            api_base,
            token,
            announce_channel_id: config.announce_channel_id.clone(),
            bot_user_id: me.id,
        })
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.token)
    }
}

#[async_trait]
impl Collector for DiscordClient {
    fn platform(&self) -> Platform {
        Platform::Discord
    }

    async fn fetch(&self, context: &CollectContext, limit: usize) -> Result<Vec<Message>> {
        let channel_id = context
            .channel_id
            .as_deref()
            .ok_or_else(|| PulseError::InvalidConfig("Discord collection needs a channel id".to_string()))?;

        let resp = self
            .http
            .get(format!("{}/channels/{channel_id}/messages", self.api_base))
            .header("Authorization", self.auth_header())
            .query(&[("limit", limit.clamp(1, MAX_PAGE))])
            .send()
            .await?;
        let page: Vec<DiscordMessage> = check_status(Platform::Discord, resp).await?.json().await?;
        debug!(channel_id, count = page.len(), "Fetched Discord messages");

        Ok(page
            .into_iter()
            .filter(|m| !m.author.bot && m.author.id != self.bot_user_id)
            .map(|m| {
                Message::new(Platform::Discord, m.id, m.content)
                    .with_author(m.author.id)
                    .with_context(m.channel_id)
                    .with_timestamp(m.timestamp)
            })
            .collect())
    }
}

#[async_trait]
impl Publisher for DiscordClient {
    fn platform(&self) -> Platform {
        Platform::Discord
    }

    async fn publish(&self, text: &str) -> Result<()> {
        let channel_id = self
            .announce_channel_id
            .as_deref()
            .ok_or_else(|| PulseError::InvalidConfig("Discord announce channel is not configured".to_string()))?;

        let resp = self
            .http
            .post(format!("{}/channels/{channel_id}/messages", self.api_base))
            .header("Authorization", self.auth_header())
            .json(&json!({ "content": text }))
            .send()
            .await?;
        check_status(Platform::Discord, resp).await?;
        info!(channel_id, "Posted highlight to Discord");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_payload_parses() {
        let raw = r#"[{
            "id": "1200",
            "channel_id": "77",
            "author": {"id": "5", "username": "ana"},
            "content": "great meetup",
            "timestamp": "2026-10-01T12:00:00.000000+00:00",
            "attachments": []
        }]"#;
        let page: Vec<DiscordMessage> = serde_json::from_str(raw).expect("parse");
        assert_eq!(page[0].id, "1200");
        assert!(!page[0].author.bot);
        assert_eq!(page[0].timestamp.to_rfc3339(), "2026-10-01T12:00:00+00:00");
    }
}
