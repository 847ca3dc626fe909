//! Per-platform authentication state for one run.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::error::{PulseError, Result};
use crate::models::Platform;
use crate::platforms::{BlueskyClient, Collector, DiscordClient, OfflineCollector, Publisher, XClient};

/// Availability and handles for one platform
#[derive(Clone, Default)]
pub struct PlatformSlot {
    /// Whether cycles should include this platform
    pub available: bool,
    /// Authentication failed but dry-run keeps the platform in play
    pub degraded: bool,
    collector: Option<Arc<dyn Collector>>,
    publisher: Option<Arc<dyn Publisher>>,
}

impl PlatformSlot {
    /// Slot excluded from every cycle
    #[must_use]
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Slot backed by live clients
    #[must_use]
    pub fn connected(collector: Arc<dyn Collector>, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            available: true,
            degraded: false,
            collector: Some(collector),
            publisher: Some(publisher),
        }
    }

    /// Slot that only collects, e.g. a read-only source
    #[must_use]
    pub fn collect_only(collector: Arc<dyn Collector>) -> Self {
        Self {
            available: true,
            degraded: false,
            collector: Some(collector),
            publisher: None,
        }
    }

    /// Dry-run stand-in for a platform whose login failed
    #[must_use]
    pub fn degraded(platform: Platform) -> Self {
        Self {
            available: true,
            degraded: true,
            collector: Some(Arc::new(OfflineCollector::new(platform))),
            publisher: None,
        }
    }

    /// Collector handle, if any
    #[must_use]
    pub fn collector(&self) -> Option<Arc<dyn Collector>> {
        self.collector.clone()
    }

    /// Publisher handle, if any
    #[must_use]
    pub fn publisher(&self) -> Option<Arc<dyn Publisher>> {
        self.publisher.clone()
    }
}

/// Authentication results for every platform
#[derive(Clone, Default)]
pub struct Session {
    discord: PlatformSlot,
    bluesky: PlatformSlot,
    x: PlatformSlot,
}

impl Session {
    /// Slot for a platform
    #[must_use]
    pub const fn slot(&self, platform: Platform) -> &PlatformSlot {
        match platform {
            Platform::Discord => &self.discord,
            Platform::Bluesky => &self.bluesky,
            Platform::X => &self.x,
        }
    }

    /// Replace one platform's slot
    #[must_use]
    pub fn with(mut self, platform: Platform, slot: PlatformSlot) -> Self {
        match platform {
            Platform::Discord => self.discord = slot,
            Platform::Bluesky => self.bluesky = slot,
            Platform::X => self.x = slot,
        }
        self
    }

    /// Whether a platform takes part in cycles
    #[must_use]
    pub const fn is_available(&self, platform: Platform) -> bool {
        self.slot(platform).available
    }

    /// Platforms available this run, in fixed order
    #[must_use]
    pub fn active_platforms(&self) -> Vec<Platform> {
        Platform::ALL
            .into_iter()
            .filter(|platform| self.is_available(*platform))
            .collect()
    }

    /// Fail when nothing is available
    pub fn require_any(&self) -> Result<()> {
        if self.active_platforms().is_empty() {
            return Err(PulseError::Other(
                "No platforms available; check credentials".to_string(),
            ));
        }
        Ok(())
    }
}

/// Log in to each requested platform.
///
/// Missing credentials exclude a platform. A failed login excludes it too,
/// except in dry-run where it stays available in degraded form.
pub async fn authenticate(config: &AppConfig, requested: &[Platform], dry_run: bool) -> Session {
    let mut session = Session::default();

    for &platform in requested {
        let slot = match connect(config, platform).await {
            Ok(slot) => slot,
            Err(PulseError::MissingCredentials(_)) => {
                warn!(platform = %platform, "Credentials not configured; {platform} will be skipped");
                PlatformSlot::unavailable()
            }
            Err(e) if dry_run => {
                warn!(platform = %platform, error = %e, "Login failed; continuing degraded for dry run");
                PlatformSlot::degraded(platform)
            }
            Err(e) => {
                error!(platform = %platform, error = %e, "Login failed; {platform} will be skipped");
                PlatformSlot::unavailable()
            }
        };
        session = session.with(platform, slot);
    }

    info!(active = ?session.active_platforms(), "Platform authentication complete");
    session
}

async fn connect(config: &AppConfig, platform: Platform) -> Result<PlatformSlot> {
    match platform {
        Platform::Discord => {
            let token = config
                .discord_token()
                .ok_or(PulseError::MissingCredentials(platform))?;
            let client = Arc::new(DiscordClient::connect(&config.platforms.discord, token).await?);
            if config.platforms.discord.announce_channel_id.is_none() {
                info!("No Discord announce channel; Discord is read-only");
                return Ok(PlatformSlot::collect_only(client));
            }
            Ok(PlatformSlot::connected(client.clone(), client))
        }
        Platform::Bluesky => {
            let (handle, password) = config
                .bluesky_credentials()
                .ok_or(PulseError::MissingCredentials(platform))?;
            let client =
                Arc::new(BlueskyClient::login(&config.platforms.bluesky, &handle, &password).await?);
            Ok(PlatformSlot::connected(client.clone(), client))
        }
        Platform::X => {
            let token = config
                .x_bearer_token()
                .ok_or(PulseError::MissingCredentials(platform))?;
            let client = Arc::new(XClient::connect(&config.platforms.x, token).await?);
            Ok(PlatformSlot::connected(client.clone(), client))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_platforms_in_fixed_order() {
        let session = Session::default()
            .with(Platform::X, PlatformSlot::degraded(Platform::X))
            .with(Platform::Discord, PlatformSlot::degraded(Platform::Discord));

        assert_eq!(session.active_platforms(), vec![Platform::Discord, Platform::X]);
        assert!(!session.is_available(Platform::Bluesky));
        assert!(session.require_any().is_ok());
    }

    #[test]
    fn test_empty_session_is_rejected() {
        assert!(Session::default().require_any().is_err());
    }

    #[tokio::test]
    async fn test_missing_credentials_leave_platforms_unavailable() {
        for key in ["DISCORD_TOKEN", "BLUESKY_HANDLE", "BLUESKY_PASSWORD", "X_BEARER_TOKEN"] {
            std::env::remove_var(key);
        }
        let mut config = AppConfig::default();
        config.platforms.discord.token = Some("YOUR_DISCORD_TOKEN".to_string());

        for dry_run in [false, true] {
            let session = authenticate(&config, &Platform::ALL, dry_run).await;
            assert!(session.active_platforms().is_empty(), "dry_run = {dry_run}");
            assert!(!session.slot(Platform::Discord).degraded);
            assert!(session.require_any().is_err());
        }
    }

    #[test]
    fn test_degraded_slot_has_no_publisher() {
        let slot = PlatformSlot::degraded(Platform::Bluesky);
        assert!(slot.available && slot.degraded);
        assert!(slot.collector().is_some());
        assert!(slot.publisher().is_none());
    }
}
