//! Configuration loading.
//!
//! One TOML file with a `[adapters.<name>]` block per adapter instance.
//! Feature sprawl is avoided by a capability set per adapter instead of
//! per-feature boolean flags: callers ask `config.supports(cap)`.

use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Complete Switchboard configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SwitchboardConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    /// Keyed by adapter id (e.g. "facebook_ads", "tiktok_ads").
    #[serde(default)]
    pub adapters: HashMap<String, AdapterConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_credentials_db")]
    pub credentials_db: String,
    #[serde(default = "default_cursors_db")]
    pub cursors_db: String,
}

fn default_credentials_db() -> String {
    "credentials.db".to_string()
}

fn default_cursors_db() -> String {
    "cursors.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            credentials_db: default_credentials_db(),
            cursors_db: default_cursors_db(),
        }
    }
}

/// Where normalized events are delivered.
#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    #[serde(default = "default_sink_url")]
    pub url: String,
}

fn default_sink_url() -> String {
    "http://localhost:4000/api/events".to_string()
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            url: default_sink_url(),
        }
    }
}

/// Which platform an adapter instance talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Facebook,
    Tiktok,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Facebook => "facebook",
            Platform::Tiktok => "tiktok",
        }
    }
}

/// What an adapter instance is allowed/able to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    AdsManagement,
    Messaging,
    ContentPublishing,
    Insights,
    PixelTracking,
    Webhooks,
    Polling,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::AdsManagement => "ads_management",
            Capability::Messaging => "messaging",
            Capability::ContentPublishing => "content_publishing",
            Capability::Insights => "insights",
            Capability::PixelTracking => "pixel_tracking",
            Capability::Webhooks => "webhooks",
            Capability::Polling => "polling",
        }
    }
}

/// Configuration for one adapter instance.
#[derive(Debug, Clone, Deserialize)]
pub struct AdapterConfig {
    pub platform: Platform,
    /// Vendor host, e.g. "https://graph.facebook.com".
    pub base_url: String,
    /// API version path segment, e.g. "v19.0".
    pub api_version: String,

    /// App/client id for OAuth refresh, when the platform requires it.
    #[serde(default)]
    pub app_id: Option<String>,
    /// App/client secret; doubles as the webhook signing secret unless
    /// `webhook_secret` overrides it.
    #[serde(default)]
    pub app_secret: Option<String>,
    /// OAuth token endpoint for refresh exchanges.
    #[serde(default)]
    pub token_url: Option<String>,
    /// Webhook subscription handshake token.
    #[serde(default)]
    pub verify_token: Option<String>,
    /// Webhook signing secret, when distinct from `app_secret`.
    #[serde(default)]
    pub webhook_secret: Option<String>,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub capabilities: Vec<Capability>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl AdapterConfig {
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// The secret used to verify inbound webhook signatures.
    pub fn signing_secret(&self) -> Option<&str> {
        self.webhook_secret
            .as_deref()
            .or(self.app_secret.as_deref())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit")]
    pub limit: u32,
    #[serde(default = "default_rate_window_secs")]
    pub window_secs: u64,
}

fn default_rate_limit() -> u32 {
    100
}

fn default_rate_window_secs() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: default_rate_limit(),
            window_secs: default_rate_window_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
    /// How far back the first poll of a fresh stream looks.
    #[serde(default = "default_lookback_secs")]
    pub lookback_secs: u64,
    /// Resource streams to poll (e.g. "page_feed", "comments").
    #[serde(default)]
    pub streams: Vec<String>,
}

fn default_poll_interval_secs() -> u64 {
    300
}

fn default_lookback_secs() -> u64 {
    3600
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval_secs(),
            lookback_secs: default_lookback_secs(),
            streams: Vec::new(),
        }
    }
}

/// Load configuration from a TOML file.
pub fn load_config(path: &str) -> anyhow::Result<SwitchboardConfig> {
    let contents = std::fs::read_to_string(path)?;
    let config: SwitchboardConfig = toml::from_str(&contents)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SwitchboardConfig::default();
        assert_eq!(config.server.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.storage.credentials_db, "credentials.db");
        assert!(config.adapters.is_empty());
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [server]
            bind_addr = "127.0.0.1:8080"

            [sink]
            url = "http://flow-engine:4000/api/events"

            [adapters.facebook_ads]
            platform = "facebook"
            base_url = "https://graph.facebook.com"
            api_version = "v19.0"
            app_id = "1234"
            app_secret = "shhh"
            verify_token = "hub-verify"
            capabilities = ["ads_management", "webhooks", "polling"]

            [adapters.facebook_ads.rate_limit]
            limit = 200
            window_secs = 3600

            [adapters.facebook_ads.poll]
            interval_secs = 120
            streams = ["page_feed", "conversations"]

            [adapters.tiktok_ads]
            platform = "tiktok"
            base_url = "https://business-api.tiktok.com/open_api"
            api_version = "v1.3"
            webhook_secret = "tt-secret"
        "#;

        let config: SwitchboardConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.sink.url, "http://flow-engine:4000/api/events");

        let fb = &config.adapters["facebook_ads"];
        assert_eq!(fb.platform, Platform::Facebook);
        assert_eq!(fb.rate_limit.limit, 200);
        assert_eq!(fb.rate_limit.window_secs, 3600);
        assert_eq!(fb.poll.interval_secs, 120);
        assert_eq!(fb.poll.streams, vec!["page_feed", "conversations"]);
        assert!(fb.supports(Capability::AdsManagement));
        assert!(!fb.supports(Capability::Messaging));
        // app_secret is the signing secret unless overridden
        assert_eq!(fb.signing_secret(), Some("shhh"));

        let tt = &config.adapters["tiktok_ads"];
        assert_eq!(tt.platform, Platform::Tiktok);
        // Defaults fill unspecified sections
        assert_eq!(tt.rate_limit.limit, 100);
        assert_eq!(tt.poll.interval_secs, 300);
        assert_eq!(tt.signing_secret(), Some("tt-secret"));
    }

    #[test]
    fn test_unknown_platform_rejected() {
        let toml = r#"
            [adapters.x]
            platform = "myspace"
            base_url = "https://example.com"
            api_version = "v1"
        "#;
        assert!(toml::from_str::<SwitchboardConfig>(toml).is_err());
    }
}
