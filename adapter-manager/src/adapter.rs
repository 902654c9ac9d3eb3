use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use switchboard::config::{Capability, Platform};
use switchboard::credentials::OAuthEndpoint;
use switchboard::dispatch::OperationDescriptor;
use switchboard::event::NormalizedEvent;
use switchboard::webhook::SignatureScheme;

/// One item returned by a poll, ordered by `created_time`.
#[derive(Clone, Debug)]
pub struct PolledItem {
    /// Vendor-assigned id; the downstream dedupe key.
    pub id: String,
    pub created_time: DateTime<Utc>,
    /// Cursor position after this item is processed (an id or a
    /// timestamp, whatever the platform's "newer than" filter takes).
    pub cursor: String,
    pub payload: Value,
}

/// Adapter interface for a social platform integration.
///
/// Adapters are stateless; credentials, cursors, and scheduling live in
/// the manager. An adapter contributes three things: a declarative
/// operation table for outbound calls, a poll implementation for
/// inbound streams, and payload normalization.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Adapter instance id (configuration key, e.g. "fb_ads").
    fn name(&self) -> &str;

    fn platform(&self) -> Platform;

    /// Token refresh endpoint and client credentials.
    fn oauth_endpoint(&self) -> OAuthEndpoint;

    /// How the platform signs webhook deliveries.
    fn signature_scheme(&self) -> SignatureScheme;

    /// Outbound operation table, registered with the dispatcher at
    /// startup.
    fn operations(&self) -> Vec<OperationDescriptor>;

    fn capabilities(&self) -> Vec<Capability>;

    /// Seconds between poll ticks.
    fn poll_interval(&self) -> u64;

    /// Stream names this adapter polls (e.g. "page_feed").
    fn streams(&self) -> Vec<String>;

    /// Fetches items from `stream` created after the cursor position.
    /// `cursor` is `None` on the first poll; implementations fall back
    /// to their configured lookback window.
    async fn fetch_newer_than(
        &self,
        access_token: &str,
        stream: &str,
        cursor: Option<&str>,
    ) -> Result<Vec<PolledItem>>;

    /// Converts one polled item into a normalized event.
    fn normalize(&self, stream: &str, item: &PolledItem) -> NormalizedEvent;
}
