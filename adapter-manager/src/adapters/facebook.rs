//! Facebook adapter: Graph API ads, pages, and Messenger.
//!
//! Outbound operations are table data over the Graph API; polling reads
//! the page feed and conversations with a `since` timestamp filter.

use crate::adapter::{Adapter, PolledItem};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use switchboard::config::{AdapterConfig, Capability, Platform};
use switchboard::credentials::OAuthEndpoint;
use switchboard::dispatch::{
    AuthPlacement, BodyEncoding, HttpMethod, OperationDescriptor, ResponseEnvelope,
};
use switchboard::event::{NormalizedEvent, HEADER_STREAM};
use switchboard::webhook::SignatureScheme;
use tracing::warn;

pub const DEFAULT_BASE_URL: &str = "https://graph.facebook.com";
pub const DEFAULT_API_VERSION: &str = "v19.0";

/// Graph API timestamps look like "2024-05-01T12:00:00+0000".
const GRAPH_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

pub struct FacebookAdapter {
    name: String,
    config: AdapterConfig,
    http_client: reqwest::Client,
}

impl FacebookAdapter {
    pub fn new(name: String, config: AdapterConfig) -> Self {
        Self {
            name,
            config,
            http_client: reqwest::Client::new(),
        }
    }

    fn rate_key(&self, resource: &str) -> String {
        format!("{}:{}", self.name, resource)
    }

    fn descriptor(
        &self,
        op_name: &str,
        method: HttpMethod,
        path: &str,
        required: &[&str],
        resource: &str,
    ) -> OperationDescriptor {
        OperationDescriptor {
            name: op_name.to_string(),
            adapter_id: self.name.clone(),
            method,
            path: path.to_string(),
            auth: AuthPlacement::QueryAccessToken,
            body: BodyEncoding::Json,
            envelope: ResponseEnvelope::Plain,
            required: required.iter().map(|s| s.to_string()).collect(),
            renames: HashMap::new(),
            rate_key: self.rate_key(resource),
            cost: 1,
        }
    }

    fn stream_path(stream: &str) -> &str {
        match stream {
            "page_feed" => "me/feed",
            "conversations" => "me/conversations",
            other => other,
        }
    }

    fn stream_event_type(stream: &str) -> &str {
        match stream {
            "page_feed" => "page.post",
            "conversations" => "page.conversation",
            _ => "page.item",
        }
    }

    fn parse_item(entry: &Value) -> Option<PolledItem> {
        let id = entry.get("id")?.as_str()?.to_string();
        let raw_time = entry
            .get("created_time")
            .or_else(|| entry.get("updated_time"))?
            .as_str()?;
        let created_time = DateTime::parse_from_str(raw_time, GRAPH_TIME_FORMAT)
            .or_else(|_| DateTime::parse_from_rfc3339(raw_time))
            .ok()?
            .with_timezone(&Utc);
        Some(PolledItem {
            id,
            created_time,
            cursor: created_time.timestamp().to_string(),
            payload: entry.clone(),
        })
    }
}

#[async_trait]
impl Adapter for FacebookAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    fn oauth_endpoint(&self) -> OAuthEndpoint {
        let token_url = self.config.token_url.clone().unwrap_or_else(|| {
            format!(
                "{}/{}/oauth/access_token",
                self.config.base_url, self.config.api_version
            )
        });
        OAuthEndpoint {
            token_url,
            client_id: self.config.app_id.clone(),
            client_secret: self.config.app_secret.clone(),
        }
    }

    fn signature_scheme(&self) -> SignatureScheme {
        SignatureScheme::HubSha256
    }

    fn operations(&self) -> Vec<OperationDescriptor> {
        use HttpMethod::{Delete, Get, Post};
        vec![
            self.descriptor(
                "CREATE_CAMPAIGN",
                Post,
                "act_{ad_account_id}/campaigns",
                &["ad_account_id", "name", "objective"],
                "ads",
            ),
            self.descriptor(
                "UPDATE_CAMPAIGN",
                Post,
                "{campaign_id}",
                &["campaign_id"],
                "ads",
            ),
            self.descriptor(
                "DELETE_CAMPAIGN",
                Delete,
                "{campaign_id}",
                &["campaign_id"],
                "ads",
            ),
            self.descriptor(
                "CREATE_ADSET",
                Post,
                "act_{ad_account_id}/adsets",
                &["ad_account_id", "name", "campaign_id"],
                "ads",
            ),
            self.descriptor("UPDATE_ADSET", Post, "{adset_id}", &["adset_id"], "ads"),
            self.descriptor("DELETE_ADSET", Delete, "{adset_id}", &["adset_id"], "ads"),
            self.descriptor(
                "CREATE_AD",
                Post,
                "act_{ad_account_id}/ads",
                &["ad_account_id", "name", "adset_id", "creative"],
                "ads",
            ),
            self.descriptor("UPDATE_AD", Post, "{ad_id}", &["ad_id"], "ads"),
            self.descriptor("DELETE_AD", Delete, "{ad_id}", &["ad_id"], "ads"),
            self.descriptor(
                "CREATE_AD_CREATIVE",
                Post,
                "act_{ad_account_id}/adcreatives",
                &["ad_account_id", "name"],
                "ads",
            ),
            self.descriptor(
                "GET_INSIGHTS",
                Get,
                "act_{ad_account_id}/insights",
                &["ad_account_id"],
                "insights",
            ),
            self.descriptor(
                "CREATE_PAGE_POST",
                Post,
                "{page_id}/feed",
                &["page_id", "message"],
                "pages",
            ),
            self.descriptor(
                "SEND_MESSAGE",
                Post,
                "me/messages",
                &["recipient", "message"],
                "messaging",
            ),
        ]
    }

    fn capabilities(&self) -> Vec<Capability> {
        self.config.capabilities.clone()
    }

    fn poll_interval(&self) -> u64 {
        self.config.poll.interval_secs
    }

    fn streams(&self) -> Vec<String> {
        self.config.poll.streams.clone()
    }

    async fn fetch_newer_than(
        &self,
        access_token: &str,
        stream: &str,
        cursor: Option<&str>,
    ) -> Result<Vec<PolledItem>> {
        let since: i64 = match cursor {
            Some(c) => c.parse().context("Invalid poll cursor")?,
            None => (Utc::now().timestamp()) - self.config.poll.lookback_secs as i64,
        };

        let url = format!(
            "{}/{}/{}",
            self.config.base_url,
            self.config.api_version,
            Self::stream_path(stream)
        );
        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("access_token", access_token),
                ("since", &since.to_string()),
            ])
            .send()
            .await
            .context("Graph API request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Graph API returned status {}: {}", status, body);
        }

        let body: Value = response
            .json()
            .await
            .context("Failed to parse Graph API response")?;
        let entries = body
            .get("data")
            .and_then(Value::as_array)
            .context("Graph API response missing 'data' array")?;

        let mut items = Vec::new();
        for entry in entries {
            match Self::parse_item(entry) {
                // `since` is inclusive on some edges; drop the boundary item.
                Some(item) if item.created_time.timestamp() > since => items.push(item),
                Some(_) => {}
                None => {
                    warn!(adapter = %self.name, stream = %stream, "Skipping malformed feed entry")
                }
            }
        }
        Ok(items)
    }

    fn normalize(&self, stream: &str, item: &PolledItem) -> NormalizedEvent {
        let mut event = NormalizedEvent::from_item(
            Platform::Facebook.as_str(),
            Self::stream_event_type(stream),
            &item.id,
            item.created_time,
            item.payload.clone(),
        );
        event
            .headers
            .insert(HEADER_STREAM.to_string(), stream.to_string());
        event
    }
}
