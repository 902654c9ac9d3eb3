//! TikTok adapter: Business API campaigns, reporting, and comments.
//!
//! Every response is wrapped in `{"code", "message", "data"}`; `code`
//! other than 0 is a failure even on HTTP 200. Polling reads comment
//! and lead streams filtered by a `start_time` unix timestamp.

use crate::adapter::{Adapter, PolledItem};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
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

pub const DEFAULT_BASE_URL: &str = "https://business-api.tiktok.com/open_api";
pub const DEFAULT_API_VERSION: &str = "v1.3";
const DEFAULT_TOKEN_URL: &str =
    "https://business-api.tiktok.com/open_api/v1.3/oauth2/access_token/";

pub struct TiktokAdapter {
    name: String,
    config: AdapterConfig,
    http_client: reqwest::Client,
}

impl TiktokAdapter {
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
            auth: AuthPlacement::AccessTokenHeader,
            body: match method {
                HttpMethod::Get => BodyEncoding::None,
                _ => BodyEncoding::Json,
            },
            envelope: ResponseEnvelope::CodeMessageData,
            required: required.iter().map(|s| s.to_string()).collect(),
            renames: HashMap::new(),
            rate_key: self.rate_key(resource),
            cost: 1,
        }
    }

    fn stream_path(stream: &str) -> &str {
        match stream {
            "comments" => "comment/list/",
            "leads" => "page/lead/task/list/",
            other => other,
        }
    }

    fn stream_event_type(stream: &str) -> &str {
        match stream {
            "comments" => "comment.created",
            "leads" => "lead.received",
            _ => "item.polled",
        }
    }

    fn parse_item(entry: &Value) -> Option<PolledItem> {
        let id = entry
            .get("comment_id")
            .or_else(|| entry.get("lead_id"))
            .or_else(|| entry.get("id"))?;
        let id = match id {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let create_time = entry.get("create_time")?.as_i64()?;
        let created_time = Utc.timestamp_opt(create_time, 0).single()?;
        Some(PolledItem {
            id,
            created_time,
            cursor: create_time.to_string(),
            payload: entry.clone(),
        })
    }
}

#[async_trait]
impl Adapter for TiktokAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn platform(&self) -> Platform {
        Platform::Tiktok
    }

    fn oauth_endpoint(&self) -> OAuthEndpoint {
        OAuthEndpoint {
            token_url: self
                .config
                .token_url
                .clone()
                .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
            client_id: self.config.app_id.clone(),
            client_secret: self.config.app_secret.clone(),
        }
    }

    fn signature_scheme(&self) -> SignatureScheme {
        SignatureScheme::TimestampNonceBody
    }

    fn operations(&self) -> Vec<OperationDescriptor> {
        use HttpMethod::{Get, Post};
        vec![
            self.descriptor(
                "CREATE_CAMPAIGN",
                Post,
                "campaign/create/",
                &["advertiser_id", "campaign_name", "objective_type"],
                "ads",
            ),
            self.descriptor(
                "UPDATE_CAMPAIGN",
                Post,
                "campaign/update/",
                &["advertiser_id", "campaign_id"],
                "ads",
            ),
            self.descriptor(
                "UPDATE_CAMPAIGN_STATUS",
                Post,
                "campaign/status/update/",
                &["advertiser_id", "campaign_ids", "operation_status"],
                "ads",
            ),
            self.descriptor(
                "CREATE_ADGROUP",
                Post,
                "adgroup/create/",
                &["advertiser_id", "campaign_id", "adgroup_name"],
                "ads",
            ),
            self.descriptor(
                "UPDATE_ADGROUP",
                Post,
                "adgroup/update/",
                &["advertiser_id", "adgroup_id"],
                "ads",
            ),
            self.descriptor(
                "CREATE_AD",
                Post,
                "ad/create/",
                &["advertiser_id", "adgroup_id", "creatives"],
                "ads",
            ),
            self.descriptor(
                "UPDATE_AD_STATUS",
                Post,
                "ad/status/update/",
                &["advertiser_id", "ad_ids", "operation_status"],
                "ads",
            ),
            self.descriptor(
                "UPLOAD_VIDEO",
                Post,
                "file/video/ad/upload/",
                &["advertiser_id", "video_url"],
                "creative",
            ),
            self.descriptor(
                "GET_REPORT",
                Get,
                "report/integrated/get/",
                &["advertiser_id", "report_type", "dimensions"],
                "reporting",
            ),
            self.descriptor(
                "LIST_COMMENTS",
                Get,
                "comment/list/",
                &["advertiser_id"],
                "comments",
            ),
            self.descriptor(
                "REPLY_COMMENT",
                Post,
                "comment/reply/create/",
                &["advertiser_id", "comment_id", "text"],
                "comments",
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
        let start_time: i64 = match cursor {
            Some(c) => c.parse().context("Invalid poll cursor")?,
            None => Utc::now().timestamp() - self.config.poll.lookback_secs as i64,
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
            .header("Access-Token", access_token)
            .query(&[("start_time", start_time.to_string())])
            .send()
            .await
            .context("Business API request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Business API returned status {}: {}", status, body);
        }

        let body: Value = response
            .json()
            .await
            .context("Failed to parse Business API response")?;

        let code = body.get("code").and_then(Value::as_i64).unwrap_or(-1);
        if code != 0 {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            anyhow::bail!("Business API error code {}: {}", code, message);
        }

        let entries = body
            .pointer("/data/list")
            .and_then(Value::as_array)
            .context("Business API response missing 'data.list'")?;

        let mut items = Vec::new();
        for entry in entries {
            match Self::parse_item(entry) {
                Some(item) if item.created_time.timestamp() > start_time => items.push(item),
                Some(_) => {}
                None => {
                    warn!(adapter = %self.name, stream = %stream, "Skipping malformed list entry")
                }
            }
        }
        Ok(items)
    }

    fn normalize(&self, stream: &str, item: &PolledItem) -> NormalizedEvent {
        let mut event = NormalizedEvent::from_item(
            Platform::Tiktok.as_str(),
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

#[cfg(test)]
mod tests;
