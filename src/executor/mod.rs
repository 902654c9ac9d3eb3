//! Outbound API request execution.
//!
//! Composes the rate limiter, the credential store, and the HTTP
//! transport into a single gated call: acquire points for the
//! operation's resource key, decrypt the access token just-in-time,
//! issue the request, and fold the vendor's response into a structured
//! result. Transient failures and 5xx retry with exponential backoff;
//! 429 waits out the vendor's `Retry-After` hint at most once; other
//! 4xx never retry and the vendor's message is surfaced verbatim.

use crate::credentials::CredentialStore;
use crate::dispatch::{
    AuthPlacement, BodyEncoding, HttpMethod, OperationDescriptor, ResponseEnvelope,
};
use crate::error::AdapterError;
use crate::rate_limit::RateLimiter;
use rand::Rng;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};


/// Attempts per call: the initial request plus two retries.
const MAX_ATTEMPTS: u32 = 3;

/// Backoff ladder between attempts (jitter added on top).
const BACKOFF_MS: [u64; 2] = [250, 1000];

/// Longest vendor `Retry-After` the executor will wait out in-line;
/// anything larger is returned to the caller as a failure with the hint.
const MAX_INLINE_RETRY_AFTER: Duration = Duration::from_secs(5);

/// Per-adapter connection profile: where requests go and how long they
/// may take.
#[derive(Clone, Debug)]
pub struct AdapterProfile {
    pub adapter_id: String,
    /// Vendor host, e.g. "https://graph.facebook.com".
    pub base_url: String,
    /// API version path segment, e.g. "v19.0".
    pub api_version: String,
    /// Per-request deadline; a timeout counts as a transient failure.
    pub timeout: Duration,
}

/// Rate-gated, authenticated HTTP executor shared by all adapters.
pub struct ApiRequestExecutor {
    profiles: HashMap<String, AdapterProfile>,
    rate_limiter: Arc<RateLimiter>,
    credential_store: Arc<CredentialStore>,
    http_client: reqwest::Client,
}

impl ApiRequestExecutor {
    pub fn new(rate_limiter: Arc<RateLimiter>, credential_store: Arc<CredentialStore>) -> Self {
        Self {
            profiles: HashMap::new(),
            rate_limiter,
            credential_store,
            http_client: reqwest::Client::new(),
        }
    }

    /// Registers an adapter's connection profile. Called once at startup
    /// for each configured adapter.
    pub fn register_profile(&mut self, profile: AdapterProfile) {
        self.profiles.insert(profile.adapter_id.clone(), profile);
    }

    /// Executes one operation described by `descriptor` with `params`.
    ///
    /// Steps: rate-limit acquire → access token → render URL → send →
    /// interpret response. A local `RateLimited` failure is returned
    /// without issuing the HTTP call.
    pub async fn execute(
        &self,
        descriptor: &OperationDescriptor,
        params: Value,
    ) -> Result<Value, AdapterError> {
        let profile = self.profiles.get(&descriptor.adapter_id).ok_or_else(|| {
            AdapterError::Configuration(format!(
                "no profile registered for adapter '{}'",
                descriptor.adapter_id
            ))
        })?;

        // Validate and render before consuming any rate budget
        let (path, payload) = descriptor.prepare(&params)?;

        self.rate_limiter.acquire(&descriptor.rate_key, descriptor.cost)?;

        let token = self.credential_store.access_token(&descriptor.adapter_id)?;

        let url = format!(
            "{}/{}/{}",
            profile.base_url.trim_end_matches('/'),
            profile.api_version,
            path
        );

        let mut last_err: Option<AdapterError> = None;
        let mut rate_hint_honored = false;

        for attempt in 0..MAX_ATTEMPTS {
            // A 429 retry already waited out the vendor's hint; the
            // backoff ladder applies only to transient and 5xx retries.
            if attempt > 0 && !matches!(last_err, Some(AdapterError::RateLimited { .. })) {
                let base = BACKOFF_MS[(attempt - 1) as usize];
                let jitter = rand::thread_rng().gen_range(0..=base / 4);
                tokio::time::sleep(Duration::from_millis(base + jitter)).await;
            }

            let request = self.build_request(descriptor, profile, &url, &token, &payload)?;

            let response = match request.send().await {
                Ok(r) => r,
                Err(e) => {
                    // Connection failures and deadline expiry are both transient
                    let err = AdapterError::Transient(e.to_string());
                    warn!(
                        operation = %descriptor.name,
                        attempt = attempt + 1,
                        error = %err,
                        "Request failed, will retry"
                    );
                    last_err = Some(err);
                    continue;
                }
            };

            match self.interpret(descriptor, response).await {
                Ok(body) => return Ok(body),
                Err(err) if err.is_retryable() && attempt + 1 < MAX_ATTEMPTS => {
                    if let AdapterError::RateLimited { retry_after, .. } = &err {
                        // Vendor 429: honor Retry-After at most once,
                        // and only when the wait is short enough to
                        // hold the caller in-line
                        if rate_hint_honored || *retry_after > MAX_INLINE_RETRY_AFTER {
                            return Err(err);
                        }
                        rate_hint_honored = true;
                        debug!(
                            operation = %descriptor.name,
                            wait_ms = retry_after.as_millis() as u64,
                            "Honoring Retry-After"
                        );
                        tokio::time::sleep(*retry_after).await;
                    }
                    warn!(
                        operation = %descriptor.name,
                        attempt = attempt + 1,
                        error = %err,
                        "Vendor failure, will retry"
                    );
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_err.unwrap_or_else(|| AdapterError::Transient("retries exhausted".into())))
    }

    fn build_request(
        &self,
        descriptor: &OperationDescriptor,
        profile: &AdapterProfile,
        url: &str,
        token: &str,
        payload: &Value,
    ) -> Result<reqwest::RequestBuilder, AdapterError> {
        let mut request = match descriptor.method {
            HttpMethod::Get => self.http_client.get(url),
            HttpMethod::Post => self.http_client.post(url),
            HttpMethod::Delete => self.http_client.delete(url),
        }
        .timeout(profile.timeout);

        request = match descriptor.auth {
            AuthPlacement::QueryAccessToken => request.query(&[("access_token", token)]),
            AuthPlacement::BearerHeader => {
                request.header("Authorization", format!("Bearer {}", token))
            }
            AuthPlacement::AccessTokenHeader => request.header("Access-Token", token),
        };

        request = match descriptor.body {
            BodyEncoding::Json => request.json(payload),
            BodyEncoding::Form => request.form(&flatten_for_wire(payload)),
            BodyEncoding::None => request.query(&flatten_for_wire(payload)),
        };

        Ok(request)
    }

    /// Folds an HTTP response into a body or a structured failure.
    async fn interpret(
        &self,
        descriptor: &OperationDescriptor,
        response: reqwest::Response,
    ) -> Result<Value, AdapterError> {
        let status = response.status();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);

        let text = response
            .text()
            .await
            .map_err(|e| AdapterError::Transient(format!("failed to read body: {}", e)))?;

        let body: Value = if text.is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text.clone()))
        };

        if status.as_u16() == 429 {
            return Err(AdapterError::RateLimited {
                key: descriptor.rate_key.clone(),
                retry_after: retry_after.unwrap_or(Duration::from_secs(1)),
            });
        }

        if !status.is_success() {
            let message =
                vendor_error_message(&body).unwrap_or_else(|| format!("HTTP {}", status));
            let code = vendor_error_code(&body);
            return Err(AdapterError::VendorApi {
                status: status.as_u16(),
                code,
                message,
            });
        }

        // TikTok wraps every response; code != 0 is a failure even on 200
        if descriptor.envelope == ResponseEnvelope::CodeMessageData {
            let code = body.get("code").and_then(Value::as_i64).unwrap_or(0);
            if code != 0 {
                let message = body
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("vendor error")
                    .to_string();
                return Err(AdapterError::VendorApi {
                    status: status.as_u16(),
                    code: Some(code),
                    message,
                });
            }
            return Ok(body.get("data").cloned().unwrap_or(body));
        }

        Ok(body)
    }
}

/// Parses a `Retry-After` header value: either delta-seconds or an
/// HTTP-date. A date already in the past means no wait.
fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let when = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = (when.with_timezone(&chrono::Utc) - chrono::Utc::now()).num_seconds();
    Some(Duration::from_secs(delta.max(0) as u64))
}

/// Extracts the vendor's human-readable error message without masking it.
/// Understands `{"error":{"message"}}` (Facebook) and top-level
/// `{"message"}` (TikTok); falls back to the raw body.
fn vendor_error_message(body: &Value) -> Option<String> {
    if let Some(message) = body
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
    {
        return Some(message.to_string());
    }
    if let Some(message) = body.get("message").and_then(Value::as_str) {
        return Some(message.to_string());
    }
    match body {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn vendor_error_code(body: &Value) -> Option<i64> {
    body.get("error")
        .and_then(|e| e.get("code"))
        .and_then(Value::as_i64)
        .or_else(|| body.get("code").and_then(Value::as_i64))
}

/// Flattens a JSON object to string pairs for form/query encoding.
/// Nested values are sent as serialized JSON, which is how both Graph
/// and Business APIs accept structured form fields.
fn flatten_for_wire(payload: &Value) -> Vec<(String, String)> {
    let Some(obj) = payload.as_object() else {
        return Vec::new();
    };
    obj.iter()
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), value)
        })
        .collect()
}
