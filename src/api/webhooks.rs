//! Webhook receiver endpoints.
//!
//! `GET /webhooks/:platform` answers the subscription handshake;
//! `POST /webhooks/:platform` verifies the delivery signature and acks
//! with `200 EVENT_RECEIVED` regardless of downstream processing, since
//! providers require a fast ack and will disable slow endpoints.

use crate::config::Platform;
use crate::event::{validate, NormalizedEvent, HEADER_STREAM};
use crate::webhook::{SignatureScheme, SignedWebhookVerifier, WebhookEnvelope};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::{TimeZone, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[cfg(test)]
mod tests;

/// Signature header sent by Facebook.
const HEADER_HUB_SIGNATURE: &str = "x-hub-signature-256";
/// Signature/timestamp/nonce headers sent by TikTok-style deliveries.
const HEADER_SIGNATURE: &str = "x-signature";
const HEADER_TIMESTAMP: &str = "x-timestamp";
const HEADER_NONCE: &str = "x-nonce";

/// Per-platform webhook verification settings.
#[derive(Clone)]
pub struct WebhookPlatformConfig {
    pub platform: Platform,
    pub scheme: SignatureScheme,
    pub secret: String,
    pub verify_token: Option<String>,
}

/// Shared state for the webhook receiver.
#[derive(Clone)]
pub struct WebhookAppState {
    /// Keyed by the `:platform` path segment ("facebook", "tiktok").
    pub platforms: HashMap<String, WebhookPlatformConfig>,
    /// Downstream hand-off; send failures are logged, never surfaced to
    /// the provider.
    pub events: mpsc::Sender<NormalizedEvent>,
}

pub fn create_webhook_router(state: WebhookAppState) -> Router {
    Router::new()
        .route(
            "/webhooks/:platform",
            get(handshake).post(receive_delivery),
        )
        .with_state(Arc::new(state))
}

/// GET /webhooks/:platform, the subscription handshake challenge echo.
async fn handshake(
    State(state): State<Arc<WebhookAppState>>,
    Path(platform): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(config) = state.platforms.get(&platform) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let mode = params.get("hub.mode").map(String::as_str).unwrap_or("");
    let token = params
        .get("hub.verify_token")
        .map(String::as_str)
        .unwrap_or("");
    let challenge = params.get("hub.challenge").map(String::as_str).unwrap_or("");

    let Some(expected) = config.verify_token.as_deref() else {
        warn!(platform = %platform, "Handshake attempted with no verify token configured");
        return StatusCode::FORBIDDEN.into_response();
    };

    match crate::webhook::verify_challenge(mode, token, challenge, expected) {
        Some(challenge) => {
            info!(platform = %platform, "Webhook subscription verified");
            (StatusCode::OK, challenge.to_string()).into_response()
        }
        None => {
            warn!(platform = %platform, "Webhook handshake rejected");
            StatusCode::FORBIDDEN.into_response()
        }
    }
}

/// POST /webhooks/:platform. Verify signature, normalize, ack.
async fn receive_delivery(
    State(state): State<Arc<WebhookAppState>>,
    Path(platform): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(config) = state.platforms.get(&platform) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let envelope = build_envelope(&config.scheme, &headers, &body);
    let verifier = SignedWebhookVerifier::new(config.scheme.clone());

    if !verifier.verify(&envelope, &config.secret) {
        // Audit log, reject without detail
        warn!(platform = %platform, "Webhook signature verification failed");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            warn!(platform = %platform, error = %e, "Verified webhook body is not JSON");
            // Signature was valid; still ack so the provider does not retry
            return (StatusCode::OK, "EVENT_RECEIVED").into_response();
        }
    };

    let events = normalize_delivery(config.platform, &payload);
    debug!(
        platform = %platform,
        event_count = events.len(),
        "Webhook delivery verified"
    );

    for event in events {
        if let Err(e) = validate(&event) {
            warn!(platform = %platform, error = %e, "Dropping invalid webhook event");
            continue;
        }
        if let Err(e) = state.events.try_send(event) {
            // Ack anyway; at-least-once redelivery comes from the provider
            warn!(platform = %platform, error = %e, "Failed to hand off webhook event");
        }
    }

    (StatusCode::OK, "EVENT_RECEIVED").into_response()
}

/// Builds the transient envelope from platform-specific headers.
fn build_envelope(scheme: &SignatureScheme, headers: &HeaderMap, body: &Bytes) -> WebhookEnvelope {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string()
    };

    match scheme {
        SignatureScheme::HubSha256 => WebhookEnvelope {
            signature: header_value(HEADER_HUB_SIGNATURE),
            timestamp: None,
            nonce: None,
            body: body.to_vec(),
        },
        SignatureScheme::TimestampNonceBody => WebhookEnvelope {
            signature: header_value(HEADER_SIGNATURE),
            timestamp: header_value(HEADER_TIMESTAMP).parse::<i64>().ok(),
            nonce: Some(header_value(HEADER_NONCE)),
            body: body.to_vec(),
        },
    }
}

/// Turns a verified vendor delivery into normalized events.
///
/// Facebook batches changes as `{"object", "entry": [{changes/messaging}]}`;
/// TikTok sends one event per delivery as `{"event", "create_time", ...}`.
pub fn normalize_delivery(platform: Platform, payload: &Value) -> Vec<NormalizedEvent> {
    match platform {
        Platform::Facebook => normalize_facebook(payload),
        Platform::Tiktok => normalize_tiktok(payload),
    }
}

fn normalize_facebook(payload: &Value) -> Vec<NormalizedEvent> {
    let object = payload.get("object").and_then(Value::as_str).unwrap_or("unknown");
    let Some(entries) = payload.get("entry").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut events = Vec::new();
    for entry in entries {
        let entry_id = entry.get("id").and_then(Value::as_str).unwrap_or("unknown");
        let timestamp = entry
            .get("time")
            .and_then(Value::as_i64)
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or_else(Utc::now);

        // Page change notifications
        if let Some(changes) = entry.get("changes").and_then(Value::as_array) {
            for change in changes {
                let field = change.get("field").and_then(Value::as_str).unwrap_or("change");
                let mut event = NormalizedEvent::from_item(
                    "facebook",
                    &format!("{}.{}", object, field),
                    entry_id,
                    timestamp,
                    change.get("value").cloned().unwrap_or(Value::Object(Default::default())),
                );
                event
                    .headers
                    .insert(HEADER_STREAM.to_string(), "webhook".to_string());
                events.push(event);
            }
        }

        // Messenger deliveries
        if let Some(messages) = entry.get("messaging").and_then(Value::as_array) {
            for message in messages {
                let mut event = NormalizedEvent::from_item(
                    "facebook",
                    &format!("{}.message", object),
                    entry_id,
                    timestamp,
                    message.clone(),
                );
                event
                    .headers
                    .insert(HEADER_STREAM.to_string(), "webhook".to_string());
                events.push(event);
            }
        }
    }
    events
}

fn normalize_tiktok(payload: &Value) -> Vec<NormalizedEvent> {
    let event_name = payload
        .get("event")
        .and_then(Value::as_str)
        .unwrap_or("notification");
    let item_id = payload
        .get("event_id")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let timestamp = payload
        .get("create_time")
        .and_then(Value::as_i64)
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .unwrap_or_else(Utc::now);

    let event_type = event_name.replace(['/', '-'], ".").to_lowercase();
    let mut event = NormalizedEvent::from_item(
        "tiktok",
        &event_type,
        item_id,
        timestamp,
        payload.clone(),
    );
    event
        .headers
        .insert(HEADER_STREAM.to_string(), "webhook".to_string());
    vec![event]
}
