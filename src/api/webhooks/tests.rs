use super::*;
use crate::webhook::sign;
use axum::body::Body;
use axum::http::Request;
use serde_json::json;
use tower::ServiceExt;

const FB_SECRET: &str = "fb-app-secret";
const TT_SECRET: &str = "tt-secret";
const VERIFY_TOKEN: &str = "hub-verify-token";

fn make_state() -> (WebhookAppState, mpsc::Receiver<NormalizedEvent>) {
    let (tx, rx) = mpsc::channel(16);
    let mut platforms = HashMap::new();
    platforms.insert(
        "facebook".to_string(),
        WebhookPlatformConfig {
            platform: Platform::Facebook,
            scheme: SignatureScheme::HubSha256,
            secret: FB_SECRET.to_string(),
            verify_token: Some(VERIFY_TOKEN.to_string()),
        },
    );
    platforms.insert(
        "tiktok".to_string(),
        WebhookPlatformConfig {
            platform: Platform::Tiktok,
            scheme: SignatureScheme::TimestampNonceBody,
            secret: TT_SECRET.to_string(),
            verify_token: None,
        },
    );
    (
        WebhookAppState {
            platforms,
            events: tx,
        },
        rx,
    )
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_handshake_echoes_challenge() {
    let (state, _rx) = make_state();
    let app = create_webhook_router(state);

    let uri = format!(
        "/webhooks/facebook?hub.mode=subscribe&hub.verify_token={}&hub.challenge=1158201444",
        VERIFY_TOKEN
    );
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "1158201444");
}

#[tokio::test]
async fn test_handshake_wrong_token_forbidden() {
    let (state, _rx) = make_state();
    let app = create_webhook_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/webhooks/facebook?hub.mode=subscribe&hub.verify_token=wrong&hub.challenge=c")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_handshake_unknown_platform() {
    let (state, _rx) = make_state();
    let app = create_webhook_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/webhooks/myspace?hub.mode=subscribe&hub.verify_token=t&hub.challenge=c")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_facebook_delivery_verified_and_normalized() {
    let (state, mut rx) = make_state();
    let app = create_webhook_router(state);

    let body = serde_json::to_vec(&json!({
        "object": "page",
        "entry": [{
            "id": "page_991",
            "time": 1717200000,
            "changes": [{
                "field": "feed",
                "value": {"post_id": "991_1", "message": "hello"}
            }]
        }]
    }))
    .unwrap();
    let signature = sign(&SignatureScheme::HubSha256, FB_SECRET, None, None, &body);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/facebook")
                .header("X-Hub-Signature-256", signature)
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "EVENT_RECEIVED");

    let event = rx.try_recv().expect("one event should be handed off");
    assert_eq!(event.source_platform, "facebook");
    assert_eq!(event.event_type, "page.feed");
    assert_eq!(event.item_id(), Some("page_991"));
    assert_eq!(event.payload["message"], "hello");
}

#[tokio::test]
async fn test_verified_delivery_with_invalid_event_is_dropped() {
    let (state, mut rx) = make_state();
    let app = create_webhook_router(state);

    // Signature checks out, but the uppercase object yields an event
    // type that fails envelope validation. Still ack, hand off nothing.
    let body = serde_json::to_vec(&json!({
        "object": "PAGE",
        "entry": [{
            "id": "page_991",
            "time": 1717200000,
            "changes": [{"field": "feed", "value": {"post_id": "991_2"}}]
        }]
    }))
    .unwrap();
    let signature = sign(&SignatureScheme::HubSha256, FB_SECRET, None, None, &body);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/facebook")
                .header("X-Hub-Signature-256", signature)
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "EVENT_RECEIVED");
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_facebook_delivery_bad_signature_unauthorized() {
    let (state, mut rx) = make_state();
    let app = create_webhook_router(state);

    let body = br#"{"object":"page","entry":[]}"#.to_vec();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/facebook")
                .header("X-Hub-Signature-256", "sha256=deadbeef")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(rx.try_recv().is_err(), "no event hand-off on rejection");
}

#[tokio::test]
async fn test_facebook_delivery_missing_signature_unauthorized() {
    let (state, _rx) = make_state();
    let app = create_webhook_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/facebook")
                .body(Body::from(r#"{"object":"page","entry":[]}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_tiktok_delivery_verified() {
    let (state, mut rx) = make_state();
    let app = create_webhook_router(state);

    let body = serde_json::to_vec(&json!({
        "event": "comment_create",
        "event_id": "evt_777",
        "create_time": 1717200000,
        "comment": {"text": "nice video"}
    }))
    .unwrap();

    let timestamp = chrono::Utc::now().timestamp();
    let signature = sign(
        &SignatureScheme::TimestampNonceBody,
        TT_SECRET,
        Some(timestamp),
        Some("nonce-1"),
        &body,
    );

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/tiktok")
                .header("X-Signature", signature)
                .header("X-Timestamp", timestamp.to_string())
                .header("X-Nonce", "nonce-1")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let event = rx.try_recv().unwrap();
    assert_eq!(event.source_platform, "tiktok");
    assert_eq!(event.event_type, "comment_create");
    assert_eq!(event.item_id(), Some("evt_777"));
}

#[tokio::test]
async fn test_tiktok_stale_timestamp_unauthorized() {
    let (state, _rx) = make_state();
    let app = create_webhook_router(state);

    let body = br#"{"event":"comment_create"}"#.to_vec();
    let stale = chrono::Utc::now().timestamp() - 4000;
    let signature = sign(
        &SignatureScheme::TimestampNonceBody,
        TT_SECRET,
        Some(stale),
        Some("n"),
        &body,
    );

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/tiktok")
                .header("X-Signature", signature)
                .header("X-Timestamp", stale.to_string())
                .header("X-Nonce", "n")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[test]
fn test_normalize_facebook_messaging_entry() {
    let payload = json!({
        "object": "page",
        "entry": [{
            "id": "page_5",
            "time": 1717200000,
            "messaging": [
                {"sender": {"id": "u1"}, "message": {"text": "hi"}},
                {"sender": {"id": "u2"}, "message": {"text": "yo"}}
            ]
        }]
    });

    let events = normalize_delivery(Platform::Facebook, &payload);
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.event_type == "page.message"));
    assert_eq!(events[0].payload["sender"]["id"], "u1");
}

#[test]
fn test_normalize_facebook_empty_entry_list() {
    let payload = json!({"object": "page", "entry": []});
    assert!(normalize_delivery(Platform::Facebook, &payload).is_empty());
}
