use super::*;
use crate::adapter::Adapter;
use crate::adapters::FacebookAdapter;
use axum::body::Body;
use axum::http::{header, Method, Request};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::json;
use std::time::Duration;
use switchboard::credentials::{CredentialStore, Credentials};
use switchboard::dispatch::OperationResult;
use switchboard::executor::{AdapterProfile, ApiRequestExecutor};
use switchboard::rate_limit::RateLimiter;
use tower::ServiceExt;

fn facebook_adapter(base_url: &str) -> FacebookAdapter {
    let toml = format!(
        r#"
platform = "facebook"
base_url = "{}"
api_version = "v19.0"
"#,
        base_url
    );
    FacebookAdapter::new("fb_ads".to_string(), toml::from_str(&toml).unwrap())
}

fn make_state(base_url: &str) -> ApiState {
    let key = BASE64.encode([1u8; 32]);
    let store = Arc::new(CredentialStore::new(":memory:", &key).unwrap());
    store
        .store(
            "fb_ads",
            &Credentials {
                access_token: "fb-token".into(),
                refresh_token: None,
                expires_at: None,
            },
        )
        .unwrap();

    let adapter = facebook_adapter(base_url);
    let mut executor = ApiRequestExecutor::new(Arc::new(RateLimiter::new()), store);
    executor.register_profile(AdapterProfile {
        adapter_id: "fb_ads".to_string(),
        base_url: base_url.to_string(),
        api_version: "v19.0".to_string(),
        timeout: Duration::from_secs(5),
    });

    let mut dispatcher = OperationDispatcher::new(Arc::new(executor));
    dispatcher.register_all(adapter.operations()).unwrap();

    let mut dispatchers = HashMap::new();
    dispatchers.insert("fb_ads".to_string(), Arc::new(dispatcher));

    ApiState {
        dispatchers,
        status_map: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
    }
}

async fn post_operation(
    router: Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

#[tokio::test]
async fn test_execute_operation_success() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v19.0/act_1001/campaigns")
        .match_query(mockito::Matcher::UrlEncoded(
            "access_token".into(),
            "fb-token".into(),
        ))
        .with_status(200)
        .with_body(json!({"id": "23850001"}).to_string())
        .create_async()
        .await;

    let router = create_router(make_state(&server.url()));
    let (status, body) = post_operation(
        router,
        "/api/adapters/fb_ads/operations/CREATE_CAMPAIGN",
        json!({"ad_account_id": "1001", "name": "Spring", "objective": "OUTCOME_SALES"}),
    )
    .await;

    mock.assert_async().await;
    assert_eq!(status, StatusCode::OK);
    let result: OperationResult = serde_json::from_slice(&body).unwrap();
    assert!(result.success);
    assert_eq!(result.body.unwrap()["id"], "23850001");
}

#[tokio::test]
async fn test_unknown_operation_reports_failure() {
    let server = mockito::Server::new_async().await;
    let router = create_router(make_state(&server.url()));
    let (status, body) = post_operation(
        router,
        "/api/adapters/fb_ads/operations/LAUNCH_ROCKET",
        json!({}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let result: OperationResult = serde_json::from_slice(&body).unwrap();
    assert!(!result.success);
    assert_eq!(result.error.unwrap().kind, "unknown_operation");
}

#[tokio::test]
async fn test_unknown_adapter_404() {
    let server = mockito::Server::new_async().await;
    let router = create_router(make_state(&server.url()));
    let (status, _) = post_operation(
        router,
        "/api/adapters/linkedin/operations/CREATE_CAMPAIGN",
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_missing_required_field_fails_fast() {
    let server = mockito::Server::new_async().await;
    let router = create_router(make_state(&server.url()));
    let (_, body) = post_operation(
        router,
        "/api/adapters/fb_ads/operations/CREATE_CAMPAIGN",
        json!({"ad_account_id": "1001"}),
    )
    .await;

    let result: OperationResult = serde_json::from_slice(&body).unwrap();
    assert!(!result.success);
    assert_eq!(result.error.unwrap().kind, "invalid_params");
}

#[tokio::test]
async fn test_poll_status_endpoints() {
    let server = mockito::Server::new_async().await;
    let state = make_state(&server.url());
    let status_handle = Arc::new(tokio::sync::Mutex::new(PollStatus {
        poll_count: 7,
        events_emitted: 42,
        ..Default::default()
    }));
    state
        .status_map
        .lock()
        .await
        .insert("fb_ads".to_string(), status_handle);
    let router = create_router(state);

    let request = Request::builder()
        .uri("/api/adapters/fb_ads/poll-status")
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let parsed: PollStatusResponse = serde_json::from_slice(&bytes).unwrap();
    assert!(parsed.running);
    assert_eq!(parsed.poll_count, 7);
    assert_eq!(parsed.events_emitted, 42);

    let request = Request::builder()
        .uri("/api/adapters/tt_ads/poll-status")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
