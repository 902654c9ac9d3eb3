use super::*;
use serde_json::json;

fn adapter_with_base(base_url: &str) -> TiktokAdapter {
    let toml = format!(
        r#"
platform = "tiktok"
base_url = "{}"
api_version = "v1.3"
app_id = "tt-app"
app_secret = "tt-secret"
capabilities = ["ads_management", "polling"]

[poll]
streams = ["comments"]
lookback_secs = 7200
"#,
        base_url
    );
    TiktokAdapter::new("tt_main".to_string(), toml::from_str(&toml).unwrap())
}

#[test]
fn test_operation_table_shape() {
    let adapter = adapter_with_base(DEFAULT_BASE_URL);
    let ops = adapter.operations();
    assert_eq!(ops.len(), 11);

    let upload = ops.iter().find(|o| o.name == "UPLOAD_VIDEO").unwrap();
    assert_eq!(upload.path, "file/video/ad/upload/");
    assert_eq!(upload.rate_key, "tt_main:creative");

    let create = ops.iter().find(|o| o.name == "CREATE_CAMPAIGN").unwrap();
    assert_eq!(create.path, "campaign/create/");
    assert_eq!(create.auth, AuthPlacement::AccessTokenHeader);
    assert_eq!(create.envelope, ResponseEnvelope::CodeMessageData);
    assert_eq!(create.body, BodyEncoding::Json);

    // GET operations carry params as query, not body.
    let report = ops.iter().find(|o| o.name == "GET_REPORT").unwrap();
    assert_eq!(report.body, BodyEncoding::None);
    assert_eq!(report.rate_key, "tt_main:reporting");
}

#[test]
fn test_parse_item_comment() {
    let entry = json!({
        "comment_id": "72001",
        "create_time": 1714564800,
        "text": "nice ad"
    });
    let item = TiktokAdapter::parse_item(&entry).unwrap();
    assert_eq!(item.id, "72001");
    assert_eq!(item.cursor, "1714564800");
}

#[test]
fn test_parse_item_numeric_id() {
    let entry = json!({"id": 9001, "create_time": 1714564800});
    let item = TiktokAdapter::parse_item(&entry).unwrap();
    assert_eq!(item.id, "9001");
}

#[tokio::test]
async fn test_fetch_unwraps_envelope_and_filters() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/v1.3/comment/list/")
        .match_query(mockito::Matcher::UrlEncoded(
            "start_time".into(),
            "1714564800".into(),
        ))
        .match_header("Access-Token", "tt-token")
        .with_status(200)
        .with_body(
            json!({
                "code": 0,
                "message": "OK",
                "data": {
                    "list": [
                        {"comment_id": "1", "create_time": 1714564800},
                        {"comment_id": "2", "create_time": 1714565000}
                    ]
                }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let adapter = adapter_with_base(&server.url());
    let items = adapter
        .fetch_newer_than("tt-token", "comments", Some("1714564800"))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, "2");
}

#[tokio::test]
async fn test_fetch_fails_on_nonzero_code() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", mockito::Matcher::Any)
        .with_status(200)
        .with_body(
            json!({"code": 40105, "message": "Access token expired", "data": {}}).to_string(),
        )
        .create_async()
        .await;

    let adapter = adapter_with_base(&server.url());
    let err = adapter
        .fetch_newer_than("tok", "comments", None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("40105"));
    assert!(err.to_string().contains("Access token expired"));
}

#[test]
fn test_normalize_comment_event() {
    let adapter = adapter_with_base(DEFAULT_BASE_URL);
    let item = PolledItem {
        id: "72001".to_string(),
        created_time: Utc.timestamp_opt(1714564800, 0).unwrap(),
        cursor: "1714564800".to_string(),
        payload: json!({"text": "nice ad"}),
    };
    let event = adapter.normalize("comments", &item);
    assert_eq!(event.source_platform, "tiktok");
    assert_eq!(event.event_type, "comment.created");
    assert_eq!(event.item_id(), Some("72001"));
}

#[test]
fn test_default_oauth_endpoint() {
    let adapter = adapter_with_base(DEFAULT_BASE_URL);
    let endpoint = adapter.oauth_endpoint();
    assert!(endpoint.token_url.contains("oauth2/access_token"));
    assert_eq!(endpoint.client_secret.as_deref(), Some("tt-secret"));
}
