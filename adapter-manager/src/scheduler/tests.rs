use super::*;
use crate::adapter::PolledItem;
use crate::sink::testing::MemorySink;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::TimeZone;
use serde_json::json;
use std::sync::Mutex;
use switchboard::config::{Capability, Platform};
use switchboard::credentials::{CredentialStore, Credentials, OAuthEndpoint};
use switchboard::cursor::InMemoryCursorStore;
use switchboard::dispatch::OperationDescriptor;
use switchboard::event::NormalizedEvent;
use switchboard::webhook::SignatureScheme;

/// Adapter backed by a mutable in-memory item list. Items have numeric
/// ids; the cursor is the highest id already delivered.
struct FakeAdapter {
    items: Mutex<Vec<PolledItem>>,
    event_type: &'static str,
}

impl FakeAdapter {
    fn new() -> Self {
        Self::with_event_type("fake.item")
    }

    fn with_event_type(event_type: &'static str) -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            event_type,
        }
    }

    fn push(&self, id: u64) {
        self.push_payload(id, json!({"id": id.to_string()}));
    }

    fn push_payload(&self, id: u64, payload: serde_json::Value) {
        let created = Utc.timestamp_opt(1_700_000_000 + id as i64, 0).unwrap();
        self.items.lock().unwrap().push(PolledItem {
            id: id.to_string(),
            created_time: created,
            cursor: id.to_string(),
            payload,
        });
    }
}

#[async_trait]
impl Adapter for FakeAdapter {
    fn name(&self) -> &str {
        "fake"
    }

    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    fn oauth_endpoint(&self) -> OAuthEndpoint {
        OAuthEndpoint {
            token_url: "http://localhost:1/oauth/token".to_string(),
            client_id: None,
            client_secret: None,
        }
    }

    fn signature_scheme(&self) -> SignatureScheme {
        SignatureScheme::HubSha256
    }

    fn operations(&self) -> Vec<OperationDescriptor> {
        vec![]
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::Polling]
    }

    fn poll_interval(&self) -> u64 {
        300
    }

    fn streams(&self) -> Vec<String> {
        vec!["feed".to_string()]
    }

    async fn fetch_newer_than(
        &self,
        _access_token: &str,
        _stream: &str,
        cursor: Option<&str>,
    ) -> Result<Vec<PolledItem>> {
        let floor: u64 = cursor.map(|c| c.parse().unwrap()).unwrap_or(0);
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|item| item.id.parse::<u64>().unwrap() > floor)
            .cloned()
            .collect())
    }

    fn normalize(&self, stream: &str, item: &PolledItem) -> NormalizedEvent {
        let mut event = NormalizedEvent::from_item(
            "facebook",
            self.event_type,
            &item.id,
            item.created_time,
            item.payload.clone(),
        );
        event
            .headers
            .insert("stream".to_string(), stream.to_string());
        event
    }
}

fn make_scheduler(adapter: Arc<FakeAdapter>, sink: Arc<MemorySink>) -> PollScheduler {
    let key = BASE64.encode([9u8; 32]);
    let store = Arc::new(CredentialStore::new(":memory:", &key).unwrap());
    store
        .store(
            "fake",
            &Credentials {
                access_token: "poll-token".into(),
                refresh_token: None,
                expires_at: None,
            },
        )
        .unwrap();
    PollScheduler::new(
        adapter,
        Arc::new(TokenRefresher::new(store)),
        Arc::new(InMemoryCursorStore::new()),
        sink,
    )
}

#[tokio::test]
async fn test_first_tick_emits_all_items_oldest_first() {
    let adapter = Arc::new(FakeAdapter::new());
    adapter.push(3);
    adapter.push(1);
    adapter.push(2);
    let sink = Arc::new(MemorySink::default());
    let scheduler = make_scheduler(Arc::clone(&adapter), Arc::clone(&sink));

    let emitted = scheduler.run_once().await.unwrap();
    assert_eq!(emitted, 3);

    let events = sink.events.lock().unwrap();
    let ids: Vec<&str> = events
        .iter()
        .map(|e| e.headers.get("item_id").unwrap().as_str())
        .collect();
    assert_eq!(ids, vec!["1", "2", "3"]);
}

#[tokio::test]
async fn test_second_tick_with_no_new_data_emits_nothing() {
    let adapter = Arc::new(FakeAdapter::new());
    adapter.push(1);
    adapter.push(2);
    let sink = Arc::new(MemorySink::default());
    let scheduler = make_scheduler(Arc::clone(&adapter), Arc::clone(&sink));

    assert_eq!(scheduler.run_once().await.unwrap(), 2);
    // No upstream changes: the cursor holds and nothing is re-emitted.
    assert_eq!(scheduler.run_once().await.unwrap(), 0);
    assert_eq!(sink.events.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_only_items_past_cursor_are_emitted() {
    let adapter = Arc::new(FakeAdapter::new());
    adapter.push(1);
    let sink = Arc::new(MemorySink::default());
    let scheduler = make_scheduler(Arc::clone(&adapter), Arc::clone(&sink));

    assert_eq!(scheduler.run_once().await.unwrap(), 1);

    adapter.push(2);
    adapter.push(3);
    assert_eq!(scheduler.run_once().await.unwrap(), 2);

    let events = sink.events.lock().unwrap();
    assert_eq!(events.len(), 3);
}

#[tokio::test]
async fn test_failed_emission_does_not_advance_cursor() {
    let adapter = Arc::new(FakeAdapter::new());
    adapter.push(1);
    adapter.push(2);
    let sink = Arc::new(MemorySink::default());
    // First item delivers, second send fails mid-batch.
    *sink.fail_after.lock().unwrap() = Some(1);
    let scheduler = make_scheduler(Arc::clone(&adapter), Arc::clone(&sink));

    assert!(scheduler.run_once().await.is_err());
    assert_eq!(sink.events.lock().unwrap().len(), 1);

    // Sink recovers; the whole batch is re-emitted (at-least-once,
    // item 1 appears twice and downstream dedupes by id).
    *sink.fail_after.lock().unwrap() = None;
    assert_eq!(scheduler.run_once().await.unwrap(), 2);

    let events = sink.events.lock().unwrap();
    let ids: Vec<&str> = events
        .iter()
        .map(|e| e.headers.get("item_id").unwrap().as_str())
        .collect();
    assert_eq!(ids, vec!["1", "1", "2"]);
}

#[tokio::test]
async fn test_event_with_invalid_type_is_dropped_not_emitted() {
    let adapter = Arc::new(FakeAdapter::with_event_type("NOT-A-VALID-TYPE"));
    adapter.push(1);
    let sink = Arc::new(MemorySink::default());

    let key = BASE64.encode([9u8; 32]);
    let store = Arc::new(CredentialStore::new(":memory:", &key).unwrap());
    store
        .store(
            "fake",
            &Credentials {
                access_token: "poll-token".into(),
                refresh_token: None,
                expires_at: None,
            },
        )
        .unwrap();
    let cursors = Arc::new(InMemoryCursorStore::new());
    let scheduler = PollScheduler::new(
        adapter,
        Arc::new(TokenRefresher::new(store)),
        Arc::clone(&cursors) as Arc<dyn CursorStore>,
        Arc::clone(&sink) as Arc<dyn EventSink>,
    );

    assert_eq!(scheduler.run_once().await.unwrap(), 0);
    assert!(sink.events.lock().unwrap().is_empty());

    // The cursor still moved past the bad item, so the stream is not
    // wedged on it.
    assert_eq!(cursors.get("fake:feed").unwrap().as_deref(), Some("1"));
}

#[tokio::test]
async fn test_oversized_payload_is_dropped_and_batch_continues() {
    let adapter = Arc::new(FakeAdapter::new());
    adapter.push_payload(1, json!({"id": "1", "blob": "x".repeat(300 * 1024)}));
    adapter.push(2);
    let sink = Arc::new(MemorySink::default());
    let scheduler = make_scheduler(Arc::clone(&adapter), Arc::clone(&sink));

    assert_eq!(scheduler.run_once().await.unwrap(), 1);

    let events = sink.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].headers.get("item_id").unwrap(), "2");
}

#[tokio::test]
async fn test_missing_credentials_fails_tick() {
    let adapter = Arc::new(FakeAdapter::new());
    let sink = Arc::new(MemorySink::default());
    let key = BASE64.encode([9u8; 32]);
    let store = Arc::new(CredentialStore::new(":memory:", &key).unwrap());
    let scheduler = PollScheduler::new(
        adapter,
        Arc::new(TokenRefresher::new(store)),
        Arc::new(InMemoryCursorStore::new()),
        sink,
    );

    assert!(scheduler.run_once().await.is_err());
}
