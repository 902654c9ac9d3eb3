use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

mod validation;

pub use validation::{validate, ValidationError};

/// Header key carrying the vendor-assigned item id. Downstream consumers
/// dedupe on this under at-least-once delivery.
pub const HEADER_ITEM_ID: &str = "item_id";

/// Header key carrying the inbound stream name (e.g. "page_feed").
pub const HEADER_STREAM: &str = "stream";

/// Platform-agnostic representation of an inbound occurrence
/// (post, message, comment, conversion, ...).
///
/// Created by inbound adapters from vendor payloads, immutable once
/// emitted. Delivery downstream is at-least-once: the `correlation_id`
/// is fresh per emission, while the vendor item id in `headers` is
/// stable across re-emissions of the same item.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NormalizedEvent {
    /// Fresh per emission (UUIDv4).
    pub correlation_id: Uuid,

    /// When the underlying item occurred (vendor time, UTC).
    pub timestamp: DateTime<Utc>,

    /// Platform identifier, lowercase (e.g. "facebook", "tiktok").
    pub source_platform: String,

    /// Event kind, lowercase with optional dot separators
    /// (e.g. "page.feed.post", "comment.created").
    pub event_type: String,

    /// Transport metadata: vendor item id, stream name, etc.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Vendor payload, opaque to the core. Must be a JSON object.
    pub payload: Value,
}

impl NormalizedEvent {
    /// Builds an event for a vendor item, stamping the item id header.
    pub fn from_item(
        platform: &str,
        event_type: &str,
        item_id: &str,
        timestamp: DateTime<Utc>,
        payload: Value,
    ) -> Self {
        let mut headers = HashMap::new();
        headers.insert(HEADER_ITEM_ID.to_string(), item_id.to_string());
        Self {
            correlation_id: Uuid::new_v4(),
            timestamp,
            source_platform: platform.to_string(),
            event_type: event_type.to_string(),
            headers,
            payload,
        }
    }

    /// Vendor item id used for downstream dedupe, if stamped.
    pub fn item_id(&self) -> Option<&str> {
        self.headers.get(HEADER_ITEM_ID).map(String::as_str)
    }

    /// Validates the event envelope before emission.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate(self)
    }
}
