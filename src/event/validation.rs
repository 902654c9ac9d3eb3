use super::NormalizedEvent;
use std::fmt;

/// Maximum serialized payload size accepted for emission (256 KiB).
const MAX_PAYLOAD_BYTES: usize = 256 * 1024;

/// Validation errors for NormalizedEvent
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    MissingPlatform,
    MissingEventType,
    InvalidEventTypeFormat(String),
    PayloadNotObject,
    PayloadTooLarge(usize),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MissingPlatform => write!(f, "source_platform is required"),
            ValidationError::MissingEventType => write!(f, "event_type is required"),
            ValidationError::InvalidEventTypeFormat(s) => {
                write!(f, "invalid event_type '{}': must be lowercase with optional dots", s)
            }
            ValidationError::PayloadNotObject => write!(f, "payload must be a JSON object"),
            ValidationError::PayloadTooLarge(size) => {
                write!(f, "payload too large: {} bytes (max {})", size, MAX_PAYLOAD_BYTES)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validates a NormalizedEvent envelope before emission.
///
/// Validation rules:
/// - Required fields: source_platform, event_type
/// - Event type format: lowercase letters, numbers, dots, underscores
/// - Payload: must be a JSON object, capped at 256 KiB serialized
pub fn validate(event: &NormalizedEvent) -> Result<(), ValidationError> {
    if event.source_platform.is_empty() {
        return Err(ValidationError::MissingPlatform);
    }
    if event.event_type.is_empty() {
        return Err(ValidationError::MissingEventType);
    }
    if !is_valid_event_type(&event.event_type) {
        return Err(ValidationError::InvalidEventTypeFormat(
            event.event_type.clone(),
        ));
    }
    if !event.payload.is_object() {
        return Err(ValidationError::PayloadNotObject);
    }

    let size = serde_json::to_vec(&event.payload).map(|v| v.len()).unwrap_or(0);
    if size > MAX_PAYLOAD_BYTES {
        return Err(ValidationError::PayloadTooLarge(size));
    }

    Ok(())
}

fn is_valid_event_type(name: &str) -> bool {
    // No leading/trailing/consecutive dots
    if name.starts_with('.') || name.ends_with('.') || name.contains("..") {
        return false;
    }
    name.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '_')
}
