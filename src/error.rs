//! Error taxonomy shared by every adapter component.
//!
//! Errors cross component boundaries as values, never as panics. The
//! executor and dispatcher fold these into `OperationResult` so callers
//! can decide success/failure per message instead of aborting a batch.

use std::time::Duration;
use thiserror::Error;

/// Errors produced by the adapter core.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Missing or invalid configuration (required credential/field).
    /// Fatal: surfaces at startup or on first use, never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Local rate limit window exhausted. Retryable after `retry_after`.
    #[error("rate limit exceeded for '{key}', retry after {retry_after:?}")]
    RateLimited { key: String, retry_after: Duration },

    /// Network-level failure or timeout. Retryable with backoff.
    #[error("transient network error: {0}")]
    Transient(String),

    /// The vendor returned an error response. The vendor's own message is
    /// preserved verbatim. Not retried except for HTTP 429.
    #[error("vendor API error (status {status}): {message}")]
    VendorApi {
        status: u16,
        /// Vendor-specific error code, when the envelope carries one.
        code: Option<i64>,
        message: String,
    },

    /// Access token missing or undecryptable.
    #[error("credential error: {0}")]
    Credential(String),

    /// Token refresh against the provider failed. The prior token is
    /// retained; manual re-auth may be required.
    #[error("token refresh failed: {0}")]
    Refresh(String),

    /// Inbound webhook failed signature or replay-window checks.
    /// Rejected with 401, logged for audit, never retried.
    #[error("webhook verification failed: {0}")]
    WebhookVerification(String),

    /// No handler registered for the requested operation name.
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// Request payload missing required fields for the operation.
    #[error("invalid params for '{operation}': {detail}")]
    InvalidParams { operation: String, detail: String },
}

impl AdapterError {
    /// True when a retry with backoff may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AdapterError::Transient(_)
                | AdapterError::RateLimited { .. }
                | AdapterError::VendorApi { status: 429, .. }
                | AdapterError::VendorApi { status: 500..=599, .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(AdapterError::Transient("timeout".into()).is_retryable());
        assert!(AdapterError::RateLimited {
            key: "k".into(),
            retry_after: Duration::from_secs(1)
        }
        .is_retryable());
        assert!(AdapterError::VendorApi {
            status: 429,
            code: None,
            message: "slow down".into()
        }
        .is_retryable());
        assert!(AdapterError::VendorApi {
            status: 503,
            code: None,
            message: "unavailable".into()
        }
        .is_retryable());
        assert!(!AdapterError::VendorApi {
            status: 400,
            code: Some(100),
            message: "bad field".into()
        }
        .is_retryable());
        assert!(!AdapterError::UnknownOperation("NOPE".into()).is_retryable());
        assert!(!AdapterError::Credential("missing".into()).is_retryable());
    }

    #[test]
    fn test_vendor_message_preserved() {
        let err = AdapterError::VendorApi {
            status: 400,
            code: Some(190),
            message: "Invalid OAuth access token".into(),
        };
        assert!(err.to_string().contains("Invalid OAuth access token"));
    }
}
