//! Encrypted credential storage and OAuth token refresh.
//!
//! Access and refresh tokens are stored AES-256-GCM encrypted in SQLite,
//! keyed by adapter id. Decryption happens just-in-time for a single
//! call; plaintext tokens are never persisted or logged. Refresh is
//! attempted proactively when the stored expiry is within a safety
//! margin of now; a failed refresh keeps the prior token.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod encryption;
mod refresh;
mod storage;

pub use refresh::{OAuthEndpoint, TokenRefresher, REFRESH_MARGIN_SECS};
pub use storage::CredentialStore;

// Re-exported for utilities and tests
pub use encryption::{open, seal, validate_key};

/// Credentials for accessing an external platform API.
///
/// Tokens are encrypted at rest by the store; instances of this struct
/// hold plaintext and must stay transient.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Credentials {
    /// Access token attached to outbound API requests.
    pub access_token: String,

    /// Refresh token used to obtain new access tokens, when the
    /// platform issues one.
    pub refresh_token: Option<String>,

    /// When the access token expires (UTC). `None` for non-expiring
    /// tokens (e.g. long-lived page tokens).
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    /// True when the token expires within `margin_secs` of now (or is
    /// already expired) and a refresh token is available.
    pub fn needs_refresh(&self, margin_secs: i64) -> bool {
        match (&self.expires_at, &self.refresh_token) {
            (Some(expires_at), Some(_)) => {
                *expires_at <= Utc::now() + chrono::Duration::seconds(margin_secs)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_refresh_requires_refresh_token() {
        let creds = Credentials {
            access_token: "tok".into(),
            refresh_token: None,
            expires_at: Some(Utc::now() - chrono::Duration::hours(1)),
        };
        assert!(!creds.needs_refresh(300));
    }

    #[test]
    fn test_needs_refresh_no_expiry() {
        let creds = Credentials {
            access_token: "tok".into(),
            refresh_token: Some("r".into()),
            expires_at: None,
        };
        assert!(!creds.needs_refresh(300));
    }

    #[test]
    fn test_needs_refresh_within_margin() {
        let creds = Credentials {
            access_token: "tok".into(),
            refresh_token: Some("r".into()),
            expires_at: Some(Utc::now() + chrono::Duration::seconds(60)),
        };
        assert!(creds.needs_refresh(300));
        assert!(!creds.needs_refresh(30));
    }

    #[test]
    fn test_needs_refresh_already_expired() {
        let creds = Credentials {
            access_token: "tok".into(),
            refresh_token: Some("r".into()),
            expires_at: Some(Utc::now() - chrono::Duration::seconds(1)),
        };
        assert!(creds.needs_refresh(300));
    }
}
