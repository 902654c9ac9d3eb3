//! Proactive OAuth token refresh.
//!
//! Before an outbound call or poll tick, the refresher checks the stored
//! expiry against a safety margin and exchanges the refresh token when
//! needed. A failed exchange leaves the stored credentials untouched and
//! surfaces the provider's error to the caller.

use super::{CredentialStore, Credentials};
use crate::error::AdapterError;
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Refresh when the token expires within this many seconds of now.
pub const REFRESH_MARGIN_SECS: i64 = 300;

/// OAuth endpoints and client credentials for one platform.
#[derive(Clone, Debug)]
pub struct OAuthEndpoint {
    /// Token exchange URL (refresh grant).
    pub token_url: String,
    /// App/client id, when the provider requires it on refresh.
    pub client_id: Option<String>,
    /// App/client secret, when the provider requires it on refresh.
    pub client_secret: Option<String>,
}

/// Token response from an OAuth refresh exchange (standard OAuth 2.0).
#[derive(Deserialize)]
struct TokenRefreshResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Refreshes stored credentials against provider token endpoints.
pub struct TokenRefresher {
    store: Arc<CredentialStore>,
    http_client: reqwest::Client,
}

impl TokenRefresher {
    pub fn new(store: Arc<CredentialStore>) -> Self {
        Self {
            store,
            http_client: reqwest::Client::new(),
        }
    }

    /// Refreshes the adapter's token if it is within the safety margin
    /// of expiry. Returns the credentials to use for the next call
    /// (refreshed or unchanged).
    ///
    /// Exactly one refresh attempt is made per expired-token
    /// observation; on failure the prior token is retained and
    /// `AdapterError::Refresh` is returned.
    pub async fn refresh_if_needed(
        &self,
        adapter_id: &str,
        endpoint: &OAuthEndpoint,
    ) -> Result<Credentials, AdapterError> {
        let credentials = self
            .store
            .get(adapter_id)
            .map_err(|e| AdapterError::Credential(e.to_string()))?
            .ok_or_else(|| {
                AdapterError::Credential(format!(
                    "no credentials stored for adapter '{}'",
                    adapter_id
                ))
            })?;

        if !credentials.needs_refresh(REFRESH_MARGIN_SECS) {
            return Ok(credentials);
        }

        self.refresh(adapter_id, &credentials, endpoint).await
    }

    /// Performs one refresh exchange and persists the rotated tokens.
    async fn refresh(
        &self,
        adapter_id: &str,
        current: &Credentials,
        endpoint: &OAuthEndpoint,
    ) -> Result<Credentials, AdapterError> {
        let refresh_token = current
            .refresh_token
            .clone()
            .ok_or_else(|| AdapterError::Refresh("no refresh token available".into()))?;

        let mut form: HashMap<&str, String> = HashMap::new();
        form.insert("grant_type", "refresh_token".into());
        form.insert("refresh_token", refresh_token);
        if let Some(client_id) = &endpoint.client_id {
            form.insert("client_id", client_id.clone());
        }
        if let Some(client_secret) = &endpoint.client_secret {
            form.insert("client_secret", client_secret.clone());
        }

        info!(adapter = %adapter_id, "Refreshing access token");

        let response = self
            .http_client
            .post(&endpoint.token_url)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| AdapterError::Refresh(format!("token request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            warn!(
                adapter = %adapter_id,
                status = %status,
                "Token refresh rejected by provider"
            );
            return Err(AdapterError::Refresh(format!(
                "provider returned {}: {}",
                status, body
            )));
        }

        let token_response: TokenRefreshResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::Refresh(format!("invalid token response: {}", e)))?;

        let expires_at = token_response
            .expires_in
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs));

        // Keep the existing refresh token if the provider did not rotate it
        let refresh_token = token_response
            .refresh_token
            .or_else(|| current.refresh_token.clone());

        let refreshed = Credentials {
            access_token: token_response.access_token,
            refresh_token,
            expires_at,
        };

        self.store
            .store(adapter_id, &refreshed)
            .map_err(|e| AdapterError::Refresh(format!("failed to persist tokens: {}", e)))?;

        info!(adapter = %adapter_id, "Access token refreshed");

        Ok(refreshed)
    }
}
