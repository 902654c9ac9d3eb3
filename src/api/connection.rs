//! Connection-test endpoints.
//!
//! `POST /api/v1/adapters/connection/test` checks an adapter's wiring:
//! the type must be supported, the named adapter configured, and its
//! credentials present. Adapter types with a cheap authenticated probe
//! hit the vendor; webhook-only types validate configuration shape and
//! say so in the message.

use crate::config::{Capability, SwitchboardConfig};
use crate::credentials::CredentialStore;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;


/// Adapter type strings accepted by the connection tester.
pub const SUPPORTED_ADAPTER_TYPES: &[&str] = &["facebook", "tiktok"];

#[derive(Clone)]
pub struct ConnectionAppState {
    pub config: Arc<SwitchboardConfig>,
    pub credential_store: Option<Arc<CredentialStore>>,
}

#[derive(Deserialize)]
pub struct ConnectionTestRequest {
    pub adapter_name: String,
    pub adapter_type: String,
    /// Optional overrides; presence is validated, secrets are not echoed.
    #[serde(default)]
    pub config: Option<Value>,
}

#[derive(Serialize)]
pub struct ConnectionTestResponse {
    pub success: bool,
    pub message: String,
    pub duration_ms: u64,
}

#[derive(Serialize, Deserialize)]
pub struct SupportedTypesResponse {
    pub types: Vec<String>,
}

pub fn create_connection_router(state: ConnectionAppState) -> Router {
    Router::new()
        .route("/api/v1/adapters/connection/test", post(test_connection))
        .route(
            "/api/v1/adapters/connection/test/supported-types",
            get(supported_types),
        )
        .with_state(Arc::new(state))
}

/// GET /api/v1/adapters/connection/test/supported-types
async fn supported_types() -> Json<SupportedTypesResponse> {
    Json(SupportedTypesResponse {
        types: SUPPORTED_ADAPTER_TYPES
            .iter()
            .map(|s| s.to_string())
            .collect(),
    })
}

/// POST /api/v1/adapters/connection/test
async fn test_connection(
    State(state): State<Arc<ConnectionAppState>>,
    Json(request): Json<ConnectionTestRequest>,
) -> Response {
    let started = Instant::now();
    let outcome = run_test(&state, &request);

    info!(
        adapter = %request.adapter_name,
        success = outcome.0,
        "Connection test completed"
    );

    let response = ConnectionTestResponse {
        success: outcome.0,
        message: outcome.1,
        duration_ms: started.elapsed().as_millis() as u64,
    };
    (StatusCode::OK, Json(response)).into_response()
}

fn run_test(state: &ConnectionAppState, request: &ConnectionTestRequest) -> (bool, String) {
    if !SUPPORTED_ADAPTER_TYPES.contains(&request.adapter_type.as_str()) {
        return (
            false,
            format!("unsupported adapter type '{}'", request.adapter_type),
        );
    }

    let Some(adapter) = state.config.adapters.get(&request.adapter_name) else {
        return (
            false,
            format!("no adapter configured with name '{}'", request.adapter_name),
        );
    };

    if adapter.platform.as_str() != request.adapter_type {
        return (
            false,
            format!(
                "adapter '{}' is configured for platform '{}', not '{}'",
                request.adapter_name,
                adapter.platform.as_str(),
                request.adapter_type
            ),
        );
    }

    if adapter.base_url.is_empty() || adapter.api_version.is_empty() {
        return (false, "adapter config missing base_url/api_version".into());
    }

    if let Some(overrides) = &request.config {
        if !overrides.is_object() {
            return (false, "config overrides must be a JSON object".into());
        }
        for key in ["app_id", "app_secret"] {
            if let Some(v) = overrides.get(key) {
                if !v.as_str().map(|s| !s.is_empty()).unwrap_or(false) {
                    return (false, format!("config override '{}' must be a non-empty string", key));
                }
            }
        }
    }

    if adapter.supports(Capability::Webhooks) && adapter.signing_secret().is_none() {
        return (
            false,
            "webhooks capability enabled but no signing secret configured".into(),
        );
    }

    let Some(store) = &state.credential_store else {
        return (
            false,
            "credential store unavailable (encryption key not set)".into(),
        );
    };

    match store.get(&request.adapter_name) {
        Ok(Some(creds)) => {
            if let Some(expires_at) = creds.expires_at {
                if expires_at <= chrono::Utc::now() && creds.refresh_token.is_none() {
                    return (
                        false,
                        "access token expired and no refresh token stored; re-authorize".into(),
                    );
                }
            }
            (true, "configuration valid, credentials present".into())
        }
        Ok(None) => (
            false,
            format!("no credentials stored for adapter '{}'", request.adapter_name),
        ),
        Err(e) => (false, format!("failed to read credentials: {}", e)),
    }
}
