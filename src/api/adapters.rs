//! Adapter status API endpoints.
//!
//! Status is derived from configuration plus whether credentials exist
//! in the CredentialStore; live poll state is reported by the manager
//! process, not here.

use crate::config::{Capability, SwitchboardConfig};
use crate::credentials::{CredentialStore, Credentials};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};


/// Shared application state for the adapter API
#[derive(Clone)]
pub struct AdapterApiState {
    pub config: Arc<SwitchboardConfig>,
    pub credential_store: Option<Arc<CredentialStore>>,
}

/// Adapter status summary (for list endpoint)
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AdapterSummary {
    pub name: String,
    pub platform: String,
    pub enabled: bool,
    pub status: String,
}

/// Detailed adapter status (for single adapter endpoint)
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AdapterDetail {
    pub name: String,
    pub platform: String,
    pub enabled: bool,
    pub status: String,
    pub capabilities: Vec<String>,
    pub polls: bool,
    pub poll_interval_seconds: u64,
}

/// List adapters response
#[derive(Serialize, Deserialize)]
pub struct ListAdaptersResponse {
    pub adapters: Vec<AdapterSummary>,
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Request body for POST /api/adapters/:name/token
#[derive(Deserialize)]
pub struct TokenRequest {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Serialize, Deserialize)]
pub struct TokenMutationResponse {
    pub success: bool,
}

/// Create adapter API router
pub fn create_adapter_router(state: AdapterApiState) -> Router {
    Router::new()
        .route("/api/adapters", get(list_adapters))
        .route("/api/adapters/:name", get(get_adapter))
        .route("/api/adapters/:name/token", post(store_token))
        .route("/api/adapters/:name/token", delete(delete_token))
        .with_state(Arc::new(state))
}

fn adapter_status(state: &AdapterApiState, name: &str) -> (bool, String) {
    let Some(store) = &state.credential_store else {
        return (false, "not_configured".to_string());
    };
    match store.get(name) {
        Ok(Some(_)) => (true, "configured".to_string()),
        Ok(None) => (false, "not_configured".to_string()),
        Err(e) => {
            warn!(adapter = %name, error = %e, "Failed to fetch credentials");
            (false, "error".to_string())
        }
    }
}

/// GET /api/adapters - list all configured adapters
async fn list_adapters(State(state): State<Arc<AdapterApiState>>) -> Json<ListAdaptersResponse> {
    debug!("Listing adapters");

    if state.credential_store.is_none() {
        warn!("Credential store not available (SWITCHBOARD_ENCRYPTION_KEY not set)");
    }

    let mut adapters: Vec<AdapterSummary> = state
        .config
        .adapters
        .iter()
        .map(|(name, cfg)| {
            let (enabled, status) = adapter_status(&state, name);
            AdapterSummary {
                name: name.clone(),
                platform: cfg.platform.as_str().to_string(),
                enabled,
                status,
            }
        })
        .collect();
    adapters.sort_by(|a, b| a.name.cmp(&b.name));

    Json(ListAdaptersResponse { adapters })
}

/// GET /api/adapters/:name - detailed status for one adapter
async fn get_adapter(
    State(state): State<Arc<AdapterApiState>>,
    Path(name): Path<String>,
) -> Response {
    let Some(cfg) = state.config.adapters.get(&name) else {
        return not_found(&name);
    };

    debug!(adapter = %name, "Getting adapter status");

    let (enabled, status) = adapter_status(&state, &name);
    let capabilities = cfg
        .capabilities
        .iter()
        .map(|c| c.as_str().to_string())
        .collect();

    Json(AdapterDetail {
        name,
        platform: cfg.platform.as_str().to_string(),
        enabled,
        status,
        capabilities,
        polls: cfg.supports(Capability::Polling),
        poll_interval_seconds: cfg.poll.interval_secs,
    })
    .into_response()
}

/// POST /api/adapters/:name/token - store credentials for an adapter
async fn store_token(
    State(state): State<Arc<AdapterApiState>>,
    Path(name): Path<String>,
    Json(body): Json<TokenRequest>,
) -> Response {
    if !state.config.adapters.contains_key(&name) {
        return not_found(&name);
    }

    let Some(store) = &state.credential_store else {
        return store_unavailable();
    };

    let credentials = Credentials {
        access_token: body.access_token,
        refresh_token: body.refresh_token,
        expires_at: body.expires_at,
    };

    if let Err(e) = store.store(&name, &credentials) {
        warn!(adapter = %name, error = %e, "Failed to store credentials");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "Failed to store credentials".to_string(),
            }),
        )
            .into_response();
    }

    info!(adapter = %name, "Token stored");
    Json(TokenMutationResponse { success: true }).into_response()
}

/// DELETE /api/adapters/:name/token - remove stored credentials
async fn delete_token(
    State(state): State<Arc<AdapterApiState>>,
    Path(name): Path<String>,
) -> Response {
    if !state.config.adapters.contains_key(&name) {
        return not_found(&name);
    }

    let Some(store) = &state.credential_store else {
        return store_unavailable();
    };

    match store.delete(&name) {
        Ok(true) => {
            info!(adapter = %name, "Token deleted");
            Json(TokenMutationResponse { success: true }).into_response()
        }
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("No credentials found for adapter '{}'", name),
            }),
        )
            .into_response(),
        Err(e) => {
            warn!(adapter = %name, error = %e, "Failed to delete credentials");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Failed to delete credentials".to_string(),
                }),
            )
                .into_response()
        }
    }
}

fn not_found(name: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("Adapter '{}' not found", name),
        }),
    )
        .into_response()
}

fn store_unavailable() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "Credential storage not available (SWITCHBOARD_ENCRYPTION_KEY not set)"
                .to_string(),
        }),
    )
        .into_response()
}
