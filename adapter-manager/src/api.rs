//! Adapter manager HTTP API: operations and poll status.
//!
//! Exposes two routes:
//! - `POST /api/adapters/:name/operations/:operation` executes one
//!   outbound operation from the adapter's table
//! - `GET /api/adapters/:name/poll-status` returns poll counters for one
//!   adapter

use crate::scheduler::PollStatus;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use switchboard::dispatch::OperationDispatcher;
use tracing::info;

#[cfg(test)]
mod tests;

/// Shared state for the manager API handlers.
#[derive(Clone)]
pub struct ApiState {
    /// One dispatcher per adapter; operation names are unique within an
    /// adapter, not across platforms.
    pub dispatchers: HashMap<String, Arc<OperationDispatcher>>,
    pub status_map: Arc<tokio::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<PollStatus>>>>>,
}

#[derive(Serialize, serde::Deserialize)]
pub struct PollStatusResponse {
    pub adapter: String,
    pub running: bool,
    pub last_poll: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub poll_count: u64,
    pub error_count: u64,
    pub events_emitted: u64,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route(
            "/api/adapters/:name/operations/:operation",
            post(execute_operation),
        )
        .route("/api/adapters/:name/poll-status", get(poll_status))
        .with_state(Arc::new(state))
}

/// POST /api/adapters/:name/operations/:operation
///
/// The response is always the uniform operation result; HTTP status
/// reflects only routing-level failures (unknown adapter).
async fn execute_operation(
    State(state): State<Arc<ApiState>>,
    Path((name, operation)): Path<(String, String)>,
    Json(params): Json<Value>,
) -> Response {
    let Some(dispatcher) = state.dispatchers.get(&name) else {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Adapter '{}' not found", name),
            }),
        )
            .into_response();
    };

    info!(adapter = %name, operation = %operation, "Dispatching operation");
    let result = dispatcher.dispatch(&operation, params).await;
    Json(result).into_response()
}

/// GET /api/adapters/:name/poll-status
async fn poll_status(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
) -> Response {
    let status_arc = {
        let map = state.status_map.lock().await;
        map.get(&name).cloned()
    };

    match status_arc {
        Some(status_arc) => {
            let status = status_arc.lock().await.clone();
            Json(PollStatusResponse {
                adapter: name,
                running: true,
                last_poll: status.last_poll,
                last_error: status.last_error,
                poll_count: status.poll_count,
                error_count: status.error_count,
                events_emitted: status.events_emitted,
            })
            .into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("No scheduler running for adapter '{}'", name),
            }),
        )
            .into_response(),
    }
}
