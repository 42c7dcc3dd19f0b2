//! HTTP surface (axum).
//!
//! Routes:
//! - `POST /api/collections/sync`: discovery trigger, body `{"filters": [...]}`
//!   (empty body or no filters syncs every enabled source). Answers with the
//!   dispatch summary and a status code chosen by [`dispatch`].
//! - `GET /api/collections/sync/status`: per-source sync status.
//! - `GET /health`: liveness.
//!
//! Every request works on one snapshot of the [`RegistryHandle`].

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use collection_sync_core::dispatch::{dispatch, SyncFilter};
use collection_sync_core::registry::{RegistryHandle, StatusReport};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::watch;
use tracing::{info, warn};

/// Shared state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RegistryHandle>,
}

#[derive(Debug, Default, Deserialize)]
struct SyncRequest {
    #[serde(default)]
    filters: Option<Vec<SyncFilter>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/collections/sync", post(trigger_sync))
        .route("/api/collections/sync/status", get(sync_status))
        .route("/health", get(health))
        .with_state(state)
}

async fn trigger_sync(State(state): State<AppState>, body: Bytes) -> Response {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        SyncRequest::default()
    } else {
        match serde_json::from_slice::<SyncRequest>(&body) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Rejecting malformed sync request body");
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "error": "invalid request body",
                        "details": e.to_string(),
                    })),
                )
                    .into_response();
            }
        }
    };

    let filters = request.filters.unwrap_or_default();
    info!(filters = filters.len(), "Sync requested over HTTP");
    let registry = state.registry.snapshot();
    let response = dispatch(&registry, &filters);
    let status =
        StatusCode::from_u16(response.status.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response)).into_response()
}

async fn sync_status(State(state): State<AppState>) -> Json<StatusReport> {
    Json(state.registry.snapshot().status())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Serves `router` on `bind` until `shutdown` publishes `true`.
pub async fn serve(bind: SocketAddr, state: AppState, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {}", bind))?;
    info!(bind = %bind, "HTTP server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            loop {
                let stop = *shutdown.borrow_and_update();
                if stop || shutdown.changed().await.is_err() {
                    break;
                }
            }
            info!("HTTP server shutting down");
        })
        .await
        .context("HTTP server failed")
}
