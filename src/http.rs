//! HTTP side-channel: config discovery, relay status and Prometheus metrics.
//!
//! - `GET /config`  - `{"backendUrl": "..."}` so overlay pages can find the relay
//! - `GET /status`  - [`RelayStatus`](crate::state::RelayStatus) as JSON
//! - `GET /metrics` - Prometheus text format

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::state::RelayHandle;

#[derive(Clone)]
struct AppState {
    backend_url: Arc<str>,
    relay: RelayHandle,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClientConfig {
    backend_url: String,
}

/// Handler for GET /config.
async fn config_handler(State(state): State<AppState>) -> Json<ClientConfig> {
    Json(ClientConfig {
        backend_url: state.backend_url.to_string(),
    })
}

/// Handler for GET /status.
async fn status_handler(State(state): State<AppState>) -> Response {
    match state.relay.status().await {
        Ok(status) => Json(status).into_response(),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    }
}

/// Handler for GET /metrics - returns Prometheus metrics in text format.
async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

/// Build the HTTP router.
pub fn router(backend_url: String, relay: RelayHandle) -> Router {
    Router::new()
        .route("/config", get(config_handler))
        .route("/status", get(status_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(AppState {
            backend_url: Arc::from(backend_url),
            relay,
        })
}

/// Serve `app` on `listener` until `shutdown` fires.
///
/// This is a long-running task that should be spawned in the background.
pub async fn run_http_server(listener: TcpListener, app: Router, mut shutdown: broadcast::Receiver<()>) {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "HTTP server listening");
    }

    let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = shutdown.recv().await;
    });
    if let Err(e) = serve.await {
        tracing::error!(error = %e, "HTTP server error");
    }
}
