//! HTTP transport: one JSON-RPC endpoint plus a health check.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;
use tokio::sync::oneshot;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use tally_store::{Database, SqliteStorage, Storage};

use crate::controller::Controller;
use crate::error::RpcError;
use crate::request::Request;
use crate::response::Response;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// `0` lets the OS pick a free port.
    pub port: u16,
    /// Largest accepted request body; bigger bodies get HTTP 413.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Run one raw request body through validation and dispatch.
pub fn handle<S: Storage>(storage: S, body: &[u8]) -> Response {
    let mut controller = Controller::new(Request::from_slice(body), storage);
    controller.dispatch();
    controller.into_response()
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Shared handle; each request wraps it in its own storage.
    pub db: Database,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/", post(rpc_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Bind the listener and serve in the background.
pub async fn start(config: ServerConfig, db: Database) -> Result<ServerHandle, std::io::Error> {
    let router = build_router(AppState { db }, config.max_body_bytes);
    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(host = %config.host, port = local_addr.port(), "tally server started");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "server terminated with error");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        shutdown_tx: Some(shutdown_tx),
        server,
    })
}

/// Handle returned by [`start`]. Dropping it leaves the server running.
pub struct ServerHandle {
    /// Port actually bound.
    pub port: u16,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Stop accepting connections and wait for in-flight requests.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.server.await {
            tracing::warn!(error = %e, "server task did not finish cleanly");
        }
        tracing::info!(port = self.port, "tally server stopped");
    }
}

/// POST /. Every outcome is a 200 with a JSON-RPC body.
async fn rpc_handler(State(state): State<AppState>, body: Bytes) -> Json<Response> {
    let db = state.db.clone();
    let response = tokio::task::spawn_blocking(move || handle(SqliteStorage::new(db), &body)).await;
    match response {
        Ok(response) => Json(response),
        Err(e) => {
            tracing::error!(error = %e, "request task failed");
            let mut response = Response::new(None);
            response.set_error(RpcError::server_error(format!("Error: {e}")));
            Json(response)
        }
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let db = state.db.clone();
    let version =
        tokio::task::spawn_blocking(move || SqliteStorage::new(db).schema_version()).await;
    match version {
        Ok(Ok(version)) => (
            StatusCode::OK,
            Json(json!({"status": "healthy", "schemaVersion": version})),
        ),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"status": "unhealthy", "error": e.to_string()})),
            )
        }
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "unhealthy", "error": e.to_string()})),
        ),
    }
}
