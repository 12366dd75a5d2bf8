//! Shared server state and router construction

use crate::{dashboard, device, http};
use axum::{routing::get, Router};
use emg_stream::IngestHandle;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tracing::info;

/// Directory the dashboard page and its assets are served from
pub const DEFAULT_STATIC_DIR: &str = "static";

/// State handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub ingest: IngestHandle,
    pub static_dir: PathBuf,
}

impl AppState {
    pub fn new(ingest: IngestHandle) -> Self {
        Self {
            ingest,
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
        }
    }

    pub fn with_static_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.static_dir = dir.into();
        self
    }
}

/// Device ingest endpoint
pub fn device_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(device::ws_handler))
        .route("/ws/device", get(device::ws_handler))
        .with_state(state)
}

/// Dashboard fan-out endpoint
pub fn dashboard_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(dashboard::ws_handler))
        .route("/ws/dashboard", get(dashboard::ws_handler))
        .with_state(state)
}

/// Dashboard page, static assets, health, status and export
pub fn http_router(state: AppState) -> Router {
    let static_files = ServeDir::new(&state.static_dir);
    Router::new()
        .route("/", get(http::index))
        .route("/health", get(http::health))
        .route("/api/status", get(http::status))
        .route("/api/export", get(http::export))
        .fallback_service(static_files)
        .with_state(state)
}

/// Bind a router to a port on all interfaces
pub async fn bind(name: &'static str, port: u16) -> anyhow::Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind {} port {}: {}", name, port, e))?;
    info!("{} listening on {}", name, addr);
    Ok(listener)
}
