//! HTTP endpoints: dashboard page, health check, status snapshot and CSV export

use crate::app::AppState;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
};
use chrono::Utc;
use emg_stream::ExportRange;
use serde::Deserialize;
use tracing::{info, warn};

const WELCOME_PAGE: &str = "<html><body><h1>EMG Posture Hub</h1>\
<p>index.html not found in the static directory.</p></body></html>";

/// `GET /`: the dashboard page, or a placeholder when none is installed
pub async fn index(State(state): State<AppState>) -> Html<String> {
    let path = state.static_dir.join("index.html");
    match tokio::fs::read_to_string(&path).await {
        Ok(page) => Html(page),
        Err(e) => {
            warn!("Dashboard page {} unavailable: {}", path.display(), e);
            Html(WELCOME_PAGE.to_string())
        }
    }
}

pub async fn health() -> &'static str {
    "Server is running"
}

pub async fn status(State(state): State<AppState>) -> Response {
    match state.ingest.status().await {
        Ok(status) => Json(status).into_response(),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ExportParams {
    pub range: Option<String>,
}

/// `GET /api/export?range=10m|30m|1h|full`
pub async fn export(State(state): State<AppState>, Query(params): Query<ExportParams>) -> Response {
    let range: ExportRange = match params.range.as_deref().unwrap_or("full").parse() {
        Ok(range) => range,
        Err(e) => {
            warn!("Rejected export request: {}", e);
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    let now = Utc::now();
    let recorder = state.ingest.recorder().clone();
    // Rendering a long session is CPU-bound; keep it off the async workers
    let csv = match tokio::task::spawn_blocking(move || recorder.export_csv(range, now)).await {
        Ok(csv) => csv,
        Err(e) => {
            warn!("Export task failed: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Export failed").into_response();
        }
    };
    info!(range = range.as_str(), bytes = csv.len(), "Session exported");

    let filename = format!(
        "attachment; filename=\"emg_session_{}_{}.csv\"",
        range.as_str(),
        now.format("%Y%m%d_%H%M%S")
    );
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, filename),
        ],
        csv,
    )
        .into_response()
}
