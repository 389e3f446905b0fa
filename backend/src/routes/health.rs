//! Liveness and a plaintext gauge page.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    /// `"whm"` when accounts are really created, `"simulated"` otherwise.
    control_plane: &'static str,
}

fn control_plane_mode(state: &AppState) -> &'static str {
    if state.provisioning.has_control_plane() {
        "whm"
    } else {
        "simulated"
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        control_plane: control_plane_mode(&state),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let configured = u8::from(state.provisioning.has_control_plane());
    let sessions = state.sessions.active_count().await;
    let body = format!(
        "# HELP backoffice_info Back office build information\n\
         # TYPE backoffice_info gauge\n\
         backoffice_info{{version=\"{}\"}} 1\n\
         # HELP backoffice_control_plane_configured Whether a WHM control plane is configured\n\
         # TYPE backoffice_control_plane_configured gauge\n\
         backoffice_control_plane_configured {}\n\
         # HELP backoffice_sessions_active Unexpired login sessions\n\
         # TYPE backoffice_sessions_active gauge\n\
         backoffice_sessions_active {}\n",
        env!("CARGO_PKG_VERSION"),
        configured,
        sessions
    );
    (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}
