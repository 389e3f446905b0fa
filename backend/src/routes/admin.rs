//! Admin API routes.
//!
//! Provides:
//! - Dashboard counters (`/v1/admin/dashboard`)
//! - Client onboarding and listing (`/v1/admin/clients`)
//! - Service listing and lifecycle (`/v1/admin/services/*`)
//! - On-demand drift check (`/v1/admin/reconcile`)

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use backoffice_common::{Client, Service};

use crate::auth::require_admin;
use crate::clients::NewClient;
use crate::dashboard::AdminDashboard;
use crate::error::{ApiResponse, Result};
use crate::provisioning::ReconcileReport;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SuspendRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminateResponse {
    pub service_id: String,
    pub terminated: bool,
}

/// GET /v1/admin/dashboard
async fn dashboard(State(state): State<Arc<AppState>>) -> Json<ApiResponse<AdminDashboard>> {
    ApiResponse::ok(state.dashboard.admin().await)
}

/// POST /v1/admin/clients
async fn create_client(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NewClient>,
) -> Result<(StatusCode, Json<ApiResponse<Client>>)> {
    let client = state.clients.create_client(&request).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(client)))
}

/// GET /v1/admin/clients
async fn list_clients(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<Client>>>> {
    Ok(ApiResponse::ok(state.clients.list_clients().await?))
}

/// GET /v1/admin/services
async fn list_services(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<Service>>>> {
    Ok(ApiResponse::ok(state.provisioning.list_all_services().await?))
}

/// PUT /v1/admin/services/:id/suspend
///
/// The body is optional; without a reason the default one is sent.
async fn suspend_service(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<Json<SuspendRequest>>,
) -> Result<Json<ApiResponse<Service>>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let service = state
        .provisioning
        .set_suspended(&id, true, request.reason.as_deref())
        .await?;
    Ok(ApiResponse::ok(service))
}

/// PUT /v1/admin/services/:id/unsuspend
async fn unsuspend_service(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Service>>> {
    let service = state.provisioning.set_suspended(&id, false, None).await?;
    Ok(ApiResponse::ok(service))
}

/// DELETE /v1/admin/services/:id
async fn terminate_service(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<TerminateResponse>>> {
    state.provisioning.terminate(&id).await?;
    Ok(ApiResponse::ok(TerminateResponse {
        service_id: id,
        terminated: true,
    }))
}

/// POST /v1/admin/reconcile
async fn reconcile(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<ReconcileReport>>> {
    Ok(ApiResponse::ok(state.reconciler.reconcile_once().await?))
}

/// Create the admin router. Every route requires an admin session.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/clients", post(create_client).get(list_clients))
        .route("/services", get(list_services))
        .route("/services/:id/suspend", put(suspend_service))
        .route("/services/:id/unsuspend", put(unsuspend_service))
        .route("/services/:id", delete(terminate_service))
        .route("/reconcile", post(reconcile))
        .layer(middleware::from_fn_with_state(state.clone(), require_admin))
        .with_state(state)
}
