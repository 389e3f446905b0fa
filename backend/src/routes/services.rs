//! Client area: provisioning, own services and the client dashboard.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    middleware,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

use backoffice_common::Service;

use crate::auth::{require_session, Session};
use crate::dashboard::ClientDashboard;
use crate::error::{ApiResponse, Result};
use crate::provisioning::{AccountSummary, Owner};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ProvisionRequest {
    pub plan: String,
    pub domain: String,
}

/// POST /v1/provision-account
async fn provision_account(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Json(request): Json<ProvisionRequest>,
) -> Result<Json<ApiResponse<Service>>> {
    let owner = Owner {
        id: session.identity_id,
        name: session.email,
    };
    let service = state
        .provisioning
        .provision(&owner, &request.plan, &request.domain)
        .await?;
    Ok(ApiResponse::ok(service))
}

/// GET /v1/client/services
async fn list_services(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<Json<ApiResponse<Vec<Service>>>> {
    let services = state
        .provisioning
        .list_client_services(&session.identity_id)
        .await?;
    Ok(ApiResponse::ok(services))
}

/// GET /v1/client/services/:id
async fn get_service(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Service>>> {
    let service = state
        .provisioning
        .get_client_service(&session.identity_id, &id)
        .await?;
    Ok(ApiResponse::ok(service))
}

/// GET /v1/client/services/:id/summary
async fn service_summary(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<AccountSummary>>> {
    let summary = state
        .provisioning
        .account_summary(&session.identity_id, &id)
        .await?;
    Ok(ApiResponse::ok(summary))
}

#[derive(Debug, Serialize)]
pub struct LoginUrlResponse {
    pub url: String,
}

/// POST /v1/client/services/:id/sso
async fn service_sso(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<LoginUrlResponse>>> {
    let url = state
        .provisioning
        .login_url(&session.identity_id, &id)
        .await?;
    Ok(ApiResponse::ok(LoginUrlResponse { url }))
}

/// GET /v1/client/dashboard
async fn dashboard(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Json<ApiResponse<ClientDashboard>> {
    ApiResponse::ok(state.dashboard.client(&session.identity_id).await)
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/provision-account", post(provision_account))
        .route("/client/services", get(list_services))
        .route("/client/services/:id", get(get_service))
        .route("/client/services/:id/summary", get(service_summary))
        .route("/client/services/:id/sso", post(service_sso))
        .route("/client/dashboard", get(dashboard))
        .layer(middleware::from_fn_with_state(state.clone(), require_session))
        .with_state(state)
}
