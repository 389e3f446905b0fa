//! Login, logout and the current session.

use std::sync::Arc;

use axum::{
    extract::State,
    middleware,
    routing::{get, post},
    Extension, Json, Router,
};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};

use backoffice_common::Role;

use crate::auth::{require_session, Session};
use crate::error::{ApiResponse, AppError, Result};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionLoginRequest {
    pub id_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionLoginResponse {
    pub role: Role,
    pub is_admin: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutResponse {
    pub logged_out: bool,
}

/// POST /v1/auth/session-login
async fn session_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<SessionLoginRequest>,
) -> Result<(CookieJar, Json<ApiResponse<SessionLoginResponse>>)> {
    let token = request.id_token.trim();
    if token.is_empty() {
        return Err(AppError::Validation("idToken is required".to_string()));
    }

    let issued = state.sessions.issue(token).await?;
    let body = SessionLoginResponse {
        role: issued.session.role,
        is_admin: issued.session.is_admin,
    };
    Ok((jar.add(issued.cookie), ApiResponse::ok(body)))
}

/// POST /v1/auth/logout
async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> (CookieJar, Json<ApiResponse<LogoutResponse>>) {
    let value = jar
        .get(state.sessions.cookie_name())
        .map(|c| c.value().to_string());
    let cleared = state.sessions.destroy(value.as_deref()).await;
    (jar.add(cleared), ApiResponse::ok(LogoutResponse { logged_out: true }))
}

/// GET /v1/auth/me
async fn me(Extension(session): Extension<Session>) -> Json<ApiResponse<Session>> {
    ApiResponse::ok(session)
}

pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/auth/me", get(me))
        .layer(middleware::from_fn_with_state(state.clone(), require_session))
        .with_state(state.clone());

    Router::new()
        .route("/auth/session-login", post(session_login))
        .route("/auth/logout", post(logout))
        .with_state(state)
        .merge(protected)
}
