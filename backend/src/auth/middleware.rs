use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;

use crate::error::AppError;
use crate::AppState;

async fn session_from_cookies(
    state: &AppState,
    jar: &CookieJar,
) -> Result<super::Session, AppError> {
    let value = jar
        .get(state.sessions.cookie_name())
        .map(|c| c.value().to_string());
    state.sessions.current(value.as_deref()).await
}

/// Middleware that requires a live session; the [`super::Session`] is
/// inserted into request extensions for handlers.
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    match session_from_cookies(&state, &jar).await {
        Ok(session) => {
            request.extensions_mut().insert(session);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Middleware that requires a live session whose role is admin.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    match session_from_cookies(&state, &jar).await {
        Ok(session) if session.role.is_admin() => {
            request.extensions_mut().insert(session);
            next.run(request).await
        }
        Ok(session) => {
            tracing::warn!(
                "Non-admin {} denied access to {}",
                session.identity_id,
                request.uri().path()
            );
            AppError::Forbidden("Admin access required".to_string()).into_response()
        }
        Err(e) => e.into_response(),
    }
}
