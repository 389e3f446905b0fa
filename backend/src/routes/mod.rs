pub mod admin;
pub mod auth;
pub mod health;
pub mod services;

use std::sync::Arc;

use axum::{middleware, Router};

use crate::logging::request_logger;
use crate::AppState;

/// Build the full HTTP surface without the CORS and trace layers.
pub fn app(state: Arc<AppState>) -> Router {
    let v1 = Router::new()
        .merge(auth::router(state.clone()))
        .merge(services::router(state.clone()))
        .nest("/admin", admin::router(state.clone()));

    Router::new()
        .merge(health::router(state))
        .nest("/v1", v1)
        .layer(middleware::from_fn(request_logger))
}
