use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderValue, Method};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hosting_backoffice::{
    routes, AppState, Config, ControlPlane, IdentityToolkitClient, JwksClient,
    SqliteDocumentStore, WhmClient,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| config.logging.level.clone().into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting hosting back office");

    // Gateways
    let store = Arc::new(SqliteDocumentStore::new(&config.database.url)?);

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.identity.timeout_secs))
        .build()?;
    let jwks = JwksClient::new(
        http_client.clone(),
        &config.identity.issuer,
        &config.identity.audience,
    )
    .await?;
    let identity = Arc::new(IdentityToolkitClient::new(
        jwks,
        http_client,
        &config.identity.api_base_url,
        &config.identity.project_id,
        &config.identity.api_token,
    ));

    let control_plane: Option<Arc<dyn ControlPlane>> = match &config.whm {
        Some(whm) => {
            tracing::info!("Using WHM control plane at {}", whm.api_base_url());
            Some(Arc::new(WhmClient::new(whm)?))
        }
        None => {
            tracing::warn!("No WHM control plane configured, new services will be simulated");
            None
        }
    };

    let state = Arc::new(AppState::new(config.clone(), store, identity, control_plane));

    if config.reconciler.interval_secs > 0 {
        state
            .reconciler
            .clone()
            .spawn(Duration::from_secs(config.reconciler.interval_secs));
    }

    // Cookies need explicit origins with credentials
    let origins = config
        .cors
        .origin_list()
        .iter()
        .map(|o| o.parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()?;
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true);

    // Build router
    let app = routes::app(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
