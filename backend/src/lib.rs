pub mod auth;
pub mod clients;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod identity;
pub mod logging;
pub mod provisioning;
pub mod routes;
pub mod store;
pub mod test_util;
pub mod whm;

pub use auth::{RoleBootstrap, Session, SessionIssuer};
pub use clients::ClientDirectory;
pub use config::Config;
pub use dashboard::Dashboard;
pub use error::{AppError, Result};
pub use identity::{IdentityProvider, IdentityToolkitClient, JwksClient};
pub use provisioning::{ProvisioningOrchestrator, Reconciler};
pub use store::{DocumentStore, SqliteDocumentStore};
pub use whm::{ControlPlane, WhmClient};

use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub sessions: SessionIssuer,
    pub provisioning: ProvisioningOrchestrator,
    pub clients: ClientDirectory,
    pub dashboard: Dashboard,
    /// Shared with the background task when one is running.
    pub reconciler: Arc<Reconciler>,
}

impl AppState {
    /// Wire every component over the given gateways.
    ///
    /// A `None` control plane runs provisioning in degraded (simulated) mode.
    pub fn new(
        config: Config,
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityProvider>,
        control_plane: Option<Arc<dyn ControlPlane>>,
    ) -> Self {
        let bootstrap = RoleBootstrap::new(
            store.clone(),
            identity.clone(),
            config.bootstrap.initial_admin_email.clone(),
        );
        let sessions = SessionIssuer::new(identity.clone(), bootstrap, &config.session);

        let (package_prefix, keep_dns) = config
            .whm
            .as_ref()
            .map(|whm| (whm.package_prefix.as_str(), whm.keep_dns_on_terminate))
            .unwrap_or(("", false));
        let provisioning = ProvisioningOrchestrator::new(
            store.clone(),
            control_plane.clone(),
            package_prefix,
            keep_dns,
        );

        Self {
            sessions,
            provisioning,
            clients: ClientDirectory::new(store.clone(), identity),
            dashboard: Dashboard::new(store.clone(), control_plane.clone()),
            reconciler: Arc::new(Reconciler::new(store, control_plane)),
            config,
        }
    }
}
