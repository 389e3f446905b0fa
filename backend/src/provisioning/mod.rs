//! Hosting service lifecycle.
//!
//! Drives `Active <-> Suspended` and `{Active, Suspended} -> Terminated` for a
//! service. The control-plane call always comes first; the two document copies
//! (client subcollection and root mirror) are then written in one batch.

mod credentials;
mod reconciler;
mod summary;

pub use credentials::{derive_username, generate_password, normalize_domain};
pub use reconciler::{ReconcileReport, Reconciler};
pub use summary::AccountSummary;

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use uuid::Uuid;

use backoffice_common::{Envelope, Record, Service, ServiceStatus};

use crate::error::{AppError, Result};
use crate::store::{collections, DocPath, DocumentStore, Query, StoreError, WriteBatch};
use crate::whm::{ControlPlane, ControlPlaneError};

const DEFAULT_SUSPEND_REASON: &str = "Suspended by administrator";
/// Control-plane service name for panel single sign-on.
const SSO_SERVICE: &str = "cpaneld";

fn root_path(service_id: &str) -> DocPath {
    DocPath::new(collections::SERVICES, service_id)
}

fn client_path(client_id: &str, service_id: &str) -> DocPath {
    DocPath::new(collections::client_services(client_id), service_id)
}

/// Owner of a new service.
#[derive(Debug, Clone)]
pub struct Owner {
    pub id: String,
    /// Display name stored on the service; the owner's email.
    pub name: String,
}

pub struct ProvisioningOrchestrator {
    store: Arc<dyn DocumentStore>,
    /// `None` selects degraded mode.
    control_plane: Option<Arc<dyn ControlPlane>>,
    package_prefix: String,
    keep_dns_on_terminate: bool,
}

impl ProvisioningOrchestrator {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        control_plane: Option<Arc<dyn ControlPlane>>,
        package_prefix: &str,
        keep_dns_on_terminate: bool,
    ) -> Self {
        if control_plane.is_none() {
            tracing::warn!("No control plane configured; provisioning runs in simulated mode");
        }
        Self {
            store,
            control_plane,
            package_prefix: package_prefix.to_string(),
            keep_dns_on_terminate,
        }
    }

    /// False in degraded mode, where new services are simulated.
    pub fn has_control_plane(&self) -> bool {
        self.control_plane.is_some()
    }

    /// Control-plane package for a plan name.
    pub fn package_for(&self, plan: &str) -> String {
        format!("{}{}", self.package_prefix, plan.trim().to_lowercase())
    }

    /// Create a hosting account for `owner` and record the service.
    pub async fn provision(&self, owner: &Owner, plan: &str, domain: &str) -> Result<Service> {
        let plan = plan.trim();
        if plan.is_empty() {
            return Err(AppError::Validation("plan is required".to_string()));
        }
        if owner.id.is_empty() {
            return Err(AppError::Unauthorized("Missing owner".to_string()));
        }
        let domain = normalize_domain(domain)?;
        let username = derive_username(&domain)?;
        let password = generate_password();
        let package = self.package_for(plan);

        tracing::info!(
            "Provisioning {} for {} (user {}, package {})",
            domain,
            owner.id,
            username,
            package
        );

        let simulated = match &self.control_plane {
            None => {
                tracing::warn!("Simulating account creation for {}: no control plane", domain);
                true
            }
            Some(cp) => match cp.create_account(&domain, &username, &password, &package).await {
                Ok(envelope) if envelope.is_success() => false,
                Ok(envelope) => {
                    tracing::warn!(
                        "Account creation for {} refused: {}",
                        domain,
                        envelope.reason()
                    );
                    return Err(AppError::Upstream(format!(
                        "Could not create the account: {}",
                        envelope.reason()
                    )));
                }
                Err(e) if e.is_unavailable() => {
                    tracing::warn!(
                        "Control plane unreachable, simulating account creation for {}: {}",
                        domain,
                        e
                    );
                    true
                }
                Err(e) => return Err(e.into()),
            },
        };

        let service = Service {
            id: Uuid::new_v4().to_string(),
            client_id: owner.id.clone(),
            client_name: owner.name.clone(),
            plan: plan.to_string(),
            description: format!("Hosting plan {} for domain {}", plan, domain),
            domain: domain.clone(),
            cpanel_user: username,
            status: ServiceStatus::Active,
            start_date: Utc::now(),
            simulated,
        };

        let document = service.to_document()?;
        let mut batch = WriteBatch::new();
        batch
            .set(client_path(&owner.id, &service.id), document.clone())
            .set(root_path(&service.id), document);

        if let Err(e) = self.store.commit(batch, vec![]).await {
            tracing::error!(
                service_id = %service.id,
                domain = %domain,
                cpanel_user = %service.cpanel_user,
                simulated,
                "Service record not saved after account creation; \
                 manual reconciliation required: {}",
                e
            );
            return Err(AppError::Internal(format!(
                "recording service for {} failed: {}",
                domain, e
            )));
        }

        tracing::info!("Service {} recorded for {}", service.id, owner.id);
        Ok(service)
    }

    /// Suspend or reactivate a service on the control plane, then mirror the
    /// new status into both document copies.
    pub async fn set_suspended(
        &self,
        service_id: &str,
        suspended: bool,
        reason: Option<&str>,
    ) -> Result<Service> {
        let mut service = self.load(service_id).await?;
        let status = if suspended {
            ServiceStatus::Suspended
        } else {
            ServiceStatus::Active
        };

        match self.control_plane_for(&service) {
            None => tracing::warn!(
                "Skipping control plane for service {} ({}), recording status only",
                service.id,
                status.as_str()
            ),
            Some(cp) => {
                let envelope = if suspended {
                    let reason = reason
                        .map(str::trim)
                        .filter(|r| !r.is_empty())
                        .unwrap_or(DEFAULT_SUSPEND_REASON);
                    cp.suspend_account(&service.cpanel_user, reason).await
                } else {
                    cp.unsuspend_account(&service.cpanel_user).await
                };
                Self::require_success(envelope, "change the account status")?;
            }
        }

        let mut fields = Map::new();
        fields.insert("status".to_string(), Value::from(status.as_str()));
        let mut batch = WriteBatch::new();
        batch
            .update(root_path(&service.id), fields.clone())
            .update(client_path(&service.client_id, &service.id), fields);

        self.store.commit(batch, vec![]).await.map_err(|e| match e {
            StoreError::NotFound(path) => AppError::Internal(format!(
                "service {} copies diverged, {} is missing",
                service.id, path
            )),
            other => other.into(),
        })?;

        tracing::info!("Service {} is now {}", service.id, status.as_str());
        service.status = status;
        Ok(service)
    }

    /// Remove the hosting account and delete both document copies.
    ///
    /// A failure reported by the control plane is logged and does not stop
    /// the local records from being removed.
    pub async fn terminate(&self, service_id: &str) -> Result<()> {
        let service = self.load(service_id).await?;
        if service.cpanel_user.is_empty() || service.client_id.is_empty() {
            return Err(AppError::Internal(format!(
                "service {} has no control-plane user or owner",
                service.id
            )));
        }

        match self.control_plane_for(&service) {
            None => tracing::warn!(
                "Skipping control plane removal for service {} ({})",
                service.id,
                service.cpanel_user
            ),
            Some(cp) => {
                let envelope = cp
                    .remove_account(&service.cpanel_user, self.keep_dns_on_terminate)
                    .await?;
                if envelope.is_success() {
                    tracing::info!("Removed account {}", service.cpanel_user);
                } else {
                    tracing::warn!(
                        "Control plane reported failure removing {}: {}; deleting records anyway",
                        service.cpanel_user,
                        envelope.reason()
                    );
                }
            }
        }

        let mut batch = WriteBatch::new();
        batch
            .delete(root_path(&service.id))
            .delete(client_path(&service.client_id, &service.id));
        self.store.commit(batch, vec![]).await?;

        tracing::info!("Service {} terminated", service.id);
        Ok(())
    }

    /// Services owned by one client, newest first.
    pub async fn list_client_services(&self, client_id: &str) -> Result<Vec<Service>> {
        self.list(Query::collection(collections::client_services(client_id)))
            .await
    }

    /// A service from the client's own subcollection.
    pub async fn get_client_service(&self, client_id: &str, service_id: &str) -> Result<Service> {
        match self.store.get(&client_path(client_id, service_id)).await? {
            Some(doc) => Ok(doc.decode()?),
            None => Err(AppError::NotFound(format!("service {}", service_id))),
        }
    }

    /// Every service, from the root mirror, newest first.
    pub async fn list_all_services(&self) -> Result<Vec<Service>> {
        self.list(Query::collection(collections::SERVICES)).await
    }

    /// Usage summary of a service the client owns.
    pub async fn account_summary(
        &self,
        client_id: &str,
        service_id: &str,
    ) -> Result<AccountSummary> {
        let service = self.get_client_service(client_id, service_id).await?;

        let Some(cp) = self.control_plane_for(&service) else {
            tracing::warn!("Returning placeholder summary for service {}", service.id);
            return Ok(AccountSummary::mock());
        };

        let envelope = cp.account_summary(&service.cpanel_user).await?;
        if !envelope.is_success() {
            return Err(AppError::Upstream(format!(
                "Could not read the account summary: {}",
                envelope.reason()
            )));
        }
        let listing = envelope
            .accounts()
            .map_err(|e| AppError::Internal(format!("malformed account summary: {}", e)))?;
        let entry = listing.acct.first().ok_or_else(|| {
            AppError::NotFound(format!("account summary for {}", service.cpanel_user))
        })?;
        Ok(AccountSummary::from_entry(entry))
    }

    /// One-time login URL into the control panel of a service the client
    /// owns. The URL is a credential and is never logged.
    pub async fn login_url(&self, client_id: &str, service_id: &str) -> Result<String> {
        let service = self.get_client_service(client_id, service_id).await?;

        let Some(cp) = self.control_plane_for(&service) else {
            tracing::warn!(
                "Single sign-on requested for service {} without a control plane",
                service.id
            );
            return Err(AppError::Unavailable(
                "Automatic login is temporarily unavailable".to_string(),
            ));
        };

        let envelope = cp.create_user_session(&service.cpanel_user, SSO_SERVICE).await?;
        if !envelope.is_success() {
            return Err(AppError::Upstream(format!(
                "Could not create the login session: {}",
                envelope.reason()
            )));
        }
        let url = envelope.session_url().ok_or_else(|| {
            AppError::Internal(format!("no login URL returned for {}", service.cpanel_user))
        })?;

        tracing::info!("Single sign-on session created for {}", service.cpanel_user);
        Ok(url.to_string())
    }

    async fn load(&self, service_id: &str) -> Result<Service> {
        match self.store.get(&root_path(service_id)).await? {
            Some(doc) => Ok(doc.decode()?),
            None => Err(AppError::NotFound(format!("service {}", service_id))),
        }
    }

    async fn list(&self, query: Query) -> Result<Vec<Service>> {
        let snapshot = self.store.query(&query).await?;
        let mut services = snapshot
            .documents
            .into_iter()
            .map(|doc| doc.decode::<Service>())
            .collect::<std::result::Result<Vec<_>, _>>()?;
        services.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        Ok(services)
    }

    /// The control plane to use for `service`, if any. Simulated services
    /// have no account to act on.
    fn control_plane_for(&self, service: &Service) -> Option<&Arc<dyn ControlPlane>> {
        if service.simulated {
            return None;
        }
        self.control_plane.as_ref()
    }

    fn require_success(
        envelope: std::result::Result<Envelope, ControlPlaneError>,
        action: &str,
    ) -> Result<()> {
        let envelope = envelope?;
        if envelope.is_success() {
            return Ok(());
        }
        Err(AppError::Upstream(format!(
            "Could not {}: {}",
            action,
            envelope.reason()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteDocumentStore;
    use crate::test_util::{mock_whm, FakeControlPlane};

    fn owner() -> Owner {
        Owner {
            id: "u1".to_string(),
            name: "a@x.com".to_string(),
        }
    }

    fn orchestrator(
        control_plane: Option<Arc<FakeControlPlane>>,
    ) -> (Arc<SqliteDocumentStore>, ProvisioningOrchestrator) {
        let store = Arc::new(SqliteDocumentStore::in_memory().unwrap());
        let cp = control_plane.map(|cp| cp as Arc<dyn ControlPlane>);
        let orchestrator = ProvisioningOrchestrator::new(store.clone(), cp, "host_", false);
        (store, orchestrator)
    }

    async fn both_copies(
        store: &SqliteDocumentStore,
        service: &Service,
    ) -> (Option<Service>, Option<Service>) {
        let root = store.get(&root_path(&service.id)).await.unwrap();
        let client = store
            .get(&client_path(&service.client_id, &service.id))
            .await
            .unwrap();
        (
            root.map(|d| d.decode().unwrap()),
            client.map(|d| d.decode().unwrap()),
        )
    }

    #[tokio::test]
    async fn test_provision_writes_both_copies() {
        let cp = Arc::new(FakeControlPlane::new());
        let (store, orch) = orchestrator(Some(cp.clone()));

        let service = orch.provision(&owner(), "Pro", "example.com").await.unwrap();
        assert_eq!(service.status, ServiceStatus::Active);
        assert_eq!(service.cpanel_user, "example");
        assert!(!service.simulated);

        let (root, client) = both_copies(&store, &service).await;
        assert_eq!(root.as_ref(), Some(&service));
        assert_eq!(client.as_ref(), Some(&service));

        let calls = cp.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], "createacct example example.com host_pro");
    }

    #[tokio::test]
    async fn test_provision_refused_writes_nothing() {
        let cp = Arc::new(FakeControlPlane::new());
        cp.respond("createacct", mock_whm::failure("Sorry, that domain is already in use."));
        let (store, orch) = orchestrator(Some(cp));

        let err = orch.provision(&owner(), "Pro", "example.com").await.unwrap_err();
        assert!(matches!(&err, AppError::Upstream(msg) if msg.contains("already in use")));
        assert!(orch.list_all_services().await.unwrap().is_empty());
        assert!(store
            .query(&Query::collection(collections::client_services("u1")))
            .await
            .unwrap()
            .documents
            .is_empty());
    }

    #[tokio::test]
    async fn test_provision_unreachable_is_simulated() {
        let cp = Arc::new(FakeControlPlane::new());
        cp.fail_with_unavailable("createacct");
        let (store, orch) = orchestrator(Some(cp));

        let service = orch.provision(&owner(), "Pro", "example.com").await.unwrap();
        assert!(service.simulated);
        let (root, client) = both_copies(&store, &service).await;
        assert_eq!(root.unwrap().status, client.unwrap().status);
    }

    #[tokio::test]
    async fn test_provision_timeout_aborts_without_writes() {
        let cp = Arc::new(FakeControlPlane::new());
        cp.fail_with_timeout("createacct");
        let (store, orch) = orchestrator(Some(cp.clone()));

        assert!(matches!(
            orch.provision(&owner(), "Pro", "example.com").await,
            Err(AppError::Internal(_))
        ));
        assert_eq!(cp.calls().len(), 1);
        assert!(orch.list_all_services().await.unwrap().is_empty());
        assert!(store
            .query(&Query::collection(collections::client_services("u1")))
            .await
            .unwrap()
            .documents
            .is_empty());
    }

    #[tokio::test]
    async fn test_provision_without_control_plane() {
        let (_store, orch) = orchestrator(None);
        let service = orch.provision(&owner(), "Basic", "shop.example.org").await.unwrap();
        assert!(service.simulated);
        assert_eq!(service.cpanel_user, "shop");
        assert_eq!(orch.list_client_services("u1").await.unwrap(), vec![service]);
    }

    #[tokio::test]
    async fn test_provision_malformed_response_is_internal() {
        let cp = Arc::new(FakeControlPlane::new());
        cp.fail_with_invalid("createacct");
        let (_store, orch) = orchestrator(Some(cp));

        assert!(matches!(
            orch.provision(&owner(), "Pro", "example.com").await,
            Err(AppError::Internal(_))
        ));
        assert!(orch.list_all_services().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_provision_validates_before_gateway() {
        let cp = Arc::new(FakeControlPlane::new());
        let (_store, orch) = orchestrator(Some(cp.clone()));

        assert!(matches!(
            orch.provision(&owner(), "Pro", "not a domain").await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            orch.provision(&owner(), " ", "example.com").await,
            Err(AppError::Validation(_))
        ));
        assert!(cp.calls().is_empty());
    }

    #[tokio::test]
    async fn test_suspend_then_unsuspend() {
        let cp = Arc::new(FakeControlPlane::new());
        let (store, orch) = orchestrator(Some(cp.clone()));
        let service = orch.provision(&owner(), "Pro", "example.com").await.unwrap();

        let suspended = orch
            .set_suspended(&service.id, true, Some("unpaid invoice"))
            .await
            .unwrap();
        assert_eq!(suspended.status, ServiceStatus::Suspended);
        let (root, client) = both_copies(&store, &service).await;
        assert_eq!(root.unwrap().status, ServiceStatus::Suspended);
        assert_eq!(client.unwrap().status, ServiceStatus::Suspended);

        orch.set_suspended(&service.id, false, None).await.unwrap();
        let (root, client) = both_copies(&store, &service).await;
        assert_eq!(root.unwrap().status, ServiceStatus::Active);
        assert_eq!(client.unwrap().status, ServiceStatus::Active);

        let calls = cp.calls();
        assert_eq!(calls[1], "suspendacct example unpaid invoice");
        assert_eq!(calls[2], "unsuspendacct example");
    }

    #[tokio::test]
    async fn test_suspend_failure_leaves_status() {
        let cp = Arc::new(FakeControlPlane::new());
        let (store, orch) = orchestrator(Some(cp.clone()));
        let service = orch.provision(&owner(), "Pro", "example.com").await.unwrap();

        cp.respond("suspendacct", mock_whm::failure("Account is locked."));
        assert!(matches!(
            orch.set_suspended(&service.id, true, None).await,
            Err(AppError::Upstream(_))
        ));

        cp.fail_with_unavailable("suspendacct");
        assert!(matches!(
            orch.set_suspended(&service.id, true, None).await,
            Err(AppError::Internal(_))
        ));

        let (root, client) = both_copies(&store, &service).await;
        assert_eq!(root.unwrap().status, ServiceStatus::Active);
        assert_eq!(client.unwrap().status, ServiceStatus::Active);
    }

    #[tokio::test]
    async fn test_suspend_unknown_service() {
        let (_store, orch) = orchestrator(None);
        assert!(matches!(
            orch.set_suspended("missing", true, None).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_suspend_with_missing_client_copy_writes_nothing() {
        let (store, orch) = orchestrator(None);
        let service = orch.provision(&owner(), "Pro", "example.com").await.unwrap();
        store
            .delete(&client_path(&service.client_id, &service.id))
            .await
            .unwrap();

        assert!(matches!(
            orch.set_suspended(&service.id, true, None).await,
            Err(AppError::Internal(_))
        ));
        let (root, _) = both_copies(&store, &service).await;
        assert_eq!(root.unwrap().status, ServiceStatus::Active);
    }

    #[tokio::test]
    async fn test_terminate_despite_remove_failure() {
        let cp = Arc::new(FakeControlPlane::new());
        let (store, orch) = orchestrator(Some(cp.clone()));
        let service = orch.provision(&owner(), "Pro", "example.com").await.unwrap();

        cp.respond("removeacct", mock_whm::failure("Account does not exist."));
        orch.terminate(&service.id).await.unwrap();

        let (root, client) = both_copies(&store, &service).await;
        assert!(root.is_none());
        assert!(client.is_none());
        assert_eq!(cp.calls().last().unwrap(), "removeacct example keepdns=false");
    }

    #[tokio::test]
    async fn test_terminate_unreachable_aborts() {
        let cp = Arc::new(FakeControlPlane::new());
        let (store, orch) = orchestrator(Some(cp.clone()));
        let service = orch.provision(&owner(), "Pro", "example.com").await.unwrap();

        cp.fail_with_unavailable("removeacct");
        assert!(matches!(
            orch.terminate(&service.id).await,
            Err(AppError::Internal(_))
        ));
        let (root, client) = both_copies(&store, &service).await;
        assert!(root.is_some() && client.is_some());
    }

    #[tokio::test]
    async fn test_terminate_malformed_record_is_internal() {
        let (store, orch) = orchestrator(None);
        let mut service = orch.provision(&owner(), "Pro", "example.com").await.unwrap();
        service.cpanel_user = String::new();
        store
            .set(&root_path(&service.id), service.to_document().unwrap())
            .await
            .unwrap();

        assert!(matches!(
            orch.terminate(&service.id).await,
            Err(AppError::Internal(_))
        ));
        assert!(matches!(
            orch.terminate("missing").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_client_cannot_read_foreign_service() {
        let (_store, orch) = orchestrator(None);
        let service = orch.provision(&owner(), "Pro", "example.com").await.unwrap();

        assert_eq!(orch.get_client_service("u1", &service.id).await.unwrap(), service);
        assert!(matches!(
            orch.get_client_service("u2", &service.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_account_summary() {
        let (_store, degraded) = orchestrator(None);
        let service = degraded.provision(&owner(), "Pro", "example.com").await.unwrap();
        assert!(degraded.account_summary("u1", &service.id).await.unwrap().is_mock);

        let cp = Arc::new(FakeControlPlane::new());
        let (_store, orch) = orchestrator(Some(cp.clone()));
        let service = orch.provision(&owner(), "Pro", "example.com").await.unwrap();
        cp.respond(
            "accountsummary",
            mock_whm::account_summary("example", "2G", "300M"),
        );
        let summary = orch.account_summary("u1", &service.id).await.unwrap();
        assert!(!summary.is_mock);
        assert_eq!(summary.disk_limit, 2048.0);
        assert_eq!(summary.disk_used, 300.0);
    }

    #[test]
    fn test_package_for_plan() {
        let (_store, orch) = orchestrator(None);
        assert_eq!(orch.package_for(" Pro "), "host_pro");
    }

    #[tokio::test]
    async fn test_login_url_for_owned_service() {
        let cp = Arc::new(FakeControlPlane::new());
        cp.respond(
            "create_user_session",
            mock_whm::user_session("https://cp.example.net:2083/cpsess42/login"),
        );
        let (_store, orch) = orchestrator(Some(cp.clone()));
        let service = orch.provision(&owner(), "Pro", "example.com").await.unwrap();

        let url = orch.login_url("u1", &service.id).await.unwrap();
        assert_eq!(url, "https://cp.example.net:2083/cpsess42/login");
        assert_eq!(cp.calls()[1], "create_user_session example cpaneld");

        assert!(matches!(
            orch.login_url("someone-else", &service.id).await,
            Err(AppError::NotFound(_))
        ));
        assert_eq!(cp.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_login_url_failures() {
        let cp = Arc::new(FakeControlPlane::new());
        let (_store, orch) = orchestrator(Some(cp.clone()));
        let service = orch.provision(&owner(), "Pro", "example.com").await.unwrap();

        cp.respond("create_user_session", mock_whm::failure("User is suspended."));
        assert!(matches!(
            orch.login_url("u1", &service.id).await,
            Err(AppError::Upstream(msg)) if msg.contains("User is suspended.")
        ));

        cp.respond("create_user_session", mock_whm::success());
        assert!(matches!(
            orch.login_url("u1", &service.id).await,
            Err(AppError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn test_login_url_unavailable_for_simulated_service() {
        let (_store, orch) = orchestrator(None);
        let service = orch.provision(&owner(), "Pro", "example.com").await.unwrap();
        assert!(matches!(
            orch.login_url("u1", &service.id).await,
            Err(AppError::Unavailable(_))
        ));
    }
}
