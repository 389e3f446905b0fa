//! Drift detection between the control plane and stored services.
//!
//! Account creation and the service write are not one transaction, so either
//! side can end up without the other. The reconciler only reports; fixing
//! drift is an operator decision.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use backoffice_common::Service;

use crate::error::{AppError, Result};
use crate::store::{collections, DocumentStore, Query};
use crate::whm::ControlPlane;

/// A stored service whose account the control plane does not list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingAccount {
    pub service_id: String,
    pub cpanel_user: String,
    pub domain: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub checked_at: DateTime<Utc>,
    /// True when no control plane is configured and nothing was compared.
    pub skipped: bool,
    pub control_plane_accounts: usize,
    pub services: usize,
    /// Control-plane users with no service record.
    pub orphaned_accounts: Vec<String>,
    pub missing_accounts: Vec<MissingAccount>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.orphaned_accounts.is_empty() && self.missing_accounts.is_empty()
    }
}

pub struct Reconciler {
    store: Arc<dyn DocumentStore>,
    control_plane: Option<Arc<dyn ControlPlane>>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        control_plane: Option<Arc<dyn ControlPlane>>,
    ) -> Self {
        Self {
            store,
            control_plane,
        }
    }

    /// Compare control-plane accounts against the root service collection.
    pub async fn reconcile_once(&self) -> Result<ReconcileReport> {
        let checked_at = Utc::now();
        let Some(cp) = &self.control_plane else {
            tracing::debug!("Reconciliation skipped: no control plane");
            return Ok(ReconcileReport {
                checked_at,
                skipped: true,
                control_plane_accounts: 0,
                services: 0,
                orphaned_accounts: vec![],
                missing_accounts: vec![],
            });
        };

        let envelope = cp.list_accounts().await?;
        if !envelope.is_success() {
            return Err(AppError::Upstream(format!(
                "Could not list accounts: {}",
                envelope.reason()
            )));
        }
        let listing = envelope
            .accounts()
            .map_err(|e| AppError::Internal(format!("malformed account listing: {}", e)))?;
        let remote: BTreeSet<String> = listing.acct.into_iter().map(|a| a.user).collect();

        let services = self
            .store
            .query(&Query::collection(collections::SERVICES))
            .await?
            .documents
            .into_iter()
            .map(|doc| doc.decode::<Service>())
            .collect::<std::result::Result<Vec<_>, _>>()?;

        // A simulated service owns no account; a live account under its name is drift.
        let known: BTreeSet<&str> = services
            .iter()
            .filter(|s| !s.simulated)
            .map(|s| s.cpanel_user.as_str())
            .collect();
        let orphaned_accounts: Vec<String> = remote
            .iter()
            .filter(|user| !known.contains(user.as_str()))
            .cloned()
            .collect();
        let missing_accounts: Vec<MissingAccount> = services
            .iter()
            .filter(|s| !s.simulated && !remote.contains(&s.cpanel_user))
            .map(|s| MissingAccount {
                service_id: s.id.clone(),
                cpanel_user: s.cpanel_user.clone(),
                domain: s.domain.clone(),
            })
            .collect();

        for user in &orphaned_accounts {
            tracing::warn!("Control-plane account {} has no service record", user);
        }
        for missing in &missing_accounts {
            tracing::warn!(
                "Service {} ({}) has no control-plane account {}",
                missing.service_id,
                missing.domain,
                missing.cpanel_user
            );
        }

        let report = ReconcileReport {
            checked_at,
            skipped: false,
            control_plane_accounts: remote.len(),
            services: services.len(),
            orphaned_accounts,
            missing_accounts,
        };
        tracing::info!(
            "Reconciliation: {} accounts, {} services, {} orphaned, {} missing",
            report.control_plane_accounts,
            report.services,
            report.orphaned_accounts.len(),
            report.missing_accounts.len()
        );
        Ok(report)
    }

    /// Run [`Self::reconcile_once`] every `period` until the handle is aborted.
    pub fn spawn(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.reconcile_once().await {
                    tracing::warn!("Reconciliation pass failed: {}", e);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provisioning::{Owner, ProvisioningOrchestrator};
    use crate::store::SqliteDocumentStore;
    use crate::test_util::{mock_whm, FakeControlPlane};

    #[tokio::test]
    async fn test_reports_drift_both_ways() {
        let store = Arc::new(SqliteDocumentStore::in_memory().unwrap());
        let cp = Arc::new(FakeControlPlane::new());
        let orchestrator = ProvisioningOrchestrator::new(
            store.clone(),
            Some(cp.clone() as Arc<dyn ControlPlane>),
            "",
            false,
        );
        let owner = Owner {
            id: "u1".to_string(),
            name: "a@x.com".to_string(),
        };
        let kept = orchestrator.provision(&owner, "Pro", "kept.com").await.unwrap();
        let lost = orchestrator.provision(&owner, "Pro", "lost.com").await.unwrap();

        cp.fail_with_unavailable("createacct");
        orchestrator.provision(&owner, "Pro", "offline.com").await.unwrap();

        cp.respond(
            "listaccts",
            mock_whm::account_list(&[("kept", "kept.com"), ("stray", "stray.com")]),
        );
        let reconciler = Reconciler::new(store.clone(), Some(cp.clone() as Arc<dyn ControlPlane>));
        let before = store
            .query(&Query::collection(collections::SERVICES))
            .await
            .unwrap()
            .documents;

        let report = reconciler.reconcile_once().await.unwrap();
        assert!(!report.skipped);
        assert_eq!(report.services, 3);
        assert_eq!(report.orphaned_accounts, vec!["stray".to_string()]);
        assert_eq!(report.missing_accounts.len(), 1);
        assert_eq!(report.missing_accounts[0].service_id, lost.id);
        assert_ne!(report.missing_accounts[0].service_id, kept.id);
        assert!(!report.is_clean());

        let after = store
            .query(&Query::collection(collections::SERVICES))
            .await
            .unwrap()
            .documents;
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_live_account_behind_simulated_service_is_orphaned() {
        let store = Arc::new(SqliteDocumentStore::in_memory().unwrap());
        let cp = Arc::new(FakeControlPlane::new());
        let orchestrator = ProvisioningOrchestrator::new(
            store.clone(),
            Some(cp.clone() as Arc<dyn ControlPlane>),
            "",
            false,
        );
        let owner = Owner {
            id: "u1".to_string(),
            name: "a@x.com".to_string(),
        };
        cp.fail_with_unavailable("createacct");
        let simulated = orchestrator.provision(&owner, "Pro", "shop.com").await.unwrap();
        assert!(simulated.simulated);

        cp.respond("listaccts", mock_whm::account_list(&[("shop", "shop.com")]));
        let reconciler = Reconciler::new(store, Some(cp as Arc<dyn ControlPlane>));
        let report = reconciler.reconcile_once().await.unwrap();
        assert_eq!(report.orphaned_accounts, vec!["shop".to_string()]);
        assert!(report.missing_accounts.is_empty());
    }

    #[tokio::test]
    async fn test_skipped_without_control_plane() {
        let store = Arc::new(SqliteDocumentStore::in_memory().unwrap());
        let report = Reconciler::new(store, None).reconcile_once().await.unwrap();
        assert!(report.skipped);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_listing_failure_is_upstream() {
        let store = Arc::new(SqliteDocumentStore::in_memory().unwrap());
        let cp = Arc::new(FakeControlPlane::new());
        cp.respond("listaccts", mock_whm::failure("Permission denied"));
        let reconciler = Reconciler::new(store, Some(cp as Arc<dyn ControlPlane>));
        assert!(matches!(
            reconciler.reconcile_once().await,
            Err(AppError::Upstream(_))
        ));
    }
}
