//! Aggregate counts for the admin and client dashboards.
//!
//! Counts are independent reads issued concurrently. A failed count is
//! logged and reported as 0; it never fails the dashboard.

use std::sync::Arc;

use serde::Serialize;

use crate::store::{collections, DocumentStore, Query};
use crate::whm::ControlPlane;

const STATUS_ACTIVE: &str = "Active";
const STATUS_OPEN: &str = "Open";
const STATUS_PAID: &str = "Paid";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminDashboard {
    pub clients: u64,
    pub active_services: u64,
    pub open_invoices: u64,
    pub open_tickets: u64,
    pub control_plane_accounts: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientDashboard {
    pub services: u64,
    pub domains: u64,
    pub open_tickets: u64,
    pub unpaid_invoices: u64,
}

pub struct Dashboard {
    store: Arc<dyn DocumentStore>,
    control_plane: Option<Arc<dyn ControlPlane>>,
}

impl Dashboard {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        control_plane: Option<Arc<dyn ControlPlane>>,
    ) -> Self {
        Self {
            store,
            control_plane,
        }
    }

    async fn count(&self, label: &str, query: Query) -> u64 {
        match self.store.count(&query).await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("Dashboard count '{}' failed: {}", label, e);
                0
            }
        }
    }

    async fn control_plane_accounts(&self) -> u64 {
        let Some(cp) = &self.control_plane else {
            tracing::debug!("No control plane, skipping account count");
            return 0;
        };
        let result = cp.list_accounts().await.map_err(|e| e.to_string()).and_then(|env| {
            if !env.is_success() {
                return Err(env.reason().to_string());
            }
            env.accounts().map_err(|e| e.to_string())
        });
        match result {
            Ok(listing) => listing.acct.len() as u64,
            Err(e) => {
                tracing::warn!("Dashboard count 'control plane accounts' failed: {}", e);
                0
            }
        }
    }

    pub async fn admin(&self) -> AdminDashboard {
        let (clients, active_services, open_invoices, open_tickets, control_plane_accounts) =
            tokio::join!(
                self.count("clients", Query::collection(collections::CLIENTS)),
                self.count(
                    "active services",
                    Query::collection(collections::SERVICES).filter_eq("status", STATUS_ACTIVE),
                ),
                self.count(
                    "open invoices",
                    Query::collection(collections::INVOICES).filter_ne("status", STATUS_PAID),
                ),
                self.count(
                    "open tickets",
                    Query::collection(collections::TICKETS).filter_eq("status", STATUS_OPEN),
                ),
                self.control_plane_accounts(),
            );

        AdminDashboard {
            clients,
            active_services,
            open_invoices,
            open_tickets,
            control_plane_accounts,
        }
    }

    pub async fn client(&self, client_id: &str) -> ClientDashboard {
        let sub = |name: &str| Query::collection(collections::client_sub(client_id, name));

        let (services, domains, open_tickets, unpaid_invoices) = tokio::join!(
            self.count("services", sub(collections::SERVICES)),
            self.count("domains", sub(collections::DOMAINS)),
            self.count(
                "open tickets",
                sub(collections::TICKETS).filter_eq("status", STATUS_OPEN),
            ),
            self.count(
                "unpaid invoices",
                sub(collections::INVOICES).filter_ne("status", STATUS_PAID),
            ),
        );

        ClientDashboard {
            services,
            domains,
            open_tickets,
            unpaid_invoices,
        }
    }
}
