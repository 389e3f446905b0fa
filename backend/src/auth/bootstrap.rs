//! First-sight role assignment.
//!
//! The first identity ever registered becomes the administrator; everyone
//! after that is a client. The admin check and the User/Client writes commit
//! as one optimistic transaction, so concurrent first registrations cannot
//! both observe an empty admin set.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use backoffice_common::{Client, ClientStatus, Record, Role, User};

use crate::error::{AppError, Result};
use crate::identity::{Identity, IdentityProvider};
use crate::store::{
    collections, run_transaction, DocPath, DocumentStore, Query, StoreError, Transaction,
    TransactionBody, DEFAULT_MAX_ATTEMPTS,
};

/// Resolves the authoritative role of an identity, registering it if needed.
pub struct RoleBootstrap {
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
    initial_admin_email: Option<String>,
    max_attempts: u32,
}

/// Outcome of the registration transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Registration {
    Existing(Role),
    Created(Role),
}

struct Register<'a> {
    identity: &'a Identity,
    now: DateTime<Utc>,
}

#[async_trait]
impl TransactionBody for Register<'_> {
    type Output = Registration;

    async fn run(&self, tx: &mut Transaction<'_>) -> std::result::Result<Registration, StoreError> {
        let user_path = DocPath::new(collections::USERS, &self.identity.id);

        // Same identity logging in twice at once: the loser sees the winner's row.
        if let Some(doc) = tx.get(&user_path).await? {
            return Ok(Registration::Existing(doc.decode::<User>()?.role));
        }

        let admins = tx
            .query(
                &Query::collection(collections::USERS)
                    .filter_eq("role", Role::Admin.as_str())
                    .limit(1),
            )
            .await?;
        let role = if admins.is_empty() {
            Role::Admin
        } else {
            Role::Client
        };

        let (first_name, last_name) = self.identity.split_name();
        let user = User {
            id: self.identity.id.clone(),
            email: self.identity.email.clone(),
            first_name: first_name.clone(),
            last_name: last_name.clone(),
            role,
            created_at: self.now,
        };
        let client = Client {
            id: self.identity.id.clone(),
            email: self.identity.email.clone(),
            first_name,
            last_name,
            status: ClientStatus::Active,
            phone_number: None,
            address: None,
            created_at: self.now,
        };

        tx.set(user_path, user.to_document()?);

        // Clients created by an admin already have a profile; keep it.
        let client_path = DocPath::new(collections::CLIENTS, &self.identity.id);
        if tx.get(&client_path).await?.is_none() {
            tx.set(client_path, client.to_document()?);
        }
        Ok(Registration::Created(role))
    }
}

impl RoleBootstrap {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityProvider>,
        initial_admin_email: Option<String>,
    ) -> Self {
        Self {
            store,
            identity,
            initial_admin_email: initial_admin_email
                .map(|e| e.trim().to_lowercase())
                .filter(|e| !e.is_empty()),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Bound on registration transaction attempts under contention.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Return the stored role of `identity`, registering it on first sight.
    pub async fn resolve_role(&self, identity: &Identity) -> Result<Role> {
        let mut role = match self.lookup(&identity.id).await? {
            Some(role) => role,
            None => self.register(identity).await?,
        };

        if role != Role::Admin && self.is_designated_admin(&identity.email) {
            tracing::info!(
                "Promoting designated initial admin {} ({})",
                identity.email,
                identity.id
            );
            role = Role::Admin;
            self.store_role(&identity.id, role).await;
        }

        if identity.role_claim() != Some(role.as_str()) {
            self.sync_claim(identity, role).await;
        }

        Ok(role)
    }

    async fn lookup(&self, id: &str) -> Result<Option<Role>> {
        let path = DocPath::new(collections::USERS, id);
        match self.store.get(&path).await? {
            Some(doc) => Ok(Some(doc.decode::<User>()?.role)),
            None => Ok(None),
        }
    }

    async fn register(&self, identity: &Identity) -> Result<Role> {
        let body = Register {
            identity,
            now: Utc::now(),
        };

        let registration = run_transaction(self.store.as_ref(), &body, self.max_attempts)
            .await
            .map_err(|e| {
                AppError::Internal(format!("registering {} failed: {}", identity.id, e))
            })?;

        match registration {
            Registration::Created(Role::Admin) => {
                tracing::info!(
                    "No administrator found; {} ({}) is the first admin",
                    identity.email,
                    identity.id
                );
                Ok(Role::Admin)
            }
            Registration::Created(role) => {
                tracing::info!("Registered {} ({}) as {}", identity.email, identity.id, role);
                Ok(role)
            }
            Registration::Existing(role) => Ok(role),
        }
    }

    fn is_designated_admin(&self, email: &str) -> bool {
        self.initial_admin_email
            .as_deref()
            .is_some_and(|designated| designated == email.trim().to_lowercase())
    }

    async fn store_role(&self, id: &str, role: Role) {
        let mut fields = Map::new();
        fields.insert("role".to_string(), Value::from(role.as_str()));
        if let Err(e) = self
            .store
            .update(&DocPath::new(collections::USERS, id), fields)
            .await
        {
            tracing::warn!("Failed to store role {} for {}: {}", role, id, e);
        }
    }

    async fn sync_claim(&self, identity: &Identity, role: Role) {
        let mut claims = identity.claims.clone();
        claims.insert("role".to_string(), Value::from(role.as_str()));
        match self.identity.set_claims(&identity.id, claims).await {
            Ok(()) => tracing::debug!("Synced role claim {} for {}", role, identity.id),
            Err(e) => tracing::warn!("Failed to sync role claim for {}: {}", identity.id, e),
        }
    }
}
