//! Admin-side client creation.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;

use backoffice_common::{Client, ClientStatus, Record};

use crate::error::{AppError, Result};
use crate::identity::IdentityProvider;
use crate::store::{collections, DocPath, DocumentStore, Query};

/// Minimum password length accepted by the identity provider.
const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewClient {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

impl NewClient {
    fn validate(&self) -> Result<()> {
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(AppError::Validation("a valid email is required".to_string()));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::Validation(format!(
                "password must have at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        if self.first_name.trim().is_empty() {
            return Err(AppError::Validation("first name is required".to_string()));
        }
        Ok(())
    }
}

pub struct ClientDirectory {
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
}

impl ClientDirectory {
    pub fn new(store: Arc<dyn DocumentStore>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { store, identity }
    }

    /// Create the identity, then the Client profile keyed by its id.
    pub async fn create_client(&self, request: &NewClient) -> Result<Client> {
        request.validate()?;

        let email = request.email.trim().to_lowercase();
        let first_name = request.first_name.trim().to_string();
        let last_name = request.last_name.trim().to_string();
        let display_name = format!("{} {}", first_name, last_name).trim().to_string();

        let identity = self
            .identity
            .create_identity(&email, &request.password, &display_name)
            .await?;

        let client = Client {
            id: identity.id.clone(),
            email,
            first_name,
            last_name,
            status: ClientStatus::Active,
            phone_number: request.phone_number.clone().filter(|p| !p.trim().is_empty()),
            address: request.address.clone().filter(|a| !a.trim().is_empty()),
            created_at: Utc::now(),
        };

        let path = DocPath::new(collections::CLIENTS, &client.id);
        if let Err(e) = self.store.set(&path, client.to_document()?).await {
            tracing::error!(
                identity_id = %client.id,
                "Identity created but client profile not saved; manual reconciliation required: {}",
                e
            );
            return Err(AppError::Internal(format!(
                "saving client {} failed: {}",
                client.id, e
            )));
        }

        tracing::info!("Created client {} ({})", client.email, client.id);
        Ok(client)
    }

    pub async fn list_clients(&self) -> Result<Vec<Client>> {
        let snapshot = self.store.query(&Query::collection(collections::CLIENTS)).await?;
        let mut clients = snapshot
            .documents
            .into_iter()
            .map(|doc| doc.decode::<Client>())
            .collect::<std::result::Result<Vec<_>, _>>()?;
        clients.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(clients)
    }
}
