//! Identity provider gateway.
//!
//! Verifies bearer identity tokens and reads/writes identity records and
//! their custom claims. The provider is external; this module only consumes it.

mod jwks;
mod toolkit;

pub use jwks::{JwksClient, TokenClaims};
pub use toolkit::IdentityToolkitClient;

use async_trait::async_trait;
use serde_json::{Map, Value};

/// Identity record issued by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    /// Custom claims, e.g. `{"role": "admin"}`.
    pub claims: Map<String, Value>,
}

impl Identity {
    /// The `role` custom claim, if set.
    pub fn role_claim(&self) -> Option<&str> {
        self.claims.get("role").and_then(Value::as_str)
    }

    /// Split the display name into first and last name at the first space.
    pub fn split_name(&self) -> (String, String) {
        let name = self.display_name.as_deref().unwrap_or("").trim();
        match name.split_once(' ') {
            Some((first, last)) => (first.to_string(), last.trim().to_string()),
            None => (name.to_string(), String::new()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Invalid token: {0}")]
    InvalidToken(String),
    #[error("JWKS fetch error: {0}")]
    JwksFetchError(String),
    #[error("Identity not found: {0}")]
    NotFound(String),
    #[error("Identity already exists: {0}")]
    AlreadyExists(String),
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Identity provider error: {0}")]
    Provider(String),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verify a bearer identity token and return the identity id it names.
    async fn verify_token(&self, token: &str) -> Result<String, IdentityError>;

    async fn get_identity(&self, id: &str) -> Result<Identity, IdentityError>;

    /// Create an identity; fails with `AlreadyExists` on a duplicate email.
    async fn create_identity(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<Identity, IdentityError>;

    /// Replace the identity's custom claims.
    async fn set_claims(&self, id: &str, claims: Map<String, Value>) -> Result<(), IdentityError>;
}
