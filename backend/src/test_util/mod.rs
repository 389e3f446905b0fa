//! Fakes and fixtures shared by unit and integration tests.

pub mod mock_whm;
#[cfg(test)]
mod oidc;

#[cfg(test)]
pub use oidc::{generate_expired_token, generate_identity_token, mount_oidc_mocks};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};

use backoffice_common::Envelope;

use crate::config::{
    BootstrapConfig, Config, CorsConfig, DatabaseConfig, IdentityConfig, LoggingConfig,
    ReconcilerConfig, SessionConfig,
};
use crate::identity::{Identity, IdentityError, IdentityProvider};
use crate::store::DocumentStore;
use crate::whm::{ControlPlane, ControlPlaneError};
use crate::AppState;

const TOKEN_PREFIX: &str = "test-token:";

pub fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 8080,
        identity: IdentityConfig {
            issuer: "https://test-issuer".to_string(),
            audience: "test-project".to_string(),
            api_base_url: "http://localhost:9099".to_string(),
            project_id: "test-project".to_string(),
            api_token: "test-api-token".to_string(),
            timeout_secs: 5,
        },
        database: DatabaseConfig {
            url: "sqlite::memory:".to_string(),
        },
        whm: None,
        session: SessionConfig {
            secret: "test-session-secret".to_string(),
            ttl_hours: 72,
            cookie_name: "backoffice_session".to_string(),
            secure: false,
        },
        bootstrap: BootstrapConfig::default(),
        logging: LoggingConfig {
            level: "debug".to_string(),
        },
        cors: CorsConfig {
            origins: "http://localhost:3000".to_string(),
        },
        reconciler: ReconcilerConfig::default(),
    }
}

/// Application state over the given store and fakes.
pub fn create_test_state(
    store: Arc<dyn DocumentStore>,
    identity: Arc<FakeIdentityProvider>,
    control_plane: Option<Arc<FakeControlPlane>>,
) -> Arc<AppState> {
    let control_plane = control_plane.map(|cp| cp as Arc<dyn ControlPlane>);
    Arc::new(AppState::new(test_config(), store, identity, control_plane))
}

/// In-memory identity provider.
///
/// Tokens are `test-token:<id>`; see [`FakeIdentityProvider::token_for`].
#[derive(Default)]
pub struct FakeIdentityProvider {
    identities: Mutex<HashMap<String, Identity>>,
    next_id: AtomicU32,
    claim_writes: AtomicUsize,
    fail_claims: AtomicBool,
}

impl FakeIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, email: &str, display_name: Option<&str>) -> Identity {
        let id = format!("uid-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let identity = Identity {
            id: id.clone(),
            email: email.to_string(),
            display_name: display_name.map(String::from),
            claims: Map::new(),
        };
        self.identities
            .lock()
            .unwrap()
            .insert(id, identity.clone());
        identity
    }

    pub fn remove(&self, id: &str) {
        self.identities.lock().unwrap().remove(id);
    }

    pub fn len(&self) -> usize {
        self.identities.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn token_for(identity: &Identity) -> String {
        format!("{}{}", TOKEN_PREFIX, identity.id)
    }

    /// Number of successful `set_claims` calls.
    pub fn claim_writes(&self) -> usize {
        self.claim_writes.load(Ordering::SeqCst)
    }

    pub fn fail_claim_writes(&self, fail: bool) {
        self.fail_claims.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    async fn verify_token(&self, token: &str) -> Result<String, IdentityError> {
        match token.strip_prefix(TOKEN_PREFIX) {
            Some(id) if !id.is_empty() => Ok(id.to_string()),
            _ => Err(IdentityError::InvalidToken("not a test token".to_string())),
        }
    }

    async fn get_identity(&self, id: &str) -> Result<Identity, IdentityError> {
        self.identities
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| IdentityError::NotFound(id.to_string()))
    }

    async fn create_identity(
        &self,
        email: &str,
        _password: &str,
        display_name: &str,
    ) -> Result<Identity, IdentityError> {
        let taken = self
            .identities
            .lock()
            .unwrap()
            .values()
            .any(|i| i.email.eq_ignore_ascii_case(email));
        if taken {
            return Err(IdentityError::AlreadyExists(email.to_string()));
        }
        let display_name = Some(display_name).filter(|n| !n.is_empty());
        Ok(self.add(email, display_name))
    }

    async fn set_claims(&self, id: &str, claims: Map<String, Value>) -> Result<(), IdentityError> {
        if self.fail_claims.load(Ordering::SeqCst) {
            return Err(IdentityError::Provider("claims unavailable".to_string()));
        }
        let mut identities = self.identities.lock().unwrap();
        let identity = identities
            .get_mut(id)
            .ok_or_else(|| IdentityError::NotFound(id.to_string()))?;
        identity.claims = claims;
        self.claim_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

enum Scripted {
    Respond(Value),
    Unavailable,
    Timeout,
    Invalid,
}

/// Scripted control plane that records every call.
///
/// Unscripted functions succeed; `listaccts` lists no accounts.
#[derive(Default)]
pub struct FakeControlPlane {
    scripted: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<Vec<String>>,
}

impl FakeControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `function` with this envelope JSON from now on.
    pub fn respond(&self, function: &str, envelope: Value) {
        self.script(function, Scripted::Respond(envelope));
    }

    pub fn fail_with_unavailable(&self, function: &str) {
        self.script(function, Scripted::Unavailable);
    }

    pub fn fail_with_timeout(&self, function: &str) {
        self.script(function, Scripted::Timeout);
    }

    pub fn fail_with_invalid(&self, function: &str) {
        self.script(function, Scripted::Invalid);
    }

    /// Calls so far, e.g. `"suspendacct example unpaid invoice"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn script(&self, function: &str, scripted: Scripted) {
        self.scripted
            .lock()
            .unwrap()
            .insert(function.to_string(), scripted);
    }

    fn answer(&self, function: &str, call: String) -> Result<Envelope, ControlPlaneError> {
        self.calls.lock().unwrap().push(call);

        let response = match self.scripted.lock().unwrap().get(function) {
            Some(Scripted::Respond(value)) => value.clone(),
            Some(Scripted::Unavailable) => {
                return Err(ControlPlaneError::Unavailable("connection refused".to_string()))
            }
            Some(Scripted::Timeout) => {
                return Err(ControlPlaneError::Timeout("operation timed out".to_string()))
            }
            Some(Scripted::Invalid) => {
                return Err(ControlPlaneError::InvalidResponse("expected value".to_string()))
            }
            None if function == "listaccts" => mock_whm::account_list(&[]),
            None if function == "create_user_session" => {
                mock_whm::user_session("https://cp.example.net:2083/cpsess0000/login")
            }
            None => mock_whm::success(),
        };
        serde_json::from_value(response)
            .map_err(|e| ControlPlaneError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn create_account(
        &self,
        domain: &str,
        username: &str,
        _password: &str,
        plan: &str,
    ) -> Result<Envelope, ControlPlaneError> {
        self.answer(
            "createacct",
            format!("createacct {} {} {}", username, domain, plan),
        )
    }

    async fn suspend_account(
        &self,
        username: &str,
        reason: &str,
    ) -> Result<Envelope, ControlPlaneError> {
        self.answer("suspendacct", format!("suspendacct {} {}", username, reason))
    }

    async fn unsuspend_account(&self, username: &str) -> Result<Envelope, ControlPlaneError> {
        self.answer("unsuspendacct", format!("unsuspendacct {}", username))
    }

    async fn remove_account(
        &self,
        username: &str,
        keep_dns: bool,
    ) -> Result<Envelope, ControlPlaneError> {
        self.answer(
            "removeacct",
            format!("removeacct {} keepdns={}", username, keep_dns),
        )
    }

    async fn list_accounts(&self) -> Result<Envelope, ControlPlaneError> {
        self.answer("listaccts", "listaccts".to_string())
    }

    async fn account_summary(&self, username: &str) -> Result<Envelope, ControlPlaneError> {
        self.answer("accountsummary", format!("accountsummary {}", username))
    }

    async fn create_user_session(
        &self,
        username: &str,
        service: &str,
    ) -> Result<Envelope, ControlPlaneError> {
        self.answer(
            "create_user_session",
            format!("create_user_session {} {}", username, service),
        )
    }
}
