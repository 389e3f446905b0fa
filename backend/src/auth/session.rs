//! Cookie-backed server-side sessions.
//!
//! The browser holds an HS256-signed token naming an opaque session id; the
//! session record itself stays in memory, keyed by the SHA-256 of that id.
//! Revocation is therefore immediate and the cookie carries no role data.

use std::collections::HashMap;
use std::sync::Arc;

use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use backoffice_common::Role;

use super::RoleBootstrap;
use crate::config::SessionConfig;
use crate::error::{AppError, Result};
use crate::identity::IdentityProvider;

const SESSION_ID_BYTES: usize = 32;

/// An authenticated session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub identity_id: String,
    pub email: String,
    pub role: Role,
    pub is_admin: bool,
    #[serde(skip)]
    pub expires_at: DateTime<Utc>,
}

impl Session {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Result of a successful login.
#[derive(Debug)]
pub struct IssuedSession {
    pub session: Session,
    pub cookie: Cookie<'static>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CookieClaims {
    sid: String,
    exp: i64,
    iat: i64,
}

fn hash_session_id(sid: &str) -> String {
    hex::encode(Sha256::digest(sid.as_bytes()))
}

fn new_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Issues, reads and destroys sessions.
pub struct SessionIssuer {
    identity: Arc<dyn IdentityProvider>,
    bootstrap: RoleBootstrap,
    sessions: RwLock<HashMap<String, Session>>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
    cookie_name: String,
    secure: bool,
}

impl SessionIssuer {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        bootstrap: RoleBootstrap,
        config: &SessionConfig,
    ) -> Self {
        Self {
            identity,
            bootstrap,
            sessions: RwLock::new(HashMap::new()),
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            ttl: Duration::hours(config.ttl_hours),
            cookie_name: config.cookie_name.clone(),
            secure: config.secure,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Verify an identity token, resolve the role and open a session.
    pub async fn issue(&self, id_token: &str) -> Result<IssuedSession> {
        let identity_id = self.identity.verify_token(id_token).await?;

        let identity = self.identity.get_identity(&identity_id).await.map_err(|e| {
            AppError::Internal(format!("fetching identity {} failed: {}", identity_id, e))
        })?;

        let role = self.bootstrap.resolve_role(&identity).await?;

        let now = Utc::now();
        let session = Session {
            identity_id: identity.id.clone(),
            email: identity.email.clone(),
            role,
            is_admin: role.is_admin(),
            expires_at: now + self.ttl,
        };

        let sid = new_session_id();
        let claims = CookieClaims {
            sid: sid.clone(),
            exp: session.expires_at.timestamp(),
            iat: now.timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("signing session failed: {}", e)))?;

        {
            let mut sessions = self.sessions.write().await;
            sessions.retain(|_, s| !s.is_expired(now));
            sessions.insert(hash_session_id(&sid), session.clone());
        }

        tracing::info!(
            "Session issued for {} ({}) as {}",
            session.email,
            session.identity_id,
            role
        );

        Ok(IssuedSession {
            session,
            cookie: self.build_cookie(token, self.ttl.num_seconds()),
        })
    }

    /// Number of unexpired sessions.
    pub async fn active_count(&self) -> usize {
        let now = Utc::now();
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| !s.is_expired(now))
            .count()
    }

    /// Drop the session named by `cookie_value`, if any, and return an
    /// already-expired cookie. Never fails.
    pub async fn destroy(&self, cookie_value: Option<&str>) -> Cookie<'static> {
        if let Some(sid) = cookie_value.and_then(|v| self.session_id(v)) {
            if let Some(session) = self.sessions.write().await.remove(&hash_session_id(&sid)) {
                tracing::info!("Session closed for {}", session.identity_id);
            }
        }
        self.build_cookie(String::new(), 0)
    }

    /// The live session named by `cookie_value`.
    pub async fn current(&self, cookie_value: Option<&str>) -> Result<Session> {
        let unauthorized = || AppError::Unauthorized("No active session".to_string());

        let sid = cookie_value
            .and_then(|v| self.session_id(v))
            .ok_or_else(unauthorized)?;

        let sessions = self.sessions.read().await;
        let session = sessions
            .get(&hash_session_id(&sid))
            .filter(|s| !s.is_expired(Utc::now()) && !s.identity_id.is_empty())
            .ok_or_else(unauthorized)?;
        Ok(session.clone())
    }

    fn session_id(&self, cookie_value: &str) -> Option<String> {
        if cookie_value.is_empty() {
            return None;
        }
        let validation = Validation::new(Algorithm::HS256);
        match decode::<CookieClaims>(cookie_value, &self.decoding_key, &validation) {
            Ok(data) => Some(data.claims.sid),
            Err(e) => {
                tracing::debug!("Rejected session cookie: {}", e);
                None
            }
        }
    }

    fn build_cookie(&self, value: String, max_age_secs: i64) -> Cookie<'static> {
        Cookie::build((self.cookie_name.clone(), value))
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .path("/")
            .max_age(time::Duration::seconds(max_age_secs))
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteDocumentStore;
    use crate::test_util::{test_config, FakeIdentityProvider};

    fn issuer() -> (Arc<FakeIdentityProvider>, SessionIssuer) {
        let store = Arc::new(SqliteDocumentStore::in_memory().unwrap());
        let identity = Arc::new(FakeIdentityProvider::new());
        let bootstrap = RoleBootstrap::new(store, identity.clone(), None);
        let issuer = SessionIssuer::new(identity.clone(), bootstrap, &test_config().session);
        (identity, issuer)
    }

    #[tokio::test]
    async fn test_issue_then_current() {
        let (identity, issuer) = issuer();
        let a = identity.add("a@x.com", None);

        let issued = issuer.issue(&FakeIdentityProvider::token_for(&a)).await.unwrap();
        assert_eq!(issued.session.role, Role::Admin);
        assert!(issued.session.is_admin);

        let cookie = &issued.cookie;
        assert_eq!(cookie.name(), issuer.cookie_name());
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.max_age(), Some(time::Duration::hours(72)));

        let current = issuer.current(Some(cookie.value())).await.unwrap();
        assert_eq!(current, issued.session);
        assert_eq!(current.email, "a@x.com");
    }

    #[tokio::test]
    async fn test_second_identity_is_client() {
        let (identity, issuer) = issuer();
        let a = identity.add("a@x.com", None);
        let b = identity.add("b@x.com", None);

        issuer.issue(&FakeIdentityProvider::token_for(&a)).await.unwrap();
        let issued = issuer.issue(&FakeIdentityProvider::token_for(&b)).await.unwrap();
        assert_eq!(issued.session.role, Role::Client);
        assert!(!issued.session.is_admin);
    }

    #[tokio::test]
    async fn test_invalid_token_is_unauthorized() {
        let (_identity, issuer) = issuer();
        assert!(matches!(
            issuer.issue("forged").await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_identity_record_is_internal() {
        let (identity, issuer) = issuer();
        let a = identity.add("a@x.com", None);
        identity.remove(&a.id);

        assert!(matches!(
            issuer.issue(&FakeIdentityProvider::token_for(&a)).await,
            Err(AppError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let (identity, issuer) = issuer();
        let a = identity.add("a@x.com", None);
        let issued = issuer.issue(&FakeIdentityProvider::token_for(&a)).await.unwrap();
        let value = issued.cookie.value().to_string();

        let cleared = issuer.destroy(Some(&value)).await;
        assert_eq!(cleared.value(), "");
        assert_eq!(cleared.max_age(), Some(time::Duration::ZERO));
        assert!(issuer.current(Some(&value)).await.is_err());

        issuer.destroy(Some(&value)).await;
        issuer.destroy(None).await;
        issuer.destroy(Some("garbage")).await;
        assert_eq!(issuer.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_active_count() {
        let (identity, issuer) = issuer();
        let a = identity.add("a@x.com", None);
        let b = identity.add("b@x.com", None);
        issuer.issue(&FakeIdentityProvider::token_for(&a)).await.unwrap();
        let issued = issuer.issue(&FakeIdentityProvider::token_for(&b)).await.unwrap();
        assert_eq!(issuer.active_count().await, 2);

        issuer.destroy(Some(issued.cookie.value())).await;
        assert_eq!(issuer.active_count().await, 1);
    }

    #[tokio::test]
    async fn test_tampered_cookie_is_rejected() {
        let (identity, issuer) = issuer();
        let a = identity.add("a@x.com", None);
        let issued = issuer.issue(&FakeIdentityProvider::token_for(&a)).await.unwrap();

        let mut forged = issued.cookie.value().to_string();
        forged.push('x');
        assert!(matches!(
            issuer.current(Some(&forged)).await,
            Err(AppError::Unauthorized(_))
        ));
        assert!(issuer.current(None).await.is_err());
        assert!(issuer.current(Some("")).await.is_err());
    }

    #[tokio::test]
    async fn test_cookie_signed_with_other_secret_is_rejected() {
        let (identity, issuer) = issuer();
        let a = identity.add("a@x.com", None);
        issuer.issue(&FakeIdentityProvider::token_for(&a)).await.unwrap();

        let mut other_config = test_config().session;
        other_config.secret = "another-secret".to_string();
        let store = Arc::new(SqliteDocumentStore::in_memory().unwrap());
        let other = SessionIssuer::new(
            identity.clone(),
            RoleBootstrap::new(store, identity.clone(), None),
            &other_config,
        );
        let foreign = other.issue(&FakeIdentityProvider::token_for(&a)).await.unwrap();
        assert!(issuer.current(Some(foreign.cookie.value())).await.is_err());
    }
}
