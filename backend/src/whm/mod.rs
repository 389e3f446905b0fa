//! Hosting control-plane gateway.
//!
//! Every operation answers with a result [`Envelope`]. A reported failure
//! (`result != 1`) is a successful call from the transport's point of view;
//! [`ControlPlaneError`] is reserved for calls that produced no envelope.

mod client;

pub use client::WhmClient;

use async_trait::async_trait;
use backoffice_common::Envelope;

#[derive(Debug, thiserror::Error)]
pub enum ControlPlaneError {
    /// Connection refused or DNS failure; the request never left.
    #[error("Control plane unavailable: {0}")]
    Unavailable(String),
    /// The request was sent but no answer came back in time. The operation
    /// may or may not have been applied.
    #[error("Control plane timed out: {0}")]
    Timeout(String),
    /// The exchange broke after the request was sent.
    #[error("Control plane request interrupted: {0}")]
    Interrupted(String),
    #[error("Control plane returned HTTP {0}: {1}")]
    Http(u16, String),
    #[error("Invalid control plane response: {0}")]
    InvalidResponse(String),
}

impl ControlPlaneError {
    /// The control plane could not be reached at all.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ControlPlaneError::Unavailable(_))
    }
}

#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn create_account(
        &self,
        domain: &str,
        username: &str,
        password: &str,
        plan: &str,
    ) -> Result<Envelope, ControlPlaneError>;

    async fn suspend_account(&self, username: &str, reason: &str)
        -> Result<Envelope, ControlPlaneError>;

    async fn unsuspend_account(&self, username: &str) -> Result<Envelope, ControlPlaneError>;

    async fn remove_account(&self, username: &str, keep_dns: bool)
        -> Result<Envelope, ControlPlaneError>;

    async fn list_accounts(&self) -> Result<Envelope, ControlPlaneError>;

    async fn account_summary(&self, username: &str) -> Result<Envelope, ControlPlaneError>;

    /// Single sign-on session for `service` (e.g. `cpaneld`); the envelope
    /// data carries the login `url`.
    async fn create_user_session(
        &self,
        username: &str,
        service: &str,
    ) -> Result<Envelope, ControlPlaneError>;
}
