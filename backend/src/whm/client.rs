use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use backoffice_common::Envelope;

use super::{ControlPlane, ControlPlaneError};
use crate::config::WhmConfig;

const API_VERSION: &str = "1";

/// Classify a reqwest failure. The URL is dropped: its query carries
/// account passwords.
fn transport_error(e: reqwest::Error) -> ControlPlaneError {
    let e = e.without_url();
    if e.is_connect() {
        ControlPlaneError::Unavailable(e.to_string())
    } else if e.is_timeout() {
        ControlPlaneError::Timeout(e.to_string())
    } else {
        ControlPlaneError::Interrupted(e.to_string())
    }
}

/// WHM JSON API v1 client.
pub struct WhmClient {
    client: Client,
    base_url: String,
    auth_header: String,
}

impl WhmClient {
    pub fn new(config: &WhmConfig) -> Result<Self, ControlPlaneError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ControlPlaneError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.api_base_url(),
            auth_header: format!("whm {}:{}", config.user, config.token),
        })
    }

    /// Call one API function with URL-encoded query parameters.
    async fn call(
        &self,
        function: &str,
        params: &[(&str, &str)],
    ) -> Result<Envelope, ControlPlaneError> {
        let url = format!("{}{}", self.base_url, function);
        tracing::debug!("WHM request: {}", function);

        let mut query = vec![("api.version", API_VERSION)];
        query.extend_from_slice(params);

        let response = self
            .client
            .get(&url)
            .header("Authorization", &self.auth_header)
            .query(&query)
            .send()
            .await
            .map_err(|e| {
                let err = transport_error(e);
                tracing::warn!("WHM {} failed: {}", function, err);
                err
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ControlPlaneError::Http(status.as_u16(), body));
        }

        let body = response.bytes().await.map_err(transport_error)?;
        let envelope: Envelope = serde_json::from_slice(&body)
            .map_err(|e| ControlPlaneError::InvalidResponse(e.to_string()))?;

        if !envelope.is_success() {
            tracing::info!("WHM {} reported failure: {}", function, envelope.reason());
        }

        Ok(envelope)
    }
}

#[async_trait]
impl ControlPlane for WhmClient {
    async fn create_account(
        &self,
        domain: &str,
        username: &str,
        password: &str,
        plan: &str,
    ) -> Result<Envelope, ControlPlaneError> {
        self.call(
            "createacct",
            &[
                ("username", username),
                ("domain", domain),
                ("password", password),
                ("plan", plan),
            ],
        )
        .await
    }

    async fn suspend_account(
        &self,
        username: &str,
        reason: &str,
    ) -> Result<Envelope, ControlPlaneError> {
        self.call("suspendacct", &[("user", username), ("reason", reason)])
            .await
    }

    async fn unsuspend_account(&self, username: &str) -> Result<Envelope, ControlPlaneError> {
        self.call("unsuspendacct", &[("user", username)]).await
    }

    async fn remove_account(
        &self,
        username: &str,
        keep_dns: bool,
    ) -> Result<Envelope, ControlPlaneError> {
        let keep_dns = if keep_dns { "1" } else { "0" };
        self.call("removeacct", &[("user", username), ("keepdns", keep_dns)])
            .await
    }

    async fn list_accounts(&self) -> Result<Envelope, ControlPlaneError> {
        self.call("listaccts", &[]).await
    }

    async fn account_summary(&self, username: &str) -> Result<Envelope, ControlPlaneError> {
        self.call("accountsummary", &[("user", username)]).await
    }

    async fn create_user_session(
        &self,
        username: &str,
        service: &str,
    ) -> Result<Envelope, ControlPlaneError> {
        self.call("create_user_session", &[("user", username), ("service", service)])
            .await
    }
}
