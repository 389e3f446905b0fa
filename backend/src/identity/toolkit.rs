use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{Identity, IdentityError, IdentityProvider, JwksClient};

/// Identity provider backed by an Identity-Toolkit-style admin REST API.
///
/// Token verification is local (JWKS); identity records and custom claims go
/// through `{base}/v1/projects/{project}/accounts*`.
pub struct IdentityToolkitClient {
    jwks: JwksClient,
    http_client: Client,
    base_url: String,
    api_token: String,
}

/// Account as returned by `accounts:lookup` and `accounts`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountInfo {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    /// JSON-encoded custom claims.
    #[serde(default)]
    custom_attributes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<AccountInfo>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateAccountRequest<'a> {
    email: &'a str,
    password: &'a str,
    display_name: &'a str,
    email_verified: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
}

impl AccountInfo {
    fn into_identity(self) -> Result<Identity, IdentityError> {
        let claims = match self.custom_attributes.as_deref() {
            None | Some("") => Map::new(),
            Some(raw) => match serde_json::from_str(raw) {
                Ok(Value::Object(map)) => map,
                _ => {
                    return Err(IdentityError::InvalidResponse(format!(
                        "custom claims of {} are not a JSON object",
                        self.local_id
                    )))
                }
            },
        };

        Ok(Identity {
            id: self.local_id,
            email: self.email.unwrap_or_default(),
            display_name: self.display_name.filter(|n| !n.is_empty()),
            claims,
        })
    }
}

impl IdentityToolkitClient {
    pub fn new(
        jwks: JwksClient,
        http_client: Client,
        api_base_url: &str,
        project_id: &str,
        api_token: &str,
    ) -> Self {
        Self {
            jwks,
            http_client,
            base_url: format!(
                "{}/v1/projects/{}",
                api_base_url.trim_end_matches('/'),
                project_id
            ),
            api_token: api_token.to_string(),
        }
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<reqwest::Response, IdentityError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        tracing::debug!("Identity admin request: {}", url);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(body)
            .send()
            .await
            .map_err(|e| IdentityError::RequestFailed(e.to_string()))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|b| b.error.message)
            .unwrap_or_else(|_| format!("{}: {}", status, text));
        Err(IdentityError::Provider(message))
    }
}

#[async_trait]
impl IdentityProvider for IdentityToolkitClient {
    async fn verify_token(&self, token: &str) -> Result<String, IdentityError> {
        Ok(self.jwks.verify(token).await?.sub)
    }

    async fn get_identity(&self, id: &str) -> Result<Identity, IdentityError> {
        let response = self
            .post("accounts:lookup", &json!({ "localId": [id] }))
            .await
            .map_err(|e| match e {
                IdentityError::Provider(msg) if msg.starts_with("USER_NOT_FOUND") => {
                    IdentityError::NotFound(id.to_string())
                }
                other => other,
            })?;

        let lookup: LookupResponse = response
            .json()
            .await
            .map_err(|e| IdentityError::InvalidResponse(e.to_string()))?;

        lookup
            .users
            .into_iter()
            .find(|u| u.local_id == id)
            .ok_or_else(|| IdentityError::NotFound(id.to_string()))?
            .into_identity()
    }

    async fn create_identity(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<Identity, IdentityError> {
        let request = CreateAccountRequest {
            email,
            password,
            display_name,
            email_verified: true,
        };

        let response = self.post("accounts", &request).await.map_err(|e| match e {
            IdentityError::Provider(msg) if msg.starts_with("EMAIL_EXISTS") => {
                IdentityError::AlreadyExists(email.to_string())
            }
            other => other,
        })?;

        let mut account: AccountInfo = response
            .json()
            .await
            .map_err(|e| IdentityError::InvalidResponse(e.to_string()))?;
        account.email.get_or_insert_with(|| email.to_string());
        if account.display_name.is_none() {
            account.display_name = Some(display_name.to_string());
        }

        tracing::info!("Created identity {} for {}", account.local_id, email);
        account.into_identity()
    }

    async fn set_claims(&self, id: &str, claims: Map<String, Value>) -> Result<(), IdentityError> {
        let encoded = Value::Object(claims).to_string();
        self.post(
            "accounts:update",
            &json!({ "localId": id, "customAttributes": encoded }),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::mount_oidc_mocks;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> IdentityToolkitClient {
        mount_oidc_mocks(server).await;
        let http = Client::new();
        let jwks = JwksClient::new(http.clone(), &server.uri(), "test-project")
            .await
            .unwrap();
        IdentityToolkitClient::new(jwks, http, &server.uri(), "test-project", "admin-token")
    }

    #[tokio::test]
    async fn test_get_identity_parses_claims() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/projects/test-project/accounts:lookup"))
            .and(header("authorization", "Bearer admin-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "users": [{
                    "localId": "u1",
                    "email": "a@x.com",
                    "displayName": "Ana Silva",
                    "customAttributes": "{\"role\":\"admin\"}"
                }]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let identity = client.get_identity("u1").await.unwrap();
        assert_eq!(identity.email, "a@x.com");
        assert_eq!(identity.display_name.as_deref(), Some("Ana Silva"));
        assert_eq!(identity.role_claim(), Some("admin"));
    }

    #[tokio::test]
    async fn test_get_identity_missing_user() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/projects/test-project/accounts:lookup"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        assert!(matches!(
            client.get_identity("ghost").await,
            Err(IdentityError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_identity_duplicate_email() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/projects/test-project/accounts"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"code": 400, "message": "EMAIL_EXISTS"}
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client
            .create_identity("a@x.com", "secret123", "Ana Silva")
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::AlreadyExists(email) if email == "a@x.com"));
    }

    #[tokio::test]
    async fn test_create_identity_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/projects/test-project/accounts"))
            .and(body_partial_json(json!({"email": "b@x.com", "displayName": "Bruno Costa"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"localId": "u2"})))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let identity = client
            .create_identity("b@x.com", "secret123", "Bruno Costa")
            .await
            .unwrap();
        assert_eq!(identity.id, "u2");
        assert_eq!(identity.email, "b@x.com");
        assert_eq!(identity.display_name.as_deref(), Some("Bruno Costa"));
    }

    #[tokio::test]
    async fn test_set_claims_encodes_attributes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/projects/test-project/accounts:update"))
            .and(body_partial_json(json!({
                "localId": "u1",
                "customAttributes": "{\"role\":\"admin\"}"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"localId": "u1"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let mut claims = Map::new();
        claims.insert("role".to_string(), json!("admin"));
        client.set_claims("u1", claims).await.unwrap();
    }

    #[tokio::test]
    async fn test_provider_error_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/projects/test-project/accounts:update"))
            .respond_with(ResponseTemplate::new(500).set_body_string("backend down"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.set_claims("u1", Map::new()).await.unwrap_err();
        assert!(matches!(err, IdentityError::Provider(msg) if msg.contains("backend down")));
    }
}
