use std::collections::HashMap;
use std::sync::Arc;

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::IdentityError;

/// JWKS key set response.
#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<Jwk>,
}

#[derive(Debug, Clone, Deserialize)]
struct Jwk {
    kid: String,
    kty: String,
    #[allow(dead_code)]
    alg: Option<String>,
    n: Option<String>,
    e: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OidcConfig {
    jwks_uri: String,
}

/// Claims of a verified identity token.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    pub exp: u64,
    pub iat: u64,
}

/// Verifies RS256 identity tokens against the issuer's published keys.
pub struct JwksClient {
    http_client: Client,
    jwks_uri: String,
    keys: Arc<RwLock<HashMap<String, DecodingKey>>>,
    issuer: String,
    audience: String,
}

impl JwksClient {
    pub async fn new(
        http_client: Client,
        issuer: &str,
        audience: &str,
    ) -> Result<Self, IdentityError> {
        // Fetch OIDC configuration to get JWKS URI
        let config_url = format!(
            "{}/.well-known/openid-configuration",
            issuer.trim_end_matches('/')
        );
        let config: OidcConfig = http_client
            .get(&config_url)
            .send()
            .await
            .map_err(|e| IdentityError::JwksFetchError(e.to_string()))?
            .json()
            .await
            .map_err(|e| IdentityError::JwksFetchError(e.to_string()))?;

        let client = Self {
            http_client,
            jwks_uri: config.jwks_uri,
            keys: Arc::new(RwLock::new(HashMap::new())),
            issuer: issuer.to_string(),
            audience: audience.to_string(),
        };

        client.refresh_keys().await?;

        Ok(client)
    }

    async fn refresh_keys(&self) -> Result<(), IdentityError> {
        tracing::info!("Fetching JWKS from {}", self.jwks_uri);

        let response: JwksResponse = self
            .http_client
            .get(&self.jwks_uri)
            .send()
            .await
            .map_err(|e| IdentityError::JwksFetchError(e.to_string()))?
            .json()
            .await
            .map_err(|e| IdentityError::JwksFetchError(e.to_string()))?;

        let mut keys = self.keys.write().await;
        keys.clear();

        for jwk in response.keys {
            if jwk.kty != "RSA" {
                continue;
            }
            if let (Some(n), Some(e)) = (&jwk.n, &jwk.e) {
                match DecodingKey::from_rsa_components(n, e) {
                    Ok(key) => {
                        keys.insert(jwk.kid.clone(), key);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse RSA key {}: {}", jwk.kid, e);
                    }
                }
            }
        }

        tracing::info!("Loaded {} JWKS keys", keys.len());
        Ok(())
    }

    async fn key_for(&self, kid: &str) -> Option<DecodingKey> {
        self.keys.read().await.get(kid).cloned()
    }

    /// Verify signature, issuer, audience and expiry of an identity token.
    ///
    /// An unknown `kid` triggers one key refresh, since providers rotate keys.
    pub async fn verify(&self, token: &str) -> Result<TokenClaims, IdentityError> {
        let header =
            decode_header(token).map_err(|e| IdentityError::InvalidToken(e.to_string()))?;
        let kid = header
            .kid
            .ok_or_else(|| IdentityError::InvalidToken("Missing kid in token header".to_string()))?;

        let key = match self.key_for(&kid).await {
            Some(key) => key,
            None => {
                self.refresh_keys().await?;
                self.key_for(&kid).await.ok_or_else(|| {
                    IdentityError::InvalidToken(format!("Key not found for kid: {}", kid))
                })?
            }
        };

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);

        let token_data = decode::<TokenClaims>(token, &key, &validation)
            .map_err(|e| IdentityError::InvalidToken(e.to_string()))?;

        if token_data.claims.sub.is_empty() {
            return Err(IdentityError::InvalidToken("Empty subject".to_string()));
        }

        Ok(token_data.claims)
    }
}
