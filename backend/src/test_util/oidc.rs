//! Mock OIDC issuer backed by a fixed RSA test key.

use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TEST_KID: &str = "test-key";
const TEST_AUDIENCE: &str = "test-project";
const TEST_PRIVATE_KEY: &[u8] = include_bytes!("test_rsa.pem");
const TEST_MODULUS: &str = include_str!("test_rsa_modulus.txt");

#[derive(Serialize)]
struct TestClaims {
    sub: String,
    email: Option<String>,
    aud: String,
    iss: String,
    exp: i64,
    iat: i64,
}

/// Serve discovery and JWKS documents for the test key on `server`.
pub async fn mount_oidc_mocks(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": server.uri(),
            "jwks_uri": format!("{}/.well-known/jwks.json", server.uri())
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/.well-known/jwks.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "keys": [{
                "kid": TEST_KID,
                "kty": "RSA",
                "alg": "RS256",
                "n": TEST_MODULUS.trim(),
                "e": "AQAB"
            }]
        })))
        .mount(server)
        .await;
}

fn sign(claims: &TestClaims) -> String {
    let header = Header {
        alg: Algorithm::RS256,
        kid: Some(TEST_KID.to_string()),
        ..Default::default()
    };
    let key = EncodingKey::from_rsa_pem(TEST_PRIVATE_KEY).expect("test key is valid PEM");
    encode(&header, claims, &key).expect("Failed to encode JWT")
}

pub fn generate_identity_token(issuer: &str, sub: &str, email: Option<&str>) -> String {
    let now = Utc::now();
    sign(&TestClaims {
        sub: sub.to_string(),
        email: email.map(String::from),
        aud: TEST_AUDIENCE.to_string(),
        iss: issuer.to_string(),
        exp: (now + Duration::hours(1)).timestamp(),
        iat: now.timestamp(),
    })
}

pub fn generate_expired_token(issuer: &str, sub: &str) -> String {
    let now = Utc::now();
    sign(&TestClaims {
        sub: sub.to_string(),
        email: None,
        aud: TEST_AUDIENCE.to_string(),
        iss: issuer.to_string(),
        exp: (now - Duration::hours(1)).timestamp(),
        iat: (now - Duration::hours(2)).timestamp(),
    })
}
