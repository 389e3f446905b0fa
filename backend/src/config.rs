//! Configuration for the back office.

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub identity: IdentityConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Hosting control plane. Absent means degraded (simulated) mode.
    #[serde(default)]
    pub whm: Option<WhmConfig>,
    pub session: SessionConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
}

/// Identity provider settings.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    /// Token issuer; its OIDC discovery document points at the JWKS.
    pub issuer: String,
    /// Expected token audience (project id).
    pub audience: String,
    /// Base URL of the identity admin REST API.
    #[serde(default = "default_identity_api")]
    pub api_base_url: String,
    /// Project the identities live in.
    pub project_id: String,
    /// Bearer token for the admin REST API.
    #[serde(default)]
    pub api_token: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite path of the document store (`sqlite:` prefix allowed).
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

/// WHM control-plane settings.
#[derive(Debug, Clone, Deserialize)]
pub struct WhmConfig {
    pub host: String,
    #[serde(default = "default_whm_port")]
    pub port: u16,
    pub user: String,
    pub token: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Prefix prepended to the lowercase plan name to form the WHM package.
    #[serde(default)]
    pub package_prefix: String,
    /// Keep DNS zones when removing an account.
    #[serde(default)]
    pub keep_dns_on_terminate: bool,
    /// Overrides `https://host:port/json-api/`; used against local mocks.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl WhmConfig {
    pub fn api_base_url(&self) -> String {
        match &self.base_url {
            Some(url) => format!("{}/", url.trim_end_matches('/')),
            None => format!("https://{}:{}/json-api/", self.host, self.port),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// HS256 secret used to sign session cookies.
    pub secret: String,
    #[serde(default = "default_session_ttl_hours")]
    pub ttl_hours: i64,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Mark the cookie `Secure`.
    #[serde(default)]
    pub secure: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BootstrapConfig {
    /// Email that is always promoted to admin on login.
    #[serde(default)]
    pub initial_admin_email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    /// Comma-separated front-end origins allowed to send credentials.
    #[serde(default = "default_cors_origins")]
    pub origins: String,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            origins: default_cors_origins(),
        }
    }
}

impl CorsConfig {
    pub fn origin_list(&self) -> Vec<String> {
        self.origins
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(String::from)
            .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReconcilerConfig {
    /// Seconds between reconciliation passes. 0 disables the background task.
    #[serde(default)]
    pub interval_secs: u64,
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_identity_api() -> String {
    "https://identitytoolkit.googleapis.com".to_string()
}
fn default_timeout_secs() -> u64 {
    15
}
fn default_database_url() -> String {
    "sqlite:./data/backoffice.db".to_string()
}
fn default_whm_port() -> u16 {
    2087
}
fn default_session_ttl_hours() -> i64 {
    72
}
fn default_cookie_name() -> String {
    "backoffice_session".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_cors_origins() -> String {
    "http://localhost:3000".to_string()
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration sources (in order of precedence):
    /// 1. Environment variables (BACKOFFICE__SECTION__KEY format)
    /// 2. config.toml file (if present)
    /// 3. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config = ConfigLoader::builder()
            .set_default("host", default_host())?
            .set_default("port", default_port() as i64)?
            .set_default("session.ttl_hours", default_session_ttl_hours())?
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("BACKOFFICE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.session.secret.trim().is_empty() {
            return Err(ConfigError::Message(
                "session.secret must be a long random string".to_string(),
            ));
        }
        if self.session.ttl_hours <= 0 {
            return Err(ConfigError::Message(
                "session.ttl_hours must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
