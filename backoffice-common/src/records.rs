//! Records persisted in the document store.
//!
//! Every record is written with a `schemaVersion` field. Decoding is strict:
//! a document missing a required field, carrying an unknown enum value, or
//! written under another schema version is rejected instead of being
//! half-read.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field holding the schema version of a stored record.
pub const SCHEMA_FIELD: &str = "schemaVersion";

/// Current schema version for all records.
pub const SCHEMA_VERSION: u64 = 1;

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("{kind} record is not a JSON object")]
    NotAnObject { kind: &'static str },
    #[error("{kind} record has no schema version")]
    MissingVersion { kind: &'static str },
    #[error("{kind} record has unsupported schema version {found}")]
    UnsupportedVersion { kind: &'static str, found: u64 },
    #[error("malformed {kind} record: {source}")]
    Malformed {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// A typed record with an explicit mapping to and from a stored document.
pub trait Record: Serialize + DeserializeOwned {
    /// Human-readable record kind, used in error messages.
    const KIND: &'static str;

    /// Encode into a document body, stamping the schema version.
    fn to_document(&self) -> Result<Map<String, Value>, RecordError> {
        let value = serde_json::to_value(self).map_err(|source| RecordError::Malformed {
            kind: Self::KIND,
            source,
        })?;
        let Value::Object(mut map) = value else {
            return Err(RecordError::NotAnObject { kind: Self::KIND });
        };
        map.insert(SCHEMA_FIELD.to_string(), Value::from(SCHEMA_VERSION));
        Ok(map)
    }

    /// Decode a stored document body.
    fn from_document(mut doc: Map<String, Value>) -> Result<Self, RecordError> {
        match doc.remove(SCHEMA_FIELD).as_ref().and_then(Value::as_u64) {
            Some(SCHEMA_VERSION) => {}
            Some(found) => {
                return Err(RecordError::UnsupportedVersion {
                    kind: Self::KIND,
                    found,
                })
            }
            None => return Err(RecordError::MissingVersion { kind: Self::KIND }),
        }
        serde_json::from_value(Value::Object(doc)).map_err(|source| RecordError::Malformed {
            kind: Self::KIND,
            source,
        })
    }
}

/// Authorization role of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Client,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Client => "client",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "client" => Ok(Role::Client),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Billing status of a client. Independent of the user's role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientStatus {
    Active,
    Suspended,
    Pending,
    Canceled,
    Inactive,
    Terminated,
}

/// Stored status of a hosting service.
///
/// Termination deletes the record, so there is no stored terminated state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceStatus {
    Active,
    Suspended,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Active => "Active",
            ServiceStatus::Suspended => "Suspended",
        }
    }
}

/// Authoritative user record, one per identity, keyed by identity id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl Record for User {
    const KIND: &'static str = "user";
}

/// Client profile and billing record, keyed by identity id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub status: ClientStatus,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Record for Client {
    const KIND: &'static str = "client";
}

/// One provisioned hosting account.
///
/// Stored twice: under `clients/{clientId}/services` and in the root
/// `services` collection. Both copies carry the same `id` and `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: String,
    pub client_id: String,
    pub client_name: String,
    pub plan: String,
    pub description: String,
    pub domain: String,
    /// Control-plane account username.
    pub cpanel_user: String,
    pub status: ServiceStatus,
    pub start_date: DateTime<Utc>,
    /// Created while the control plane was not reachable or not configured.
    #[serde(default)]
    pub simulated: bool,
}

impl Record for Service {
    const KIND: &'static str = "service";
}
