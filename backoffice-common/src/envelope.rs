//! Result envelope of the hosting control-plane API.
//!
//! Every call answers with `{"metadata": {"result": .., "reason": ..}, "data": {..}}`.
//! `result == 1` signals success; anything else carries a human-readable
//! `reason` intended for display.

use serde::{Deserialize, Serialize};
use serde_json::Value;

const UNKNOWN_REASON: &str = "unknown reason";

/// Envelope metadata block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeMetadata {
    /// Result code. Seen as `1`/`0`, `true`/`false` or `"1"`/`"0"` in the wild.
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
}

impl EnvelopeMetadata {
    pub fn is_success(&self) -> bool {
        match &self.result {
            Value::Number(n) => n.as_i64() == Some(1) || n.as_f64() == Some(1.0),
            Value::Bool(b) => *b,
            Value::String(s) => s == "1",
            _ => false,
        }
    }
}

/// Control-plane response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub metadata: EnvelopeMetadata,
    #[serde(default)]
    pub data: Option<Value>,
}

impl Envelope {
    /// A successful envelope, mostly useful for simulated responses.
    pub fn success(data: Option<Value>) -> Self {
        Self {
            metadata: EnvelopeMetadata {
                result: Value::from(1),
                reason: Some("OK".to_string()),
                command: None,
            },
            data,
        }
    }

    pub fn is_success(&self) -> bool {
        self.metadata.is_success()
    }

    /// Reason text, or a generic placeholder when the control plane gave none.
    pub fn reason(&self) -> &str {
        self.metadata
            .reason
            .as_deref()
            .filter(|r| !r.is_empty())
            .unwrap_or(UNKNOWN_REASON)
    }

    /// Split into the data payload on success or the failure reason.
    pub fn into_result(self) -> Result<Option<Value>, String> {
        if self.is_success() {
            Ok(self.data)
        } else {
            Err(self.reason().to_string())
        }
    }

    /// Login URL carried by `create_user_session`.
    pub fn session_url(&self) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|d| d.get("url"))
            .and_then(Value::as_str)
            .filter(|u| !u.is_empty())
    }

    /// Decode the account listing carried by `listaccts`/`accountsummary`.
    pub fn accounts(&self) -> Result<AccountListing, serde_json::Error> {
        match &self.data {
            Some(data) => serde_json::from_value(data.clone()),
            None => Ok(AccountListing::default()),
        }
    }
}

/// `data` block of account listings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountListing {
    #[serde(default)]
    pub acct: Vec<AccountEntry>,
}

/// One account row. Unknown fields are kept in `extra` for summaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountEntry {
    pub user: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl AccountEntry {
    /// String-valued field from the row, if present.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.extra.get(name).and_then(Value::as_str)
    }
}

/// Parse a control-plane size metric (`"10.5M"`, `"2G"`, `"512"`,
/// `"unlimited"`) into megabytes. Unlimited is `-1.0`; unparsable is `None`.
pub fn parse_metric_mb(metric: &str) -> Option<f64> {
    let metric = metric.trim().to_ascii_lowercase();
    if metric == "unlimited" {
        return Some(-1.0);
    }
    let number = metric.trim_end_matches(|c: char| c.is_ascii_alphabetic());
    let value: f64 = number.trim().parse().ok()?;
    let unit = &metric[number.len()..];
    match unit {
        "" | "m" | "mb" => Some(value),
        "g" | "gb" => Some(value * 1024.0),
        "k" | "kb" => Some(value / 1024.0),
        "b" => Some(value / (1024.0 * 1024.0)),
        _ => None,
    }
}
