use serde::Serialize;

use backoffice_common::{parse_metric_mb, AccountEntry};

/// Resource usage of one hosting account. Sizes are MB; `-1` means unlimited.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    pub disk_limit: f64,
    pub disk_used: f64,
    pub email_accounts_limit: i64,
    pub email_accounts_used: i64,
    pub mysql_db_limit: i64,
    pub mysql_db_used: i64,
    pub bandwidth_limit: f64,
    pub bandwidth_used: f64,
    /// True when the numbers are placeholders rather than control-plane data.
    pub is_mock: bool,
}

impl AccountSummary {
    /// Placeholder returned when no control plane is configured.
    pub fn mock() -> Self {
        Self {
            disk_limit: 10240.0,
            disk_used: 2048.0,
            email_accounts_limit: 10,
            email_accounts_used: 2,
            mysql_db_limit: 5,
            mysql_db_used: 1,
            bandwidth_limit: 102400.0,
            bandwidth_used: 15360.0,
            is_mock: true,
        }
    }

    /// Build from an `accountsummary` row. The control plane reports
    /// everything as strings; absent or unparsable sizes read as 0.
    pub fn from_entry(entry: &AccountEntry) -> Self {
        let size = |name: &str| entry.field(name).and_then(parse_metric_mb).unwrap_or(0.0);

        Self {
            disk_limit: size("disklimit"),
            disk_used: size("diskused"),
            email_accounts_limit: limit(entry.field("maxpop")),
            email_accounts_used: count(entry.field("emailaccounts")),
            mysql_db_limit: limit(entry.field("maxsql")),
            mysql_db_used: count(entry.field("dbused")),
            bandwidth_limit: size("bandwidthlimit"),
            bandwidth_used: size("bandwidthused"),
            is_mock: false,
        }
    }
}

fn count(raw: Option<&str>) -> i64 {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}

/// `"unlimited"`, `"0"` and absent all mean no limit.
fn limit(raw: Option<&str>) -> i64 {
    match raw.and_then(|v| v.trim().parse::<i64>().ok()) {
        Some(n) if n > 0 => n,
        _ => -1,
    }
}
