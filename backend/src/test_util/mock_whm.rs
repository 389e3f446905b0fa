//! Control-plane response bodies as the WHM JSON API shapes them.

use serde_json::{json, Value};

pub fn success() -> Value {
    json!({
        "metadata": {"result": 1, "reason": "OK", "version": 1},
        "data": {}
    })
}

pub fn failure(reason: &str) -> Value {
    json!({
        "metadata": {"result": 0, "reason": reason, "version": 1}
    })
}

/// `listaccts` answer with `(user, domain)` rows.
pub fn account_list(accounts: &[(&str, &str)]) -> Value {
    let acct: Vec<Value> = accounts
        .iter()
        .map(|(user, domain)| {
            json!({
                "user": user,
                "domain": domain,
                "plan": "default",
                "suspended": 0
            })
        })
        .collect();
    json!({
        "metadata": {"result": 1, "reason": "OK", "command": "listaccts", "version": 1},
        "data": {"acct": acct}
    })
}

/// `accountsummary` answer for one user.
pub fn account_summary(user: &str, disk_limit: &str, disk_used: &str) -> Value {
    json!({
        "metadata": {"result": 1, "reason": "OK", "command": "accountsummary", "version": 1},
        "data": {
            "acct": [{
                "user": user,
                "domain": format!("{}.com", user),
                "disklimit": disk_limit,
                "diskused": disk_used,
                "maxpop": "unlimited",
                "emailaccounts": "1",
                "maxsql": "5",
                "dbused": "0",
                "bandwidthlimit": "unlimited",
                "bandwidthused": "0M"
            }]
        }
    })
}

/// `create_user_session` answer carrying a login URL.
pub fn user_session(url: &str) -> Value {
    json!({
        "metadata": {
            "result": 1,
            "reason": "Created session",
            "command": "create_user_session",
            "version": 1
        },
        "data": {"url": url, "service": "cpaneld", "expires": 1700000000}
    })
}
