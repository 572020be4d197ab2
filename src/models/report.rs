//! Results handed back to the CLI for display.

use serde::Serialize;

/// One row of `--list`.
#[derive(Debug, Clone, Serialize)]
pub struct ClientListing {
    pub identity: String,
    pub address: String,
    pub public_key: String,
    pub fingerprint: Option<String>,
    pub usage_bytes: Option<i64>,
}

/// Outcome of a usage read (or read-and-reset) for one requested identifier.
#[derive(Debug, Clone, Serialize)]
pub struct UsageOutcome {
    pub identity: String,
    #[serde(flatten)]
    pub result: UsageResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UsageResult {
    Ok { bytes: i64 },
    Failed { kind: String, error: String },
}

impl UsageOutcome {
    pub fn bytes(&self) -> Option<i64> {
        match self.result {
            UsageResult::Ok { bytes } => Some(bytes),
            UsageResult::Failed { .. } => None,
        }
    }
}

/// Sort successful outcomes by usage (descending, ties by identity descending);
/// failures follow in request order.
pub fn sort_by_usage_desc(outcomes: &mut [UsageOutcome]) {
    outcomes.sort_by(|a, b| match (a.bytes(), b.bytes()) {
        (Some(x), Some(y)) => (y, &b.identity).cmp(&(x, &a.identity)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
}

/// Result of a bulk reset guarded by confirmation.
#[derive(Debug)]
pub enum ResetOutcome {
    Declined,
    Reset(Vec<UsageOutcome>),
}
