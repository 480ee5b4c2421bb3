use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The single persisted document holding all allocation state for a deployment.
///
/// Wire names (`next`, `assigned`, `userId`, `name`, `at`) pin the JSON layout
/// written by earlier deployments, so an existing ledger file is read as-is.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ledger {
    /// Next number to hand out. Advances by exactly one per committed allocation.
    #[serde(rename = "next")]
    pub next_sequence: u64,
    /// Human-readable prefix stamped on every code. Fixed at creation.
    pub prefix: String,
    /// Every issued code, in allocation order. Append-only.
    #[serde(rename = "assigned", default)]
    pub assignments: Vec<Assignment>,
}

impl Ledger {
    /// Fresh ledger starting at `start` with no issued codes.
    pub fn new(prefix: impl Into<String>, start: u64) -> Self {
        Self {
            next_sequence: start,
            prefix: prefix.into(),
            assignments: Vec::new(),
        }
    }

    /// Render the human-readable code for a sequence number.
    pub fn code_for(&self, number: u64) -> String {
        format!("{}{}", self.prefix, number)
    }
}

/// One issued code and who received it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Assignment {
    pub code: String,
    #[serde(rename = "userId")]
    pub requester_id: String,
    #[serde(rename = "name")]
    pub label: String,
    #[serde(rename = "at")]
    pub issued_at: DateTime<Utc>,
}

/// Opaque revision identifier returned by a store read and required on write.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VersionToken(String);

impl VersionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
