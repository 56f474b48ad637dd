use serde::{Deserialize, Serialize};

/// One trackable unit of the monitored code base.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeBaseEntry {
    /// Stable identifier of the unit; also the key of its usage records.
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
}

impl CodeBaseEntry {
    pub fn new(signature: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
            visibility: None,
        }
    }
}

/// Evidence that an inventory item was exercised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub signature: String,
    pub invoked_at_millis: i64,
}

impl UsageRecord {
    pub fn new(signature: impl Into<String>, invoked_at_millis: i64) -> Self {
        Self {
            signature: signature.into(),
            invoked_at_millis,
        }
    }
}
