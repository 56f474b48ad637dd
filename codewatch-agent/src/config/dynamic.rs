//! Dynamic configuration delivered by the control plane.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Scheduling parameters and publisher selection returned by a poll.
///
/// Superseded as a whole by each successful poll. Unknown response fields
/// are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicConfig {
    pub config_poll_interval_seconds: u32,
    pub config_poll_retry_interval_seconds: u32,

    pub snapshot_publisher_name: String,
    pub snapshot_publisher_check_interval_seconds: u32,
    pub snapshot_publisher_retry_interval_seconds: u32,
    #[serde(default)]
    pub snapshot_publisher_config: String,

    pub usage_publisher_name: String,
    pub usage_publisher_interval_seconds: u32,
    pub usage_publisher_retry_interval_seconds: u32,
    #[serde(default)]
    pub usage_publisher_config: String,
}

impl DynamicConfig {
    /// Reject responses the scheduler cannot act on.
    pub fn validate(&self) -> Result<()> {
        if self.snapshot_publisher_name.trim().is_empty() {
            return Err(Error::config(
                "control plane returned an empty snapshotPublisherName",
            ));
        }
        if self.usage_publisher_name.trim().is_empty() {
            return Err(Error::config(
                "control plane returned an empty usagePublisherName",
            ));
        }
        Ok(())
    }
}
