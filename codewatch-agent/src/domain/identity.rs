use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AgentConfig;

/// Identity of one running agent, attached to every poll and upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentIdentity {
    /// Random per-process identifier.
    pub instance_id: String,
    pub app_name: String,
    pub app_version: String,
    pub environment: String,
    pub host_name: String,
    pub started_at_millis: i64,
    pub agent_version: String,
}

impl AgentIdentity {
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
            app_name: config.app_name.clone(),
            app_version: config.app_version.clone(),
            environment: config.environment.clone(),
            host_name: config.resolved_host_name(),
            started_at_millis: Utc::now().timestamp_millis(),
            agent_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
