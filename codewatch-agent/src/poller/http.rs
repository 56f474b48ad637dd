use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, trace};

use super::ConfigPoller;
use crate::config::{AgentConfig, DynamicConfig};
use crate::domain::AgentIdentity;
use crate::utils::http_client::build_client;
use crate::{Error, Result};

pub const POLL_CONFIG_PATH: &str = "agent/v1/poll-config";

/// Body of a poll request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollRequest<'a> {
    #[serde(flatten)]
    pub identity: &'a AgentIdentity,
    /// Polls attempted by this instance, including this one.
    pub poll_count: u64,
}

/// Polls the control plane over HTTP.
pub struct HttpConfigPoller {
    client: Client,
    endpoint: String,
    license_key: String,
    identity: Arc<AgentIdentity>,
    poll_count: AtomicU64,
}

impl HttpConfigPoller {
    pub fn new(config: &AgentConfig, identity: Arc<AgentIdentity>) -> Result<Self> {
        let client = build_client(config.connect_timeout(), config.request_timeout())?;
        Ok(Self::with_client(client, config, identity))
    }

    pub fn with_client(client: Client, config: &AgentConfig, identity: Arc<AgentIdentity>) -> Self {
        Self {
            client,
            endpoint: config.endpoint(POLL_CONFIG_PATH),
            license_key: config.license_key.clone(),
            identity,
            poll_count: AtomicU64::new(0),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ConfigPoller for HttpConfigPoller {
    async fn poll(&self) -> Result<DynamicConfig> {
        let poll_count = self.poll_count.fetch_add(1, Ordering::Relaxed) + 1;
        let request = PollRequest {
            identity: self.identity.as_ref(),
            poll_count,
        };

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if !self.license_key.is_empty() {
            builder = builder.bearer_auth(&self.license_key);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(Error::protocol(&self.endpoint, status.as_u16(), body));
        }

        trace!(body = %body, "Poll response");

        let config: DynamicConfig = serde_json::from_str(&body).map_err(|e| {
            Error::protocol(
                &self.endpoint,
                status.as_u16(),
                format!("undecodable response: {e}"),
            )
        })?;
        config
            .validate()
            .map_err(|e| Error::protocol(&self.endpoint, status.as_u16(), e.to_string()))?;

        debug!(
            poll_count,
            snapshot_publisher = %config.snapshot_publisher_name,
            usage_publisher = %config.usage_publisher_name,
            "Received dynamic config"
        );
        Ok(config)
    }
}
