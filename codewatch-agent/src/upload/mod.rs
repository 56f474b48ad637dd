//! Transport of payload files to the control plane.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use tracing::{debug, warn};

use crate::config::AgentConfig;
use crate::domain::AgentIdentity;
use crate::utils::http_client::build_client;
use crate::{Error, Result};

pub const FINGERPRINT_HEADER: &str = "x-codewatch-fingerprint";
pub const ITEM_COUNT_HEADER: &str = "x-codewatch-item-count";
pub const INSTANCE_HEADER: &str = "x-codewatch-instance";

/// Kind of artifact being uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Snapshot,
    Usage,
}

impl UploadKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::Usage => "usage",
        }
    }

    /// Endpoint path relative to the server URL.
    pub fn path(self) -> &'static str {
        match self {
            Self::Snapshot => "agent/v1/upload-snapshot",
            Self::Usage => "agent/v1/upload-usage",
        }
    }
}

impl fmt::Display for UploadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sends one payload file. Must not retry internally.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(
        &self,
        kind: UploadKind,
        payload: &Path,
        fingerprint_digest: &str,
        item_count: usize,
    ) -> Result<()>;
}

/// Uploads payload files with an HTTP POST.
pub struct HttpUploader {
    client: Client,
    server_url: String,
    license_key: String,
    identity: Arc<AgentIdentity>,
}

impl HttpUploader {
    pub fn new(config: &AgentConfig, identity: Arc<AgentIdentity>) -> Result<Self> {
        let client = build_client(config.connect_timeout(), config.request_timeout())?;
        Ok(Self::with_client(client, config, identity))
    }

    pub fn with_client(client: Client, config: &AgentConfig, identity: Arc<AgentIdentity>) -> Self {
        Self {
            client,
            server_url: config.server_url.trim_end_matches('/').to_string(),
            license_key: config.license_key.clone(),
            identity,
        }
    }

    fn build_headers(&self, fingerprint_digest: &str, item_count: usize) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ITEM_COUNT_HEADER, HeaderValue::from(item_count as u64));

        if let Ok(value) = HeaderValue::from_str(fingerprint_digest) {
            headers.insert(FINGERPRINT_HEADER, value);
        }
        if let Ok(value) = HeaderValue::from_str(&self.identity.instance_id) {
            headers.insert(INSTANCE_HEADER, value);
        }
        if !self.license_key.is_empty()
            && let Ok(value) = format!("Bearer {}", self.license_key).parse()
        {
            headers.insert(AUTHORIZATION, value);
        }

        headers
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn upload(
        &self,
        kind: UploadKind,
        payload: &Path,
        fingerprint_digest: &str,
        item_count: usize,
    ) -> Result<()> {
        let url = format!("{}/{}", self.server_url, kind.path());
        let body = tokio::fs::read(payload).await?;
        let size = body.len();

        let response = self
            .client
            .post(&url)
            .headers(self.build_headers(fingerprint_digest, item_count))
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(kind = %kind, status = %status, "Upload rejected");
            return Err(Error::protocol(url, status.as_u16(), body));
        }

        debug!(
            kind = %kind,
            bytes = size,
            items = item_count,
            "Uploaded payload"
        );
        Ok(())
    }
}
