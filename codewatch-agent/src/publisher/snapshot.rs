//! Snapshot publishers.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use codebase_fingerprint::Fingerprint;
use tracing::{debug, info};

use super::payload::{SnapshotPayload, run_blocking, write_payload};
use super::{
    HTTP_PUBLISHER, NO_OP_PUBLISHER, PublishOutcome, Publisher, PublisherFactory, PublisherState,
};
use crate::Result;
use crate::collector::CodeBaseScanner;
use crate::domain::AgentIdentity;
use crate::upload::{UploadKind, Uploader};

/// Publishes the code base inventory when it changes.
#[async_trait]
pub trait SnapshotPublisher: Publisher {
    /// Fingerprint of the last successfully published snapshot.
    fn fingerprint(&self) -> Option<&Fingerprint>;

    /// Decide whether anything must be sent, and send it.
    async fn publish_snapshot(&mut self) -> Result<PublishOutcome>;

    /// Count the check, then publish unless disabled. Increments the
    /// sequence number on [`PublishOutcome::Published`].
    async fn check_and_publish(&mut self) -> Result<PublishOutcome> {
        self.state_mut().record_check();
        if !self.is_enabled() {
            debug!(publisher = %self.name(), "Snapshot publisher disabled");
            self.on_disabled();
            return Ok(PublishOutcome::Skipped);
        }

        let outcome = self.publish_snapshot().await?;
        if outcome.is_published() {
            self.state_mut().record_published();
        }
        Ok(outcome)
    }
}

/// Factory for snapshot publishers.
pub type SnapshotPublisherFactory = PublisherFactory<dyn SnapshotPublisher>;

impl SnapshotPublisherFactory {
    /// Factory knowing only the no-op implementation.
    pub fn no_op() -> Self {
        Self::new("snapshot", || {
            Box::new(NoOpSnapshotPublisher::new()) as Box<dyn SnapshotPublisher>
        })
    }

    /// Factory knowing the no-op and HTTP implementations.
    pub fn standard(
        scanner: Arc<dyn CodeBaseScanner>,
        uploader: Arc<dyn Uploader>,
        identity: Arc<AgentIdentity>,
        work_dir: PathBuf,
    ) -> Self {
        Self::no_op().register(HTTP_PUBLISHER, move || {
            Box::new(HttpSnapshotPublisher::new(
                Arc::clone(&scanner),
                Arc::clone(&uploader),
                Arc::clone(&identity),
                work_dir.clone(),
            )) as Box<dyn SnapshotPublisher>
        })
    }
}

/// Publishes nothing and always succeeds.
#[derive(Debug)]
pub struct NoOpSnapshotPublisher {
    state: PublisherState,
}

impl NoOpSnapshotPublisher {
    pub fn new() -> Self {
        Self {
            state: PublisherState::new(NO_OP_PUBLISHER),
        }
    }
}

impl Default for NoOpSnapshotPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl Publisher for NoOpSnapshotPublisher {
    fn state(&self) -> &PublisherState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut PublisherState {
        &mut self.state
    }
}

#[async_trait]
impl SnapshotPublisher for NoOpSnapshotPublisher {
    fn fingerprint(&self) -> Option<&Fingerprint> {
        None
    }

    async fn publish_snapshot(&mut self) -> Result<PublishOutcome> {
        Ok(PublishOutcome::Skipped)
    }
}

/// Scans the code base and uploads it whenever its fingerprint differs from
/// the last published one.
///
/// Configuration keys:
/// - `enforceRepublish=true|false`: publish on every check
pub struct HttpSnapshotPublisher {
    state: PublisherState,
    scanner: Arc<dyn CodeBaseScanner>,
    uploader: Arc<dyn Uploader>,
    identity: Arc<AgentIdentity>,
    work_dir: PathBuf,
    published: Option<Fingerprint>,
    enforce_republish: bool,
}

impl HttpSnapshotPublisher {
    pub fn new(
        scanner: Arc<dyn CodeBaseScanner>,
        uploader: Arc<dyn Uploader>,
        identity: Arc<AgentIdentity>,
        work_dir: PathBuf,
    ) -> Self {
        Self {
            state: PublisherState::new(HTTP_PUBLISHER),
            scanner,
            uploader,
            identity,
            work_dir,
            published: None,
            enforce_republish: false,
        }
    }
}

impl Publisher for HttpSnapshotPublisher {
    fn state(&self) -> &PublisherState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut PublisherState {
        &mut self.state
    }

    fn configure_key(&mut self, key: &str, value: &str) -> bool {
        match key {
            "enforceRepublish" => {
                self.enforce_republish = value.eq_ignore_ascii_case("true");
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl SnapshotPublisher for HttpSnapshotPublisher {
    fn fingerprint(&self) -> Option<&Fingerprint> {
        self.published.as_ref()
    }

    async fn publish_snapshot(&mut self) -> Result<PublishOutcome> {
        let scanner = Arc::clone(&self.scanner);
        let fingerprint = run_blocking(move || scanner.fingerprint()).await?;

        if !self.enforce_republish && self.published.as_ref() == Some(&fingerprint) {
            debug!(fingerprint = %fingerprint, "Code base unchanged, skipping snapshot");
            return Ok(PublishOutcome::Skipped);
        }

        let scanner = Arc::clone(&self.scanner);
        let work_dir = self.work_dir.clone();
        let payload_fingerprint = fingerprint.clone();
        let identity = (*self.identity).clone();
        let sequence_number = self.sequence_number() + 1;
        let (file, item_count) = run_blocking(move || {
            let entries = scanner.scan()?;
            let item_count = entries.len();
            let payload = SnapshotPayload {
                identity,
                sequence_number,
                fingerprint: payload_fingerprint,
                entries,
            };
            let file = write_payload(&work_dir, "snapshot-", &payload)?;
            Ok((file, item_count))
        })
        .await?;

        self.uploader
            .upload(UploadKind::Snapshot, file.path(), &fingerprint.digest, item_count)
            .await?;

        info!(
            fingerprint = %fingerprint,
            entries = item_count,
            sequence_number,
            "Published code base snapshot"
        );
        self.published = Some(fingerprint);
        Ok(PublishOutcome::Published)
    }
}
