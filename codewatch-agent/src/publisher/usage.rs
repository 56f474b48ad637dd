//! Usage publishers.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use codebase_fingerprint::Fingerprint;
use tracing::{debug, info};

use super::payload::{UsagePayload, run_blocking, write_payload};
use super::{
    HTTP_PUBLISHER, NO_OP_PUBLISHER, PublishOutcome, Publisher, PublisherFactory, PublisherState,
};
use crate::Result;
use crate::collector::UsageSink;
use crate::domain::{AgentIdentity, UsageRecord};
use crate::upload::{UploadKind, Uploader};

/// Publishes usage records collected since the previous publish.
#[async_trait]
pub trait UsagePublisher: Publisher {
    /// Fingerprint of the snapshot the records are attributed to.
    fn fingerprint(&self) -> Option<&Fingerprint>;

    /// Supplied by the scheduler before every check.
    fn set_fingerprint(&mut self, fingerprint: Option<Fingerprint>);

    /// Number of records waiting to be published.
    fn pending_records(&self) -> usize {
        0
    }

    /// Decide whether anything must be sent, and send it.
    async fn publish_usage(&mut self) -> Result<PublishOutcome>;

    /// Count the check, then publish unless disabled. Increments the
    /// sequence number on [`PublishOutcome::Published`].
    async fn check_and_publish(&mut self) -> Result<PublishOutcome> {
        self.state_mut().record_check();
        if !self.is_enabled() {
            debug!(publisher = %self.name(), "Usage publisher disabled");
            self.on_disabled();
            return Ok(PublishOutcome::Skipped);
        }

        let outcome = self.publish_usage().await?;
        if outcome.is_published() {
            self.state_mut().record_published();
        }
        Ok(outcome)
    }
}

/// Factory for usage publishers.
pub type UsagePublisherFactory = PublisherFactory<dyn UsagePublisher>;

impl UsagePublisherFactory {
    /// Factory knowing only the no-op implementation.
    pub fn no_op() -> Self {
        Self::new("usage", || {
            Box::new(NoOpUsagePublisher::new()) as Box<dyn UsagePublisher>
        })
    }

    /// Factory knowing the no-op and HTTP implementations.
    pub fn standard(
        sink: Arc<dyn UsageSink>,
        uploader: Arc<dyn Uploader>,
        identity: Arc<AgentIdentity>,
        work_dir: PathBuf,
    ) -> Self {
        Self::no_op().register(HTTP_PUBLISHER, move || {
            Box::new(HttpUsagePublisher::new(
                Arc::clone(&sink),
                Arc::clone(&uploader),
                Arc::clone(&identity),
                work_dir.clone(),
            )) as Box<dyn UsagePublisher>
        })
    }
}

/// Publishes nothing, touches nothing, always succeeds.
#[derive(Debug)]
pub struct NoOpUsagePublisher {
    state: PublisherState,
    fingerprint: Option<Fingerprint>,
}

impl NoOpUsagePublisher {
    pub fn new() -> Self {
        Self {
            state: PublisherState::new(NO_OP_PUBLISHER),
            fingerprint: None,
        }
    }
}

impl Default for NoOpUsagePublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl Publisher for NoOpUsagePublisher {
    fn state(&self) -> &PublisherState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut PublisherState {
        &mut self.state
    }
}

#[async_trait]
impl UsagePublisher for NoOpUsagePublisher {
    fn fingerprint(&self) -> Option<&Fingerprint> {
        self.fingerprint.as_ref()
    }

    fn set_fingerprint(&mut self, fingerprint: Option<Fingerprint>) {
        self.fingerprint = fingerprint;
    }

    async fn publish_usage(&mut self) -> Result<PublishOutcome> {
        Ok(PublishOutcome::Skipped)
    }
}

/// Drains the usage sink and uploads the records.
///
/// Drained records are merged into a pending buffer keyed by signature
/// (keeping the latest invocation time) and stay there until an upload
/// succeeds, so a failed upload never loses data.
///
/// Configuration keys:
/// - `maxRecordsPerUpload=<n>`: cap on records per upload, in signature
///   order; the rest stays pending
pub struct HttpUsagePublisher {
    state: PublisherState,
    sink: Arc<dyn UsageSink>,
    uploader: Arc<dyn Uploader>,
    identity: Arc<AgentIdentity>,
    work_dir: PathBuf,
    fingerprint: Option<Fingerprint>,
    pending: BTreeMap<String, i64>,
    interval_start_millis: i64,
    max_records_per_upload: Option<usize>,
}

impl HttpUsagePublisher {
    pub fn new(
        sink: Arc<dyn UsageSink>,
        uploader: Arc<dyn Uploader>,
        identity: Arc<AgentIdentity>,
        work_dir: PathBuf,
    ) -> Self {
        Self {
            state: PublisherState::new(HTTP_PUBLISHER),
            sink,
            uploader,
            identity,
            work_dir,
            fingerprint: None,
            pending: BTreeMap::new(),
            interval_start_millis: Utc::now().timestamp_millis(),
            max_records_per_upload: None,
        }
    }

    fn absorb(&mut self, records: Vec<UsageRecord>) {
        for record in records {
            let at = self.pending.entry(record.signature).or_insert(record.invoked_at_millis);
            *at = (*at).max(record.invoked_at_millis);
        }
    }

    fn next_batch(&self) -> Vec<UsageRecord> {
        let limit = self.max_records_per_upload.unwrap_or(usize::MAX);
        self.pending
            .iter()
            .take(limit)
            .map(|(signature, at)| UsageRecord::new(signature.clone(), *at))
            .collect()
    }
}

impl Publisher for HttpUsagePublisher {
    fn state(&self) -> &PublisherState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut PublisherState {
        &mut self.state
    }

    fn configure_key(&mut self, key: &str, value: &str) -> bool {
        match key {
            "maxRecordsPerUpload" => {
                self.max_records_per_upload = value.parse().ok().filter(|n: &usize| *n > 0);
                true
            }
            _ => false,
        }
    }

    fn on_disabled(&mut self) {
        self.sink.clear();
        self.pending.clear();
    }
}

#[async_trait]
impl UsagePublisher for HttpUsagePublisher {
    fn fingerprint(&self) -> Option<&Fingerprint> {
        self.fingerprint.as_ref()
    }

    fn set_fingerprint(&mut self, fingerprint: Option<Fingerprint>) {
        self.fingerprint = fingerprint;
    }

    fn pending_records(&self) -> usize {
        self.pending.len()
    }

    async fn publish_usage(&mut self) -> Result<PublishOutcome> {
        let drained = self.sink.drain_unpublished();
        self.absorb(drained);

        let Some(fingerprint) = self.fingerprint.clone() else {
            debug!(
                pending = self.pending.len(),
                "No published snapshot yet, holding usage records"
            );
            return Ok(PublishOutcome::Skipped);
        };

        if self.pending.is_empty() {
            debug!("No usage records to publish");
            return Ok(PublishOutcome::Skipped);
        }

        let batch = self.next_batch();
        let published_at_millis = Utc::now().timestamp_millis();
        let sequence_number = self.sequence_number() + 1;
        let payload = UsagePayload {
            identity: (*self.identity).clone(),
            sequence_number,
            fingerprint_digest: fingerprint.digest.clone(),
            recording_interval_start_millis: self.interval_start_millis,
            published_at_millis,
            records: batch,
        };
        let item_count = payload.records.len();

        let work_dir = self.work_dir.clone();
        let (file, payload) = run_blocking(move || {
            let file = write_payload(&work_dir, "usage-", &payload)?;
            Ok((file, payload))
        })
        .await?;

        self.uploader
            .upload(UploadKind::Usage, file.path(), &fingerprint.digest, item_count)
            .await?;

        for record in &payload.records {
            self.pending.remove(&record.signature);
        }
        self.interval_start_millis = published_at_millis;

        info!(
            records = item_count,
            remaining = self.pending.len(),
            sequence_number,
            fingerprint = %fingerprint.short_digest(),
            "Published usage data"
        );
        Ok(PublishOutcome::Published)
    }
}
