//! Scheduler service.
//!
//! The [`Scheduler`] owns the three [`TaskState`]s, the active publishers and
//! the last [`DynamicConfig`]. [`Scheduler::tick`] decides what is due and
//! runs it; [`Scheduler::start`] moves the scheduler onto a dedicated worker
//! that ticks at a fixed period until shut down.
//!
//! # Tick
//!
//! 1. Config poll, if due. On success the task intervals are updated and
//!    publishers are replaced when the requested implementation name changed
//!    (the replaced task becomes due immediately) or reconfigured in place
//!    when only their configuration string changed.
//! 2. Snapshot publish, if due and a config has been received.
//! 3. Usage publish, if due and a config has been received. The usage
//!    publisher is first given the fingerprint of the last published
//!    snapshot.
//!
//! Steps are independent. A failed poll does not prevent the publishers from
//! running with the previous configuration.

use std::sync::Arc;
use std::time::Duration;

use codebase_fingerprint::Fingerprint;
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::clock::{Clock, SystemClock};
use super::handle::SchedulerHandle;
use super::task_state::TaskState;
use crate::config::DynamicConfig;
use crate::poller::ConfigPoller;
use crate::publisher::snapshot::SnapshotPublisherFactory;
use crate::publisher::usage::UsagePublisherFactory;
use crate::publisher::{
    PublishOutcome, Publisher, PublisherFactory, PublisherState, SnapshotPublisher, UsagePublisher,
};
use crate::{Error, Result};

/// Default base tick period (10 seconds).
const DEFAULT_TICK_PERIOD: Duration = Duration::from_secs(10);

/// Default bound on waiting for the worker at shutdown (5 seconds).
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval and retry interval of every task until the first config arrives.
const DEFAULT_INITIAL_INTERVAL_SECS: u32 = 10;

const CONFIG_POLL_TASK: &str = "config-poll";
const SNAPSHOT_TASK: &str = "snapshot-publish";
const USAGE_TASK: &str = "usage-publish";

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Period of the worker's tick.
    pub tick_period: Duration,
    /// Bound on waiting for an in-flight tick at shutdown.
    pub shutdown_timeout: Duration,
    /// Interval of every task before the first config arrives.
    pub initial_interval_secs: u32,
    /// Retry interval of every task before the first config arrives.
    pub initial_retry_interval_secs: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_period: DEFAULT_TICK_PERIOD,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            initial_interval_secs: DEFAULT_INITIAL_INTERVAL_SECS,
            initial_retry_interval_secs: DEFAULT_INITIAL_INTERVAL_SECS,
        }
    }
}

/// Point-in-time view of the scheduler.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStats {
    pub config_received: bool,
    /// Config poll, snapshot publish and usage publish, in that order.
    pub tasks: Vec<TaskState>,
    pub snapshot_publisher: Option<PublisherState>,
    pub usage_publisher: Option<PublisherState>,
    /// Digest of the last published snapshot.
    pub published_fingerprint: Option<String>,
}

/// A publisher together with the name and configuration it was created for.
///
/// The requested name is kept because an unknown name resolves to the no-op
/// implementation, whose own name differs.
struct ActivePublisher<P: ?Sized> {
    requested_name: String,
    config: String,
    publisher: Box<P>,
}

enum SlotUpdate<P: ?Sized> {
    Unchanged,
    Reconfigured,
    /// Holds the previous publisher, if there was one.
    Replaced(Option<Box<P>>),
}

fn update_slot<P: ?Sized + Publisher>(
    slot: &mut Option<ActivePublisher<P>>,
    factory: &PublisherFactory<P>,
    name: &str,
    config: &str,
) -> SlotUpdate<P> {
    if let Some(active) = slot.as_mut()
        && active.requested_name == name
    {
        if active.config == config {
            return SlotUpdate::Unchanged;
        }
        active.publisher.configure(config);
        active.config = config.to_string();
        return SlotUpdate::Reconfigured;
    }

    let previous = slot.replace(ActivePublisher {
        requested_name: name.to_string(),
        config: config.to_string(),
        publisher: factory.create(name, config),
    });
    SlotUpdate::Replaced(previous.map(|active| active.publisher))
}

/// Orchestrates config polling and the two publishers.
pub struct Scheduler {
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
    poller: Arc<dyn ConfigPoller>,
    snapshot_factory: SnapshotPublisherFactory,
    usage_factory: UsagePublisherFactory,
    dynamic_config: Option<DynamicConfig>,
    config_poll: TaskState,
    snapshot_task: TaskState,
    usage_task: TaskState,
    snapshot: Option<ActivePublisher<dyn SnapshotPublisher>>,
    usage: Option<ActivePublisher<dyn UsagePublisher>>,
    cancel_token: CancellationToken,
}

impl Scheduler {
    /// Create a scheduler. Every task is due immediately.
    pub fn new(
        config: SchedulerConfig,
        poller: Arc<dyn ConfigPoller>,
        snapshot_factory: SnapshotPublisherFactory,
        usage_factory: UsagePublisherFactory,
    ) -> Self {
        let task = |name: &str| {
            TaskState::new(
                name,
                config.initial_interval_secs,
                config.initial_retry_interval_secs,
            )
        };

        Self {
            config_poll: task(CONFIG_POLL_TASK),
            snapshot_task: task(SNAPSHOT_TASK),
            usage_task: task(USAGE_TASK),
            config,
            clock: Arc::new(SystemClock),
            poller,
            snapshot_factory,
            usage_factory,
            dynamic_config: None,
            snapshot: None,
            usage: None,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// The last config received from the control plane.
    pub fn dynamic_config(&self) -> Option<&DynamicConfig> {
        self.dynamic_config.as_ref()
    }

    /// Run every task that is due.
    ///
    /// Once shutdown has been requested the remaining publish steps are left
    /// to the shutdown flush.
    pub async fn tick(&mut self) {
        if self.config_poll.is_due(self.clock.now_millis()) {
            self.poll_config().await;
        }

        if self.dynamic_config.is_none() {
            trace!("No config received yet, publishers idle");
            return;
        }

        if self.cancel_token.is_cancelled() {
            debug!("Shutdown requested, skipping publish steps");
            return;
        }
        if self.snapshot_task.is_due(self.clock.now_millis()) {
            self.publish_snapshot().await;
        }

        if self.cancel_token.is_cancelled() {
            debug!("Shutdown requested, skipping usage publish");
            return;
        }
        if self.usage_task.is_due(self.clock.now_millis()) {
            self.publish_usage().await;
        }
    }

    /// Poll the control plane now and apply the result.
    pub async fn poll_config(&mut self) {
        match self.poller.poll().await {
            Ok(config) => {
                self.apply_config(config).await;
                let now = self.clock.now_millis();
                self.config_poll.schedule_next(now);
                trace!(
                    next_poll_in_ms = self.config_poll.next_event_at_millis() - now,
                    "Config poll succeeded"
                );
            }
            Err(e) => {
                let now = self.clock.now_millis();
                self.config_poll.schedule_retry(now);
                log_failure(&self.config_poll, &e, now);
            }
        }
    }

    /// Run the snapshot publisher now. No-op before the first config.
    pub async fn publish_snapshot(&mut self) {
        let Some(active) = self.snapshot.as_mut() else {
            return;
        };
        let result = active.publisher.check_and_publish().await;
        let now = self.clock.now_millis();
        record_result(&mut self.snapshot_task, result, now);
    }

    /// Run the usage publisher now. No-op before the first config.
    pub async fn publish_usage(&mut self) {
        let fingerprint = self.published_fingerprint();
        let Some(active) = self.usage.as_mut() else {
            return;
        };
        active.publisher.set_fingerprint(fingerprint);
        let result = active.publisher.check_and_publish().await;
        let now = self.clock.now_millis();
        record_result(&mut self.usage_task, result, now);
    }

    /// Final flush before the scheduler is dropped.
    ///
    /// Does nothing unless a config was received. Otherwise the snapshot
    /// publisher runs if it never published (so usage data has a
    /// fingerprint to refer to) or is due, then the usage publisher runs
    /// once more. Returns whether a flush was attempted.
    pub async fn flush_on_shutdown(&mut self) -> bool {
        if self.dynamic_config.is_none() {
            debug!("No config received, nothing to flush");
            return false;
        }

        let never_published = self
            .snapshot
            .as_ref()
            .is_some_and(|active| active.publisher.sequence_number() == 0);
        if never_published {
            self.snapshot_task.schedule_now();
        }
        if self.snapshot_task.is_due(self.clock.now_millis()) {
            self.publish_snapshot().await;
        }

        self.usage_task.schedule_now();
        self.publish_usage().await;
        true
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            config_received: self.dynamic_config.is_some(),
            tasks: vec![
                self.config_poll.clone(),
                self.snapshot_task.clone(),
                self.usage_task.clone(),
            ],
            snapshot_publisher: self
                .snapshot
                .as_ref()
                .map(|active| active.publisher.state().clone()),
            usage_publisher: self
                .usage
                .as_ref()
                .map(|active| active.publisher.state().clone()),
            published_fingerprint: self.published_fingerprint().map(|fp| fp.digest),
        }
    }

    /// Move the scheduler onto its own worker task.
    ///
    /// The first tick runs immediately.
    pub fn start(self) -> SchedulerHandle {
        let cancel_token = self.cancel_token.clone();
        let shutdown_timeout = self.config.shutdown_timeout;
        let worker = tokio::spawn(self.run(cancel_token.clone()));
        SchedulerHandle::new(cancel_token, worker, shutdown_timeout)
    }

    async fn run(mut self, cancel_token: CancellationToken) -> Self {
        let mut ticker = tokio::time::interval(self.config.tick_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(tick_period = ?self.config.tick_period, "Scheduler started");

        loop {
            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => break,
                _ = ticker.tick() => self.tick().await,
            }
        }

        debug!("Scheduler worker stopped");
        self
    }

    fn published_fingerprint(&self) -> Option<Fingerprint> {
        self.snapshot
            .as_ref()
            .and_then(|active| active.publisher.fingerprint().cloned())
    }

    async fn apply_config(&mut self, config: DynamicConfig) {
        self.config_poll.update_intervals(
            config.config_poll_interval_seconds,
            config.config_poll_retry_interval_seconds,
        );
        self.snapshot_task.update_intervals(
            config.snapshot_publisher_check_interval_seconds,
            config.snapshot_publisher_retry_interval_seconds,
        );
        self.usage_task.update_intervals(
            config.usage_publisher_interval_seconds,
            config.usage_publisher_retry_interval_seconds,
        );

        // Taken before the snapshot slot changes; a new snapshot publisher
        // has not published anything yet.
        let published = self.published_fingerprint();

        match update_slot(
            &mut self.snapshot,
            &self.snapshot_factory,
            &config.snapshot_publisher_name,
            &config.snapshot_publisher_config,
        ) {
            SlotUpdate::Unchanged => {}
            SlotUpdate::Reconfigured => {
                info!(name = %config.snapshot_publisher_name, "Reconfigured snapshot publisher");
            }
            SlotUpdate::Replaced(_) => {
                info!(name = %config.snapshot_publisher_name, "Activated snapshot publisher");
                self.snapshot_task.schedule_now();
            }
        }

        match update_slot(
            &mut self.usage,
            &self.usage_factory,
            &config.usage_publisher_name,
            &config.usage_publisher_config,
        ) {
            SlotUpdate::Unchanged => {}
            SlotUpdate::Reconfigured => {
                info!(name = %config.usage_publisher_name, "Reconfigured usage publisher");
            }
            SlotUpdate::Replaced(previous) => {
                if let Some(previous) = previous {
                    retire_usage_publisher(previous, published).await;
                }
                info!(name = %config.usage_publisher_name, "Activated usage publisher");
                self.usage_task.schedule_now();
            }
        }

        self.dynamic_config = Some(config);
    }
}

/// Give a replaced usage publisher one last chance to send what it holds.
async fn retire_usage_publisher(
    mut publisher: Box<dyn UsagePublisher>,
    fingerprint: Option<Fingerprint>,
) {
    publisher.set_fingerprint(fingerprint);
    match publisher.check_and_publish().await {
        Ok(outcome) if publisher.pending_records() > 0 => warn!(
            publisher = %publisher.name(),
            outcome = ?outcome,
            pending = publisher.pending_records(),
            "Replaced usage publisher still held records, dropping them"
        ),
        Ok(outcome) => debug!(
            publisher = %publisher.name(),
            outcome = ?outcome,
            "Flushed replaced usage publisher"
        ),
        Err(e) => warn!(
            publisher = %publisher.name(),
            pending = publisher.pending_records(),
            error = %e,
            "Final flush of replaced usage publisher failed, dropping its records"
        ),
    }
}

fn record_result(task: &mut TaskState, result: Result<PublishOutcome>, now_millis: i64) {
    match result {
        Ok(outcome) => {
            debug!(task = task.name(), outcome = ?outcome, "Task completed");
            task.schedule_next(now_millis);
        }
        Err(e) => {
            task.schedule_retry(now_millis);
            log_failure(task, &e, now_millis);
        }
    }
}

fn log_failure(task: &TaskState, error: &Error, now_millis: i64) {
    let next_attempt_in_ms = task.next_event_at_millis() - now_millis;
    if error.is_protocol() {
        error!(
            task = task.name(),
            failures = task.num_failures(),
            next_attempt_in_ms,
            error = %error,
            "Task failed with an unexpected response"
        );
    } else {
        warn!(
            task = task.name(),
            failures = task.num_failures(),
            next_attempt_in_ms,
            error = %error,
            "Task failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::NO_OP_PUBLISHER;
    use crate::scheduler::ManualClock;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counters {
        snapshots: AtomicUsize,
        usages: AtomicUsize,
        fail_snapshot: AtomicBool,
        fail_usage: AtomicBool,
        /// Usage records waiting to be drained by a usage publisher.
        recorded: AtomicUsize,
        uploaded: AtomicUsize,
        usage_fingerprints: Mutex<Vec<Option<String>>>,
    }

    struct FakeSnapshot {
        state: PublisherState,
        counters: Arc<Counters>,
        fingerprint: Option<Fingerprint>,
    }

    impl Publisher for FakeSnapshot {
        fn state(&self) -> &PublisherState {
            &self.state
        }

        fn state_mut(&mut self) -> &mut PublisherState {
            &mut self.state
        }
    }

    #[async_trait]
    impl SnapshotPublisher for FakeSnapshot {
        fn fingerprint(&self) -> Option<&Fingerprint> {
            self.fingerprint.as_ref()
        }

        async fn publish_snapshot(&mut self) -> Result<PublishOutcome> {
            self.counters.snapshots.fetch_add(1, Ordering::SeqCst);
            if self.counters.fail_snapshot.load(Ordering::SeqCst) {
                return Err(Error::Other("upload refused".into()));
            }
            self.fingerprint = Some(Fingerprint {
                file_count: 1,
                total_bytes: 1,
                max_last_modified_millis: 1,
                digest: format!("{}-digest", self.state.name()),
            });
            Ok(PublishOutcome::Published)
        }
    }

    struct FakeUsage {
        state: PublisherState,
        counters: Arc<Counters>,
        fingerprint: Option<Fingerprint>,
        pending: usize,
    }

    impl Publisher for FakeUsage {
        fn state(&self) -> &PublisherState {
            &self.state
        }

        fn state_mut(&mut self) -> &mut PublisherState {
            &mut self.state
        }
    }

    #[async_trait]
    impl UsagePublisher for FakeUsage {
        fn fingerprint(&self) -> Option<&Fingerprint> {
            self.fingerprint.as_ref()
        }

        fn set_fingerprint(&mut self, fingerprint: Option<Fingerprint>) {
            self.fingerprint = fingerprint;
        }

        async fn publish_usage(&mut self) -> Result<PublishOutcome> {
            self.counters.usages.fetch_add(1, Ordering::SeqCst);
            self.counters
                .usage_fingerprints
                .lock()
                .push(self.fingerprint.as_ref().map(|fp| fp.digest.clone()));

            self.pending += self.counters.recorded.swap(0, Ordering::SeqCst);
            if self.fingerprint.is_none() {
                return Ok(PublishOutcome::Skipped);
            }
            if self.counters.fail_usage.load(Ordering::SeqCst) {
                return Err(Error::Other("upload refused".into()));
            }
            self.counters
                .uploaded
                .fetch_add(std::mem::take(&mut self.pending), Ordering::SeqCst);
            Ok(PublishOutcome::Published)
        }

        fn pending_records(&self) -> usize {
            self.pending
        }
    }

    #[derive(Default)]
    struct ScriptedPoller {
        response: Mutex<Option<DynamicConfig>>,
        polls: AtomicUsize,
    }

    impl ScriptedPoller {
        fn respond(&self, config: Option<DynamicConfig>) {
            *self.response.lock() = config;
        }

        fn update(&self, f: impl FnOnce(&mut DynamicConfig)) {
            if let Some(config) = self.response.lock().as_mut() {
                f(config);
            }
        }
    }

    #[async_trait]
    impl ConfigPoller for ScriptedPoller {
        async fn poll(&self) -> Result<DynamicConfig> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            self.response
                .lock()
                .clone()
                .ok_or_else(|| Error::Other("control plane unreachable".into()))
        }
    }

    fn dynamic_config() -> DynamicConfig {
        DynamicConfig {
            config_poll_interval_seconds: 60,
            config_poll_retry_interval_seconds: 10,
            snapshot_publisher_name: "fake".to_string(),
            snapshot_publisher_check_interval_seconds: 60,
            snapshot_publisher_retry_interval_seconds: 10,
            snapshot_publisher_config: String::new(),
            usage_publisher_name: "fake".to_string(),
            usage_publisher_interval_seconds: 60,
            usage_publisher_retry_interval_seconds: 10,
            usage_publisher_config: String::new(),
        }
    }

    struct Harness {
        scheduler: Scheduler,
        clock: ManualClock,
        poller: Arc<ScriptedPoller>,
        counters: Arc<Counters>,
    }

    fn harness(config: Option<DynamicConfig>) -> Harness {
        let counters = Arc::new(Counters::default());
        let poller = Arc::new(ScriptedPoller::default());
        poller.respond(config);

        let mut snapshot_factory = SnapshotPublisherFactory::no_op();
        let mut usage_factory = UsagePublisherFactory::no_op();
        for name in ["fake", "fake-2"] {
            let c = Arc::clone(&counters);
            snapshot_factory = snapshot_factory.register(name, move || {
                Box::new(FakeSnapshot {
                    state: PublisherState::new(name),
                    counters: Arc::clone(&c),
                    fingerprint: None,
                }) as Box<dyn SnapshotPublisher>
            });
            let c = Arc::clone(&counters);
            usage_factory = usage_factory.register(name, move || {
                Box::new(FakeUsage {
                    state: PublisherState::new(name),
                    counters: Arc::clone(&c),
                    fingerprint: None,
                    pending: 0,
                }) as Box<dyn UsagePublisher>
            });
        }

        let clock = ManualClock::new(0);
        let scheduler = Scheduler::new(
            SchedulerConfig::default(),
            poller.clone(),
            snapshot_factory,
            usage_factory,
        )
        .with_clock(Arc::new(clock.clone()));

        Harness {
            scheduler,
            clock,
            poller,
            counters,
        }
    }

    impl Harness {
        fn polls(&self) -> usize {
            self.poller.polls.load(Ordering::SeqCst)
        }

        fn snapshots(&self) -> usize {
            self.counters.snapshots.load(Ordering::SeqCst)
        }

        fn usages(&self) -> usize {
            self.counters.usages.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn test_publishers_idle_until_first_config() {
        let mut h = harness(None);
        h.scheduler.tick().await;

        assert_eq!(h.polls(), 1);
        assert_eq!(h.snapshots(), 0);
        assert_eq!(h.usages(), 0);

        let stats = h.scheduler.stats();
        assert!(!stats.config_received);
        assert!(stats.snapshot_publisher.is_none());
        assert_eq!(stats.tasks[0].num_failures(), 1);
        assert_eq!(stats.tasks[0].next_event_at_millis(), 10_000);
    }

    #[tokio::test]
    async fn test_first_config_runs_everything() {
        let mut h = harness(Some(dynamic_config()));
        h.scheduler.tick().await;

        assert_eq!((h.polls(), h.snapshots(), h.usages()), (1, 1, 1));
        assert_eq!(
            *h.counters.usage_fingerprints.lock(),
            vec![Some("fake-digest".to_string())]
        );

        let stats = h.scheduler.stats();
        assert!(stats.config_received);
        assert_eq!(stats.published_fingerprint.as_deref(), Some("fake-digest"));
        for task in &stats.tasks {
            assert_eq!(task.next_event_at_millis(), 60_000);
        }

        // Nothing is due until the intervals elapse.
        h.clock.set(59_999);
        h.scheduler.tick().await;
        assert_eq!((h.polls(), h.snapshots(), h.usages()), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_poll_failure_does_not_block_publishers() {
        let mut h = harness(Some(dynamic_config()));
        h.scheduler.tick().await;

        h.poller.respond(None);
        h.clock.set(60_000);
        h.scheduler.tick().await;

        assert_eq!((h.polls(), h.snapshots(), h.usages()), (2, 2, 2));
        let stats = h.scheduler.stats();
        assert_eq!(stats.tasks[0].num_failures(), 1);
        assert_eq!(stats.tasks[0].next_event_at_millis(), 70_000);
        assert_eq!(stats.tasks[1].num_failures(), 0);
    }

    #[tokio::test]
    async fn test_publisher_failure_backs_off() {
        let mut h = harness(Some(dynamic_config()));
        h.counters.fail_snapshot.store(true, Ordering::SeqCst);
        h.scheduler.tick().await;

        let stats = h.scheduler.stats();
        let snapshot = &stats.tasks[1];
        assert_eq!(snapshot.num_failures(), 1);
        assert_eq!(snapshot.next_event_at_millis(), 10_000);

        // Five retries at the nominal interval, then doubling.
        let mut now = 10_000;
        for _ in 0..5 {
            h.clock.set(now);
            h.scheduler.tick().await;
            now = h.scheduler.stats().tasks[1].next_event_at_millis();
        }
        let stats = h.scheduler.stats();
        let snapshot = &stats.tasks[1];
        assert_eq!(snapshot.num_failures(), 6);
        assert_eq!(snapshot.retry_interval_factor(), 2);
        assert_eq!(snapshot.next_event_at_millis(), 50_000 + 20_000);

        h.counters.fail_snapshot.store(false, Ordering::SeqCst);
        h.clock.set(70_000);
        h.scheduler.tick().await;
        let stats = h.scheduler.stats();
        let snapshot = &stats.tasks[1];
        assert_eq!(snapshot.num_failures(), 0);
        assert_eq!(snapshot.retry_interval_factor(), 1);
    }

    #[tokio::test]
    async fn test_usage_waits_for_published_snapshot() {
        let mut h = harness(Some(dynamic_config()));
        h.counters.fail_snapshot.store(true, Ordering::SeqCst);
        h.scheduler.tick().await;

        assert_eq!(*h.counters.usage_fingerprints.lock(), vec![None]);
    }

    #[tokio::test]
    async fn test_name_change_replaces_publisher_and_runs_it() {
        let mut config = dynamic_config();
        config.config_poll_interval_seconds = 1;
        let mut h = harness(Some(config));
        h.scheduler.tick().await;

        h.poller
            .update(|c| c.snapshot_publisher_name = "fake-2".to_string());
        h.clock.set(1_000);
        h.scheduler.tick().await;

        assert_eq!((h.polls(), h.snapshots(), h.usages()), (2, 2, 1));
        let stats = h.scheduler.stats();
        let snapshot = stats.snapshot_publisher.unwrap();
        assert_eq!(snapshot.name(), "fake-2");
        assert_eq!(snapshot.sequence_number(), 1);
        assert_eq!(stats.published_fingerprint.as_deref(), Some("fake-2-digest"));
    }

    #[tokio::test]
    async fn test_unknown_name_falls_back_once() {
        let mut config = dynamic_config();
        config.config_poll_interval_seconds = 1;
        config.snapshot_publisher_name = "mystery".to_string();
        let mut h = harness(Some(config));

        h.scheduler.tick().await;
        h.clock.set(1_000);
        h.scheduler.tick().await;

        let snapshot = h.scheduler.stats().snapshot_publisher.unwrap();
        assert_eq!(snapshot.name(), NO_OP_PUBLISHER);
        // Not recreated by the second poll, so not forced to run again.
        assert_eq!(snapshot.check_count(), 1);
        assert_eq!(h.scheduler.stats().tasks[1].num_failures(), 0);
    }

    #[tokio::test]
    async fn test_config_change_reconfigures_in_place() {
        let mut config = dynamic_config();
        config.config_poll_interval_seconds = 1;
        let mut h = harness(Some(config));
        h.scheduler.tick().await;

        h.poller
            .update(|c| c.snapshot_publisher_config = "enabled=false".to_string());
        h.clock.set(1_000);
        h.scheduler.tick().await;

        let snapshot = h.scheduler.stats().snapshot_publisher.unwrap();
        assert!(!snapshot.is_enabled());
        assert_eq!(snapshot.sequence_number(), 1);
        assert_eq!(
            snapshot.config().get("enabled").map(String::as_str),
            Some("false")
        );
        assert_eq!(h.snapshots(), 1);
    }

    #[tokio::test]
    async fn test_replaced_usage_publisher_is_flushed() {
        let mut config = dynamic_config();
        config.config_poll_interval_seconds = 1;
        let mut h = harness(Some(config));
        h.scheduler.tick().await;

        h.poller
            .update(|c| c.usage_publisher_name = "fake-2".to_string());
        h.clock.set(1_000);
        h.scheduler.tick().await;

        // One final check of the old publisher, one immediate run of the new.
        assert_eq!(h.usages(), 3);
        let usage = h.scheduler.stats().usage_publisher.unwrap();
        assert_eq!(usage.name(), "fake-2");
        assert_eq!(usage.check_count(), 1);
    }

    #[tokio::test]
    async fn test_swapping_both_publishers_keeps_pending_usage() {
        let mut config = dynamic_config();
        config.config_poll_interval_seconds = 1;
        let mut h = harness(Some(config));
        h.counters.recorded.store(1, Ordering::SeqCst);
        h.counters.fail_usage.store(true, Ordering::SeqCst);
        h.scheduler.tick().await;
        assert_eq!(h.counters.uploaded.load(Ordering::SeqCst), 0);

        h.counters.fail_usage.store(false, Ordering::SeqCst);
        h.poller.update(|c| {
            c.snapshot_publisher_name = "fake-2".to_string();
            c.usage_publisher_name = "fake-2".to_string();
        });
        h.clock.set(1_000);
        h.scheduler.tick().await;

        assert_eq!(h.counters.uploaded.load(Ordering::SeqCst), 1);
        // The retired publisher flushed against the previously published
        // snapshot, not the one that replaced it.
        assert_eq!(
            h.counters.usage_fingerprints.lock()[1].as_deref(),
            Some("fake-digest")
        );
        let stats = h.scheduler.stats();
        assert_eq!(stats.usage_publisher.unwrap().name(), "fake-2");
        assert_eq!(stats.published_fingerprint.as_deref(), Some("fake-2-digest"));
    }

    #[tokio::test]
    async fn test_cancelled_tick_leaves_publishing_to_flush() {
        let mut h = harness(Some(dynamic_config()));
        h.scheduler.cancel_token.cancel();
        h.scheduler.tick().await;
        assert_eq!((h.polls(), h.snapshots(), h.usages()), (1, 0, 0));

        assert!(h.scheduler.flush_on_shutdown().await);
        assert_eq!((h.snapshots(), h.usages()), (1, 1));
    }

    #[tokio::test]
    async fn test_flush_without_config_does_nothing() {
        let mut h = harness(None);
        h.scheduler.tick().await;

        assert!(!h.scheduler.flush_on_shutdown().await);
        assert_eq!((h.snapshots(), h.usages()), (0, 0));
    }

    #[tokio::test]
    async fn test_flush_forces_first_snapshot() {
        let mut h = harness(Some(dynamic_config()));
        h.scheduler.poll_config().await;
        assert_eq!((h.snapshots(), h.usages()), (0, 0));

        assert!(h.scheduler.flush_on_shutdown().await);
        assert_eq!((h.snapshots(), h.usages()), (1, 1));
        assert_eq!(
            *h.counters.usage_fingerprints.lock(),
            vec![Some("fake-digest".to_string())]
        );
    }

    #[tokio::test]
    async fn test_flush_skips_snapshot_already_published() {
        let mut h = harness(Some(dynamic_config()));
        h.scheduler.tick().await;
        h.clock.set(5_000);

        assert!(h.scheduler.flush_on_shutdown().await);
        assert_eq!((h.snapshots(), h.usages()), (1, 2));
    }
}
