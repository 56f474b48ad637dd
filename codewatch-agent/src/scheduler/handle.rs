//! Control of a running scheduler worker.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::service::Scheduler;

/// Report from a shutdown operation.
#[derive(Debug, Clone, Default)]
pub struct ShutdownReport {
    /// Time spent in `shutdown`, flush included.
    pub duration: Duration,
    /// Whether the worker stopped within the shutdown timeout.
    pub worker_stopped: bool,
    /// Whether a final flush was attempted.
    pub flushed: bool,
    /// Whether the worker had already been shut down by an earlier call.
    pub already_shut_down: bool,
}

/// Handle to the scheduler worker started by [`Scheduler::start`].
///
/// # Shutdown
///
/// 1. Cancel the worker; no new tick starts
/// 2. Wait for the in-flight tick, bounded by the shutdown timeout
/// 3. Run the final flush on the scheduler handed back by the worker
///
/// If the timeout expires the worker is aborted and the flush is skipped.
/// Concurrent and repeated calls are safe; only the first does the work and
/// the others wait for it to complete.
pub struct SchedulerHandle {
    cancel_token: CancellationToken,
    worker: Mutex<Option<JoinHandle<Scheduler>>>,
    shutdown_timeout: Duration,
}

impl SchedulerHandle {
    pub(super) fn new(
        cancel_token: CancellationToken,
        worker: JoinHandle<Scheduler>,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            cancel_token,
            worker: Mutex::new(Some(worker)),
            shutdown_timeout,
        }
    }

    /// Check if shutdown has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Stop the worker and flush the publishers.
    pub async fn shutdown(&self) -> ShutdownReport {
        let started = Instant::now();
        self.cancel_token.cancel();

        let mut worker = self.worker.lock().await;
        let Some(mut join) = worker.take() else {
            debug!("Scheduler already shut down");
            return ShutdownReport {
                duration: started.elapsed(),
                already_shut_down: true,
                ..Default::default()
            };
        };

        info!("Shutting down scheduler");
        let mut report = ShutdownReport::default();

        match tokio::time::timeout(self.shutdown_timeout, &mut join).await {
            Ok(Ok(mut scheduler)) => {
                report.worker_stopped = true;
                report.flushed = scheduler.flush_on_shutdown().await;
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Scheduler worker failed, skipping final flush");
            }
            Err(_) => {
                warn!(
                    timeout = ?self.shutdown_timeout,
                    "Scheduler worker did not stop in time, aborting without final flush"
                );
                join.abort();
            }
        }

        report.duration = started.elapsed();
        info!(
            duration_ms = report.duration.as_millis() as u64,
            flushed = report.flushed,
            "Scheduler shutdown complete"
        );
        report
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
