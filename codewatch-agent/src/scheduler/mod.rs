//! Task scheduling.
//!
//! One [`Scheduler`] drives three recurring tasks:
//! - config poll: fetch [`DynamicConfig`](crate::config::DynamicConfig) and
//!   swap publishers when the control plane names a different implementation
//! - snapshot publish: run the active snapshot publisher
//! - usage publish: hand the latest published fingerprint to the usage
//!   publisher and run it
//!
//! Each task has its own [`TaskState`] with an independent interval and
//! backoff. All scheduler state is owned by a single worker task; the
//! [`SchedulerHandle`] returned by [`Scheduler::start`] is the only way to
//! stop it.

mod clock;
mod handle;
mod service;
mod task_state;

pub use clock::{Clock, ManualClock, SystemClock};
pub use handle::{SchedulerHandle, ShutdownReport};
pub use service::{Scheduler, SchedulerConfig, SchedulerStats};
pub use task_state::{BACK_OFF_LIMIT, MAX_BACK_OFF_EXPONENT, TaskState};
