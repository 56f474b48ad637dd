//! codewatch agent library crate.
//!
//! An in-process agent that polls a control plane for configuration,
//! publishes a snapshot of the monitored code base whenever its fingerprint
//! changes, and publishes records of which parts of it were exercised.
//!
//! The host builds a [`Scheduler`] from a [`ConfigPoller`] and two publisher
//! factories, calls [`Scheduler::start`], and calls
//! [`SchedulerHandle::shutdown`] before exiting.

pub mod collector;
pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod poller;
pub mod publisher;
pub mod scheduler;
pub mod upload;
pub mod utils;

pub use config::{AgentConfig, DynamicConfig};
pub use error::{Error, Result};
pub use poller::ConfigPoller;
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerHandle, ShutdownReport};
