//! Timing and retry state of one recurring task.
//!
//! `TaskState` is a pure state machine: it never reads a clock and never does
//! I/O. The scheduler passes the current time into every call.
//!
//! # Backoff Algorithm
//!
//! - The first [`BACK_OFF_LIMIT`] consecutive failures retry after the nominal
//!   retry interval
//! - From the next failure on: retry interval * 2^(failures - limit + 1)
//! - The factor is capped at 2^[`MAX_BACK_OFF_EXPONENT`] (16x)
//! - A success resets the failure count and the factor

use serde::Serialize;

/// Consecutive failures tolerated at the nominal retry interval.
pub const BACK_OFF_LIMIT: u32 = 5;

/// Maximum exponent applied to the retry interval.
pub const MAX_BACK_OFF_EXPONENT: u32 = 4;

/// Per-task timing/retry state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskState {
    name: String,
    next_event_at_millis: i64,
    interval_secs: u32,
    retry_interval_secs: u32,
    retry_interval_factor: u32,
    num_failures: u32,
}

impl TaskState {
    /// Create a state that is due immediately.
    pub fn new(name: impl Into<String>, interval_secs: u32, retry_interval_secs: u32) -> Self {
        let mut state = Self {
            name: name.into(),
            next_event_at_millis: 0,
            interval_secs: 0,
            retry_interval_secs: 0,
            retry_interval_factor: 1,
            num_failures: 0,
        };
        state.initialize(interval_secs, retry_interval_secs);
        state
    }

    /// Reset everything; the task becomes due immediately.
    pub fn initialize(&mut self, interval_secs: u32, retry_interval_secs: u32) {
        self.interval_secs = interval_secs;
        self.retry_interval_secs = retry_interval_secs;
        self.next_event_at_millis = 0;
        self.num_failures = 0;
        self.retry_interval_factor = 1;
    }

    /// Replace the intervals without touching the timer.
    pub fn update_intervals(&mut self, interval_secs: u32, retry_interval_secs: u32) {
        self.interval_secs = interval_secs;
        self.retry_interval_secs = retry_interval_secs;
    }

    pub fn is_due(&self, now_millis: i64) -> bool {
        now_millis >= self.next_event_at_millis
    }

    /// Schedule the next regular execution after a success.
    pub fn schedule_next(&mut self, now_millis: i64) {
        self.next_event_at_millis = now_millis.saturating_add(secs_to_millis(self.interval_secs, 1));
        self.num_failures = 0;
        self.retry_interval_factor = 1;
    }

    /// Schedule a retry after a failure, backing off once the failure
    /// count passes [`BACK_OFF_LIMIT`].
    pub fn schedule_retry(&mut self, now_millis: i64) {
        self.retry_interval_factor = if self.num_failures < BACK_OFF_LIMIT {
            1
        } else {
            let exponent = (self.num_failures - BACK_OFF_LIMIT + 1).min(MAX_BACK_OFF_EXPONENT);
            1 << exponent
        };

        self.next_event_at_millis = now_millis.saturating_add(secs_to_millis(
            self.retry_interval_secs,
            self.retry_interval_factor,
        ));
        self.num_failures = self.num_failures.saturating_add(1);
    }

    /// Make the task due on the next check.
    pub fn schedule_now(&mut self) {
        self.next_event_at_millis = 0;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn next_event_at_millis(&self) -> i64 {
        self.next_event_at_millis
    }

    pub fn interval_secs(&self) -> u32 {
        self.interval_secs
    }

    pub fn retry_interval_secs(&self) -> u32 {
        self.retry_interval_secs
    }

    pub fn retry_interval_factor(&self) -> u32 {
        self.retry_interval_factor
    }

    pub fn num_failures(&self) -> u32 {
        self.num_failures
    }
}

fn secs_to_millis(secs: u32, factor: u32) -> i64 {
    i64::from(secs) * i64::from(factor) * 1000
}
