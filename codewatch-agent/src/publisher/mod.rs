//! Pluggable publishers.
//!
//! A publisher emits one kind of artifact to the control plane. Two kinds
//! exist:
//! - [`SnapshotPublisher`]: publishes the code base inventory when its
//!   fingerprint changes
//! - [`UsagePublisher`]: publishes usage records, tagged with the fingerprint
//!   of the last published snapshot
//!
//! Implementations are resolved by name through a [`PublisherFactory`] and
//! configured with a `key=value;...` string. The key `enabled` is handled
//! here for every implementation; other keys are offered to the
//! implementation via [`Publisher::configure_key`].
//!
//! Publishers never retry internally. Errors propagate to the scheduler,
//! which owns the retry policy.

mod factory;
mod payload;
pub mod snapshot;
pub mod usage;

pub use factory::{PublisherConstructor, PublisherFactory};
pub use payload::{SnapshotPayload, UsagePayload, write_payload};
pub use snapshot::{HttpSnapshotPublisher, NoOpSnapshotPublisher, SnapshotPublisher};
pub use usage::{HttpUsagePublisher, NoOpUsagePublisher, UsagePublisher};

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::parse_key_values;

/// Registry name of the no-op implementations, also used as fallback.
pub const NO_OP_PUBLISHER: &str = "no-op";

/// Registry name of the HTTP implementations.
pub const HTTP_PUBLISHER: &str = "http";

/// Result of one successful check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishOutcome {
    /// An artifact was sent.
    Published,
    /// Nothing new to send.
    Skipped,
}

impl PublishOutcome {
    pub fn is_published(self) -> bool {
        self == Self::Published
    }
}

/// State common to every publisher.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublisherState {
    name: String,
    enabled: bool,
    sequence_number: u64,
    check_count: u64,
    config: BTreeMap<String, String>,
}

impl PublisherState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            sequence_number: 0,
            check_count: 0,
            config: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn check_count(&self) -> u64 {
        self.check_count
    }

    /// The most recently applied key/value pairs.
    pub fn config(&self) -> &BTreeMap<String, String> {
        &self.config
    }

    pub(crate) fn record_check(&mut self) {
        self.check_count += 1;
    }

    pub(crate) fn record_published(&mut self) {
        self.sequence_number += 1;
    }
}

/// Behaviour shared by every publisher kind.
pub trait Publisher: Send {
    fn state(&self) -> &PublisherState;

    fn state_mut(&mut self) -> &mut PublisherState;

    /// Apply an implementation-specific configuration key.
    ///
    /// Returns `false` when the key is not recognized.
    fn configure_key(&mut self, _key: &str, _value: &str) -> bool {
        false
    }

    /// Called instead of publishing when a check finds the publisher disabled.
    fn on_disabled(&mut self) {}

    fn name(&self) -> &str {
        self.state().name()
    }

    fn is_enabled(&self) -> bool {
        self.state().is_enabled()
    }

    /// Number of successful publishes.
    fn sequence_number(&self) -> u64 {
        self.state().sequence_number()
    }

    /// Number of checks, regardless of outcome.
    fn check_count(&self) -> u64 {
        self.state().check_count()
    }

    /// Apply a `key=value;...` configuration string.
    ///
    /// Unrecognized keys and unparsable `enabled` values are logged and
    /// ignored.
    fn configure(&mut self, config: &str) {
        let pairs = parse_key_values(config);
        self.state_mut().config = pairs.iter().cloned().collect();

        for (key, value) in pairs {
            if key == "enabled" {
                match value.parse::<bool>() {
                    Ok(enabled) => self.state_mut().set_enabled(enabled),
                    Err(_) => warn!(
                        publisher = %self.name(),
                        value = %value,
                        "Ignoring invalid value for 'enabled'"
                    ),
                }
            } else if !self.configure_key(&key, &value) {
                warn!(
                    publisher = %self.name(),
                    key = %key,
                    "Unrecognized publisher configuration key"
                );
            }
        }

        debug!(
            publisher = %self.name(),
            enabled = self.is_enabled(),
            "Publisher configured"
        );
    }
}
