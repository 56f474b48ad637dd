//! Control-plane polling.

mod http;

pub use http::{HttpConfigPoller, POLL_CONFIG_PATH, PollRequest};

use async_trait::async_trait;

use crate::Result;
use crate::config::DynamicConfig;

/// Fetches the current [`DynamicConfig`] from the control plane.
///
/// Every failure, transport or protocol, is returned as an error; the
/// scheduler retries all of them the same way.
#[async_trait]
pub trait ConfigPoller: Send + Sync {
    async fn poll(&self) -> Result<DynamicConfig>;
}
