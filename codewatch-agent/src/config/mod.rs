//! Agent configuration.
//!
//! - [`AgentConfig`]: static settings supplied by the host process
//! - [`DynamicConfig`]: intervals and publisher selection pulled from the control plane
//! - [`parse_key_values`]: the `key=value;...` grammar of publisher configuration strings

mod agent;
mod dynamic;
mod key_value;

pub use agent::{AgentConfig, ENV_PREFIX};
pub use dynamic::DynamicConfig;
pub use key_value::parse_key_values;
