//! Domain values shared by the scheduler, publishers and collaborators.

mod identity;
mod inventory;

pub use identity::AgentIdentity;
pub use inventory::{CodeBaseEntry, UsageRecord};
