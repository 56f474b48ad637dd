//! Collaborators the publishers read from.
//!
//! The agent does not know how a host enumerates its inventory or captures
//! usage events. It talks to both through the traits below; the bundled
//! implementations cover file-based inventories and in-process recording.

mod scanner;
mod sink;

pub use scanner::{CodeBaseScanner, FileTreeScanner};
pub use sink::{InMemoryUsageSink, UsageSink};
