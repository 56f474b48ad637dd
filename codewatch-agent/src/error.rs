//! Agent-wide error types.

use thiserror::Error;

/// Agent-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Agent-wide error type.
///
/// Every failure of a poll or publish surfaces as one of these; the scheduler
/// treats them all alike when deciding to retry.
#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response from {endpoint}: {status} - {body}")]
    Protocol {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Fingerprint error: {0}")]
    Fingerprint(#[from] codebase_fingerprint::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn protocol(endpoint: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::Protocol {
            endpoint: endpoint.into(),
            status,
            body: body.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Whether the remote side answered with something we could not use,
    /// as opposed to a transport failure.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol { .. } | Self::Serialization(_))
    }
}
