//! # Codebase Fingerprint
//!
//! Content-derived identity for a changing set of files.
//!
//! A [`Fingerprint`] summarises a set of files (count, total size, newest
//! modification time) together with a SHA-256 digest over the files'
//! canonical paths, sizes and modification times. The digest is seeded with
//! the configuration that selected the files ([`FingerprintConfig`]), so a
//! change to inclusion/exclusion patterns or the visibility filter yields a
//! new fingerprint even when the files themselves are untouched.
//!
//! Fingerprints are built with a [`FingerprintBuilder`]:
//!
//! - recording the same path twice is a no-op
//! - recording order never affects the result
//! - identical inputs give identical digests across process restarts

use thiserror::Error;

mod builder;
mod fingerprint;

pub use builder::{FileRecord, FingerprintBuilder, walk_files};
pub use fingerprint::{Fingerprint, FingerprintConfig};

/// Errors raised while recording files into a fingerprint.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Result alias for fingerprint operations.
pub type Result<T> = std::result::Result<T, Error>;
