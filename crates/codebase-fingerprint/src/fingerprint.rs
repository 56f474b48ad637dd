use std::fmt;

use serde::{Deserialize, Serialize};

/// Configuration values that seed every fingerprint digest.
///
/// Pattern lists are treated as sets: order and duplicates do not matter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FingerprintConfig {
    /// Inclusion patterns (e.g. package prefixes).
    #[serde(default)]
    pub packages: Vec<String>,
    /// Exclusion patterns.
    #[serde(default)]
    pub exclude_packages: Vec<String>,
    /// Visibility filter applied when enumerating items.
    #[serde(default)]
    pub visibility: String,
}

impl FingerprintConfig {
    pub fn new(
        packages: impl IntoIterator<Item = impl Into<String>>,
        exclude_packages: impl IntoIterator<Item = impl Into<String>>,
        visibility: impl Into<String>,
    ) -> Self {
        Self {
            packages: packages.into_iter().map(Into::into).collect(),
            exclude_packages: exclude_packages.into_iter().map(Into::into).collect(),
            visibility: visibility.into(),
        }
    }
}

/// Immutable identity of a set of files plus the configuration used to
/// select them.
///
/// Two fingerprints are equal iff all four fields are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fingerprint {
    pub file_count: usize,
    pub total_bytes: u64,
    pub max_last_modified_millis: i64,
    /// Lower-case hex SHA-256.
    pub digest: String,
}

impl Fingerprint {
    /// Short form of the digest, for log lines.
    pub fn short_digest(&self) -> &str {
        let end = self.digest.len().min(12);
        &self.digest[..end]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} files, {} bytes)",
            self.short_digest(),
            self.file_count,
            self.total_bytes
        )
    }
}
