use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use sha2::{Digest, Sha256};
use tracing::trace;

use crate::{Error, Fingerprint, FingerprintConfig, Result};

/// Metadata of one recorded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: PathBuf,
    pub len: u64,
    pub last_modified_millis: i64,
}

impl FileRecord {
    pub fn new(path: impl Into<PathBuf>, len: u64, last_modified_millis: i64) -> Self {
        Self {
            path: path.into(),
            len,
            last_modified_millis,
        }
    }

    /// Read size and modification time of `path`, keyed by its canonical path.
    pub fn from_path(path: &Path) -> Result<Self> {
        let canonical = fs::canonicalize(path).map_err(|e| Error::io(path, e))?;
        let metadata = fs::metadata(&canonical).map_err(|e| Error::io(&canonical, e))?;
        let last_modified_millis = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        Ok(Self {
            path: canonical,
            len: metadata.len(),
            last_modified_millis,
        })
    }
}

/// Every regular file below `root`, in no particular order.
///
/// Symbolic links to directories are not followed. A `root` that is a plain
/// file is returned as the only entry.
pub fn walk_files(root: &Path) -> Result<Vec<PathBuf>> {
    let metadata = fs::metadata(root).map_err(|e| Error::io(root, e))?;
    if metadata.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }

    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = fs::read_dir(&dir).map_err(|e| Error::io(&dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| Error::io(&dir, e))?;
            let path = entry.path();
            let file_type = entry.file_type().map_err(|e| Error::io(&path, e))?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                files.push(path);
            } else {
                trace!(path = %path.display(), "Skipping non-regular file");
            }
        }
    }
    Ok(files)
}

/// Accumulates files into a [`Fingerprint`].
///
/// Files are kept in a map keyed by path, so recording is idempotent and the
/// digest is fed in path order regardless of recording order.
#[derive(Debug, Clone)]
pub struct FingerprintBuilder {
    config: FingerprintConfig,
    files: BTreeMap<PathBuf, FileRecord>,
}

impl FingerprintBuilder {
    pub fn new(config: FingerprintConfig) -> Self {
        Self {
            config,
            files: BTreeMap::new(),
        }
    }

    /// Record a file from the filesystem.
    pub fn record(&mut self, path: &Path) -> Result<&mut Self> {
        let record = FileRecord::from_path(path)?;
        Ok(self.record_file(record))
    }

    /// Record pre-gathered file metadata. A path already recorded keeps its
    /// first record.
    pub fn record_file(&mut self, record: FileRecord) -> &mut Self {
        self.files.entry(record.path.clone()).or_insert(record);
        self
    }

    /// Recursively record every regular file below `root`.
    ///
    /// See [`walk_files`] for which entries count as files.
    pub fn record_tree(&mut self, root: &Path) -> Result<&mut Self> {
        for path in walk_files(root)? {
            self.record(&path)?;
        }
        Ok(self)
    }

    /// Number of distinct files recorded so far.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn build(&self) -> Fingerprint {
        let mut hasher = Sha256::new();
        hash_set(&mut hasher, "packages", &self.config.packages);
        hash_set(&mut hasher, "exclude", &self.config.exclude_packages);
        hasher.update(b"visibility\0");
        hasher.update(self.config.visibility.trim().as_bytes());
        hasher.update([0u8]);

        let mut total_bytes = 0u64;
        let mut max_last_modified_millis = 0i64;

        for record in self.files.values() {
            hasher.update(record.path.to_string_lossy().as_bytes());
            hasher.update([0u8]);
            hasher.update(record.len.to_le_bytes());
            hasher.update(record.last_modified_millis.to_le_bytes());

            total_bytes = total_bytes.saturating_add(record.len);
            max_last_modified_millis = max_last_modified_millis.max(record.last_modified_millis);
        }

        Fingerprint {
            file_count: self.files.len(),
            total_bytes,
            max_last_modified_millis,
            digest: hex::encode(hasher.finalize()),
        }
    }
}

fn hash_set(hasher: &mut Sha256, label: &str, values: &[String]) {
    let values: BTreeSet<&str> = values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect();

    hasher.update(label.as_bytes());
    hasher.update([0u8]);
    for value in values {
        hasher.update(value.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update([0xffu8]);
}
