//! Upload payloads and their staging on disk.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use codebase_fingerprint::Fingerprint;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::domain::{AgentIdentity, CodeBaseEntry, UsageRecord};
use crate::{Error, Result};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotPayload {
    pub identity: AgentIdentity,
    pub sequence_number: u64,
    pub fingerprint: Fingerprint,
    pub entries: Vec<CodeBaseEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsagePayload {
    pub identity: AgentIdentity,
    pub sequence_number: u64,
    pub fingerprint_digest: String,
    pub recording_interval_start_millis: i64,
    pub published_at_millis: i64,
    pub records: Vec<UsageRecord>,
}

/// Serialize `payload` as JSON into a fresh temporary file in `work_dir`.
///
/// The file is removed when the returned handle is dropped.
pub fn write_payload<T: Serialize>(work_dir: &Path, prefix: &str, payload: &T) -> Result<NamedTempFile> {
    fs::create_dir_all(work_dir)?;
    let mut file = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".json")
        .tempfile_in(work_dir)?;

    {
        let mut writer = BufWriter::new(file.as_file_mut());
        serde_json::to_writer(&mut writer, payload)?;
        writer.flush()?;
    }

    Ok(file)
}

/// Run blocking work (scanning, file staging) off the async executor.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Other(format!("Blocking task failed: {e}")))?
}
