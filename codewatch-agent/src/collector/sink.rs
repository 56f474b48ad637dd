use std::collections::HashMap;

use parking_lot::Mutex;

use crate::domain::UsageRecord;

/// Buffer of usage events captured by the host.
pub trait UsageSink: Send + Sync {
    /// Remove and return everything recorded since the previous drain.
    fn drain_unpublished(&self) -> Vec<UsageRecord>;

    /// Discard everything recorded so far.
    fn clear(&self);
}

/// In-process sink keeping the latest invocation time per signature.
#[derive(Debug, Default)]
pub struct InMemoryUsageSink {
    records: Mutex<HashMap<String, i64>>,
}

impl InMemoryUsageSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `signature` was exercised at `at_millis`.
    pub fn record(&self, signature: impl Into<String>, at_millis: i64) {
        let mut records = self.records.lock();
        let entry = records.entry(signature.into()).or_insert(at_millis);
        *entry = (*entry).max(at_millis);
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl UsageSink for InMemoryUsageSink {
    fn drain_unpublished(&self) -> Vec<UsageRecord> {
        let drained = std::mem::take(&mut *self.records.lock());
        let mut records: Vec<UsageRecord> = drained
            .into_iter()
            .map(|(signature, at)| UsageRecord::new(signature, at))
            .collect();
        records.sort_by(|a, b| a.signature.cmp(&b.signature));
        records
    }

    fn clear(&self) {
        self.records.lock().clear();
    }
}
