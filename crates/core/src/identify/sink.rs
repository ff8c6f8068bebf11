//! Result sinks and cooperative abort.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::record::MetadataRecord;

/// Receives metadata records as workers produce them.
pub trait ResultSink: Send + Sync {
    fn push(&self, record: MetadataRecord);
}

/// Sink that collects records in arrival order.
#[derive(Debug, Default)]
pub struct VecSink {
    records: Mutex<Vec<MetadataRecord>>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records pushed so far.
    pub fn snapshot(&self) -> Vec<MetadataRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self.records.lock() {
            Ok(records) => records.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_inner(self) -> Vec<MetadataRecord> {
        match self.records.into_inner() {
            Ok(records) => records,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl ResultSink for VecSink {
    fn push(&self, record: MetadataRecord) {
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}

/// Cooperative cancellation flag shared between a caller and a running
/// identify call. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    aborted: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }
}
