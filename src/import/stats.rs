//! Import outcome tracking.
//!
//! [`ImportTally`] is the per-file aggregator shared by that file's row
//! workers. [`FileImportResult`] and [`ImportBatchResult`] are what callers
//! get back.

use parking_lot::Mutex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Outcome of importing a single file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileImportResult {
    /// Entity kind as the caller spelled it.
    pub entity_kind: String,
    /// Data rows found after the header; 0 when the file was rejected
    /// before any row was read.
    pub total_lines: usize,
    pub success_count: usize,
    pub failure_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_records: Vec<String>,
}

impl FileImportResult {
    /// A file that failed before row processing began.
    pub fn rejected(entity_kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            entity_kind: entity_kind.into(),
            total_lines: 0,
            success_count: 0,
            failure_count: 1,
            failed_records: vec![message.into()],
        }
    }
}

/// Outcome of a whole batch. `results` is in completion order.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportBatchResult {
    pub total_files: usize,
    pub results: Vec<FileImportResult>,
    /// Wall-clock duration of the batch, e.g. `"12.5ms"`.
    pub processing_time: String,
}

#[derive(Debug, Default)]
struct Counts {
    success: usize,
    failure: usize,
    failed_records: Vec<String>,
}

/// Shared success/failure aggregator for one file.
///
/// The lock is only ever held for a single increment.
#[derive(Debug)]
pub struct ImportTally {
    entity_kind: String,
    total_lines: usize,
    counts: Mutex<Counts>,
}

impl ImportTally {
    pub fn new(entity_kind: impl Into<String>, total_lines: usize) -> Self {
        Self {
            entity_kind: entity_kind.into(),
            total_lines,
            counts: Mutex::new(Counts::default()),
        }
    }

    pub fn record_success(&self) {
        self.counts.lock().success += 1;
    }

    pub fn record_failure(&self, message: String) {
        let mut counts = self.counts.lock();
        counts.failure += 1;
        counts.failed_records.push(message);
    }

    /// Snapshot the current totals.
    pub fn finish(&self) -> FileImportResult {
        let counts = self.counts.lock();
        FileImportResult {
            entity_kind: self.entity_kind.clone(),
            total_lines: self.total_lines,
            success_count: counts.success,
            failure_count: counts.failure,
            failed_records: counts.failed_records.clone(),
        }
    }
}
