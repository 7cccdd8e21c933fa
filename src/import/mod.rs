//! Bulk CSV import.
//!
//! A batch is a list of base64 encoded CSV files, each tagged with the kind
//! of entity its rows describe. The pipeline has two levels of bounded
//! fan-out:
//!
//! 1. **Coordination** (`coordinator`) runs up to [`MAX_FILE_WORKERS`] files
//!    at once and assembles the batch result.
//! 2. **File processing** (`processor`) decodes one file, validates its
//!    header and runs up to [`MAX_LINE_WORKERS`] rows at once.
//! 3. **Row workers** (`worker`) validate a single row and create the entity
//!    through the cache-aside repositories.
//!
//! At most `MAX_FILE_WORKERS * MAX_LINE_WORKERS` creates are in flight for a
//! batch. For every file that got past header validation,
//! `successCount + failureCount == totalLines`.

mod coordinator;
mod csv_input;
mod processor;
mod stats;
mod worker;

pub use coordinator::{FileImportSpec, ImportCoordinator, MAX_FILE_WORKERS};
pub use csv_input::{CsvTable, HeaderColumns, PayloadError, required_columns};
pub use processor::{FileProcessor, MAX_LINE_WORKERS};
pub use stats::{FileImportResult, ImportBatchResult, ImportTally};
pub use worker::{RecordWorker, RowError};

use thiserror::Error;

/// Request-level import failure. File and row problems never surface here.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("No files provided")]
    EmptyBatch,
}
