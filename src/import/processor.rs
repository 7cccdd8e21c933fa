use super::csv_input;
use super::stats::{FileImportResult, ImportTally};
use super::worker::RecordWorker;
use crate::models::EntityKind;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Row workers allowed to run at once for a single file.
pub const MAX_LINE_WORKERS: usize = 20;

/// Imports one file: decode, validate the header, then fan the rows out to
/// a bounded pool of [`RecordWorker`]s.
#[derive(Clone)]
pub struct FileProcessor {
    worker: RecordWorker,
}

impl FileProcessor {
    pub fn new(worker: RecordWorker) -> Self {
        Self { worker }
    }

    /// Never fails as a whole: every problem ends up in the returned result.
    pub async fn process(&self, kind: EntityKind, payload: &str) -> FileImportResult {
        let table = match csv_input::parse(kind, payload) {
            Ok(table) => table,
            Err(err) => {
                log::debug!("rejected {} file: {}", kind, err);
                return FileImportResult::rejected(kind.collection(), err.to_string());
            }
        };

        let tally = Arc::new(ImportTally::new(kind.collection(), table.rows.len()));
        let columns = Arc::new(table.columns);
        let slots = Arc::new(Semaphore::new(MAX_LINE_WORKERS));
        let mut handles = Vec::with_capacity(table.rows.len());

        for (index, row) in table.rows.into_iter().enumerate() {
            let line = index + 1;

            // The permit moves into the task and is released when it ends,
            // however it ends.
            let permit = match slots.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(err) => {
                    tally.record_failure(format!("Line {}: {}", line, err));
                    continue;
                }
            };

            let worker = self.worker.clone();
            let tally = tally.clone();
            let columns = columns.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                match worker.process(kind, line, &row, &columns).await {
                    Ok(()) => tally.record_success(),
                    Err(err) => {
                        log::debug!("{} import row failed: {}", kind, err);
                        tally.record_failure(err.to_string());
                    }
                }
            });
            handles.push((line, handle));
        }

        for (line, handle) in handles {
            if let Err(err) = handle.await {
                log::error!("{} import worker for line {} did not finish: {}", kind, line, err);
                tally.record_failure(format!("Line {}: Worker failed: {}", line, err));
            }
        }

        let result = tally.finish();
        log::debug!(
            "{} file processed: {} lines, {} ok, {} failed",
            kind,
            result.total_lines,
            result.success_count,
            result.failure_count
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MemoryServices, memory_services};
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use std::time::Duration;

    fn processor(services: &MemoryServices) -> FileProcessor {
        FileProcessor::new(RecordWorker::new(
            services.users.clone(),
            services.teams.clone(),
        ))
    }

    fn encode(text: &str) -> String {
        STANDARD.encode(text)
    }

    #[tokio::test]
    async fn test_well_formed_users_file_imports_every_row() {
        let services = memory_services();
        let csv = "email,name\na@example.com,A\nb@example.com,B\nc@example.com,C\n";

        let result = processor(&services).process(EntityKind::User, &encode(csv)).await;

        assert_eq!(result.entity_kind, "users");
        assert_eq!(result.total_lines, 3);
        assert_eq!(result.success_count, 3);
        assert_eq!(result.failure_count, 0);
        assert!(result.failed_records.is_empty());
        assert_eq!(services.storage.user_count(), 3);
    }

    #[tokio::test]
    async fn test_wrong_header_rejects_whole_file() {
        let services = memory_services();
        let csv = "name,phone\nAda,555\n";

        let result = processor(&services).process(EntityKind::User, &encode(csv)).await;

        assert_eq!(result.total_lines, 0);
        assert_eq!(result.failure_count, 1);
        assert_eq!(result.failed_records.len(), 1);
        assert!(result.failed_records[0].contains("email"));
        assert_eq!(services.storage.user_count(), 0);
    }

    #[tokio::test]
    async fn test_short_row_fails_alone() {
        let services = memory_services();
        let csv = "email,name\na@example.com,A\nb@example.com\nc@example.com,C\n";

        let result = processor(&services).process(EntityKind::User, &encode(csv)).await;

        assert_eq!(result.total_lines, 3);
        assert_eq!(result.success_count, 2);
        assert_eq!(result.failure_count, 1);
        assert_eq!(result.failed_records, vec!["Line 2: Invalid number of fields"]);
    }

    #[tokio::test]
    async fn test_rows_as_wide_as_header_are_all_created() {
        let services = memory_services();
        let csv = "email,name\nada,Ada\n,Bob\nc@example.com,\n";

        let result = processor(&services).process(EntityKind::User, &encode(csv)).await;

        assert_eq!(result.total_lines, 3);
        assert_eq!(result.success_count, 3);
        assert_eq!(result.failure_count, 0);
        assert_eq!(services.storage.user_count(), 3);
    }

    #[tokio::test]
    async fn test_duplicate_email_fails_its_line_only() {
        let services = memory_services();
        let csv = "email,name\ndup@example.com,One\nother@example.com,Two\ndup@example.com,Three\n";

        let result = processor(&services).process(EntityKind::User, &encode(csv)).await;

        assert_eq!(result.total_lines, 3);
        assert_eq!(result.success_count, 2);
        assert_eq!(result.failure_count, 1);
        let record = &result.failed_records[0];
        assert!(record.contains(": Failed to create user: "), "{}", record);
        assert!(record.contains("dup@example.com"), "{}", record);
    }

    #[tokio::test]
    async fn test_bad_base64_is_a_single_failure() {
        let services = memory_services();

        let result = processor(&services).process(EntityKind::Team, "not//base64!").await;

        assert_eq!(result.entity_kind, "teams");
        assert_eq!(result.total_lines, 0);
        assert_eq!(result.failed_records, vec!["Invalid base64 data"]);
    }

    #[tokio::test]
    async fn test_storage_faults_are_counted_per_row() {
        let services = memory_services();
        services.storage.fail_writes(true);
        let csv = "title,description\nCore,Platform\nDocs,Writers\n";

        let result = processor(&services).process(EntityKind::Team, &encode(csv)).await;

        assert_eq!(result.total_lines, 2);
        assert_eq!(result.failure_count, 2);
        assert_eq!(result.success_count + result.failure_count, result.total_lines);
        for record in &result.failed_records {
            assert!(record.contains("Failed to create team"), "{}", record);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_row_workers_never_exceed_pool_size() {
        let services = memory_services();
        services.storage.set_delay(Duration::from_millis(20));

        let mut csv = String::from("email,name\n");
        for row in 0..50 {
            csv.push_str(&format!("user{}@example.com,User {}\n", row, row));
        }

        let result = processor(&services).process(EntityKind::User, &encode(&csv)).await;

        assert_eq!(result.total_lines, 50);
        assert_eq!(result.success_count, 50);
        let peak = services.storage.peak_in_flight();
        assert!(peak <= MAX_LINE_WORKERS, "peak {} exceeded pool", peak);
        assert!(peak > 1, "rows should run concurrently");
    }
}
