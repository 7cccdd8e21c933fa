use super::ImportError;
use super::processor::FileProcessor;
use super::stats::{FileImportResult, ImportBatchResult};
use super::worker::RecordWorker;
use crate::models::EntityKind;
use crate::repository::{TeamRepository, UserRepository};
use parking_lot::Mutex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

/// Files allowed to be processed at once within a batch.
pub const MAX_FILE_WORKERS: usize = 5;

/// One file of an import batch.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileImportSpec {
    /// `"users"` or `"teams"`.
    #[serde(alias = "entity_type")]
    pub entity_kind: String,
    /// Standard base64 encoded CSV text.
    pub data: String,
}

impl FileImportSpec {
    pub fn new(entity_kind: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            entity_kind: entity_kind.into(),
            data: data.into(),
        }
    }
}

/// Runs a batch of files through [`FileProcessor`]s, at most
/// [`MAX_FILE_WORKERS`] at a time.
#[derive(Clone)]
pub struct ImportCoordinator {
    processor: FileProcessor,
}

impl ImportCoordinator {
    pub fn new(users: UserRepository, teams: TeamRepository) -> Self {
        Self {
            processor: FileProcessor::new(RecordWorker::new(users, teams)),
        }
    }

    /// Import every file in `specs` and wait for all of them.
    ///
    /// Only an empty batch fails outright; every other problem is reported
    /// in the per-file results.
    pub async fn import_batch(
        &self,
        specs: Vec<FileImportSpec>,
    ) -> Result<ImportBatchResult, ImportError> {
        if specs.is_empty() {
            return Err(ImportError::EmptyBatch);
        }

        let started = Instant::now();
        let total_files = specs.len();
        log::info!("starting import of {} file(s)", total_files);

        let results = Arc::new(Mutex::new(Vec::with_capacity(total_files)));
        let slots = Arc::new(Semaphore::new(MAX_FILE_WORKERS));
        let mut handles = Vec::with_capacity(total_files);

        for FileImportSpec { entity_kind, data } in specs {
            // Unknown kinds are answered without taking a slot.
            let kind = match entity_kind.parse::<EntityKind>() {
                Ok(kind) => kind,
                Err(message) => {
                    log::debug!("{}", message);
                    results
                        .lock()
                        .push(FileImportResult::rejected(entity_kind, message));
                    continue;
                }
            };

            let permit = match slots.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(err) => {
                    results
                        .lock()
                        .push(FileImportResult::rejected(kind.collection(), err.to_string()));
                    continue;
                }
            };

            let processor = self.processor.clone();
            let results = results.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                let result = processor.process(kind, &data).await;
                results.lock().push(result);
            });
            handles.push((kind, handle));
        }

        for (kind, handle) in handles {
            if let Err(err) = handle.await {
                log::error!("{} file import did not finish: {}", kind, err);
                results.lock().push(FileImportResult::rejected(
                    kind.collection(),
                    format!("File processing failed: {}", err),
                ));
            }
        }

        let results = std::mem::take(&mut *results.lock());
        let elapsed = started.elapsed();
        log::info!(
            "import of {} file(s) finished in {:.2}ms",
            total_files,
            elapsed.as_secs_f64() * 1000.0
        );

        Ok(ImportBatchResult {
            total_files,
            results,
            processing_time: format!("{:?}", elapsed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_services;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use std::time::Duration;

    fn users_file(rows: &[(&str, &str)]) -> FileImportSpec {
        let mut csv = String::from("email,name\n");
        for (email, name) in rows {
            csv.push_str(&format!("{},{}\n", email, name));
        }
        FileImportSpec::new("users", STANDARD.encode(csv))
    }

    #[tokio::test]
    async fn test_empty_batch_is_rejected() {
        let services = memory_services();
        let coordinator = ImportCoordinator::new(services.users, services.teams);

        let err = coordinator.import_batch(Vec::new()).await.expect_err("empty");
        assert!(matches!(err, ImportError::EmptyBatch));
        assert_eq!(err.to_string(), "No files provided");
    }

    #[tokio::test]
    async fn test_unknown_entity_kind_fails_only_that_file() {
        let services = memory_services();
        let coordinator = ImportCoordinator::new(services.users.clone(), services.teams.clone());

        let batch = coordinator
            .import_batch(vec![
                FileImportSpec::new("projects", STANDARD.encode("title\nx\n")),
                users_file(&[("a@example.com", "A")]),
            ])
            .await
            .expect("batch");

        assert_eq!(batch.total_files, 2);
        assert_eq!(batch.results.len(), 2);

        let rejected = batch
            .results
            .iter()
            .find(|r| r.entity_kind == "projects")
            .expect("rejected file present");
        assert_eq!(rejected.total_lines, 0);
        assert_eq!(rejected.failed_records, vec!["Invalid entity type: projects"]);

        let imported = batch
            .results
            .iter()
            .find(|r| r.entity_kind == "users")
            .expect("users file present");
        assert_eq!(imported.success_count, 1);
        assert_eq!(services.storage.user_count(), 1);
    }

    #[tokio::test]
    async fn test_mixed_batch_keeps_per_file_counts_consistent() {
        let services = memory_services();
        let coordinator = ImportCoordinator::new(services.users.clone(), services.teams.clone());
        let teams_csv = "title,description\nCore,Platform\n,Nameless\nDocs\n";

        let batch = coordinator
            .import_batch(vec![
                users_file(&[("a@example.com", "A"), ("b@example.com", "B")]),
                FileImportSpec::new("teams", STANDARD.encode(teams_csv)),
                FileImportSpec::new("users", "@@@"),
            ])
            .await
            .expect("batch");

        assert_eq!(batch.total_files, 3);
        for result in &batch.results {
            if result.total_lines == 0 {
                assert_eq!(result.failed_records.len(), 1);
            } else {
                assert_eq!(
                    result.success_count + result.failure_count,
                    result.total_lines
                );
            }
        }

        let teams = batch
            .results
            .iter()
            .find(|r| r.entity_kind == "teams")
            .expect("teams file");
        assert_eq!(teams.success_count, 2);
        assert_eq!(teams.failure_count, 1);
        assert!(!batch.processing_time.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_file_workers_never_exceed_pool_size() {
        let services = memory_services();
        services.storage.set_delay(Duration::from_millis(30));
        let coordinator = ImportCoordinator::new(services.users.clone(), services.teams.clone());

        let specs: Vec<FileImportSpec> = (0..10)
            .map(|file| {
                let email = format!("file{}@example.com", file);
                users_file(&[(email.as_str(), "One")])
            })
            .collect();

        let batch = coordinator.import_batch(specs).await.expect("batch");

        assert_eq!(batch.results.len(), 10);
        assert!(batch.results.iter().all(|r| r.success_count == 1));
        let peak = services.storage.peak_in_flight();
        assert!(peak <= MAX_FILE_WORKERS, "peak {} exceeded pool", peak);
        assert!(peak > 1, "files should run concurrently");
    }
}
