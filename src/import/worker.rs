use super::csv_input::HeaderColumns;
use crate::models::{EntityKind, NewTeam, NewUser};
use crate::repository::{TeamRepository, UserRepository};
use crate::storage::StoreError;
use csv::StringRecord;
use thiserror::Error;

/// Row-level failure, rendered into the file's `failedRecords`.
#[derive(Debug, Error)]
pub enum RowError {
    #[error("Line {line}: Invalid number of fields")]
    FieldCount { line: usize },
    #[error("Line {line}: Failed to create {kind}: {source}")]
    Create {
        line: usize,
        kind: EntityKind,
        source: StoreError,
    },
}

/// Turns one CSV row into one entity. Each row is attempted exactly once.
#[derive(Clone)]
pub struct RecordWorker {
    users: UserRepository,
    teams: TeamRepository,
}

impl RecordWorker {
    pub fn new(users: UserRepository, teams: TeamRepository) -> Self {
        Self { users, teams }
    }

    /// Check `row` is as wide as the header and create the entity it
    /// describes. Field contents are passed to storage as written; `line` is
    /// the 1-based data row number.
    pub async fn process(
        &self,
        kind: EntityKind,
        line: usize,
        row: &StringRecord,
        columns: &HeaderColumns,
    ) -> Result<(), RowError> {
        if row.len() < columns.width() {
            return Err(RowError::FieldCount { line });
        }

        match kind {
            EntityKind::User => {
                let email = columns.field(row, 0);
                let name = columns.field(row, 1);
                self.users
                    .create(NewUser::now(email, name))
                    .await
                    .map_err(|source| RowError::Create { line, kind, source })?;
            }
            EntityKind::Team => {
                let title = columns.field(row, 0);
                let description = columns.field(row, 1);
                self.teams
                    .create(NewTeam::now(title, description))
                    .await
                    .map_err(|source| RowError::Create { line, kind, source })?;
            }
        }

        Ok(())
    }
}
