//! Durable storage adapters for users and teams.
//!
//! The traits here are the seam between the cache-aside repositories and
//! whatever holds the authoritative copy of the data. Postgres implementations
//! live in [`postgres`]; an in-memory one lives in `crate::test_support`.
//!
//! Mutations that touch the `team_users` relationship report the ids on the
//! other side of it so callers can invalidate exactly the cache entries that
//! went stale.

mod postgres;

pub use postgres::{PgTeamStorage, PgUserStorage};

use crate::models::{
    EntityKind, MembershipChange, NewTeam, NewUser, Team, User, UserWithTeams,
};
use async_trait::async_trait;
use rocket_db_pools::sqlx;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: i32 },
    #[error("{0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn not_found(kind: EntityKind, id: i32) -> Self {
        StoreError::NotFound { kind, id }
    }
}

#[async_trait]
pub trait UserStorage: Send + Sync {
    async fn insert(&self, user: NewUser) -> StoreResult<User>;

    /// Overwrite the scalar fields of an existing user.
    async fn update(&self, user: &User) -> StoreResult<User>;

    /// Update the scalar fields and replace every team membership of the
    /// user in one transaction. Unknown team ids are skipped.
    async fn replace_memberships(
        &self,
        user: &User,
        team_ids: &[i32],
    ) -> StoreResult<(User, MembershipChange)>;

    /// Delete the user, returning the teams it belonged to.
    async fn delete(&self, id: i32) -> StoreResult<Vec<i32>>;

    async fn find(&self, id: i32) -> StoreResult<Option<User>>;

    async fn find_with_teams(&self, id: i32) -> StoreResult<Option<UserWithTeams>>;

    async fn list(&self) -> StoreResult<Vec<User>>;
}

#[async_trait]
pub trait TeamStorage: Send + Sync {
    async fn insert(&self, team: NewTeam) -> StoreResult<Team>;

    /// Overwrite title and description; memberships are left alone.
    async fn update(&self, team: &Team) -> StoreResult<Team>;

    /// Delete the team, returning the ids of its former members.
    async fn delete(&self, id: i32) -> StoreResult<Vec<i32>>;

    async fn find(&self, id: i32) -> StoreResult<Option<Team>>;

    async fn list(&self) -> StoreResult<Vec<Team>>;

    /// Add `user_id` to the team. Adding an existing member is a no-op.
    async fn add_member(&self, team_id: i32, user_id: i32) -> StoreResult<()>;
}
