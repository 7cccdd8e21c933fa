//! Wiring of storage, cache and import pipeline into managed state.

use crate::cache::CacheStore;
use crate::import::ImportCoordinator;
use crate::repository::{TeamRepository, UserRepository};
use crate::storage::{PgTeamStorage, PgUserStorage, TeamStorage, UserStorage};
use rocket::{Build, Rocket};
use rocket_db_pools::sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

/// Everything a request handler or the CLI importer needs.
#[derive(Clone)]
pub struct RosterServices {
    pub users: UserRepository,
    pub teams: TeamRepository,
    pub importer: ImportCoordinator,
}

impl RosterServices {
    /// Postgres-backed services sharing one cache store.
    pub fn postgres(pool: PgPool, cache: Arc<CacheStore>, entity_ttl: Duration) -> Self {
        Self::from_storage(
            Arc::new(PgUserStorage::new(pool.clone())),
            Arc::new(PgTeamStorage::new(pool)),
            cache,
            entity_ttl,
        )
    }

    pub fn from_storage(
        user_storage: Arc<dyn UserStorage>,
        team_storage: Arc<dyn TeamStorage>,
        cache: Arc<CacheStore>,
        entity_ttl: Duration,
    ) -> Self {
        let users = UserRepository::new(user_storage, cache.clone(), entity_ttl);
        let teams = TeamRepository::new(team_storage, cache, entity_ttl);
        let importer = ImportCoordinator::new(users.clone(), teams.clone());

        Self {
            users,
            teams,
            importer,
        }
    }

    /// Put each service into Rocket's managed state.
    pub fn manage(self, rocket: Rocket<Build>) -> Rocket<Build> {
        rocket
            .manage(self.users)
            .manage(self.teams)
            .manage(self.importer)
    }
}
