#[macro_use]
extern crate rocket;

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod import;
pub mod models;
pub mod repository;
pub mod request_logger;
pub mod routes;
pub mod services;
pub mod storage;

use crate::cache::CacheStore;
use crate::config::AppConfig;
use crate::db::RosterDb;
use crate::request_logger::RequestLogger;
use crate::services::RosterServices;
use env_logger::Env;
use rocket::fairing::AdHoc;
use rocket::http::Method;
use rocket::{Build, Catcher, Rocket, Route};
use rocket_cors::{AllowedOrigins, CorsOptions};
use rocket_db_pools::Database;
use rocket_okapi::{
    openapi_get_routes,
    rapidoc::{GeneralConfig, HideShowConfig, RapiDocConfig, make_rapidoc},
    settings::UrlObject,
    swagger_ui::{SwaggerUIConfig, make_swagger_ui},
};
use std::sync::{Arc, Once};

static LOGGER: Once = Once::new();

pub fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(
            Env::default().default_filter_or("info,rocket::server=warn,rocket::request=warn"),
        )
        .init();
    });
}

/// Every API route, plus the generated `openapi.json`. Mounted under `/api`.
pub fn api_routes() -> Vec<Route> {
    openapi_get_routes![
        // Health
        routes::health::health_check,
        // Users
        routes::users::create_user,
        routes::users::list_users,
        routes::users::get_user,
        routes::users::get_user_teams,
        routes::users::update_user,
        routes::users::delete_user,
        // Teams
        routes::teams::create_team,
        routes::teams::list_teams,
        routes::teams::get_team,
        routes::teams::update_team,
        routes::teams::delete_team,
        routes::teams::add_team_member,
        // Import
        routes::import::import_files,
    ]
}

/// JSON catchers rendering the failure envelope.
pub fn api_catchers() -> Vec<Catcher> {
    catchers![
        error::bad_request,
        error::not_found,
        error::unprocessable_entity,
        error::internal_error,
    ]
}

pub fn rocket() -> Rocket<Build> {
    init_logger();

    // Configure CORS
    let cors = CorsOptions::default()
        .allowed_origins(AllowedOrigins::all())
        .allowed_methods(
            vec![Method::Get, Method::Post, Method::Put, Method::Delete]
                .into_iter()
                .map(From::from)
                .collect(),
        )
        .allow_credentials(true)
        .to_cors()
        .expect("Error creating CORS");

    rocket::build()
        .attach(RequestLogger)
        .attach(RosterDb::init())
        .attach(cors)
        // Run database migrations on startup
        .attach(AdHoc::try_on_ignite(
            "Run Migrations",
            |rocket| async move {
                match RosterDb::fetch(&rocket) {
                    Some(db) => {
                        let pool = (**db).clone();
                        match db::run_migrations(&pool).await {
                            Ok(_) => {
                                log::info!("database migrations successful");
                                Ok(rocket)
                            }
                            Err(e) => {
                                log::error!("database migrations failed: {}", e);
                                Err(rocket)
                            }
                        }
                    }
                    None => {
                        log::error!("database pool not available for migrations");
                        Err(rocket)
                    }
                }
            },
        ))
        // Build cache tiers, repositories and the import coordinator
        .attach(AdHoc::try_on_ignite(
            "Roster Services",
            |rocket| async move {
                let config = match AppConfig::from_env() {
                    Ok(config) => config,
                    Err(e) => {
                        log::error!("invalid configuration: {}", e);
                        return Err(rocket);
                    }
                };

                let pool = match RosterDb::fetch(&rocket) {
                    Some(db) => (**db).clone(),
                    None => {
                        log::error!("database pool not available for services");
                        return Err(rocket);
                    }
                };

                let cache = match CacheStore::connect(&config.cache).await {
                    Ok(cache) => Arc::new(cache),
                    Err(e) => {
                        log::error!("failed to initialize cache: {}", e);
                        return Err(rocket);
                    }
                };

                let services = RosterServices::postgres(pool, cache, config.cache.entity_ttl);
                Ok(services.manage(rocket.manage(config)))
            },
        ))
        .mount("/api", api_routes())
        .register("/", api_catchers())
        .mount(
            "/api/docs/swagger/",
            make_swagger_ui(&SwaggerUIConfig {
                url: "../../openapi.json".to_owned(),
                ..Default::default()
            }),
        )
        .mount(
            "/api/docs/rapidoc/",
            make_rapidoc(&RapiDocConfig {
                general: GeneralConfig {
                    spec_urls: vec![UrlObject::new("Roster API", "../../openapi.json")],
                    ..Default::default()
                },
                hide_show: HideShowConfig {
                    allow_spec_url_load: false,
                    allow_spec_file_load: false,
                    ..Default::default()
                },
                ..Default::default()
            }),
        )
}

#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support {
    use crate::cache::{CacheBackend, CacheError, CacheResult, CacheStore, LocalCache};
    use crate::models::{
        EntityKind, MembershipChange, NewTeam, NewUser, Team, TeamSummary, User, UserWithTeams,
    };
    use crate::repository::{TeamRepository, UserRepository};
    use crate::services::RosterServices;
    use crate::storage::{StoreError, StoreResult, TeamStorage, UserStorage};
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;
    use rocket::config::LogLevel;
    use rocket::figment::Figment;
    use rocket::local::asynchronous::Client as AsyncClient;
    use rocket::local::blocking::Client;
    use rocket::{Build, Rocket, Route};
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    pub use database::{TestDatabase, TestDatabaseError};

    const TEST_TTL: Duration = Duration::from_secs(300);

    #[derive(Default)]
    struct MemoryState {
        users: BTreeMap<i32, User>,
        teams: BTreeMap<i32, Team>,
        /// `(team_id, user_id)` pairs.
        memberships: BTreeSet<(i32, i32)>,
        next_user_id: i32,
        next_team_id: i32,
    }

    impl MemoryState {
        fn email_taken(&self, email: &str, except: Option<i32>) -> bool {
            self.users
                .values()
                .any(|user| user.email == email && Some(user.id) != except)
        }

        fn members_of(&self, team_id: i32) -> Vec<i32> {
            self.memberships
                .iter()
                .filter(|(team, _)| *team == team_id)
                .map(|(_, user)| *user)
                .collect()
        }

        fn teams_of(&self, user_id: i32) -> Vec<i32> {
            self.memberships
                .iter()
                .filter(|(_, user)| *user == user_id)
                .map(|(team, _)| *team)
                .collect()
        }

        fn team_with_members(&self, team: &Team) -> Team {
            Team {
                members: self.members_of(team.id),
                ..team.clone()
            }
        }
    }

    /// In-memory [`UserStorage`] and [`TeamStorage`] with fault injection,
    /// artificial latency and a counter recording peak concurrent calls.
    #[derive(Default)]
    pub struct MemoryStorage {
        state: Mutex<MemoryState>,
        read_fault: AtomicBool,
        write_fault: AtomicBool,
        delay: Mutex<Duration>,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
    }

    struct InFlight<'a>(&'a AtomicUsize);

    impl Drop for InFlight<'_> {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl MemoryStorage {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make every read fail with [`StoreError::Unavailable`].
        pub fn fail_reads(&self, fail: bool) {
            self.read_fault.store(fail, Ordering::SeqCst);
        }

        /// Make every mutation fail with [`StoreError::Unavailable`].
        pub fn fail_writes(&self, fail: bool) {
            self.write_fault.store(fail, Ordering::SeqCst);
        }

        /// Sleep this long inside every call.
        pub fn set_delay(&self, delay: Duration) {
            *self.delay.lock() = delay;
        }

        /// Highest number of calls observed running at the same time.
        pub fn peak_in_flight(&self) -> usize {
            self.peak_in_flight.load(Ordering::SeqCst)
        }

        pub fn user_count(&self) -> usize {
            self.state.lock().users.len()
        }

        pub fn team_count(&self) -> usize {
            self.state.lock().teams.len()
        }

        async fn enter(&self) -> InFlight<'_> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
            let guard = InFlight(&self.in_flight);

            let delay = *self.delay.lock();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            guard
        }

        fn check_read(&self) -> StoreResult<()> {
            if self.read_fault.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("injected read fault".to_string()));
            }
            Ok(())
        }

        fn check_write(&self) -> StoreResult<()> {
            if self.write_fault.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("injected write fault".to_string()));
            }
            Ok(())
        }

        fn apply_user_update(state: &mut MemoryState, user: &User) -> StoreResult<User> {
            if state.email_taken(&user.email, Some(user.id)) {
                return Err(StoreError::Conflict(format!(
                    "email '{}' is already registered",
                    user.email
                )));
            }
            let stored = state
                .users
                .get_mut(&user.id)
                .ok_or_else(|| StoreError::not_found(EntityKind::User, user.id))?;
            stored.email = user.email.clone();
            stored.name = user.name.clone();
            stored.updated_at = Utc::now();
            Ok(stored.clone())
        }
    }

    #[async_trait]
    impl UserStorage for MemoryStorage {
        async fn insert(&self, user: NewUser) -> StoreResult<User> {
            let _in_flight = self.enter().await;
            self.check_write()?;

            let mut state = self.state.lock();
            if state.email_taken(&user.email, None) {
                return Err(StoreError::Conflict(format!(
                    "email '{}' is already registered",
                    user.email
                )));
            }
            state.next_user_id += 1;
            let created = User {
                id: state.next_user_id,
                email: user.email,
                name: user.name,
                created_at: user.created_at,
                updated_at: user.updated_at,
            };
            state.users.insert(created.id, created.clone());
            Ok(created)
        }

        async fn update(&self, user: &User) -> StoreResult<User> {
            let _in_flight = self.enter().await;
            self.check_write()?;

            let mut state = self.state.lock();
            Self::apply_user_update(&mut state, user)
        }

        async fn replace_memberships(
            &self,
            user: &User,
            team_ids: &[i32],
        ) -> StoreResult<(User, MembershipChange)> {
            let _in_flight = self.enter().await;
            self.check_write()?;

            let mut state = self.state.lock();
            let updated = Self::apply_user_update(&mut state, user)?;

            let previous = state.teams_of(user.id);
            state.memberships.retain(|(_, member)| *member != user.id);

            let mut current: Vec<i32> = team_ids
                .iter()
                .copied()
                .filter(|team_id| state.teams.contains_key(team_id))
                .collect();
            current.sort_unstable();
            current.dedup();
            for team_id in &current {
                state.memberships.insert((*team_id, user.id));
            }

            Ok((updated, MembershipChange { previous, current }))
        }

        async fn delete(&self, id: i32) -> StoreResult<Vec<i32>> {
            let _in_flight = self.enter().await;
            self.check_write()?;

            let mut state = self.state.lock();
            if state.users.remove(&id).is_none() {
                return Err(StoreError::not_found(EntityKind::User, id));
            }
            let teams = state.teams_of(id);
            state.memberships.retain(|(_, member)| *member != id);
            Ok(teams)
        }

        async fn find(&self, id: i32) -> StoreResult<Option<User>> {
            let _in_flight = self.enter().await;
            self.check_read()?;
            Ok(self.state.lock().users.get(&id).cloned())
        }

        async fn find_with_teams(&self, id: i32) -> StoreResult<Option<UserWithTeams>> {
            let _in_flight = self.enter().await;
            self.check_read()?;

            let state = self.state.lock();
            let Some(user) = state.users.get(&id).cloned() else {
                return Ok(None);
            };
            let teams = state
                .teams_of(id)
                .into_iter()
                .filter_map(|team_id| state.teams.get(&team_id))
                .map(|team| TeamSummary {
                    id: team.id,
                    title: team.title.clone(),
                    description: team.description.clone(),
                })
                .collect();
            Ok(Some(UserWithTeams { user, teams }))
        }

        async fn list(&self) -> StoreResult<Vec<User>> {
            let _in_flight = self.enter().await;
            self.check_read()?;
            Ok(self.state.lock().users.values().cloned().collect())
        }
    }

    #[async_trait]
    impl TeamStorage for MemoryStorage {
        async fn insert(&self, team: NewTeam) -> StoreResult<Team> {
            let _in_flight = self.enter().await;
            self.check_write()?;

            let mut state = self.state.lock();
            state.next_team_id += 1;
            let created = Team {
                id: state.next_team_id,
                title: team.title,
                description: team.description,
                created_at: team.created_at,
                updated_at: team.updated_at,
                members: Vec::new(),
            };
            state.teams.insert(created.id, created.clone());
            Ok(created)
        }

        async fn update(&self, team: &Team) -> StoreResult<Team> {
            let _in_flight = self.enter().await;
            self.check_write()?;

            let mut state = self.state.lock();
            let stored = state
                .teams
                .get_mut(&team.id)
                .ok_or_else(|| StoreError::not_found(EntityKind::Team, team.id))?;
            stored.title = team.title.clone();
            stored.description = team.description.clone();
            stored.updated_at = Utc::now();
            let stored = stored.clone();
            Ok(state.team_with_members(&stored))
        }

        async fn delete(&self, id: i32) -> StoreResult<Vec<i32>> {
            let _in_flight = self.enter().await;
            self.check_write()?;

            let mut state = self.state.lock();
            if state.teams.remove(&id).is_none() {
                return Err(StoreError::not_found(EntityKind::Team, id));
            }
            let members = state.members_of(id);
            state.memberships.retain(|(team, _)| *team != id);
            Ok(members)
        }

        async fn find(&self, id: i32) -> StoreResult<Option<Team>> {
            let _in_flight = self.enter().await;
            self.check_read()?;

            let state = self.state.lock();
            Ok(state.teams.get(&id).map(|team| state.team_with_members(team)))
        }

        async fn list(&self) -> StoreResult<Vec<Team>> {
            let _in_flight = self.enter().await;
            self.check_read()?;

            let state = self.state.lock();
            Ok(state
                .teams
                .values()
                .map(|team| state.team_with_members(team))
                .collect())
        }

        async fn add_member(&self, team_id: i32, user_id: i32) -> StoreResult<()> {
            let _in_flight = self.enter().await;
            self.check_write()?;

            let mut state = self.state.lock();
            if !state.teams.contains_key(&team_id) {
                return Err(StoreError::not_found(EntityKind::Team, team_id));
            }
            if !state.users.contains_key(&user_id) {
                return Err(StoreError::not_found(EntityKind::User, user_id));
            }
            state.memberships.insert((team_id, user_id));
            Ok(())
        }
    }

    /// Cache tier that can be told to fail reads or writes.
    pub struct FlakyBackend {
        inner: LocalCache,
        read_fault: AtomicBool,
        write_fault: AtomicBool,
    }

    impl Default for FlakyBackend {
        fn default() -> Self {
            Self::new()
        }
    }

    impl FlakyBackend {
        pub fn new() -> Self {
            Self {
                inner: LocalCache::new(TEST_TTL),
                read_fault: AtomicBool::new(false),
                write_fault: AtomicBool::new(false),
            }
        }

        pub fn fail_reads(&self, fail: bool) {
            self.read_fault.store(fail, Ordering::SeqCst);
        }

        /// Applies to both `set` and `delete`.
        pub fn fail_writes(&self, fail: bool) {
            self.write_fault.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl CacheBackend for FlakyBackend {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
            if self.read_fault.load(Ordering::SeqCst) {
                return Err(CacheError::Unavailable("injected read fault".to_string()));
            }
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
            if self.write_fault.load(Ordering::SeqCst) {
                return Err(CacheError::Unavailable("injected write fault".to_string()));
            }
            self.inner.set(key, value, ttl).await
        }

        async fn delete(&self, key: &str) -> CacheResult<()> {
            if self.write_fault.load(Ordering::SeqCst) {
                return Err(CacheError::Unavailable("injected write fault".to_string()));
            }
            self.inner.delete(key).await
        }
    }

    /// Two in-process tiers standing in for local + Redis.
    pub fn local_cache_store() -> Arc<CacheStore> {
        Arc::new(CacheStore::new(
            Arc::new(LocalCache::new(TEST_TTL)),
            Arc::new(LocalCache::new(TEST_TTL)),
            TEST_TTL,
        ))
    }

    /// Repositories over one [`MemoryStorage`], with handles kept for
    /// assertions.
    pub struct MemoryServices {
        pub storage: Arc<MemoryStorage>,
        pub cache: Arc<CacheStore>,
        pub users: UserRepository,
        pub teams: TeamRepository,
    }

    impl MemoryServices {
        pub fn services(&self) -> RosterServices {
            RosterServices::from_storage(
                self.storage.clone(),
                self.storage.clone(),
                self.cache.clone(),
                TEST_TTL,
            )
        }
    }

    pub fn memory_services() -> MemoryServices {
        let storage = Arc::new(MemoryStorage::new());
        let cache = local_cache_store();
        let users = UserRepository::new(storage.clone(), cache.clone(), TEST_TTL);
        let teams = TeamRepository::new(storage.clone(), cache.clone(), TEST_TTL);

        MemoryServices {
            storage,
            cache,
            users,
            teams,
        }
    }

    pub mod database {
        use log::LevelFilter;
        use rocket_db_pools::sqlx::postgres::{PgConnectOptions, PgPoolOptions};
        use rocket_db_pools::sqlx::{self, ConnectOptions, PgPool};
        use testcontainers::{ContainerAsync, core::error::TestcontainersError, runners::AsyncRunner};
        use testcontainers_modules::postgres::Postgres;
        use thiserror::Error;

        static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

        #[derive(Debug, Error)]
        pub enum TestDatabaseError {
            #[error("database error: {0}")]
            Sqlx(#[from] sqlx::Error),
            #[error("migration error: {0}")]
            Migration(#[from] sqlx::migrate::MigrateError),
            #[error("container error: {0}")]
            Container(#[from] TestcontainersError),
        }

        /// Migrated Postgres in a disposable container.
        pub struct TestDatabase {
            pool: Option<PgPool>,
            container: Option<ContainerAsync<Postgres>>,
        }

        impl TestDatabase {
            /// Launch a container and apply every migration.
            pub async fn new() -> Result<Self, TestDatabaseError> {
                let container = Postgres::default().start().await?;

                let host = container.get_host().await?.to_string();
                let port = container.get_host_port_ipv4(5432).await?;
                let url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

                let options: PgConnectOptions = url.parse()?;
                let pool = PgPoolOptions::new()
                    .max_connections(5)
                    .connect_with(options.log_statements(LevelFilter::Off))
                    .await?;

                MIGRATOR.run(&pool).await?;

                Ok(Self {
                    pool: Some(pool),
                    container: Some(container),
                })
            }

            pub fn pool(&self) -> &PgPool {
                self.pool.as_ref().expect("test database pool is available")
            }

            pub fn pool_clone(&self) -> PgPool {
                self.pool().clone()
            }

            /// Remove every row, keeping the schema.
            pub async fn truncate(&self) -> Result<(), TestDatabaseError> {
                sqlx::query("TRUNCATE team_users, teams, users RESTART IDENTITY CASCADE")
                    .execute(self.pool())
                    .await?;
                Ok(())
            }

            /// Close pool connections and stop the container.
            pub async fn close(mut self) -> Result<(), TestDatabaseError> {
                if let Some(pool) = self.pool.take() {
                    pool.close().await;
                }
                if let Some(container) = self.container.take() {
                    container.stop().await?;
                }
                Ok(())
            }
        }
    }

    /// Builder for constructing Rocket instances tailored for integration tests.
    #[derive(Default)]
    pub struct TestRocketBuilder {
        figment: Figment,
        mounts: Vec<(String, Vec<Route>)>,
        services: Option<RosterServices>,
    }

    impl TestRocketBuilder {
        /// Start a builder with sensible defaults: random port, logging disabled.
        pub fn new() -> Self {
            let figment = rocket::Config::figment()
                .merge(("port", 0))
                .merge(("log_level", LogLevel::Off))
                .merge(("cli_colors", false));

            Self {
                figment,
                mounts: Vec::new(),
                services: None,
            }
        }

        /// Mount routes under `/api`.
        pub fn mount_api_routes(mut self, routes: Vec<Route>) -> Self {
            self.mounts.push(("/api".to_string(), routes));
            self
        }

        /// Manage repositories and the import coordinator.
        pub fn manage_services(mut self, services: RosterServices) -> Self {
            self.services = Some(services);
            self
        }

        /// Finish building the Rocket instance.
        pub fn build(self) -> Rocket<Build> {
            let mut rocket = rocket::custom(self.figment).register("/", crate::api_catchers());

            for (base, routes) in self.mounts {
                rocket = rocket.mount(base, routes);
            }

            if let Some(services) = self.services {
                rocket = services.manage(rocket);
            }

            rocket
        }

        /// Convenience helper to produce a blocking local client.
        pub fn blocking_client(self) -> Client {
            Client::tracked(self.build()).expect("valid Rocket instance")
        }

        /// Convenience helper to produce an asynchronous local client.
        pub async fn async_client(self) -> AsyncClient {
            AsyncClient::tracked(self.build())
                .await
                .expect("valid Rocket instance")
        }
    }
}
