//! Postgres-backed storage for users, teams and their memberships.

use super::{StoreError, StoreResult, TeamStorage, UserStorage};
use crate::models::{
    EntityKind, MembershipChange, NewTeam, NewUser, Team, TeamSummary, User, UserWithTeams,
};
use async_trait::async_trait;
use chrono::Utc;
use rocket_db_pools::sqlx::{self, PgPool};

const UNIQUE_VIOLATION: &str = "23505";

const USER_COLUMNS: &str = "id, email, name, created_at, updated_at";

/// Team row with its member ids folded into an ordered array.
const TEAM_SELECT: &str = r#"
    SELECT t.id, t.title, t.description, t.created_at, t.updated_at,
           COALESCE(
               array_agg(tu.user_id ORDER BY tu.user_id) FILTER (WHERE tu.user_id IS NOT NULL),
               ARRAY[]::int4[]
           ) AS members
    FROM teams t
    LEFT JOIN team_users tu ON tu.team_id = t.id"#;

/// Translate unique-constraint violations into [`StoreError::Conflict`].
fn map_write_error(err: sqlx::Error, what: impl FnOnce() -> String) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            StoreError::Conflict(what())
        }
        _ => StoreError::Database(err),
    }
}

#[derive(Debug, Clone)]
pub struct PgUserStorage {
    pool: PgPool,
}

impl PgUserStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStorage for PgUserStorage {
    async fn insert(&self, user: NewUser) -> StoreResult<User> {
        let sql = format!(
            "INSERT INTO users (email, name, created_at, updated_at) VALUES ($1, $2, $3, $4) RETURNING {}",
            USER_COLUMNS
        );

        sqlx::query_as::<_, User>(&sql)
            .bind(&user.email)
            .bind(&user.name)
            .bind(user.created_at)
            .bind(user.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_write_error(e, || format!("email '{}' is already registered", user.email)))
    }

    async fn update(&self, user: &User) -> StoreResult<User> {
        let sql = format!(
            "UPDATE users SET email = $2, name = $3, updated_at = $4 WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        );

        sqlx::query_as::<_, User>(&sql)
            .bind(user.id)
            .bind(&user.email)
            .bind(&user.name)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_write_error(e, || format!("email '{}' is already registered", user.email)))?
            .ok_or_else(|| StoreError::not_found(EntityKind::User, user.id))
    }

    async fn replace_memberships(
        &self,
        user: &User,
        team_ids: &[i32],
    ) -> StoreResult<(User, MembershipChange)> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "UPDATE users SET email = $2, name = $3, updated_at = $4 WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        );
        let updated = sqlx::query_as::<_, User>(&sql)
            .bind(user.id)
            .bind(&user.email)
            .bind(&user.name)
            .bind(Utc::now())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_write_error(e, || format!("email '{}' is already registered", user.email)))?
            .ok_or_else(|| StoreError::not_found(EntityKind::User, user.id))?;

        let previous: Vec<i32> = sqlx::query_scalar(
            "SELECT team_id FROM team_users WHERE user_id = $1 ORDER BY team_id",
        )
        .bind(user.id)
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM team_users WHERE user_id = $1")
            .bind(user.id)
            .execute(&mut *tx)
            .await?;

        let mut current: Vec<i32> = sqlx::query_scalar(
            r#"INSERT INTO team_users (team_id, user_id)
               SELECT id, $1 FROM teams WHERE id = ANY($2)
               RETURNING team_id"#,
        )
        .bind(user.id)
        .bind(team_ids)
        .fetch_all(&mut *tx)
        .await?;
        current.sort_unstable();

        tx.commit().await?;

        Ok((updated, MembershipChange { previous, current }))
    }

    async fn delete(&self, id: i32) -> StoreResult<Vec<i32>> {
        let mut tx = self.pool.begin().await?;

        let teams: Vec<i32> = sqlx::query_scalar(
            "SELECT team_id FROM team_users WHERE user_id = $1 ORDER BY team_id",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        // team_users rows go with the user (ON DELETE CASCADE).
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(EntityKind::User, id));
        }

        tx.commit().await?;
        Ok(teams)
    }

    async fn find(&self, id: i32) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_with_teams(&self, id: i32) -> StoreResult<Option<UserWithTeams>> {
        let Some(user) = self.find(id).await? else {
            return Ok(None);
        };

        let teams: Vec<TeamSummary> = sqlx::query_as(
            r#"SELECT t.id, t.title, t.description
               FROM teams t
               JOIN team_users tu ON tu.team_id = t.id
               WHERE tu.user_id = $1
               ORDER BY t.id"#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(UserWithTeams { user, teams }))
    }

    async fn list(&self) -> StoreResult<Vec<User>> {
        let sql = format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS);
        let users = sqlx::query_as::<_, User>(&sql).fetch_all(&self.pool).await?;
        Ok(users)
    }
}

#[derive(Debug, Clone)]
pub struct PgTeamStorage {
    pool: PgPool,
}

impl PgTeamStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TeamStorage for PgTeamStorage {
    async fn insert(&self, team: NewTeam) -> StoreResult<Team> {
        let created = sqlx::query_as::<_, Team>(
            r#"INSERT INTO teams (title, description, created_at, updated_at)
               VALUES ($1, $2, $3, $4)
               RETURNING id, title, description, created_at, updated_at, ARRAY[]::int4[] AS members"#,
        )
        .bind(&team.title)
        .bind(&team.description)
        .bind(team.created_at)
        .bind(team.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_write_error(e, || format!("team '{}' already exists", team.title)))?;

        Ok(created)
    }

    async fn update(&self, team: &Team) -> StoreResult<Team> {
        sqlx::query_as::<_, Team>(
            r#"WITH updated AS (
                   UPDATE teams SET title = $2, description = $3, updated_at = $4
                   WHERE id = $1
                   RETURNING id, title, description, created_at, updated_at
               )
               SELECT u.id, u.title, u.description, u.created_at, u.updated_at,
                      COALESCE(
                          (SELECT array_agg(tu.user_id ORDER BY tu.user_id)
                           FROM team_users tu WHERE tu.team_id = u.id),
                          ARRAY[]::int4[]
                      ) AS members
               FROM updated u"#,
        )
        .bind(team.id)
        .bind(&team.title)
        .bind(&team.description)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found(EntityKind::Team, team.id))
    }

    async fn delete(&self, id: i32) -> StoreResult<Vec<i32>> {
        let mut tx = self.pool.begin().await?;

        let members: Vec<i32> = sqlx::query_scalar(
            "SELECT user_id FROM team_users WHERE team_id = $1 ORDER BY user_id",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM teams WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(EntityKind::Team, id));
        }

        tx.commit().await?;
        Ok(members)
    }

    async fn find(&self, id: i32) -> StoreResult<Option<Team>> {
        let sql = format!("{} WHERE t.id = $1 GROUP BY t.id", TEAM_SELECT);
        let team = sqlx::query_as::<_, Team>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(team)
    }

    async fn list(&self) -> StoreResult<Vec<Team>> {
        let sql = format!("{} GROUP BY t.id ORDER BY t.id", TEAM_SELECT);
        let teams = sqlx::query_as::<_, Team>(&sql).fetch_all(&self.pool).await?;
        Ok(teams)
    }

    async fn add_member(&self, team_id: i32, user_id: i32) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let team_exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM teams WHERE id = $1)")
                .bind(team_id)
                .fetch_one(&mut *tx)
                .await?;
        if !team_exists {
            return Err(StoreError::not_found(EntityKind::Team, team_id));
        }

        let user_exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
                .bind(user_id)
                .fetch_one(&mut *tx)
                .await?;
        if !user_exists {
            return Err(StoreError::not_found(EntityKind::User, user_id));
        }

        sqlx::query(
            "INSERT INTO team_users (team_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(team_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
