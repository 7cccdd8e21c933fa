use super::{invalidate, read_through};
use crate::cache::{CacheStore, keys};
use crate::models::{EntityKind, NewUser, User, UserWithTeams};
use crate::storage::{StoreError, StoreResult, UserStorage};
use std::sync::Arc;
use std::time::Duration;

/// Users, read through the cache and invalidated on write.
#[derive(Clone)]
pub struct UserRepository {
    storage: Arc<dyn UserStorage>,
    cache: Arc<CacheStore>,
    ttl: Duration,
}

impl UserRepository {
    pub fn new(storage: Arc<dyn UserStorage>, cache: Arc<CacheStore>, ttl: Duration) -> Self {
        Self {
            storage,
            cache,
            ttl,
        }
    }

    pub async fn create(&self, user: NewUser) -> StoreResult<User> {
        let created = self.storage.insert(user).await?;
        invalidate(&self.cache, &[keys::USERS_LIST.to_string()]).await;
        Ok(created)
    }

    pub async fn update(&self, user: &User) -> StoreResult<User> {
        let updated = self.storage.update(user).await?;
        invalidate(&self.cache, &Self::own_keys(user.id)).await;
        Ok(updated)
    }

    /// Update the user and replace its memberships with `team_ids` in one
    /// durable transaction. Both the previous and the new teams are
    /// invalidated.
    pub async fn replace_memberships(&self, user: &User, team_ids: &[i32]) -> StoreResult<User> {
        let (updated, change) = self.storage.replace_memberships(user, team_ids).await?;

        let mut stale = Self::own_keys(user.id);
        stale.push(keys::TEAMS_LIST.to_string());
        stale.extend(change.affected_teams().into_iter().map(keys::team));
        invalidate(&self.cache, &stale).await;

        Ok(updated)
    }

    pub async fn delete(&self, id: i32) -> StoreResult<()> {
        let former_teams = self.storage.delete(id).await?;

        let mut stale = Self::own_keys(id);
        if !former_teams.is_empty() {
            stale.push(keys::TEAMS_LIST.to_string());
            stale.extend(former_teams.into_iter().map(keys::team));
        }
        invalidate(&self.cache, &stale).await;

        Ok(())
    }

    pub async fn get_by_id(&self, id: i32) -> StoreResult<User> {
        read_through(&self.cache, &keys::user(id), self.ttl, || self.storage.find(id))
            .await?
            .ok_or_else(|| StoreError::not_found(EntityKind::User, id))
    }

    pub async fn get_with_teams(&self, id: i32) -> StoreResult<UserWithTeams> {
        read_through(&self.cache, &keys::user_teams(id), self.ttl, || {
            self.storage.find_with_teams(id)
        })
        .await?
        .ok_or_else(|| StoreError::not_found(EntityKind::User, id))
    }

    pub async fn list(&self) -> StoreResult<Vec<User>> {
        let users = read_through(&self.cache, keys::USERS_LIST, self.ttl, || async {
            self.storage.list().await.map(Some)
        })
        .await?;
        Ok(users.unwrap_or_default())
    }

    fn own_keys(id: i32) -> Vec<String> {
        vec![
            keys::USERS_LIST.to_string(),
            keys::user(id),
            keys::user_teams(id),
        ]
    }
}
