use super::{invalidate, read_through};
use crate::cache::{CacheStore, keys};
use crate::models::{EntityKind, NewTeam, Team};
use crate::storage::{StoreError, StoreResult, TeamStorage};
use std::sync::Arc;
use std::time::Duration;

/// Teams and their memberships, read through the cache and invalidated on
/// write.
#[derive(Clone)]
pub struct TeamRepository {
    storage: Arc<dyn TeamStorage>,
    cache: Arc<CacheStore>,
    ttl: Duration,
}

impl TeamRepository {
    pub fn new(storage: Arc<dyn TeamStorage>, cache: Arc<CacheStore>, ttl: Duration) -> Self {
        Self {
            storage,
            cache,
            ttl,
        }
    }

    pub async fn create(&self, team: NewTeam) -> StoreResult<Team> {
        let created = self.storage.insert(team).await?;
        invalidate(&self.cache, &[keys::TEAMS_LIST.to_string()]).await;
        Ok(created)
    }

    /// Overwrite title and description. Members see the change through
    /// their `user_teams_<id>` entries, so those are dropped too.
    pub async fn update(&self, team: &Team) -> StoreResult<Team> {
        let updated = self.storage.update(team).await?;

        let mut stale = vec![keys::TEAMS_LIST.to_string(), keys::team(team.id)];
        stale.extend(updated.members.iter().copied().map(keys::user_teams));
        invalidate(&self.cache, &stale).await;

        Ok(updated)
    }

    pub async fn delete(&self, id: i32) -> StoreResult<()> {
        let members = self.storage.delete(id).await?;

        let mut stale = vec![keys::TEAMS_LIST.to_string(), keys::team(id)];
        stale.extend(members.into_iter().map(keys::user_teams));
        invalidate(&self.cache, &stale).await;

        Ok(())
    }

    pub async fn add_member(&self, team_id: i32, user_id: i32) -> StoreResult<()> {
        self.storage.add_member(team_id, user_id).await?;

        invalidate(
            &self.cache,
            &[
                keys::team(team_id),
                keys::TEAMS_LIST.to_string(),
                keys::user(user_id),
                keys::user_teams(user_id),
                keys::USERS_LIST.to_string(),
            ],
        )
        .await;

        Ok(())
    }

    pub async fn get_by_id(&self, id: i32) -> StoreResult<Team> {
        read_through(&self.cache, &keys::team(id), self.ttl, || self.storage.find(id))
            .await?
            .ok_or_else(|| StoreError::not_found(EntityKind::Team, id))
    }

    pub async fn list(&self) -> StoreResult<Vec<Team>> {
        let teams = read_through(&self.cache, keys::TEAMS_LIST, self.ttl, || async {
            self.storage.list().await.map(Some)
        })
        .await?;
        Ok(teams.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewUser;
    use crate::storage::UserStorage;
    use crate::test_support::{MemoryStorage, local_cache_store};

    fn repository() -> (Arc<MemoryStorage>, Arc<CacheStore>, TeamRepository) {
        let storage = Arc::new(MemoryStorage::new());
        let cache = local_cache_store();
        let repo = TeamRepository::new(storage.clone(), cache.clone(), Duration::from_secs(300));
        (storage, cache, repo)
    }

    async fn seed_user(storage: &MemoryStorage, email: &str) -> i32 {
        UserStorage::insert(storage, NewUser::now(email, "Member"))
            .await
            .expect("user")
            .id
    }

    #[tokio::test]
    async fn test_add_member_invalidates_both_sides() {
        let (storage, cache, repo) = repository();
        let team = repo.create(NewTeam::now("Platform", "infra")).await.expect("create");
        let user_id = seed_user(&storage, "p@example.com").await;

        repo.get_by_id(team.id).await.expect("warm");
        repo.list().await.expect("warm");
        for key in [keys::user(user_id), keys::user_teams(user_id)] {
            cache
                .set(&key, b"stale", Duration::from_secs(60))
                .await
                .expect("seed");
        }

        repo.add_member(team.id, user_id).await.expect("add");

        for key in [
            keys::team(team.id),
            keys::TEAMS_LIST.to_string(),
            keys::user(user_id),
            keys::user_teams(user_id),
        ] {
            assert!(cache.get(&key).await.is_none(), "{} should be gone", key);
        }
        assert_eq!(repo.get_by_id(team.id).await.expect("get").members, vec![user_id]);
    }

    #[tokio::test]
    async fn test_add_member_twice_is_a_no_op() {
        let (storage, _, repo) = repository();
        let team = repo.create(NewTeam::now("Ops", "")).await.expect("create");
        let user_id = seed_user(&storage, "o@example.com").await;

        repo.add_member(team.id, user_id).await.expect("first");
        repo.add_member(team.id, user_id).await.expect("second");

        assert_eq!(repo.get_by_id(team.id).await.expect("get").members, vec![user_id]);
    }

    #[tokio::test]
    async fn test_add_member_to_missing_team_is_not_found() {
        let (storage, _, repo) = repository();
        let user_id = seed_user(&storage, "n@example.com").await;

        let err = repo.add_member(77, user_id).await.expect_err("missing team");
        assert!(matches!(
            err,
            StoreError::NotFound {
                kind: EntityKind::Team,
                id: 77
            }
        ));
    }

    #[tokio::test]
    async fn test_update_invalidates_member_views() {
        let (storage, cache, repo) = repository();
        let mut team = repo.create(NewTeam::now("Docs", "")).await.expect("create");
        let user_id = seed_user(&storage, "w@example.com").await;
        repo.add_member(team.id, user_id).await.expect("add");
        cache
            .set(&keys::user_teams(user_id), b"stale", Duration::from_secs(60))
            .await
            .expect("seed");
        repo.get_by_id(team.id).await.expect("warm");

        team.description = "Writers".to_string();
        let updated = repo.update(&team).await.expect("update");

        assert_eq!(updated.members, vec![user_id]);
        assert!(cache.get(&keys::user_teams(user_id)).await.is_none());
        assert_eq!(
            repo.get_by_id(team.id).await.expect("get").description,
            "Writers"
        );
    }

    #[tokio::test]
    async fn test_delete_removes_team_and_members_views() {
        let (storage, cache, repo) = repository();
        let team = repo.create(NewTeam::now("Temp", "")).await.expect("create");
        let user_id = seed_user(&storage, "t@example.com").await;
        repo.add_member(team.id, user_id).await.expect("add");
        repo.get_by_id(team.id).await.expect("warm");
        cache
            .set(&keys::user_teams(user_id), b"stale", Duration::from_secs(60))
            .await
            .expect("seed");

        repo.delete(team.id).await.expect("delete");

        assert!(cache.get(&keys::team(team.id)).await.is_none());
        assert!(cache.get(&keys::user_teams(user_id)).await.is_none());
        assert!(repo.list().await.expect("list").is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_membership_writes_and_reads_leave_no_stale_team_entry() {
        let (storage, cache, repo) = repository();
        let team = repo.create(NewTeam::now("Shared", "")).await.expect("create");
        repo.get_by_id(team.id).await.expect("warm");
        storage.set_delay(Duration::from_millis(5));

        let mut handles = Vec::new();
        for file in 0..2 {
            let storage = storage.clone();
            let repo = repo.clone();
            let team_id = team.id;
            handles.push(tokio::spawn(async move {
                for row in 0..5 {
                    let email = format!("f{}r{}@example.com", file, row);
                    let user_id = seed_user(&storage, &email).await;
                    repo.add_member(team_id, user_id).await.expect("add");
                }
            }));
        }
        for _ in 0..2 {
            let repo = repo.clone();
            let team_id = team.id;
            handles.push(tokio::spawn(async move {
                for _ in 0..15 {
                    repo.get_by_id(team_id).await.expect("read");
                }
            }));
        }
        for handle in handles {
            handle.await.expect("worker task");
        }

        let durable = TeamStorage::find(&*storage, team.id)
            .await
            .expect("find")
            .expect("team exists");
        assert_eq!(durable.members.len(), 10);

        let cached: Option<Team> = cache.get_json(&keys::team(team.id)).await;
        if let Some(cached) = cached {
            assert_eq!(cached, durable);
        }
        assert_eq!(repo.get_by_id(team.id).await.expect("get"), durable);
    }
}
