use roster_api::cache::keys;
use roster_api::models::{NewTeam, NewUser};
use roster_api::services::RosterServices;
use roster_api::storage::StoreError;
use roster_api::test_support::{TestDatabase, local_cache_store};
use std::time::Duration;

async fn provision(test_name: &str) -> Option<TestDatabase> {
    match TestDatabase::new().await {
        Ok(db) => Some(db),
        Err(err) => {
            eprintln!("skipping {test_name}: test database unavailable: {err}");
            None
        }
    }
}

#[tokio::test]
async fn postgres_repositories_keep_cache_consistent() {
    let Some(test_db) = provision("postgres repository test").await else {
        return;
    };

    let cache = local_cache_store();
    let services =
        RosterServices::postgres(test_db.pool_clone(), cache.clone(), Duration::from_secs(300));

    let user = services
        .users
        .create(NewUser::now("ada@example.com", "Ada"))
        .await
        .expect("create user");
    let team = services
        .teams
        .create(NewTeam::now("Core", "Platform"))
        .await
        .expect("create team");

    // Warm, then mutate through the relationship.
    let before = services.teams.get_by_id(team.id).await.expect("get team");
    assert!(before.members.is_empty());
    assert!(cache.get(&keys::team(team.id)).await.is_some());

    services
        .teams
        .add_member(team.id, user.id)
        .await
        .expect("add member");
    services
        .teams
        .add_member(team.id, user.id)
        .await
        .expect("adding twice is a no-op");
    assert!(cache.get(&keys::team(team.id)).await.is_none());

    let after = services.teams.get_by_id(team.id).await.expect("get team");
    assert_eq!(after.members, vec![user.id]);

    let with_teams = services
        .users
        .get_with_teams(user.id)
        .await
        .expect("user with teams");
    assert_eq!(with_teams.teams.len(), 1);
    assert_eq!(with_teams.teams[0].title, "Core");

    let err = services
        .users
        .create(NewUser::now("ada@example.com", "Imposter"))
        .await
        .expect_err("duplicate email");
    assert!(matches!(err, StoreError::Conflict(_)));

    test_db.close().await.expect("failed to stop test database");
}

#[tokio::test]
async fn replace_memberships_is_transactional_and_skips_unknown_teams() {
    let Some(test_db) = provision("membership replacement test").await else {
        return;
    };

    let services = RosterServices::postgres(
        test_db.pool_clone(),
        local_cache_store(),
        Duration::from_secs(300),
    );

    let mut user = services
        .users
        .create(NewUser::now("grace@example.com", "Grace"))
        .await
        .expect("create user");
    let old = services
        .teams
        .create(NewTeam::now("Old", ""))
        .await
        .expect("create team");
    let new = services
        .teams
        .create(NewTeam::now("New", ""))
        .await
        .expect("create team");
    services
        .teams
        .add_member(old.id, user.id)
        .await
        .expect("add member");

    user.name = "Grace Hopper".to_string();
    let updated = services
        .users
        .replace_memberships(&user, &[new.id, 9_999])
        .await
        .expect("replace memberships");
    assert_eq!(updated.name, "Grace Hopper");

    let with_teams = services
        .users
        .get_with_teams(user.id)
        .await
        .expect("user with teams");
    let ids: Vec<i32> = with_teams.teams.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![new.id]);

    // A conflicting email aborts the whole transaction.
    let other = services
        .users
        .create(NewUser::now("other@example.com", "Other"))
        .await
        .expect("create user");
    user.email = other.email.clone();
    let err = services
        .users
        .replace_memberships(&user, &[old.id])
        .await
        .expect_err("email conflict");
    assert!(matches!(err, StoreError::Conflict(_)));

    let unchanged = services
        .users
        .get_with_teams(user.id)
        .await
        .expect("user with teams");
    assert_eq!(unchanged.user.email, "grace@example.com");
    assert_eq!(unchanged.teams.len(), 1);
    assert_eq!(unchanged.teams[0].id, new.id);

    services.teams.delete(new.id).await.expect("delete team");
    let after_delete = services
        .users
        .get_with_teams(user.id)
        .await
        .expect("user with teams");
    assert!(after_delete.teams.is_empty());

    test_db.close().await.expect("failed to stop test database");
}
