//! Postgres 仓库层测试
//!
//! 需要 TEST_DATABASE_URL 指向一个可写的测试库：
//! `cargo test --test repository_tests -- --ignored`

use chrono::{Duration, Utc};
use rbac_system::{
    db,
    error::AppError,
    models::{
        role::*,
        session::{AuthSessionData, SessionRecord},
        user::NewUser,
    },
    repository::{RbacRepository, RbacStore, SessionRepository, SessionStore},
};
use serial_test::serial;
use sqlx::PgPool;
use uuid::Uuid;

mod common;
use common::create_test_config;

async fn setup_test_db() -> PgPool {
    let config = create_test_config();
    let pool = db::create_pool(&config.database)
        .await
        .expect("Failed to connect to test database");
    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    sqlx::query(
        "TRUNCATE sessions, user_role_bindings, role_permissions, roles, permissions, modules, users CASCADE",
    )
    .execute(&pool)
    .await
    .expect("Failed to clean test database");

    pool
}

fn new_user(username: &str) -> NewUser {
    NewUser {
        username: username.to_string(),
        email: format!("{}@example.com", username),
        password_hash: "hash".to_string(),
        display_name: None,
        employee_id: None,
    }
}

fn role_req(code: &str) -> CreateRoleRequest {
    CreateRoleRequest {
        code: code.to_string(),
        name: code.to_string(),
        description: None,
    }
}

fn binding(user_id: Uuid, role_id: Uuid, days_from_now: i64, end_in_days: Option<i64>) -> NewRoleBinding {
    let now = Utc::now();
    NewRoleBinding {
        user_id,
        role_id,
        scope_type: ScopeType::Global,
        scope_id: None,
        start_at: now + Duration::days(days_from_now),
        end_at: end_in_days.map(|d| now + Duration::days(d)),
        created_by: None,
    }
}

#[tokio::test]
#[ignore] // 需要数据库
#[serial]
async fn test_user_email_lookup_is_case_insensitive() {
    let repo = RbacRepository::new(setup_test_db().await);

    let user = repo.create_user(&new_user("alice")).await.unwrap();
    let found = repo
        .find_user_by_email("ALICE@example.com")
        .await
        .unwrap()
        .expect("user not found");
    assert_eq!(found.id, user.id);

    let err = repo.create_user(&new_user("alice")).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
#[ignore] // 需要数据库
#[serial]
async fn test_emails_differing_only_in_case_collide() {
    let repo = RbacRepository::new(setup_test_db().await);

    repo.create_user(&new_user("frank")).await.unwrap();

    let err = repo
        .create_user(&NewUser {
            username: "frank2".to_string(),
            email: "FRANK@Example.com".to_string(),
            ..new_user("frank2")
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
#[ignore] // 需要数据库
#[serial]
async fn test_binding_grants_respect_window() {
    let repo = RbacRepository::new(setup_test_db().await);

    let module = repo.upsert_module("a", "A").await.unwrap();
    let view = repo.upsert_permission(module.id, "a.view", "View").await.unwrap();
    let edit = repo.upsert_permission(module.id, "a.edit", "Edit").await.unwrap();

    let user = repo.create_user(&new_user("bob")).await.unwrap();
    let current = repo.create_role(&role_req("current")).await.unwrap();
    let expired = repo.create_role(&role_req("expired")).await.unwrap();
    let future = repo.create_role(&role_req("future")).await.unwrap();
    let empty = repo.create_role(&role_req("empty")).await.unwrap();

    repo.replace_role_permissions(current.id, &[view.id, edit.id])
        .await
        .unwrap();
    repo.replace_role_permissions(expired.id, &[view.id]).await.unwrap();

    repo.create_binding(&binding(user.id, current.id, -1, None)).await.unwrap();
    repo.create_binding(&binding(user.id, expired.id, -10, Some(-1))).await.unwrap();
    repo.create_binding(&binding(user.id, future.id, 1, None)).await.unwrap();
    repo.create_binding(&binding(user.id, empty.id, -1, Some(1))).await.unwrap();

    let grants = repo.binding_grants_for_user(user.id, Utc::now()).await.unwrap();

    let mut codes: Vec<&str> = grants.iter().map(|g| g.role.code.as_str()).collect();
    codes.sort();
    assert_eq!(codes, vec!["current", "empty"]);

    let current_grant = grants.iter().find(|g| g.role.id == current.id).unwrap();
    let mut perms = current_grant.permission_codes.clone();
    perms.sort();
    assert_eq!(perms, vec!["a.edit", "a.view"]);

    // 没有权限的角色仍然返回
    let empty_grant = grants.iter().find(|g| g.role.id == empty.id).unwrap();
    assert!(empty_grant.permission_codes.is_empty());
}

#[tokio::test]
#[ignore] // 需要数据库
#[serial]
async fn test_replace_role_permissions_and_counts() {
    let repo = RbacRepository::new(setup_test_db().await);

    let module = repo.upsert_module("a", "A").await.unwrap();
    let view = repo.upsert_permission(module.id, "a.view", "View").await.unwrap();
    let edit = repo.upsert_permission(module.id, "a.edit", "Edit").await.unwrap();
    let role = repo.create_role(&role_req("editor")).await.unwrap();

    repo.replace_role_permissions(role.id, &[view.id, edit.id])
        .await
        .unwrap();
    assert_eq!(repo.role_permission_ids(role.id).await.unwrap().len(), 2);

    repo.replace_role_permissions(role.id, &[view.id]).await.unwrap();
    assert_eq!(repo.role_permission_ids(role.id).await.unwrap(), vec![view.id]);

    repo.replace_role_permissions(role.id, &[]).await.unwrap();
    assert!(repo.role_permission_ids(role.id).await.unwrap().is_empty());

    assert_eq!(
        repo.count_permissions(&[view.id, Uuid::new_v4()]).await.unwrap(),
        1
    );
}

#[tokio::test]
#[ignore] // 需要数据库
#[serial]
async fn test_list_roles_counts_and_keyword() {
    let repo = RbacRepository::new(setup_test_db().await);

    let editor = repo.create_role(&role_req("editor")).await.unwrap();
    repo.create_role(&role_req("viewer")).await.unwrap();
    let alice = repo.create_user(&new_user("alice")).await.unwrap();
    let bob = repo.create_user(&new_user("bob")).await.unwrap();
    repo.create_binding(&binding(alice.id, editor.id, -1, None)).await.unwrap();
    repo.create_binding(&binding(alice.id, editor.id, -2, None)).await.unwrap();
    repo.create_binding(&binding(bob.id, editor.id, -1, None)).await.unwrap();

    let (total, items) = repo
        .list_roles(&ListRolesQuery {
            page: None,
            page_size: None,
            keyword: Some("EDIT".to_string()),
        })
        .await
        .unwrap();

    assert_eq!(total, 1);
    assert_eq!(items[0].binding_count, 3);
    assert_eq!(items[0].user_count, 2);

    let mut users = repo.user_ids_for_role(editor.id).await.unwrap();
    users.sort();
    let mut expected = vec![alice.id, bob.id];
    expected.sort();
    assert_eq!(users, expected);
}

#[tokio::test]
#[ignore] // 需要数据库
#[serial]
async fn test_delete_role_referenced_by_binding_is_conflict() {
    let repo = RbacRepository::new(setup_test_db().await);

    let role = repo.create_role(&role_req("editor")).await.unwrap();
    let user = repo.create_user(&new_user("carol")).await.unwrap();
    let created = repo.create_binding(&binding(user.id, role.id, -1, None)).await.unwrap();

    let err = repo.delete_role(role.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let removed = repo.delete_binding(created.id).await.unwrap().unwrap();
    assert_eq!(removed.id, created.id);
    assert!(repo.delete_role(role.id).await.unwrap());
}

#[tokio::test]
#[ignore] // 需要数据库
#[serial]
async fn test_binding_for_unknown_role_is_not_found() {
    let repo = RbacRepository::new(setup_test_db().await);
    let user = repo.create_user(&new_user("dave")).await.unwrap();

    let err = repo
        .create_binding(&binding(user.id, Uuid::new_v4(), -1, None))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
#[ignore] // 需要数据库
#[serial]
async fn test_session_repository_lifecycle() {
    let pool = setup_test_db().await;
    let rbac = RbacRepository::new(pool.clone());
    let sessions = SessionRepository::new(pool);

    let user = rbac.create_user(&new_user("erin")).await.unwrap();
    let now = Utc::now();
    let data = AuthSessionData {
        user_id: user.id,
        username: user.username.clone(),
        email: user.email.clone(),
        employee_id: None,
        roles: vec![],
        permissions: vec!["a.view".to_string()],
        scopes: vec![],
    };

    let live = SessionRecord {
        id: "live-digest".to_string(),
        user_id: user.id,
        data: data.clone(),
        expires_at: now + Duration::hours(1),
        created_at: now,
        last_seen_at: now,
    };
    let stale = SessionRecord {
        id: "stale-digest".to_string(),
        expires_at: now - Duration::minutes(1),
        ..live.clone()
    };
    sessions.insert_session(&live).await.unwrap();
    sessions.insert_session(&stale).await.unwrap();

    let found = sessions.find_session("live-digest", now).await.unwrap().unwrap();
    assert_eq!(found.data, data);
    assert!(sessions.find_session("stale-digest", now).await.unwrap().is_none());

    assert_eq!(sessions.prune_expired_sessions(now).await.unwrap(), 1);
    assert_eq!(sessions.delete_sessions_by_user(user.id).await.unwrap(), 1);
    assert!(sessions.find_session("live-digest", now).await.unwrap().is_none());
}
