//! 授权快照构建测试

use chrono::{TimeZone, Utc};
use rbac_system::{models::role::ScopeType, repository::RbacStore};
use uuid::Uuid;

mod common;
use common::{create_test_env, days_ago, days_ahead};

#[tokio::test]
async fn test_inactive_user_gets_no_session_despite_bindings() {
    let env = create_test_env();
    let perms = env.seed_permissions("a", &["a.view"]).await;
    let role = env.create_role("viewer", &perms).await;
    let user = env.create_plain_user("inactive").await;
    env.bind(user.id, role.id, days_ago(1), None).await;

    env.store.set_user_active(user.id, false).await.unwrap();

    let session = env.permissions().build_auth_session(user.id).await.unwrap();
    assert!(session.is_none());
}

#[tokio::test]
async fn test_unknown_user_gets_no_session() {
    let env = create_test_env();

    let session = env
        .permissions()
        .build_auth_session(Uuid::new_v4())
        .await
        .unwrap();
    assert!(session.is_none());
}

#[tokio::test]
async fn test_user_without_bindings_gets_empty_session() {
    let env = create_test_env();
    let user = env.create_plain_user("nobody").await;

    let session = env
        .permissions()
        .build_auth_session(user.id)
        .await
        .unwrap()
        .expect("active user must get a session");

    assert_eq!(session.user_id, user.id);
    assert_eq!(session.username, "nobody");
    assert_eq!(session.email, "nobody@example.com");
    assert!(session.roles.is_empty());
    assert!(session.permissions.is_empty());
    assert!(session.scopes.is_empty());
}

#[tokio::test]
async fn test_same_role_through_two_scopes_is_listed_once() {
    let env = create_test_env();
    let perms = env.seed_permissions("contracts", &["contracts.view"]).await;
    let role = env.create_role("contract-viewer", &perms).await;
    let user = env.create_plain_user("dana").await;

    env.bind_scoped(user.id, role.id, ScopeType::Department, Some("d-1"), days_ago(2), None)
        .await;
    env.bind_scoped(user.id, role.id, ScopeType::Customer, Some("c-7"), days_ago(1), None)
        .await;

    let session = env
        .permissions()
        .build_auth_session(user.id)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(session.roles.len(), 1);
    assert_eq!(session.roles[0].code, "contract-viewer");
    assert_eq!(session.permissions, vec!["contracts.view"]);
    assert_eq!(session.scopes.len(), 2);
    assert_eq!(session.scope_ids(ScopeType::Department), vec![Some("d-1")]);
    assert_eq!(session.scope_ids(ScopeType::Customer), vec![Some("c-7")]);
    assert!(!session.is_global());
}

#[tokio::test]
async fn test_permission_granted_by_two_roles_appears_once() {
    let env = create_test_env();
    let perms = env
        .seed_permissions("a", &["a.view", "a.edit", "a.delete"])
        .await;
    let editor = env.create_role("editor", &perms[..2]).await;
    let auditor = env.create_role("auditor", &[perms[0], perms[2]]).await;
    let user = env.create_plain_user("erin").await;

    env.bind(user.id, editor.id, days_ago(1), None).await;
    env.bind(user.id, auditor.id, days_ago(1), None).await;

    let session = env
        .permissions()
        .build_auth_session(user.id)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(session.roles.len(), 2);
    assert_eq!(session.permissions, vec!["a.delete", "a.edit", "a.view"]);
    assert!(session.has_role("editor"));
    assert!(session.has_role("auditor"));
}

#[tokio::test]
async fn test_expired_binding_does_not_contribute() {
    let env = create_test_env();
    let perms = env.seed_permissions("a", &["a.view"]).await;
    let role = env.create_role("temp", &perms).await;
    let user = env.create_plain_user("frank").await;

    env.bind(user.id, role.id, days_ago(10), Some(days_ago(1))).await;

    let session = env
        .permissions()
        .build_auth_session(user.id)
        .await
        .unwrap()
        .unwrap();

    assert!(session.roles.is_empty());
    assert!(!session.has_permission("a.view"));
    assert!(session.scopes.is_empty());
}

#[tokio::test]
async fn test_future_binding_does_not_contribute() {
    let env = create_test_env();
    let perms = env.seed_permissions("a", &["a.view"]).await;
    let role = env.create_role("upcoming", &perms).await;
    let user = env.create_plain_user("gina").await;

    env.bind(user.id, role.id, days_ahead(1), None).await;

    let session = env
        .permissions()
        .build_auth_session(user.id)
        .await
        .unwrap()
        .unwrap();

    assert!(session.roles.is_empty());
    assert!(session.permissions.is_empty());
}

#[tokio::test]
async fn test_build_at_fixed_instant_honours_window() {
    let env = create_test_env();
    let perms = env.seed_permissions("a", &["a.view", "a.edit"]).await;
    let role = env.create_role("editor", &perms).await;
    let user = env.create_plain_user("hank").await;

    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2024, 12, 31, 0, 0, 0).unwrap();
    env.bind(user.id, role.id, start, Some(end)).await;

    let inside = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let session = env
        .permissions()
        .build_auth_session_at(user.id, inside)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.permissions, vec!["a.edit", "a.view"]);

    // 窗口两端都包含
    let session = env
        .permissions()
        .build_auth_session_at(user.id, end)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.roles.len(), 1);

    let before = Utc.with_ymd_and_hms(2023, 12, 31, 0, 0, 0).unwrap();
    let session = env
        .permissions()
        .build_auth_session_at(user.id, before)
        .await
        .unwrap()
        .unwrap();
    assert!(session.permissions.is_empty());
}

#[tokio::test]
async fn test_global_binding_scope_is_exposed() {
    let env = create_test_env();
    let role = env.create_role("plain", &[]).await;
    let user = env.create_plain_user("ivan").await;
    env.bind(user.id, role.id, days_ago(1), None).await;

    let session = env
        .permissions()
        .build_auth_session(user.id)
        .await
        .unwrap()
        .unwrap();

    // 没有权限的角色仍然出现在快照中
    assert_eq!(session.roles.len(), 1);
    assert!(session.permissions.is_empty());
    assert!(session.is_global());
    assert_eq!(session.scope_ids(ScopeType::Global), vec![None]);
}
