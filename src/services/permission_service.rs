//! 权限解析服务
//! 将用户当前生效的角色绑定展开为可缓存在会话中的授权快照

use crate::{
    error::AppError,
    models::{
        role::BindingGrant,
        session::{AuthRole, AuthSessionData, EffectiveScope},
        user::User,
    },
    repository::RbacStore,
};
use chrono::{DateTime, Utc};
use std::{
    collections::{BTreeSet, HashSet},
    sync::Arc,
};
use uuid::Uuid;

pub struct PermissionService {
    store: Arc<dyn RbacStore>,
}

impl PermissionService {
    pub fn new(store: Arc<dyn RbacStore>) -> Self {
        Self { store }
    }

    /// 构建用户的授权快照
    ///
    /// 用户不存在或已停用时返回 `None`；没有生效绑定时返回空快照。
    pub async fn build_auth_session(
        &self,
        user_id: Uuid,
    ) -> Result<Option<AuthSessionData>, AppError> {
        self.build_auth_session_at(user_id, Utc::now()).await
    }

    /// 以指定时刻判断绑定是否生效
    pub async fn build_auth_session_at(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<AuthSessionData>, AppError> {
        let user = match self.store.find_user_by_id(user_id).await? {
            Some(user) if user.is_active => user,
            Some(_) => {
                tracing::debug!(user_id = %user_id, "User is inactive, no authorization");
                return Ok(None);
            }
            None => {
                tracing::debug!(user_id = %user_id, "User not found, no authorization");
                return Ok(None);
            }
        };

        let grants = self.store.binding_grants_for_user(user_id, at).await?;
        let session = flatten_grants(&user, &grants, at);

        tracing::debug!(
            user_id = %user_id,
            roles = session.roles.len(),
            permissions = session.permissions.len(),
            scopes = session.scopes.len(),
            "Auth session built"
        );

        Ok(Some(session))
    }
}

/// 合并生效绑定：角色按 ID 去重（保持首次出现顺序），权限取并集，
/// 每个绑定贡献一个范围
fn flatten_grants(user: &User, grants: &[BindingGrant], at: DateTime<Utc>) -> AuthSessionData {
    let mut seen_roles = HashSet::new();
    let mut roles: Vec<AuthRole> = Vec::new();
    let mut permissions: BTreeSet<&str> = BTreeSet::new();
    let mut scopes: Vec<EffectiveScope> = Vec::new();

    for grant in grants.iter().filter(|g| g.is_active_at(at)) {
        if seen_roles.insert(grant.role.id) {
            roles.push(grant.role.clone());
        }
        permissions.extend(grant.permission_codes.iter().map(String::as_str));
        scopes.push(grant.scope.clone());
    }

    AuthSessionData {
        user_id: user.id,
        username: user.username.clone(),
        email: user.email.clone(),
        employee_id: user.employee_id,
        roles,
        permissions: permissions.into_iter().map(str::to_string).collect(),
        scopes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::role::ScopeType;
    use chrono::Duration;

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "carol".to_string(),
            email: "carol@example.com".to_string(),
            password_hash: String::new(),
            display_name: None,
            is_active: true,
            last_login_at: None,
            employee_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn grant(role: &AuthRole, start_at: DateTime<Utc>, codes: &[&str]) -> BindingGrant {
        BindingGrant {
            binding_id: Uuid::new_v4(),
            role: role.clone(),
            scope: EffectiveScope {
                scope_type: ScopeType::Global,
                scope_id: None,
            },
            start_at,
            end_at: None,
            permission_codes: codes.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn test_flatten_ignores_grants_outside_window() {
        let now = Utc::now();
        let role = AuthRole {
            id: Uuid::new_v4(),
            code: "future".to_string(),
            name: "Future".to_string(),
        };

        let session = flatten_grants(
            &user(),
            &[grant(&role, now + Duration::hours(1), &["a.view"])],
            now,
        );

        assert!(session.roles.is_empty());
        assert!(session.permissions.is_empty());
        assert!(session.scopes.is_empty());
    }

    #[test]
    fn test_flatten_sorts_and_dedupes_permissions() {
        let now = Utc::now();
        let role = AuthRole {
            id: Uuid::new_v4(),
            code: "editor".to_string(),
            name: "Editor".to_string(),
        };
        let start = now - Duration::days(1);

        let session = flatten_grants(
            &user(),
            &[
                grant(&role, start, &["b.edit", "a.view"]),
                grant(&role, start, &["a.view"]),
            ],
            now,
        );

        assert_eq!(session.roles.len(), 1);
        assert_eq!(session.permissions, vec!["a.view", "b.edit"]);
        assert_eq!(session.scopes.len(), 2);
    }
}
