//! RBAC 管理服务
//! 角色、角色权限与角色绑定的变更；任何会改变授权快照的变更在提交后
//! 都会使受影响用户的会话失效

use crate::{
    error::AppError,
    models::{role::*, session::InvalidationReport, user::User},
    repository::RbacStore,
    services::SessionService,
};
use chrono::Utc;
use std::{
    collections::{BTreeSet, HashSet},
    sync::Arc,
};
use uuid::Uuid;
use validator::Validate;

pub struct RbacAdminService {
    store: Arc<dyn RbacStore>,
    sessions: Arc<SessionService>,
}

impl RbacAdminService {
    pub fn new(store: Arc<dyn RbacStore>, sessions: Arc<SessionService>) -> Self {
        Self { store, sessions }
    }

    // ==================== Roles ====================

    /// 创建角色，代码先归一化（去空白、小写）再检查唯一性
    pub async fn create_role(&self, req: CreateRoleRequest) -> Result<Role, AppError> {
        let req = req.normalized();
        req.validate()?;

        if !is_valid_role_code(&req.code) {
            return Err(AppError::Validation(format!(
                "code: must match [a-z0-9._-]+, got '{}'",
                req.code
            )));
        }

        if self.store.find_role_by_code(&req.code).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "Role code already exists: {}",
                req.code
            )));
        }

        let role = self.store.create_role(&req).await?;

        tracing::info!(role_id = %role.id, code = %role.code, "Role created");

        Ok(role)
    }

    /// 更新角色名称 / 描述
    pub async fn update_role(
        &self,
        role_id: Uuid,
        patch: UpdateRoleRequest,
    ) -> Result<Role, AppError> {
        let patch = patch.normalized();
        patch.validate()?;

        let role = self
            .store
            .update_role(role_id, &patch)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("role {}", role_id)))?;

        // 快照中包含角色名称
        if patch.name.is_some() {
            self.invalidate_role_holders(role_id).await;
        }

        tracing::info!(role_id = %role_id, "Role updated");

        Ok(role)
    }

    /// 删除角色；仍有绑定引用时拒绝
    pub async fn delete_role(&self, role_id: Uuid) -> Result<(), AppError> {
        self.require_role(role_id).await?;

        let bindings = self.store.count_bindings_for_role(role_id).await?;
        if bindings > 0 {
            return Err(AppError::Conflict(format!(
                "Role {} is still referenced by {} binding(s)",
                role_id, bindings
            )));
        }

        if !self.store.delete_role(role_id).await? {
            return Err(AppError::NotFound(format!("role {}", role_id)));
        }

        tracing::info!(role_id = %role_id, "Role deleted");

        Ok(())
    }

    /// 分页列出角色
    pub async fn get_roles(&self, query: ListRolesQuery) -> Result<Page<RoleListItem>, AppError> {
        query.validate()?;

        let (total, items) = self.store.list_roles(&query).await?;

        Ok(Page {
            page: query.page(),
            page_size: query.page_size(),
            total,
            items,
        })
    }

    /// 角色详情：附带目录中每个权限及其是否已分配
    pub async fn get_role_detail(&self, role_id: Uuid) -> Result<RoleDetail, AppError> {
        let role = self.require_role(role_id).await?;

        let assigned: HashSet<Uuid> = self
            .store
            .role_permission_ids(role_id)
            .await?
            .into_iter()
            .collect();

        let permissions = self
            .store
            .list_permissions(None)
            .await?
            .into_iter()
            .map(|p| RoleDetailPermission {
                assigned: assigned.contains(&p.id),
                id: p.id,
                code: p.code,
                name: p.name,
                module_code: p.module_code,
                module_name: p.module_name,
            })
            .collect();

        Ok(RoleDetail {
            id: role.id,
            code: role.code,
            name: role.name,
            description: role.description,
            permissions,
        })
    }

    /// 权限目录，可按模块过滤
    pub async fn get_all_permissions(
        &self,
        module_code: Option<&str>,
    ) -> Result<Vec<PermissionItem>, AppError> {
        let module_code = module_code.map(str::trim).filter(|m| !m.is_empty());
        self.store.list_permissions(module_code).await
    }

    /// 替换角色的全部权限
    ///
    /// 空列表表示撤销全部权限。写入在单个事务内完成，提交后再使
    /// 所有曾绑定该角色的用户会话失效。
    pub async fn update_role_permissions(
        &self,
        role_id: Uuid,
        permission_ids: Vec<Uuid>,
    ) -> Result<RolePermissionsUpdate, AppError> {
        self.require_role(role_id).await?;

        let ids: Vec<Uuid> = permission_ids
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if !ids.is_empty() {
            let found = self.store.count_permissions(&ids).await?;
            if found != ids.len() as i64 {
                return Err(AppError::UnknownPermissions {
                    expected: ids.len(),
                    found,
                });
            }
        }

        let affected = self.store.user_ids_for_role(role_id).await?;

        self.store.replace_role_permissions(role_id, &ids).await?;

        tracing::info!(
            role_id = %role_id,
            permission_count = ids.len(),
            affected_users = affected.len(),
            "Role permissions replaced"
        );

        let report = self.sessions.invalidate_users(&affected).await;

        Ok(RolePermissionsUpdate {
            role_id,
            permission_count: ids.len(),
            affected_users: affected.len(),
            sessions_cleared: report.sessions_removed,
        })
    }

    // ==================== Role Bindings ====================

    /// 为用户分配角色
    pub async fn assign_role(
        &self,
        user_id: Uuid,
        req: AssignRoleRequest,
        created_by: Option<Uuid>,
    ) -> Result<UserRoleBinding, AppError> {
        let start_at = req.start_at.unwrap_or_else(Utc::now);
        if let Some(end_at) = req.end_at {
            if end_at < start_at {
                return Err(AppError::Validation(
                    "end_at: must not be earlier than start_at".to_string(),
                ));
            }
        }

        let scope_id = req
            .scope_id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        if req.scope_type == ScopeType::Global && scope_id.is_some() {
            return Err(AppError::Validation(
                "scope_id: must be empty for a global binding".to_string(),
            ));
        }

        self.require_user(user_id).await?;
        self.require_role(req.role_id).await?;

        let binding = self
            .store
            .create_binding(&NewRoleBinding {
                user_id,
                role_id: req.role_id,
                scope_type: req.scope_type,
                scope_id,
                start_at,
                end_at: req.end_at,
                created_by,
            })
            .await?;

        tracing::info!(
            binding_id = %binding.id,
            user_id = %user_id,
            role_id = %binding.role_id,
            scope_type = %binding.scope_type,
            "Role assigned"
        );

        self.sessions.invalidate_users(&[user_id]).await;

        Ok(binding)
    }

    /// 撤销角色绑定
    pub async fn revoke_binding(&self, binding_id: Uuid) -> Result<UserRoleBinding, AppError> {
        let binding = self
            .store
            .delete_binding(binding_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("binding {}", binding_id)))?;

        tracing::info!(
            binding_id = %binding_id,
            user_id = %binding.user_id,
            role_id = %binding.role_id,
            "Role binding revoked"
        );

        self.sessions.invalidate_users(&[binding.user_id]).await;

        Ok(binding)
    }

    pub async fn list_user_bindings(&self, user_id: Uuid) -> Result<Vec<RoleBindingView>, AppError> {
        self.require_user(user_id).await?;
        self.store.list_user_bindings(user_id).await
    }

    // ==================== Users ====================

    /// 启用 / 停用用户；停用立即使其会话失效
    pub async fn set_user_active(&self, user_id: Uuid, is_active: bool) -> Result<User, AppError> {
        let user = self
            .store
            .set_user_active(user_id, is_active)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {}", user_id)))?;

        tracing::info!(user_id = %user_id, is_active, "User activation changed");

        self.sessions.invalidate_users(&[user_id]).await;

        Ok(user)
    }

    // ==================== Helpers ====================

    async fn require_role(&self, role_id: Uuid) -> Result<Role, AppError> {
        self.store
            .find_role_by_id(role_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("role {}", role_id)))
    }

    async fn require_user(&self, user_id: Uuid) -> Result<User, AppError> {
        self.store
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {}", user_id)))
    }

    async fn invalidate_role_holders(&self, role_id: Uuid) -> InvalidationReport {
        match self.store.user_ids_for_role(role_id).await {
            Ok(users) => self.sessions.invalidate_users(&users).await,
            Err(e) => {
                tracing::error!(role_id = %role_id, error = %e, "Failed to resolve role holders");
                InvalidationReport {
                    failures: 1,
                    ..Default::default()
                }
            }
        }
    }
}
