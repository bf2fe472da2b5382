//! Database repository layer
//!
//! Services talk to storage through the [`RbacStore`] and [`SessionStore`]
//! traits. Postgres implementations live in `rbac_repo` / `session_repo`;
//! `memory` holds an in-process implementation of both.

pub mod memory;
pub mod rbac_repo;
pub mod session_repo;

pub use memory::MemoryStore;
pub use rbac_repo::RbacRepository;
pub use session_repo::SessionRepository;

use crate::{
    error::AppError,
    models::{role::*, session::SessionRecord, user::*},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// 用户、角色、权限与角色绑定的持久化
#[async_trait]
pub trait RbacStore: Send + Sync {
    /// 存储可用性检查
    async fn ping(&self) -> Result<(), AppError>;

    // ==================== Users ====================

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn create_user(&self, user: &NewUser) -> Result<User, AppError>;

    async fn set_user_active(&self, id: Uuid, is_active: bool) -> Result<Option<User>, AppError>;

    async fn touch_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError>;

    // ==================== Resolution ====================

    /// 用户在 `at` 时刻生效的绑定，连同角色及其全部权限码
    async fn binding_grants_for_user(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Vec<BindingGrant>, AppError>;

    // ==================== Catalog ====================

    async fn upsert_module(&self, code: &str, name: &str) -> Result<Module, AppError>;

    async fn upsert_permission(
        &self,
        module_id: Uuid,
        code: &str,
        name: &str,
    ) -> Result<Permission, AppError>;

    /// 按模块代码、权限代码排序
    async fn list_permissions(
        &self,
        module_code: Option<&str>,
    ) -> Result<Vec<PermissionItem>, AppError>;

    /// 统计 `ids` 中真实存在的权限数量
    async fn count_permissions(&self, ids: &[Uuid]) -> Result<i64, AppError>;

    // ==================== Roles ====================

    async fn find_role_by_id(&self, id: Uuid) -> Result<Option<Role>, AppError>;

    async fn find_role_by_code(&self, code: &str) -> Result<Option<Role>, AppError>;

    /// 代码重复时返回 `Conflict`
    async fn create_role(&self, req: &CreateRoleRequest) -> Result<Role, AppError>;

    async fn update_role(
        &self,
        id: Uuid,
        patch: &UpdateRoleRequest,
    ) -> Result<Option<Role>, AppError>;

    async fn delete_role(&self, id: Uuid) -> Result<bool, AppError>;

    /// 返回 (总数, 当前页)
    async fn list_roles(
        &self,
        query: &ListRolesQuery,
    ) -> Result<(i64, Vec<RoleListItem>), AppError>;

    async fn role_permission_ids(&self, role_id: Uuid) -> Result<Vec<Uuid>, AppError>;

    /// 在单个事务内删除角色的全部权限并写入新集合
    async fn replace_role_permissions(
        &self,
        role_id: Uuid,
        permission_ids: &[Uuid],
    ) -> Result<(), AppError>;

    // ==================== Role Bindings ====================

    async fn count_bindings_for_role(&self, role_id: Uuid) -> Result<i64, AppError>;

    /// 曾经绑定过该角色的全部用户（含已过期绑定），去重
    async fn user_ids_for_role(&self, role_id: Uuid) -> Result<Vec<Uuid>, AppError>;

    async fn create_binding(&self, binding: &NewRoleBinding) -> Result<UserRoleBinding, AppError>;

    async fn delete_binding(&self, id: Uuid) -> Result<Option<UserRoleBinding>, AppError>;

    async fn list_user_bindings(&self, user_id: Uuid) -> Result<Vec<RoleBindingView>, AppError>;
}

/// 会话记录的持久化
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_session(&self, record: &SessionRecord) -> Result<(), AppError>;

    /// 只返回未过期的会话
    async fn find_session(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionRecord>, AppError>;

    /// 滑动过期：刷新最近访问时间与过期时间
    async fn touch_session(
        &self,
        id: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    async fn delete_session(&self, id: &str) -> Result<bool, AppError>;

    /// 删除回指该用户或快照属于该用户的全部会话
    async fn delete_sessions_by_user(&self, user_id: Uuid) -> Result<u64, AppError>;

    async fn prune_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}
