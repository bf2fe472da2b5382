//! 启动初始化
//!
//! 把静态权限目录同步到存储，保证内置系统管理员角色持有全部权限，
//! 并按配置创建初始管理员账户。可重复执行。

use crate::{
    auth::{
        catalog::{self, SYSTEM_ADMIN_ROLE},
        password::PasswordHasher,
    },
    config::BootstrapConfig,
    error::AppError,
    models::{role::*, user::NewUser},
    repository::RbacStore,
    services::RbacAdminService,
};
use secrecy::ExposeSecret;
use std::collections::BTreeSet;
use uuid::Uuid;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    pub modules: usize,
    pub permissions: usize,
    pub admin_role_updated: bool,
    pub admin_user_created: bool,
}

/// 执行全部初始化步骤
pub async fn run(
    store: &dyn RbacStore,
    admin: &RbacAdminService,
    config: &BootstrapConfig,
) -> Result<BootstrapReport, AppError> {
    let (modules, permission_ids) = sync_catalog(store).await?;
    let permissions = permission_ids.len();
    let (role, admin_role_updated) = ensure_system_admin_role(store, admin, permission_ids).await?;

    let admin_user_created = match (&config.admin_email, &config.admin_password) {
        (Some(email), Some(password)) => {
            ensure_admin_user(store, admin, role.id, email, password.expose_secret()).await?
        }
        _ => false,
    };

    let report = BootstrapReport {
        modules,
        permissions,
        admin_role_updated,
        admin_user_created,
    };

    tracing::info!(
        modules = report.modules,
        permissions = report.permissions,
        admin_role_updated = report.admin_role_updated,
        admin_user_created = report.admin_user_created,
        "Bootstrap completed"
    );

    Ok(report)
}

/// 同步权限目录，返回 (模块数, 目录内全部权限 ID)
pub async fn sync_catalog(store: &dyn RbacStore) -> Result<(usize, Vec<Uuid>), AppError> {
    let mut ids = Vec::new();

    for module in catalog::CATALOG {
        let stored = store.upsert_module(module.code, module.name).await?;
        for permission in module.permissions {
            let p = store
                .upsert_permission(stored.id, permission.code, permission.name)
                .await?;
            ids.push(p.id);
        }
    }

    Ok((catalog::CATALOG.len(), ids))
}

/// 确保系统管理员角色存在且持有全部目录权限；仅在集合变化时写入
async fn ensure_system_admin_role(
    store: &dyn RbacStore,
    admin: &RbacAdminService,
    permission_ids: Vec<Uuid>,
) -> Result<(Role, bool), AppError> {
    let role = match store.find_role_by_code(SYSTEM_ADMIN_ROLE).await? {
        Some(role) => role,
        None => {
            admin
                .create_role(CreateRoleRequest {
                    code: SYSTEM_ADMIN_ROLE.to_string(),
                    name: "System administrator".to_string(),
                    description: Some("Holds every permission in the catalog".to_string()),
                })
                .await?
        }
    };

    let wanted: BTreeSet<Uuid> = permission_ids.into_iter().collect();
    let current: BTreeSet<Uuid> = store.role_permission_ids(role.id).await?.into_iter().collect();

    if wanted.is_subset(&current) {
        return Ok((role, false));
    }

    // 保留目录之外手工添加的权限
    let merged: Vec<Uuid> = wanted.union(&current).copied().collect();
    admin.update_role_permissions(role.id, merged).await?;

    Ok((role, true))
}

/// 按邮箱创建初始管理员，并授予全局系统管理员角色
async fn ensure_admin_user(
    store: &dyn RbacStore,
    admin: &RbacAdminService,
    admin_role_id: Uuid,
    email: &str,
    password: &str,
) -> Result<bool, AppError> {
    if store.find_user_by_email(email).await?.is_some() {
        tracing::debug!(email = %email, "Bootstrap admin user already exists");
        return Ok(false);
    }

    PasswordHasher::validate_length(password)?;
    let password_hash = PasswordHasher::new()?.hash(password)?;

    let username = email
        .split('@')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("admin")
        .to_string();

    let user = store
        .create_user(&NewUser {
            username,
            email: email.trim().to_string(),
            password_hash,
            display_name: Some("Administrator".to_string()),
            employee_id: None,
        })
        .await?;

    admin
        .assign_role(
            user.id,
            AssignRoleRequest {
                role_id: admin_role_id,
                scope_type: ScopeType::Global,
                scope_id: None,
                start_at: None,
                end_at: None,
            },
            None,
        )
        .await?;

    tracing::info!(user_id = %user.id, email = %email, "Bootstrap admin user created");

    Ok(true)
}
