//! RBAC repository (用户 / 角色 / 权限 / 绑定数据访问)

use super::RbacStore;
use crate::{
    db::{self, HealthStatus},
    error::AppError,
    models::{
        role::*,
        session::{AuthRole, EffectiveScope},
        user::*,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub struct RbacRepository {
    db: PgPool,
}

impl RbacRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/// 绑定 + 角色 + 权限的扁平行，一个绑定对应多行
#[derive(sqlx::FromRow)]
struct GrantRow {
    binding_id: Uuid,
    scope_type: ScopeType,
    scope_id: Option<String>,
    start_at: DateTime<Utc>,
    end_at: Option<DateTime<Utc>>,
    role_id: Uuid,
    role_code: String,
    role_name: String,
    permission_code: Option<String>,
}

/// 按 binding_id 聚合（行已按绑定排序）
fn group_grant_rows(rows: Vec<GrantRow>) -> Vec<BindingGrant> {
    let mut grants: Vec<BindingGrant> = Vec::new();

    for row in rows {
        let same_binding = grants
            .last()
            .is_some_and(|g| g.binding_id == row.binding_id);

        if !same_binding {
            grants.push(BindingGrant {
                binding_id: row.binding_id,
                role: AuthRole {
                    id: row.role_id,
                    code: row.role_code,
                    name: row.role_name,
                },
                scope: EffectiveScope {
                    scope_type: row.scope_type,
                    scope_id: row.scope_id,
                },
                start_at: row.start_at,
                end_at: row.end_at,
                permission_codes: Vec::new(),
            });
        }

        if let (Some(code), Some(grant)) = (row.permission_code, grants.last_mut()) {
            grant.permission_codes.push(code);
        }
    }

    grants
}

/// ILIKE 模式，转义通配符
fn like_pattern(keyword: &str) -> String {
    let escaped = keyword
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[async_trait]
impl RbacStore for RbacRepository {
    async fn ping(&self) -> Result<(), AppError> {
        match db::health_check(&self.db).await {
            HealthStatus::Healthy => Ok(()),
            HealthStatus::Unhealthy(msg) => Err(AppError::Internal(msg)),
        }
    }

    // ==================== Users ====================

    /// 根据 ID 查找用户
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        Ok(user)
    }

    /// 根据邮箱查找用户（不区分大小写）
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(email.trim())
            .fetch_optional(&self.db)
            .await?;

        Ok(user)
    }

    /// 创建用户
    async fn create_user(&self, user: &NewUser) -> Result<User, AppError> {
        let created = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password_hash, display_name, employee_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.display_name)
        .bind(user.employee_id)
        .fetch_one(&self.db)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict(format!("User already exists: {}", user.email))
            }
            other => AppError::Database(other),
        })?;

        Ok(created)
    }

    /// 启用 / 停用用户
    async fn set_user_active(&self, id: Uuid, is_active: bool) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET is_active = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(is_active)
        .fetch_optional(&self.db)
        .await?;

        Ok(user)
    }

    /// 记录最近登录时间
    async fn touch_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET last_login_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    // ==================== Resolution ====================

    /// 一次查询取回用户当前生效的绑定、角色与权限
    async fn binding_grants_for_user(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Vec<BindingGrant>, AppError> {
        let rows = sqlx::query_as::<_, GrantRow>(
            r#"
            SELECT
                b.id AS binding_id,
                b.scope_type,
                b.scope_id,
                b.start_at,
                b.end_at,
                r.id AS role_id,
                r.code AS role_code,
                r.name AS role_name,
                p.code AS permission_code
            FROM user_role_bindings b
            JOIN roles r ON r.id = b.role_id
            LEFT JOIN role_permissions rp ON rp.role_id = r.id
            LEFT JOIN permissions p ON p.id = rp.permission_id
            WHERE b.user_id = $1
                AND b.start_at <= $2
                AND (b.end_at IS NULL OR b.end_at >= $2)
            ORDER BY b.start_at, b.id, p.code
            "#,
        )
        .bind(user_id)
        .bind(at)
        .fetch_all(&self.db)
        .await?;

        Ok(group_grant_rows(rows))
    }

    // ==================== Catalog ====================

    async fn upsert_module(&self, code: &str, name: &str) -> Result<Module, AppError> {
        let module = sqlx::query_as::<_, Module>(
            r#"
            INSERT INTO modules (code, name)
            VALUES ($1, $2)
            ON CONFLICT (code) DO UPDATE SET name = EXCLUDED.name
            RETURNING *
            "#,
        )
        .bind(code)
        .bind(name)
        .fetch_one(&self.db)
        .await?;

        Ok(module)
    }

    async fn upsert_permission(
        &self,
        module_id: Uuid,
        code: &str,
        name: &str,
    ) -> Result<Permission, AppError> {
        let permission = sqlx::query_as::<_, Permission>(
            r#"
            INSERT INTO permissions (code, name, module_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (code) DO UPDATE SET name = EXCLUDED.name, module_id = EXCLUDED.module_id
            RETURNING *
            "#,
        )
        .bind(code)
        .bind(name)
        .bind(module_id)
        .fetch_one(&self.db)
        .await?;

        Ok(permission)
    }

    /// 列出权限目录
    async fn list_permissions(
        &self,
        module_code: Option<&str>,
    ) -> Result<Vec<PermissionItem>, AppError> {
        let permissions = sqlx::query_as::<_, PermissionItem>(
            r#"
            SELECT
                p.id,
                p.code,
                p.name,
                m.code AS module_code,
                m.name AS module_name
            FROM permissions p
            JOIN modules m ON m.id = p.module_id
            WHERE ($1::text IS NULL OR m.code = $1)
            ORDER BY m.code, p.code
            "#,
        )
        .bind(module_code)
        .fetch_all(&self.db)
        .await?;

        Ok(permissions)
    }

    async fn count_permissions(&self, ids: &[Uuid]) -> Result<i64, AppError> {
        let count: i64 = sqlx::query("SELECT COUNT(*) FROM permissions WHERE id = ANY($1)")
            .bind(ids)
            .fetch_one(&self.db)
            .await?
            .get(0);

        Ok(count)
    }

    // ==================== Roles ====================

    /// 根据 ID 查找角色
    async fn find_role_by_id(&self, id: Uuid) -> Result<Option<Role>, AppError> {
        let role = sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        Ok(role)
    }

    /// 根据代码查找角色
    async fn find_role_by_code(&self, code: &str) -> Result<Option<Role>, AppError> {
        let role = sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.db)
            .await?;

        Ok(role)
    }

    /// 创建角色
    async fn create_role(&self, req: &CreateRoleRequest) -> Result<Role, AppError> {
        let role = sqlx::query_as::<_, Role>(
            r#"
            INSERT INTO roles (code, name, description)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(&req.code)
        .bind(&req.name)
        .bind(&req.description)
        .fetch_one(&self.db)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict(format!("Role code already exists: {}", req.code))
            }
            other => AppError::Database(other),
        })?;

        Ok(role)
    }

    /// 更新角色，未提供的字段保持原值
    async fn update_role(
        &self,
        id: Uuid,
        patch: &UpdateRoleRequest,
    ) -> Result<Option<Role>, AppError> {
        let role = sqlx::query_as::<_, Role>(
            r#"
            UPDATE roles
            SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&patch.name)
        .bind(&patch.description)
        .fetch_optional(&self.db)
        .await?;

        Ok(role)
    }

    /// 删除角色（role_permissions 级联删除，绑定存在时外键拒绝）
    async fn delete_role(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                    AppError::Conflict(format!("Role is still assigned to users: {}", id))
                }
                other => AppError::Database(other),
            })?;

        Ok(result.rows_affected() > 0)
    }

    /// 分页列出角色，附带实时绑定数
    async fn list_roles(
        &self,
        query: &ListRolesQuery,
    ) -> Result<(i64, Vec<RoleListItem>), AppError> {
        let pattern = query.keyword().map(like_pattern);

        let total: i64 = sqlx::query(
            r#"
            SELECT COUNT(*)
            FROM roles r
            WHERE ($1::text IS NULL OR r.code ILIKE $1 OR r.name ILIKE $1)
            "#,
        )
        .bind(&pattern)
        .fetch_one(&self.db)
        .await?
        .get(0);

        let items = sqlx::query_as::<_, RoleListItem>(
            r#"
            SELECT
                r.id,
                r.code,
                r.name,
                r.description,
                COUNT(b.id) AS binding_count,
                COUNT(DISTINCT b.user_id) AS user_count,
                r.created_at,
                r.updated_at
            FROM roles r
            LEFT JOIN user_role_bindings b ON b.role_id = r.id
            WHERE ($1::text IS NULL OR r.code ILIKE $1 OR r.name ILIKE $1)
            GROUP BY r.id
            ORDER BY r.created_at DESC, r.code
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(&pattern)
        .bind(query.page_size())
        .bind(query.offset())
        .fetch_all(&self.db)
        .await?;

        Ok((total, items))
    }

    /// 获取角色已分配的权限 ID
    async fn role_permission_ids(&self, role_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT permission_id FROM role_permissions WHERE role_id = $1",
        )
        .bind(role_id)
        .fetch_all(&self.db)
        .await?;

        Ok(ids)
    }

    /// 替换角色权限（单事务：先删后插）
    async fn replace_role_permissions(
        &self,
        role_id: Uuid,
        permission_ids: &[Uuid],
    ) -> Result<(), AppError> {
        let mut tx = self.db.begin().await?;

        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(role_id)
            .execute(&mut *tx)
            .await?;

        if !permission_ids.is_empty() {
            sqlx::query(
                r#"
                INSERT INTO role_permissions (role_id, permission_id)
                SELECT $1, UNNEST($2::uuid[])
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(role_id)
            .bind(permission_ids)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    // ==================== Role Bindings ====================

    async fn count_bindings_for_role(&self, role_id: Uuid) -> Result<i64, AppError> {
        let count: i64 = sqlx::query("SELECT COUNT(*) FROM user_role_bindings WHERE role_id = $1")
            .bind(role_id)
            .fetch_one(&self.db)
            .await?
            .get(0);

        Ok(count)
    }

    async fn user_ids_for_role(&self, role_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT DISTINCT user_id FROM user_role_bindings WHERE role_id = $1",
        )
        .bind(role_id)
        .fetch_all(&self.db)
        .await?;

        Ok(ids)
    }

    /// 为用户分配角色
    async fn create_binding(&self, binding: &NewRoleBinding) -> Result<UserRoleBinding, AppError> {
        let created = sqlx::query_as::<_, UserRoleBinding>(
            r#"
            INSERT INTO user_role_bindings
                (user_id, role_id, scope_type, scope_id, start_at, end_at, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(binding.user_id)
        .bind(binding.role_id)
        .bind(binding.scope_type)
        .bind(&binding.scope_id)
        .bind(binding.start_at)
        .bind(binding.end_at)
        .bind(binding.created_by)
        .fetch_one(&self.db)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => AppError::NotFound(
                format!("user {} or role {}", binding.user_id, binding.role_id),
            ),
            other => AppError::Database(other),
        })?;

        Ok(created)
    }

    /// 撤销绑定，返回被删除的行
    async fn delete_binding(&self, id: Uuid) -> Result<Option<UserRoleBinding>, AppError> {
        let deleted = sqlx::query_as::<_, UserRoleBinding>(
            "DELETE FROM user_role_bindings WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(deleted)
    }

    /// 获取用户的角色绑定
    async fn list_user_bindings(&self, user_id: Uuid) -> Result<Vec<RoleBindingView>, AppError> {
        let bindings = sqlx::query_as::<_, RoleBindingView>(
            r#"
            SELECT
                b.id,
                b.user_id,
                b.role_id,
                r.code AS role_code,
                r.name AS role_name,
                b.scope_type,
                b.scope_id,
                b.start_at,
                b.end_at,
                b.created_by,
                b.created_at
            FROM user_role_bindings b
            JOIN roles r ON r.id = b.role_id
            WHERE b.user_id = $1
            ORDER BY b.start_at, b.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        Ok(bindings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(binding_id: Uuid, role_id: Uuid, permission: Option<&str>) -> GrantRow {
        GrantRow {
            binding_id,
            scope_type: ScopeType::Global,
            scope_id: None,
            start_at: Utc::now(),
            end_at: None,
            role_id,
            role_code: "editor".to_string(),
            role_name: "Editor".to_string(),
            permission_code: permission.map(|p| p.to_string()),
        }
    }

    #[test]
    fn test_group_grant_rows_by_binding() {
        let role_id = Uuid::new_v4();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        let grants = group_grant_rows(vec![
            row(first, role_id, Some("a.edit")),
            row(first, role_id, Some("a.view")),
            row(second, role_id, None),
        ]);

        assert_eq!(grants.len(), 2);
        assert_eq!(grants[0].permission_codes, vec!["a.edit", "a.view"]);
        assert!(grants[1].permission_codes.is_empty());
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("edit"), "%edit%");
        assert_eq!(like_pattern("100%_"), "%100\\%\\_%");
    }
}
