//! Role, permission and role binding domain models

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::Validate;

use super::session::{AuthRole, EffectiveScope};

static ROLE_CODE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9._-]+$").expect("role code pattern must compile"));

/// Scope qualifier of a role binding
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "scope_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ScopeType {
    #[default]
    Global,
    Department,
    Customer,
    Contract,
}

impl fmt::Display for ScopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScopeType::Global => "global",
            ScopeType::Department => "department",
            ScopeType::Customer => "customer",
            ScopeType::Contract => "contract",
        };
        f.write_str(s)
    }
}

/// Functional area owning a group of permissions
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Module {
    pub id: Uuid,
    pub code: String,
    pub name: String,
}

/// Atomic grantable capability
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Permission {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub module_id: Uuid,
}

/// Role
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Role {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    pub fn summary(&self) -> AuthRole {
        AuthRole {
            id: self.id,
            code: self.code.clone(),
            name: self.name.clone(),
        }
    }
}

/// Role <-> permission link
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, sqlx::FromRow)]
pub struct RolePermission {
    pub role_id: Uuid,
    pub permission_id: Uuid,
}

/// Role binding (user <-> role with scope and time window)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRoleBinding {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub scope_type: ScopeType,
    pub scope_id: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl UserRoleBinding {
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        is_window_active(self.start_at, self.end_at, at)
    }
}

/// A binding is active at `at` iff `start_at <= at` and the window is
/// open-ended or `end_at >= at`.
pub fn is_window_active(
    start_at: DateTime<Utc>,
    end_at: Option<DateTime<Utc>>,
    at: DateTime<Utc>,
) -> bool {
    start_at <= at && end_at.map_or(true, |end| end >= at)
}

/// Binding joined with its role, for admin listings
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RoleBindingView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub role_code: String,
    pub role_name: String,
    pub scope_type: ScopeType,
    pub scope_id: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// One binding of a user, with its role and every permission code the role
/// carries. Input of the session resolution.
#[derive(Debug, Clone)]
pub struct BindingGrant {
    pub binding_id: Uuid,
    pub role: AuthRole,
    pub scope: EffectiveScope,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    pub permission_codes: Vec<String>,
}

impl BindingGrant {
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        is_window_active(self.start_at, self.end_at, at)
    }
}

// ==================== Requests ====================

/// Lower-cases and trims a role code before any comparison
pub fn normalize_role_code(code: &str) -> String {
    code.trim().to_lowercase()
}

pub fn is_valid_role_code(code: &str) -> bool {
    ROLE_CODE_PATTERN.is_match(code)
}

fn trimmed_or_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Create role request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateRoleRequest {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
}

impl CreateRoleRequest {
    pub fn normalized(self) -> Self {
        Self {
            code: normalize_role_code(&self.code),
            name: self.name.trim().to_string(),
            description: trimmed_or_none(self.description),
        }
    }
}

/// Partial role update. `None` keeps the previous value.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateRoleRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
}

impl UpdateRoleRequest {
    pub fn normalized(self) -> Self {
        Self {
            name: self.name.map(|n| n.trim().to_string()),
            description: trimmed_or_none(self.description),
        }
    }

    pub fn apply(&self, role: &mut Role) {
        if let Some(name) = &self.name {
            role.name = name.clone();
        }
        if let Some(description) = &self.description {
            role.description = Some(description.clone());
        }
    }
}

/// Role list query
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ListRolesQuery {
    #[validate(range(min = 1, max = 1_000_000))]
    pub page: Option<i64>,
    #[validate(range(min = 1, max = 200))]
    pub page_size: Option<i64>,
    pub keyword: Option<String>,
}

impl ListRolesQuery {
    pub const DEFAULT_PAGE_SIZE: i64 = 20;

    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1)
    }

    pub fn page_size(&self) -> i64 {
        self.page_size.unwrap_or(Self::DEFAULT_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.page_size()
    }

    pub fn keyword(&self) -> Option<&str> {
        self.keyword
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

/// Permission list query
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListPermissionsQuery {
    pub module_code: Option<String>,
}

/// Replace the permission set of a role
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateRolePermissionsRequest {
    pub permission_ids: Vec<Uuid>,
}

/// Assign role request (user id comes from the path)
#[derive(Debug, Clone, Deserialize)]
pub struct AssignRoleRequest {
    pub role_id: Uuid,
    #[serde(default)]
    pub scope_type: ScopeType,
    pub scope_id: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
}

/// Binding row to insert
#[derive(Debug, Clone)]
pub struct NewRoleBinding {
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub scope_type: ScopeType,
    pub scope_id: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
}

// ==================== Responses ====================

/// Paginated listing
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
    pub items: Vec<T>,
}

/// Role list entry with live usage counts
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RoleListItem {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub binding_count: i64,
    pub user_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Catalog permission with its module
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PermissionItem {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub module_code: String,
    pub module_name: String,
}

/// Catalog permission flagged against one role
#[derive(Debug, Clone, Serialize)]
pub struct RoleDetailPermission {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub module_code: String,
    pub module_name: String,
    pub assigned: bool,
}

/// Role plus the full permission toggle matrix
#[derive(Debug, Clone, Serialize)]
pub struct RoleDetail {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub permissions: Vec<RoleDetailPermission>,
}

/// Outcome of a role permission replacement
#[derive(Debug, Clone, Serialize)]
pub struct RolePermissionsUpdate {
    pub role_id: Uuid,
    pub permission_count: usize,
    pub affected_users: usize,
    pub sessions_cleared: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_window_activity() {
        let now = Utc::now();

        assert!(is_window_active(now - Duration::days(1), None, now));
        assert!(is_window_active(now, Some(now), now));
        assert!(!is_window_active(now + Duration::seconds(1), None, now));
        assert!(!is_window_active(
            now - Duration::days(10),
            Some(now - Duration::days(1)),
            now
        ));
    }

    #[test]
    fn test_role_code_normalization() {
        let req = CreateRoleRequest {
            code: "  EDITOR ".to_string(),
            name: " Editor ".to_string(),
            description: Some("   ".to_string()),
        }
        .normalized();

        assert_eq!(req.code, "editor");
        assert_eq!(req.name, "Editor");
        assert!(req.description.is_none());
        assert!(is_valid_role_code(&req.code));
    }

    #[test]
    fn test_role_code_pattern_rejects_spaces() {
        assert!(is_valid_role_code("system-admin"));
        assert!(is_valid_role_code("contracts.reviewer_2"));
        assert!(!is_valid_role_code("content editor"));
        assert!(!is_valid_role_code("Editor"));
    }

    #[test]
    fn test_update_role_patch_keeps_unset_fields() {
        let mut role = Role {
            id: Uuid::new_v4(),
            code: "editor".to_string(),
            name: "Editor".to_string(),
            description: Some("Edits things".to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        UpdateRoleRequest {
            name: Some("Senior editor".to_string()),
            description: None,
        }
        .apply(&mut role);

        assert_eq!(role.name, "Senior editor");
        assert_eq!(role.description.as_deref(), Some("Edits things"));
    }

    #[test]
    fn test_list_roles_query_defaults() {
        let query = ListRolesQuery::default();
        assert_eq!(query.page(), 1);
        assert_eq!(query.page_size(), 20);
        assert_eq!(query.offset(), 0);
        assert!(query.keyword().is_none());

        let query = ListRolesQuery {
            page: Some(3),
            page_size: Some(10),
            keyword: Some("  edit ".to_string()),
        };
        assert_eq!(query.offset(), 20);
        assert_eq!(query.keyword(), Some("edit"));
    }

    #[test]
    fn test_list_roles_query_rejects_oversized_page() {
        let query = ListRolesQuery {
            page: Some(1),
            page_size: Some(500),
            keyword: None,
        };
        assert!(query.validate().is_err());
    }

    #[test]
    fn test_list_roles_query_rejects_huge_page() {
        let query = ListRolesQuery {
            page: Some(i64::MAX),
            page_size: Some(20),
            keyword: None,
        };
        assert!(query.validate().is_err());

        let query = ListRolesQuery {
            page: Some(1_000_000),
            page_size: Some(200),
            keyword: None,
        };
        assert!(query.validate().is_ok());
        assert_eq!(query.offset(), 999_999 * 200);
    }

    #[test]
    fn test_scope_type_serialization() {
        assert_eq!(serde_json::to_string(&ScopeType::Department).unwrap(), "\"department\"");
        assert_eq!(ScopeType::default(), ScopeType::Global);
        assert_eq!(ScopeType::Contract.to_string(), "contract");
    }
}
