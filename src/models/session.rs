//! Session snapshot models
//!
//! `AuthSessionData` is a derived cache of the role / permission tables,
//! stored with the login session and read by the permission guard on every
//! request. It is never patched in place; when the underlying data changes
//! the whole session is destroyed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::role::ScopeType;

/// Role held by the session owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRole {
    pub id: Uuid,
    pub code: String,
    pub name: String,
}

/// Scope contributed by one active binding
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EffectiveScope {
    #[serde(rename = "type")]
    pub scope_type: ScopeType,
    pub scope_id: Option<String>,
}

/// Authorization snapshot cached in the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSessionData {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub employee_id: Option<Uuid>,
    pub roles: Vec<AuthRole>,
    /// Sorted, without duplicates
    pub permissions: Vec<String>,
    pub scopes: Vec<EffectiveScope>,
}

impl AuthSessionData {
    pub fn has_permission(&self, code: &str) -> bool {
        self.permissions.iter().any(|p| p == code)
    }

    /// OR semantics: true if any of `codes` is granted
    pub fn has_any_permission<S: AsRef<str>>(&self, codes: &[S]) -> bool {
        codes.iter().any(|c| self.has_permission(c.as_ref()))
    }

    pub fn has_role(&self, code: &str) -> bool {
        self.roles.iter().any(|r| r.code == code)
    }

    /// Scope ids granted for a scope type; `None` entries mean the whole type
    pub fn scope_ids(&self, scope_type: ScopeType) -> Vec<Option<&str>> {
        self.scopes
            .iter()
            .filter(|s| s.scope_type == scope_type)
            .map(|s| s.scope_id.as_deref())
            .collect()
    }

    pub fn is_global(&self) -> bool {
        self.scopes.iter().any(|s| s.scope_type == ScopeType::Global)
    }
}

/// Persisted session row. `id` is the SHA-256 digest of the client token.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: String,
    pub user_id: Uuid,
    pub data: AuthSessionData,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn is_expired_at(&self, at: DateTime<Utc>) -> bool {
        self.expires_at <= at
    }
}

/// Result of a session invalidation sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InvalidationReport {
    pub users: usize,
    pub sessions_removed: u64,
    pub failures: usize,
}
