//! In-process store
//!
//! Implements both [`RbacStore`] and [`SessionStore`] on top of plain maps
//! guarded by one lock, applying the same uniqueness and reference rules as
//! the Postgres schema. Every operation takes the write lock once, so
//! multi-step changes such as a permission replacement are atomic.

use super::{RbacStore, SessionStore};
use crate::{
    error::AppError,
    models::{
        role::*,
        session::{EffectiveScope, SessionRecord},
        user::*,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    modules: HashMap<Uuid, Module>,
    permissions: HashMap<Uuid, Permission>,
    roles: HashMap<Uuid, Role>,
    role_permissions: BTreeSet<RolePermission>,
    bindings: HashMap<Uuid, UserRoleBinding>,
    sessions: HashMap<String, SessionRecord>,
}

impl MemoryState {
    fn permission_item(&self, permission: &Permission) -> Option<PermissionItem> {
        let module = self.modules.get(&permission.module_id)?;
        Some(PermissionItem {
            id: permission.id,
            code: permission.code.clone(),
            name: permission.name.clone(),
            module_code: module.code.clone(),
            module_name: module.name.clone(),
        })
    }

    fn permission_codes_of(&self, role_id: Uuid) -> Vec<String> {
        let mut codes: Vec<String> = self
            .role_permissions
            .iter()
            .filter(|rp| rp.role_id == role_id)
            .filter_map(|rp| self.permissions.get(&rp.permission_id))
            .map(|p| p.code.clone())
            .collect();
        codes.sort();
        codes
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions, expired ones included
    pub async fn session_count(&self) -> usize {
        self.state.read().await.sessions.len()
    }

    pub async fn sessions_of_user(&self, user_id: Uuid) -> usize {
        self.state
            .read()
            .await
            .sessions
            .values()
            .filter(|s| s.user_id == user_id || s.data.user_id == user_id)
            .count()
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[async_trait]
impl RbacStore for MemoryStore {
    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }

    // ==================== Users ====================

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let email = email.trim().to_lowercase();
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|u| u.email.to_lowercase() == email)
            .cloned())
    }

    async fn create_user(&self, user: &NewUser) -> Result<User, AppError> {
        let mut state = self.state.write().await;

        let taken = state.users.values().any(|u| {
            u.username == user.username || u.email.to_lowercase() == user.email.to_lowercase()
        });
        if taken {
            return Err(AppError::Conflict(format!(
                "User already exists: {}",
                user.email
            )));
        }

        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            username: user.username.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            display_name: user.display_name.clone(),
            is_active: true,
            last_login_at: None,
            employee_id: user.employee_id,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(created.id, created.clone());

        Ok(created)
    }

    async fn set_user_active(&self, id: Uuid, is_active: bool) -> Result<Option<User>, AppError> {
        let mut state = self.state.write().await;
        Ok(state.users.get_mut(&id).map(|user| {
            user.is_active = is_active;
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn touch_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        if let Some(user) = self.state.write().await.users.get_mut(&id) {
            user.last_login_at = Some(at);
        }
        Ok(())
    }

    // ==================== Resolution ====================

    async fn binding_grants_for_user(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Vec<BindingGrant>, AppError> {
        let state = self.state.read().await;

        let mut bindings: Vec<&UserRoleBinding> = state
            .bindings
            .values()
            .filter(|b| b.user_id == user_id && b.is_active_at(at))
            .collect();
        bindings.sort_by_key(|b| (b.start_at, b.id));

        let grants = bindings
            .into_iter()
            .filter_map(|b| {
                let role = state.roles.get(&b.role_id)?;
                Some(BindingGrant {
                    binding_id: b.id,
                    role: role.summary(),
                    scope: EffectiveScope {
                        scope_type: b.scope_type,
                        scope_id: b.scope_id.clone(),
                    },
                    start_at: b.start_at,
                    end_at: b.end_at,
                    permission_codes: state.permission_codes_of(role.id),
                })
            })
            .collect();

        Ok(grants)
    }

    // ==================== Catalog ====================

    async fn upsert_module(&self, code: &str, name: &str) -> Result<Module, AppError> {
        let mut state = self.state.write().await;

        if let Some(module) = state.modules.values_mut().find(|m| m.code == code) {
            module.name = name.to_string();
            return Ok(module.clone());
        }

        let module = Module {
            id: Uuid::new_v4(),
            code: code.to_string(),
            name: name.to_string(),
        };
        state.modules.insert(module.id, module.clone());

        Ok(module)
    }

    async fn upsert_permission(
        &self,
        module_id: Uuid,
        code: &str,
        name: &str,
    ) -> Result<Permission, AppError> {
        let mut state = self.state.write().await;

        if !state.modules.contains_key(&module_id) {
            return Err(AppError::NotFound(format!("module {}", module_id)));
        }

        if let Some(permission) = state.permissions.values_mut().find(|p| p.code == code) {
            permission.name = name.to_string();
            permission.module_id = module_id;
            return Ok(permission.clone());
        }

        let permission = Permission {
            id: Uuid::new_v4(),
            code: code.to_string(),
            name: name.to_string(),
            module_id,
        };
        state.permissions.insert(permission.id, permission.clone());

        Ok(permission)
    }

    async fn list_permissions(
        &self,
        module_code: Option<&str>,
    ) -> Result<Vec<PermissionItem>, AppError> {
        let state = self.state.read().await;

        let mut items: Vec<PermissionItem> = state
            .permissions
            .values()
            .filter_map(|p| state.permission_item(p))
            .filter(|item| module_code.map_or(true, |m| item.module_code == m))
            .collect();
        items.sort_by(|a, b| (&a.module_code, &a.code).cmp(&(&b.module_code, &b.code)));

        Ok(items)
    }

    async fn count_permissions(&self, ids: &[Uuid]) -> Result<i64, AppError> {
        let state = self.state.read().await;
        let unique: HashSet<&Uuid> = ids.iter().collect();
        Ok(unique
            .into_iter()
            .filter(|id| state.permissions.contains_key(*id))
            .count() as i64)
    }

    // ==================== Roles ====================

    async fn find_role_by_id(&self, id: Uuid) -> Result<Option<Role>, AppError> {
        Ok(self.state.read().await.roles.get(&id).cloned())
    }

    async fn find_role_by_code(&self, code: &str) -> Result<Option<Role>, AppError> {
        let state = self.state.read().await;
        Ok(state.roles.values().find(|r| r.code == code).cloned())
    }

    async fn create_role(&self, req: &CreateRoleRequest) -> Result<Role, AppError> {
        let mut state = self.state.write().await;

        if state.roles.values().any(|r| r.code == req.code) {
            return Err(AppError::Conflict(format!(
                "Role code already exists: {}",
                req.code
            )));
        }

        let now = Utc::now();
        let role = Role {
            id: Uuid::new_v4(),
            code: req.code.clone(),
            name: req.name.clone(),
            description: req.description.clone(),
            created_at: now,
            updated_at: now,
        };
        state.roles.insert(role.id, role.clone());

        Ok(role)
    }

    async fn update_role(
        &self,
        id: Uuid,
        patch: &UpdateRoleRequest,
    ) -> Result<Option<Role>, AppError> {
        let mut state = self.state.write().await;
        Ok(state.roles.get_mut(&id).map(|role| {
            patch.apply(role);
            role.updated_at = Utc::now();
            role.clone()
        }))
    }

    async fn delete_role(&self, id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state.write().await;

        if state.bindings.values().any(|b| b.role_id == id) {
            return Err(AppError::Conflict(format!(
                "Role is still assigned to users: {}",
                id
            )));
        }

        let removed = state.roles.remove(&id).is_some();
        if removed {
            state.role_permissions.retain(|rp| rp.role_id != id);
        }

        Ok(removed)
    }

    async fn list_roles(
        &self,
        query: &ListRolesQuery,
    ) -> Result<(i64, Vec<RoleListItem>), AppError> {
        let state = self.state.read().await;
        let keyword = query.keyword();

        let mut roles: Vec<&Role> = state
            .roles
            .values()
            .filter(|r| {
                keyword.map_or(true, |k| {
                    contains_ignore_case(&r.code, k) || contains_ignore_case(&r.name, k)
                })
            })
            .collect();
        roles.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.code.cmp(&b.code))
        });

        let total = roles.len() as i64;
        let items = roles
            .into_iter()
            .skip(query.offset().max(0) as usize)
            .take(query.page_size().max(0) as usize)
            .map(|r| {
                let bindings: Vec<&UserRoleBinding> =
                    state.bindings.values().filter(|b| b.role_id == r.id).collect();
                let users: HashSet<Uuid> = bindings.iter().map(|b| b.user_id).collect();

                RoleListItem {
                    id: r.id,
                    code: r.code.clone(),
                    name: r.name.clone(),
                    description: r.description.clone(),
                    binding_count: bindings.len() as i64,
                    user_count: users.len() as i64,
                    created_at: r.created_at,
                    updated_at: r.updated_at,
                }
            })
            .collect();

        Ok((total, items))
    }

    async fn role_permission_ids(&self, role_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .role_permissions
            .iter()
            .filter(|rp| rp.role_id == role_id)
            .map(|rp| rp.permission_id)
            .collect())
    }

    async fn replace_role_permissions(
        &self,
        role_id: Uuid,
        permission_ids: &[Uuid],
    ) -> Result<(), AppError> {
        let mut state = self.state.write().await;

        if !state.roles.contains_key(&role_id) {
            return Err(AppError::NotFound(format!("role {}", role_id)));
        }
        if let Some(missing) = permission_ids
            .iter()
            .find(|id| !state.permissions.contains_key(*id))
        {
            return Err(AppError::NotFound(format!("permission {}", missing)));
        }

        state.role_permissions.retain(|rp| rp.role_id != role_id);
        state
            .role_permissions
            .extend(permission_ids.iter().map(|&permission_id| RolePermission {
                role_id,
                permission_id,
            }));

        Ok(())
    }

    // ==================== Role Bindings ====================

    async fn count_bindings_for_role(&self, role_id: Uuid) -> Result<i64, AppError> {
        let state = self.state.read().await;
        Ok(state
            .bindings
            .values()
            .filter(|b| b.role_id == role_id)
            .count() as i64)
    }

    async fn user_ids_for_role(&self, role_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        let state = self.state.read().await;
        let users: BTreeSet<Uuid> = state
            .bindings
            .values()
            .filter(|b| b.role_id == role_id)
            .map(|b| b.user_id)
            .collect();
        Ok(users.into_iter().collect())
    }

    async fn create_binding(&self, binding: &NewRoleBinding) -> Result<UserRoleBinding, AppError> {
        let mut state = self.state.write().await;

        if !state.users.contains_key(&binding.user_id) || !state.roles.contains_key(&binding.role_id)
        {
            return Err(AppError::NotFound(format!(
                "user {} or role {}",
                binding.user_id, binding.role_id
            )));
        }

        let created = UserRoleBinding {
            id: Uuid::new_v4(),
            user_id: binding.user_id,
            role_id: binding.role_id,
            scope_type: binding.scope_type,
            scope_id: binding.scope_id.clone(),
            start_at: binding.start_at,
            end_at: binding.end_at,
            created_by: binding.created_by,
            created_at: Utc::now(),
        };
        state.bindings.insert(created.id, created.clone());

        Ok(created)
    }

    async fn delete_binding(&self, id: Uuid) -> Result<Option<UserRoleBinding>, AppError> {
        Ok(self.state.write().await.bindings.remove(&id))
    }

    async fn list_user_bindings(&self, user_id: Uuid) -> Result<Vec<RoleBindingView>, AppError> {
        let state = self.state.read().await;

        let mut views: Vec<RoleBindingView> = state
            .bindings
            .values()
            .filter(|b| b.user_id == user_id)
            .filter_map(|b| {
                let role = state.roles.get(&b.role_id)?;
                Some(RoleBindingView {
                    id: b.id,
                    user_id: b.user_id,
                    role_id: b.role_id,
                    role_code: role.code.clone(),
                    role_name: role.name.clone(),
                    scope_type: b.scope_type,
                    scope_id: b.scope_id.clone(),
                    start_at: b.start_at,
                    end_at: b.end_at,
                    created_by: b.created_by,
                    created_at: b.created_at,
                })
            })
            .collect();
        views.sort_by_key(|v| (v.start_at, v.id));

        Ok(views)
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_session(&self, record: &SessionRecord) -> Result<(), AppError> {
        let mut state = self.state.write().await;

        if state.sessions.contains_key(&record.id) {
            return Err(AppError::Conflict("Session id collision".to_string()));
        }
        state.sessions.insert(record.id.clone(), record.clone());

        Ok(())
    }

    async fn find_session(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionRecord>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .sessions
            .get(id)
            .filter(|s| !s.is_expired_at(now))
            .cloned())
    }

    async fn touch_session(
        &self,
        id: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if let Some(session) = self.state.write().await.sessions.get_mut(id) {
            session.last_seen_at = now;
            session.expires_at = expires_at;
        }
        Ok(())
    }

    async fn delete_session(&self, id: &str) -> Result<bool, AppError> {
        Ok(self.state.write().await.sessions.remove(id).is_some())
    }

    async fn delete_sessions_by_user(&self, user_id: Uuid) -> Result<u64, AppError> {
        let mut state = self.state.write().await;
        let before = state.sessions.len();
        state
            .sessions
            .retain(|_, s| s.user_id != user_id && s.data.user_id != user_id);
        Ok((before - state.sessions.len()) as u64)
    }

    async fn prune_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut state = self.state.write().await;
        let before = state.sessions.len();
        state.sessions.retain(|_, s| !s.is_expired_at(now));
        Ok((before - state.sessions.len()) as u64)
    }
}
