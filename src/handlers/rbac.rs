//! RBAC 管理的 HTTP 处理器
//! 整组路由由 `system.rbac.admin` 权限守卫保护

use crate::{
    auth::middleware::AuthContext,
    error::AppError,
    middleware::AppState,
    models::{role::*, user::*},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

// ==================== Roles ====================

/// 分页列出角色
pub async fn list_roles(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListRolesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = state.rbac_admin_service.get_roles(query).await?;
    Ok(Json(page))
}

/// 创建角色
pub async fn create_role(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateRoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let role = state.rbac_admin_service.create_role(req).await?;
    Ok((StatusCode::CREATED, Json(role)))
}

/// 获取角色详情（含全部权限及分配状态）
pub async fn get_role(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let detail = state.rbac_admin_service.get_role_detail(id).await?;
    Ok(Json(detail))
}

/// 更新角色
pub async fn update_role(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateRoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let role = state.rbac_admin_service.update_role(id, req).await?;
    Ok(Json(role))
}

/// 删除角色
pub async fn delete_role(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.rbac_admin_service.delete_role(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// 替换角色权限
pub async fn update_role_permissions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateRolePermissionsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state
        .rbac_admin_service
        .update_role_permissions(id, req.permission_ids)
        .await?;
    Ok(Json(outcome))
}

// ==================== Permissions ====================

/// 权限目录
pub async fn list_permissions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListPermissionsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let permissions = state
        .rbac_admin_service
        .get_all_permissions(query.module_code.as_deref())
        .await?;

    Ok(Json(json!({
        "permissions": permissions,
        "count": permissions.len()
    })))
}

// ==================== Role Bindings ====================

/// 获取用户的角色绑定
pub async fn list_user_bindings(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let bindings = state.rbac_admin_service.list_user_bindings(user_id).await?;
    Ok(Json(bindings))
}

/// 为用户分配角色
pub async fn assign_role(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(user_id): Path<Uuid>,
    Json(req): Json<AssignRoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let binding = state
        .rbac_admin_service
        .assign_role(user_id, req, Some(auth_context.session.user_id))
        .await?;
    Ok((StatusCode::CREATED, Json(binding)))
}

/// 撤销角色绑定
pub async fn revoke_binding(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.rbac_admin_service.revoke_binding(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ==================== Users ====================

/// 启用 / 停用用户
pub async fn set_user_active(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<SetUserActiveRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .rbac_admin_service
        .set_user_active(user_id, req.is_active)
        .await?;
    Ok(Json(UserResponse::from(user)))
}
