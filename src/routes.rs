//! 路由注册
//! 创建所有 API 路由并应用中间件

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    auth::{catalog, permission_guard, session_auth_middleware, RequiredPermissions},
    handlers,
    middleware::{request_tracking_middleware, AppState},
};

/// 管理接口所需权限
const RBAC_ADMIN: RequiredPermissions = RequiredPermissions::any_of(&[catalog::system::RBAC_ADMIN]);

/// 创建应用路由
pub fn create_router(state: Arc<AppState>) -> Router {
    // 公开端点（健康检查）
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check));

    // 认证路由；me / logout 通过 AuthContext 提取器要求会话
    let auth_routes = Router::new()
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/auth/me", get(handlers::auth::me));

    // RBAC 管理
    let admin_routes = Router::new()
        .route(
            "/roles",
            get(handlers::rbac::list_roles).post(handlers::rbac::create_role),
        )
        .route(
            "/roles/{id}",
            get(handlers::rbac::get_role)
                .patch(handlers::rbac::update_role)
                .delete(handlers::rbac::delete_role),
        )
        .route(
            "/roles/{id}/permissions",
            put(handlers::rbac::update_role_permissions),
        )
        .route("/permissions", get(handlers::rbac::list_permissions))
        .route(
            "/users/{id}/bindings",
            get(handlers::rbac::list_user_bindings).post(handlers::rbac::assign_role),
        )
        .route("/users/{id}/active", put(handlers::rbac::set_user_active))
        .route("/bindings/{id}", delete(handlers::rbac::revoke_binding))
        .route_layer(from_fn_with_state(RBAC_ADMIN, permission_guard));

    // 组合所有路由
    Router::new()
        .merge(public_routes)
        .merge(auth_routes)
        .nest("/api/rbac/admin", admin_routes)
        .layer(from_fn_with_state(
            state.session_service.clone(),
            session_auth_middleware,
        ))
        .layer(from_fn(request_tracking_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new())
        .with_state(state)
}
