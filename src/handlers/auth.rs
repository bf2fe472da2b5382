//! 认证相关的 HTTP 处理器

use crate::{
    auth::middleware::AuthContext, error::AppError, middleware::AppState, models::auth::*,
};
use axum::{
    extract::State,
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;

/// 登录：返回会话令牌，同时写入 HttpOnly Cookie
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Response, AppError> {
    let response = state.auth_service.login(req).await?;

    let session = &state.config.session;
    let cookie = session_cookie(
        &session.cookie_name,
        &response.session_id,
        session.ttl_secs,
        session.secure_cookie,
    );
    let cookie = HeaderValue::from_str(&cookie)
        .map_err(|e| AppError::Internal(format!("Invalid session cookie: {}", e)))?;

    let mut res = Json(response).into_response();
    res.headers_mut().insert(header::SET_COOKIE, cookie);

    Ok(res)
}

/// 登出：销毁当前会话并清除 Cookie
pub async fn logout(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
) -> Result<Response, AppError> {
    state.auth_service.logout(&auth_context.session_id).await?;

    let session = &state.config.session;
    let cookie = session_cookie(&session.cookie_name, "", 0, session.secure_cookie);

    let mut res = Json(json!({"message": "Logged out"})).into_response();
    if let Ok(cookie) = HeaderValue::from_str(&cookie) {
        res.headers_mut().insert(header::SET_COOKIE, cookie);
    }

    Ok(res)
}

/// 当前会话的授权快照
pub async fn me(auth_context: AuthContext) -> Result<impl IntoResponse, AppError> {
    Ok(Json(auth_context.session))
}

fn session_cookie(name: &str, value: &str, max_age_secs: u64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        name, value, max_age_secs
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}
