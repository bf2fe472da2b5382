//! 会话认证中间件

use crate::{error::AppError, models::session::AuthSessionData, services::SessionService};
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// 会话令牌请求头（Cookie 之外的备选方式）
pub const SESSION_HEADER: &str = "x-session-id";

/// 认证上下文（附加到请求扩展）
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// 存储中的会话 ID（令牌摘要）
    pub session_id: String,
    pub session: AuthSessionData,
}

// 实现 FromRequestParts 以便在 handler 中直接提取 AuthContext
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

/// 提取会话令牌：优先 X-Session-Id 头，其次 Cookie
pub fn extract_session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    if let Some(token) = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == cookie_name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// 会话加载中间件
///
/// 令牌有效时把 [`AuthContext`] 放入请求扩展；缺失或失效时不拒绝请求，
/// 由权限守卫或 `AuthContext` 提取器决定返回 401。
pub async fn session_auth_middleware(
    State(sessions): State<Arc<SessionService>>,
    mut req: Request,
    next: Next,
) -> Response {
    if let Some(token) = extract_session_token(req.headers(), sessions.cookie_name()) {
        match sessions.load(&token).await {
            Ok(Some(record)) => {
                req.extensions_mut().insert(AuthContext {
                    session_id: record.id,
                    session: record.data,
                });
            }
            Ok(None) => {
                tracing::debug!("Session token did not resolve to a live session");
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to load session");
            }
        }
    }

    next.run(req).await
}
