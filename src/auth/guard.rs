//! 权限守卫
//!
//! 只读取会话中缓存的授权快照，从不访问存储。所需权限为"任一即可"（OR）。

use crate::{auth::middleware::AuthContext, error::AppError, models::session::AuthSessionData};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

/// 路由声明的所需权限
#[derive(Debug, Clone, Copy)]
pub struct RequiredPermissions(pub &'static [&'static str]);

impl RequiredPermissions {
    pub const fn any_of(codes: &'static [&'static str]) -> Self {
        Self(codes)
    }
}

/// 授权判定
///
/// - 未声明权限：放行
/// - 声明了权限但没有会话：`Unauthorized`
/// - 有会话但权限不相交：`Forbidden`
pub fn authorize<S: AsRef<str>>(
    session: Option<&AuthSessionData>,
    required: &[S],
) -> Result<(), AppError> {
    if required.is_empty() {
        return Ok(());
    }

    let session = session.ok_or(AppError::Unauthorized)?;

    if session.has_any_permission(required) {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

/// 权限守卫中间件，配合 `from_fn_with_state(RequiredPermissions::any_of(..), permission_guard)`
pub async fn permission_guard(
    State(required): State<RequiredPermissions>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let context = req.extensions().get::<AuthContext>();

    if let Err(e) = authorize(context.map(|c| &c.session), required.0) {
        let reason = match e {
            AppError::Unauthorized => "unauthenticated",
            _ => "forbidden",
        };
        metrics::counter!("rbac_guard_denied_total", "reason" => reason).increment(1);
        tracing::warn!(
            user_id = ?context.map(|c| c.session.user_id),
            required = ?required.0,
            reason,
            "Permission denied"
        );
        return Err(e);
    }

    Ok(next.run(req).await)
}
