//! 认证服务：登录、登出

use crate::{
    auth::password::PasswordHasher,
    error::AppError,
    models::{auth::*, user::*},
    repository::RbacStore,
    services::{PermissionService, SessionService},
};
use chrono::Utc;
use std::sync::Arc;
use validator::Validate;

pub struct AuthService {
    store: Arc<dyn RbacStore>,
    permissions: Arc<PermissionService>,
    sessions: Arc<SessionService>,
    hasher: PasswordHasher,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn RbacStore>,
        permissions: Arc<PermissionService>,
        sessions: Arc<SessionService>,
    ) -> Result<Self, AppError> {
        Ok(Self {
            store,
            permissions,
            sessions,
            hasher: PasswordHasher::new()?,
        })
    }

    /// 用户登录
    ///
    /// 校验密码后构建授权快照并保存为会话；快照为 `None`（账户停用）时拒绝登录。
    pub async fn login(&self, req: LoginRequest) -> Result<LoginResponse, AppError> {
        req.validate()?;

        // 获取用户
        let user: User = self
            .store
            .find_user_by_email(&req.email)
            .await?
            .ok_or_else(|| {
                tracing::info!(email = %req.email, "Login failed: unknown email");
                AppError::InvalidCredentials
            })?;

        // 验证密码
        self.hasher
            .verify(&req.password, &user.password_hash)
            .map_err(|e| {
                tracing::info!(user_id = %user.id, "Login failed: wrong password");
                e
            })?;

        // 构建授权快照
        let auth = self
            .permissions
            .build_auth_session(user.id)
            .await?
            .ok_or_else(|| {
                tracing::info!(user_id = %user.id, "Login refused: account disabled");
                AppError::AccountDisabled
            })?;

        // 最近登录时间仅作记录，失败不影响登录
        let now = Utc::now();
        if let Err(e) = self.store.touch_last_login(user.id, now).await {
            tracing::warn!(user_id = %user.id, error = %e, "Failed to record last login");
        }

        let session_id = self.sessions.create(auth.clone()).await?;

        tracing::info!(
            user_id = %user.id,
            roles = auth.roles.len(),
            permissions = auth.permissions.len(),
            "User logged in"
        );

        let mut user = UserResponse::from(user);
        user.last_login_at = Some(now);

        Ok(LoginResponse {
            session_id,
            user,
            auth,
        })
    }

    /// 登出（销毁当前会话）
    pub async fn logout(&self, session_id: &str) -> Result<(), AppError> {
        if self.sessions.destroy(session_id).await? {
            tracing::info!("Session destroyed");
        }
        Ok(())
    }
}
