//! 会话服务：会话创建、加载、销毁与批量失效

use crate::{
    auth::token::SessionToken,
    config::SessionConfig,
    error::AppError,
    models::session::{AuthSessionData, InvalidationReport, SessionRecord},
    repository::SessionStore,
};
use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use std::{collections::BTreeSet, sync::Arc};
use uuid::Uuid;

pub struct SessionService {
    store: Arc<dyn SessionStore>,
    ttl: Duration,
    cookie_name: String,
}

impl SessionService {
    pub fn new(store: Arc<dyn SessionStore>, config: &SessionConfig) -> Self {
        Self {
            store,
            ttl: Duration::seconds(config.ttl_secs as i64),
            cookie_name: config.cookie_name.clone(),
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// 保存授权快照，返回交给客户端的原始令牌
    pub async fn create(&self, data: AuthSessionData) -> Result<String, AppError> {
        let token = SessionToken::generate();
        let now = Utc::now();

        let record = SessionRecord {
            id: SessionToken::digest(&token),
            user_id: data.user_id,
            data,
            expires_at: now + self.ttl,
            created_at: now,
            last_seen_at: now,
        };

        self.store.insert_session(&record).await?;

        tracing::info!(user_id = %record.user_id, "Session created");

        Ok(token)
    }

    /// 根据原始令牌加载会话，并顺延过期时间
    pub async fn load(&self, token: &str) -> Result<Option<SessionRecord>, AppError> {
        self.load_at(token, Utc::now()).await
    }

    pub async fn load_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionRecord>, AppError> {
        let id = SessionToken::digest(token);

        let Some(mut record) = self.store.find_session(&id, now).await? else {
            return Ok(None);
        };

        let expires_at = now + self.ttl;
        // 顺延失败不影响本次请求
        if let Err(e) = self.store.touch_session(&id, now, expires_at).await {
            tracing::warn!(error = %e, user_id = %record.user_id, "Failed to extend session");
        } else {
            record.last_seen_at = now;
            record.expires_at = expires_at;
        }

        Ok(Some(record))
    }

    /// 销毁单个会话（登出）
    pub async fn destroy(&self, session_id: &str) -> Result<bool, AppError> {
        self.store.delete_session(session_id).await
    }

    /// 删除这些用户的全部会话，迫使其重新登录
    ///
    /// 对每个用户尽力而为：单个用户失败只记录日志并计数，不向上传播。
    pub async fn invalidate_users(&self, user_ids: &[Uuid]) -> InvalidationReport {
        let unique: BTreeSet<Uuid> = user_ids.iter().copied().collect();
        if unique.is_empty() {
            return InvalidationReport::default();
        }

        let results = join_all(unique.iter().map(|&user_id| async move {
            (user_id, self.store.delete_sessions_by_user(user_id).await)
        }))
        .await;

        let mut report = InvalidationReport {
            users: unique.len(),
            ..Default::default()
        };

        for (user_id, result) in results {
            match result {
                Ok(removed) => report.sessions_removed += removed,
                Err(e) => {
                    report.failures += 1;
                    tracing::error!(
                        user_id = %user_id,
                        error = %e,
                        "Failed to invalidate sessions"
                    );
                }
            }
        }

        metrics::counter!("rbac_sessions_invalidated_total").increment(report.sessions_removed);
        if report.failures > 0 {
            metrics::counter!("rbac_invalidation_failures_total").increment(report.failures as u64);
        }

        tracing::info!(
            users = report.users,
            sessions_removed = report.sessions_removed,
            failures = report.failures,
            "Sessions invalidated"
        );

        report
    }

    /// 清理过期会话
    pub async fn prune(&self) -> Result<u64, AppError> {
        let removed = self.store.prune_expired_sessions(Utc::now()).await?;
        if removed > 0 {
            tracing::debug!(removed, "Pruned expired sessions");
        }
        Ok(removed)
    }
}
