//! Session repository (会话数据访问)

use super::SessionStore;
use crate::{
    error::AppError,
    models::session::{AuthSessionData, SessionRecord},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, PgPool};
use uuid::Uuid;

pub struct SessionRepository {
    db: PgPool,
}

impl SessionRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    user_id: Uuid,
    data: Json<AuthSessionData>,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    last_seen_at: DateTime<Utc>,
}

impl From<SessionRow> for SessionRecord {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            data: row.data.0,
            expires_at: row.expires_at,
            created_at: row.created_at,
            last_seen_at: row.last_seen_at,
        }
    }
}

#[async_trait]
impl SessionStore for SessionRepository {
    /// 存储会话
    async fn insert_session(&self, record: &SessionRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, data, expires_at, created_at, last_seen_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&record.id)
        .bind(record.user_id)
        .bind(Json(&record.data))
        .bind(record.expires_at)
        .bind(record.created_at)
        .bind(record.last_seen_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// 根据令牌摘要查找未过期的会话
    async fn find_session(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionRecord>, AppError> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT * FROM sessions WHERE id = $1 AND expires_at > $2",
        )
        .bind(id)
        .bind(now)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(SessionRecord::from))
    }

    async fn touch_session(
        &self,
        id: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE sessions SET last_seen_at = $2, expires_at = $3 WHERE id = $1")
            .bind(id)
            .bind(now)
            .bind(expires_at)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    /// 删除单个会话（登出）
    async fn delete_session(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 删除用户的全部会话，同时匹配快照中的 user_id
    async fn delete_sessions_by_user(&self, user_id: Uuid) -> Result<u64, AppError> {
        let result =
            sqlx::query("DELETE FROM sessions WHERE user_id = $1 OR data->>'user_id' = $2")
                .bind(user_id)
                .bind(user_id.to_string())
                .execute(&self.db)
                .await?;

        Ok(result.rows_affected())
    }

    /// 清理过期会话
    async fn prune_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }
}
