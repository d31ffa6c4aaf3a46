//! Bearer token lookup
//!
//! Tokens are issued by the authentication service; this server only maps
//! them back to a user.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::Result;

pub struct SessionRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SessionRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Register a token that never expires
    pub async fn create(&self, user_id: &str, token: &str) -> Result<()> {
        self.create_with_expiry(user_id, token, None).await
    }

    pub async fn create_with_expiry(
        &self,
        user_id: &str,
        token: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (token, user_id, created_at, expires_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(token) DO UPDATE SET
                user_id = excluded.user_id,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(token)
        .bind(user_id)
        .bind(Utc::now().to_rfc3339())
        .bind(expires_at.map(|t| t.to_rfc3339()))
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// User owning `token`, if the token exists and has not expired
    pub async fn user_for_token(&self, token: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT user_id FROM sessions
            WHERE token = ? AND (expires_at IS NULL OR expires_at > ?)
            "#,
        )
        .bind(token)
        .bind(Utc::now().to_rfc3339())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|r| r.0))
    }

    pub async fn revoke(&self, token: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
