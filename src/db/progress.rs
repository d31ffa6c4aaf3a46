//! Reading position database operations

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::parse_timestamp;
use crate::error::{AppError, Result};
use crate::remote::{PositionRecord, PositionUpdate};

#[derive(Debug, Clone, sqlx::FromRow)]
struct PositionRow {
    address: String,
    percentage: Option<f64>,
    updated_at: String,
}

impl PositionRow {
    fn into_record(self) -> Result<PositionRecord> {
        Ok(PositionRecord {
            updated_at: parse_timestamp(&self.updated_at)?,
            address: self.address,
            percentage: self.percentage,
        })
    }
}

/// Reading position repository
pub struct PositionRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> PositionRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Saved position for one user and document
    pub async fn get(&self, user_id: &str, document_id: &str) -> Result<Option<PositionRecord>> {
        let row = sqlx::query_as::<_, PositionRow>(
            r#"
            SELECT address, percentage, updated_at
            FROM reading_positions
            WHERE user_id = ? AND document_id = ?
            "#,
        )
        .bind(user_id)
        .bind(document_id)
        .fetch_optional(self.pool)
        .await?;

        row.map(PositionRow::into_record).transpose()
    }

    /// Overwrite the saved position, creating it on first save
    pub async fn upsert(&self, user_id: &str, update: &PositionUpdate) -> Result<PositionRecord> {
        let now = Utc::now().to_rfc3339();
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO reading_positions (id, user_id, document_id, address, percentage, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, document_id) DO UPDATE SET
                address = excluded.address,
                percentage = excluded.percentage,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(&update.document_id)
        .bind(&update.address)
        .bind(update.percentage)
        .bind(&now)
        .execute(self.pool)
        .await?;

        self.get(user_id, &update.document_id)
            .await?
            .ok_or_else(|| AppError::Internal("Failed to fetch upserted position".to_string()))
    }

    /// Number of stored positions for a user
    pub async fn count(&self, user_id: &str) -> Result<i64> {
        let result: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM reading_positions WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_one(self.pool)
        .await?;

        Ok(result.0)
    }
}
