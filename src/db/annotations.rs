//! Annotation database operations

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::parse_timestamp;
use crate::annotations::AnnotationKind;
use crate::error::{AppError, Result};
use crate::remote::{AnnotationRecord, NewAnnotation};

#[derive(Debug, Clone, sqlx::FromRow)]
struct AnnotationRow {
    id: String,
    range_address: String,
    text: String,
    kind: String,
    color: Option<String>,
    created_at: String,
}

impl AnnotationRow {
    fn into_record(self) -> Result<AnnotationRecord> {
        let kind = AnnotationKind::parse(&self.kind)
            .ok_or_else(|| AppError::Internal(format!("Unknown annotation kind: {}", self.kind)))?;
        Ok(AnnotationRecord {
            created_at: parse_timestamp(&self.created_at)?,
            id: self.id,
            range_address: self.range_address,
            text: self.text,
            kind,
            color: self.color,
        })
    }
}

/// Annotation repository
pub struct AnnotationRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AnnotationRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Annotations of one user on one document, oldest first
    pub async fn list(&self, user_id: &str, document_id: &str) -> Result<Vec<AnnotationRecord>> {
        let rows = sqlx::query_as::<_, AnnotationRow>(
            r#"
            SELECT id, range_address, text, kind, color, created_at
            FROM annotations
            WHERE user_id = ? AND document_id = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(user_id)
        .bind(document_id)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(AnnotationRow::into_record).collect()
    }

    pub async fn create(&self, user_id: &str, annotation: &NewAnnotation) -> Result<AnnotationRecord> {
        let record = AnnotationRecord {
            id: Uuid::new_v4().to_string(),
            range_address: annotation.range_address.clone(),
            text: annotation.text.clone(),
            kind: annotation.kind,
            color: match annotation.kind {
                AnnotationKind::Highlight => annotation.color.clone(),
                AnnotationKind::Emphasis => None,
            },
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO annotations (id, user_id, document_id, range_address, text, kind, color, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(user_id)
        .bind(&annotation.document_id)
        .bind(&record.range_address)
        .bind(&record.text)
        .bind(record.kind.as_str())
        .bind(&record.color)
        .bind(record.created_at.to_rfc3339())
        .execute(self.pool)
        .await?;

        Ok(record)
    }

    /// Delete one of the user's annotations; `false` if there was none
    pub async fn delete(&self, user_id: &str, id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM annotations
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(id)
        .bind(user_id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
