//! Database schema initialization

use sqlx::SqlitePool;

use crate::error::Result;

/// Initialize the database schema
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA_SQL).execute(pool).await?;

    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- One saved position per user and document, overwritten on every save
CREATE TABLE IF NOT EXISTS reading_positions (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    document_id TEXT NOT NULL,
    address TEXT NOT NULL,
    percentage REAL,
    updated_at TEXT NOT NULL,
    UNIQUE(user_id, document_id)
);

CREATE TABLE IF NOT EXISTS annotations (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    document_id TEXT NOT NULL,
    range_address TEXT NOT NULL,
    text TEXT NOT NULL,
    kind TEXT NOT NULL,
    color TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_annotations_owner ON annotations(user_id, document_id);

-- Bearer tokens issued by the authentication service
CREATE TABLE IF NOT EXISTS sessions (
    token TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    expires_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
"#;
