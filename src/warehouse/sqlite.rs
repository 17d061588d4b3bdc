//! SQLite-backed warehouse.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::{Category, Document, UserDocument, UserName};
use crate::error::WarehouseError;

use super::DocumentStore;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id          TEXT PRIMARY KEY,
    first_name  TEXT NOT NULL,
    last_name   TEXT NOT NULL,
    created_at  TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (first_name, last_name)
);

CREATE TABLE IF NOT EXISTS documents (
    seq              INTEGER PRIMARY KEY AUTOINCREMENT,
    id               TEXT    NOT NULL UNIQUE,
    collection       TEXT    NOT NULL,
    author_id        TEXT    NOT NULL,
    author_full_name TEXT    NOT NULL,
    platform         TEXT    NOT NULL,
    link             TEXT    NOT NULL,
    content          TEXT    NOT NULL,
    created_at       TEXT    NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_documents_author ON documents(collection, author_id);
CREATE INDEX IF NOT EXISTS idx_documents_link ON documents(collection, link);
"#;

/// Warehouse stored in a SQLite database.
#[derive(Clone)]
pub struct SqliteWarehouse {
    pool: SqlitePool,
}

impl SqliteWarehouse {
    /// Opens (creating if missing) the database at `database_url` and applies
    /// the schema.
    ///
    /// Accepts `sqlite:` URLs, including `sqlite::memory:`, or a bare file path.
    pub async fn connect(database_url: &str) -> Result<Self, WarehouseError> {
        let in_memory = database_url.contains(":memory:");
        let url = if database_url.starts_with("sqlite:") {
            database_url.to_string()
        } else {
            format!("sqlite://{}", database_url)
        };

        let mut opts = SqliteConnectOptions::from_str(&url)
            .map_err(|e| WarehouseError::ConnectionFailed(e.to_string()))?
            .create_if_missing(true);
        if !in_memory {
            opts = opts
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal);
        }

        let pool = pool_options(in_memory)
            .connect_with(opts)
            .await
            .map_err(|e| WarehouseError::ConnectionFailed(e.to_string()))?;

        sqlx::query(SCHEMA_SQL).execute(&pool).await?;

        tracing::info!(url = %url, "Warehouse opened");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Pool settings for the warehouse.
///
/// Each in-memory connection is its own database, so the in-memory pool holds
/// exactly one connection that is never closed for idleness or age.
fn pool_options(in_memory: bool) -> SqlitePoolOptions {
    if in_memory {
        SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(4)
    }
}

fn parse_uuid(raw: &str, collection: &str) -> Result<Uuid, WarehouseError> {
    Uuid::parse_str(raw).map_err(|e| WarehouseError::CorruptRecord {
        collection: collection.to_string(),
        reason: format!("invalid id '{}': {}", raw, e),
    })
}

fn row_to_user(row: &SqliteRow) -> Result<UserDocument, WarehouseError> {
    let id: String = row.try_get("id")?;
    Ok(UserDocument {
        id: parse_uuid(&id, "users")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
    })
}

fn row_to_document(row: &SqliteRow) -> Result<Document, WarehouseError> {
    let collection: String = row.try_get("collection")?;
    let category =
        Category::from_str(&collection).map_err(|e| WarehouseError::CorruptRecord {
            collection: collection.clone(),
            reason: e.to_string(),
        })?;

    let id: String = row.try_get("id")?;
    let author_id: String = row.try_get("author_id")?;
    let content: String = row.try_get("content")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;

    Ok(Document {
        id: parse_uuid(&id, &collection)?,
        category,
        author_id: parse_uuid(&author_id, &collection)?,
        author_full_name: row.try_get("author_full_name")?,
        platform: row.try_get("platform")?,
        link: row.try_get("link")?,
        content: serde_json::from_str(&content)?,
        created_at,
    })
}

#[async_trait]
impl DocumentStore for SqliteWarehouse {
    async fn get_or_create_user(&self, name: &UserName) -> Result<UserDocument, WarehouseError> {
        sqlx::query(
            "INSERT INTO users (id, first_name, last_name) VALUES (?1, ?2, ?3)
             ON CONFLICT(first_name, last_name) DO NOTHING",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&name.first_name)
        .bind(&name.last_name)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            "SELECT id, first_name, last_name FROM users WHERE first_name = ?1 AND last_name = ?2",
        )
        .bind(&name.first_name)
        .bind(&name.last_name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| WarehouseError::NotFound(format!("user '{}'", name)))?;

        row_to_user(&row)
    }

    async fn insert(&self, document: &Document) -> Result<(), WarehouseError> {
        let content = serde_json::to_string(&document.content)?;

        sqlx::query(
            "INSERT INTO documents (
                id, collection, author_id, author_full_name, platform, link, content, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(document.id.to_string())
        .bind(document.collection_name())
        .bind(document.author_id.to_string())
        .bind(&document.author_full_name)
        .bind(&document.platform)
        .bind(&document.link)
        .bind(content)
        .bind(document.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_link(
        &self,
        category: Category,
        link: &str,
    ) -> Result<Option<Document>, WarehouseError> {
        let row = sqlx::query(
            "SELECT * FROM documents WHERE collection = ?1 AND link = ?2 ORDER BY seq LIMIT 1",
        )
        .bind(category.collection_name())
        .bind(link)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_document).transpose()
    }

    async fn bulk_find(
        &self,
        category: Category,
        author_id: Uuid,
    ) -> Result<Vec<Document>, WarehouseError> {
        let rows = sqlx::query(
            "SELECT * FROM documents WHERE collection = ?1 AND author_id = ?2 ORDER BY seq",
        )
        .bind(category.collection_name())
        .bind(author_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_document).collect()
    }
}
