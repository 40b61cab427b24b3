//! Media repository
//!
//! Rows describing uploaded files. The files themselves live under the
//! configured upload directory and are managed by `MediaService`.

use crate::db::{Backend, DynDatabasePool};
use crate::models::{CreateMediaInput, Media, MediaKind};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

const MEDIA_COLUMNS: &str =
    "id, filename, original_name, url, content_type, kind, size, uploaded_by, created_at";

#[async_trait]
pub trait MediaRepository: Send + Sync {
    async fn create(&self, input: &CreateMediaInput) -> Result<Media>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Media>>;

    /// Newest first, optionally restricted to one kind
    async fn list(&self, kind: Option<MediaKind>, offset: i64, limit: i64) -> Result<Vec<Media>>;

    async fn count(&self, kind: Option<MediaKind>) -> Result<i64>;

    async fn delete(&self, id: i64) -> Result<bool>;
}

/// SQLx-based media repository
pub struct SqlxMediaRepository {
    pool: DynDatabasePool,
}

impl SqlxMediaRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn MediaRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl MediaRepository for SqlxMediaRepository {
    async fn create(&self, input: &CreateMediaInput) -> Result<Media> {
        let now = Utc::now();
        let id = match self.pool.backend() {
            Backend::Sqlite(p) => insert_media_sqlite(p, input).await?,
            Backend::Mysql(p) => insert_media_mysql(p, input).await?,
        };
        Ok(Media {
            id,
            filename: input.filename.clone(),
            original_name: input.original_name.clone(),
            url: input.url.clone(),
            content_type: input.content_type.clone(),
            kind: input.kind,
            size: input.size,
            uploaded_by: input.uploaded_by,
            created_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Media>> {
        let sql = format!("SELECT {} FROM media WHERE id = ?", MEDIA_COLUMNS);
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(p)
                    .await
                    .context("Failed to get media by ID")?;
                row.as_ref().map(row_to_media_sqlite).transpose()
            }
            Backend::Mysql(p) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(p)
                    .await
                    .context("Failed to get media by ID")?;
                row.as_ref().map(row_to_media_mysql).transpose()
            }
        }
    }

    async fn list(&self, kind: Option<MediaKind>, offset: i64, limit: i64) -> Result<Vec<Media>> {
        // a NULL kind matches every row
        let sql = format!(
            "SELECT {} FROM media WHERE (? IS NULL OR kind = ?) \
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            MEDIA_COLUMNS
        );
        let kind = kind.map(|k| k.as_str());
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let rows = sqlx::query(&sql)
                    .bind(kind)
                    .bind(kind)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(p)
                    .await
                    .context("Failed to list media")?;
                rows.iter().map(row_to_media_sqlite).collect()
            }
            Backend::Mysql(p) => {
                let rows = sqlx::query(&sql)
                    .bind(kind)
                    .bind(kind)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(p)
                    .await
                    .context("Failed to list media")?;
                rows.iter().map(row_to_media_mysql).collect()
            }
        }
    }

    async fn count(&self, kind: Option<MediaKind>) -> Result<i64> {
        let sql = "SELECT COUNT(*) as count FROM media WHERE (? IS NULL OR kind = ?)";
        let kind = kind.map(|k| k.as_str());
        let count: i64 = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(sql)
                .bind(kind)
                .bind(kind)
                .fetch_one(p)
                .await
                .context("Failed to count media")?
                .try_get("count")?,
            Backend::Mysql(p) => sqlx::query(sql)
                .bind(kind)
                .bind(kind)
                .fetch_one(p)
                .await
                .context("Failed to count media")?
                .try_get("count")?,
        };
        Ok(count)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let sql = "DELETE FROM media WHERE id = ?";
        let affected = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(sql)
                .bind(id)
                .execute(p)
                .await
                .context("Failed to delete media")?
                .rows_affected(),
            Backend::Mysql(p) => sqlx::query(sql)
                .bind(id)
                .execute(p)
                .await
                .context("Failed to delete media")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }
}

const INSERT_MEDIA_SQL: &str = r#"
    INSERT INTO media (filename, original_name, url, content_type, kind, size, uploaded_by, created_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
"#;

// SQLite implementations
async fn insert_media_sqlite(pool: &SqlitePool, input: &CreateMediaInput) -> Result<i64> {
    let result = sqlx::query(INSERT_MEDIA_SQL)
        .bind(&input.filename)
        .bind(&input.original_name)
        .bind(&input.url)
        .bind(&input.content_type)
        .bind(input.kind.as_str())
        .bind(input.size)
        .bind(input.uploaded_by)
        .bind(Utc::now())
        .execute(pool)
        .await
        .context("Failed to record media")?;
    Ok(result.last_insert_rowid())
}

fn row_to_media_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Media> {
    let kind: String = row.try_get("kind")?;
    Ok(Media {
        id: row.try_get("id")?,
        filename: row.try_get("filename")?,
        original_name: row.try_get("original_name")?,
        url: row.try_get("url")?,
        content_type: row.try_get("content_type")?,
        kind: MediaKind::from_str(&kind)
            .ok_or_else(|| anyhow::anyhow!("Invalid media kind: {}", kind))?,
        size: row.try_get("size")?,
        uploaded_by: row.try_get("uploaded_by")?,
        created_at: row.try_get("created_at")?,
    })
}

// MySQL implementations
async fn insert_media_mysql(pool: &MySqlPool, input: &CreateMediaInput) -> Result<i64> {
    let result = sqlx::query(INSERT_MEDIA_SQL)
        .bind(&input.filename)
        .bind(&input.original_name)
        .bind(&input.url)
        .bind(&input.content_type)
        .bind(input.kind.as_str())
        .bind(input.size)
        .bind(input.uploaded_by)
        .bind(Utc::now())
        .execute(pool)
        .await
        .context("Failed to record media")?;
    Ok(result.last_insert_id() as i64)
}

fn row_to_media_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Media> {
    let kind: String = row.try_get("kind")?;
    Ok(Media {
        id: row.try_get("id")?,
        filename: row.try_get("filename")?,
        original_name: row.try_get("original_name")?,
        url: row.try_get("url")?,
        content_type: row.try_get("content_type")?,
        kind: MediaKind::from_str(&kind)
            .ok_or_else(|| anyhow::anyhow!("Invalid media kind: {}", kind))?,
        size: row.try_get("size")?,
        uploaded_by: row.try_get("uploaded_by")?,
        created_at: row.try_get("created_at")?,
    })
}
