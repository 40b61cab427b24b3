//! Watchlist repository

use crate::db::{Backend, DynDatabasePool};
use crate::models::{CreateWatchlistItemInput, MediaType, WatchStatus, WatchlistItem};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

const WATCHLIST_COLUMNS: &str = "id, tmdb_id, media_type, title, overview, poster_path, \
    release_date, vote_average, status, rating, notes, created_at, updated_at";

#[async_trait]
pub trait WatchlistRepository: Send + Sync {
    async fn create(&self, input: &CreateWatchlistItemInput) -> Result<WatchlistItem>;

    async fn get_by_id(&self, id: i64) -> Result<Option<WatchlistItem>>;

    async fn get_by_tmdb(&self, tmdb_id: i64, media_type: MediaType)
        -> Result<Option<WatchlistItem>>;

    /// Most recently updated first
    async fn list(
        &self,
        status: Option<WatchStatus>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<WatchlistItem>>;

    async fn count(&self, status: Option<WatchStatus>) -> Result<i64>;

    /// Persist status, rating and notes
    async fn update(&self, item: &WatchlistItem) -> Result<WatchlistItem>;

    async fn delete(&self, id: i64) -> Result<bool>;
}

/// SQLx-based watchlist repository
pub struct SqlxWatchlistRepository {
    pool: DynDatabasePool,
}

impl SqlxWatchlistRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn WatchlistRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl WatchlistRepository for SqlxWatchlistRepository {
    async fn create(&self, input: &CreateWatchlistItemInput) -> Result<WatchlistItem> {
        let id = match self.pool.backend() {
            Backend::Sqlite(p) => insert_item_sqlite(p, input).await?,
            Backend::Mysql(p) => insert_item_mysql(p, input).await?,
        };
        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Watchlist item not found after insert"))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<WatchlistItem>> {
        let sql = format!("SELECT {} FROM watchlist_items WHERE id = ?", WATCHLIST_COLUMNS);
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(p)
                    .await
                    .context("Failed to get watchlist item")?;
                row.as_ref().map(row_to_item_sqlite).transpose()
            }
            Backend::Mysql(p) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(p)
                    .await
                    .context("Failed to get watchlist item")?;
                row.as_ref().map(row_to_item_mysql).transpose()
            }
        }
    }

    async fn get_by_tmdb(
        &self,
        tmdb_id: i64,
        media_type: MediaType,
    ) -> Result<Option<WatchlistItem>> {
        let sql = format!(
            "SELECT {} FROM watchlist_items WHERE tmdb_id = ? AND media_type = ?",
            WATCHLIST_COLUMNS
        );
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let row = sqlx::query(&sql)
                    .bind(tmdb_id)
                    .bind(media_type.as_str())
                    .fetch_optional(p)
                    .await
                    .context("Failed to look up watchlist item")?;
                row.as_ref().map(row_to_item_sqlite).transpose()
            }
            Backend::Mysql(p) => {
                let row = sqlx::query(&sql)
                    .bind(tmdb_id)
                    .bind(media_type.as_str())
                    .fetch_optional(p)
                    .await
                    .context("Failed to look up watchlist item")?;
                row.as_ref().map(row_to_item_mysql).transpose()
            }
        }
    }

    async fn list(
        &self,
        status: Option<WatchStatus>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<WatchlistItem>> {
        let sql = format!(
            "SELECT {} FROM watchlist_items WHERE (? IS NULL OR status = ?) \
             ORDER BY updated_at DESC, id DESC LIMIT ? OFFSET ?",
            WATCHLIST_COLUMNS
        );
        let status = status.map(|s| s.as_str());
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let rows = sqlx::query(&sql)
                    .bind(status)
                    .bind(status)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(p)
                    .await
                    .context("Failed to list watchlist")?;
                rows.iter().map(row_to_item_sqlite).collect()
            }
            Backend::Mysql(p) => {
                let rows = sqlx::query(&sql)
                    .bind(status)
                    .bind(status)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(p)
                    .await
                    .context("Failed to list watchlist")?;
                rows.iter().map(row_to_item_mysql).collect()
            }
        }
    }

    async fn count(&self, status: Option<WatchStatus>) -> Result<i64> {
        let sql = "SELECT COUNT(*) as count FROM watchlist_items WHERE (? IS NULL OR status = ?)";
        let status = status.map(|s| s.as_str());
        let count: i64 = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(sql)
                .bind(status)
                .bind(status)
                .fetch_one(p)
                .await
                .context("Failed to count watchlist")?
                .try_get("count")?,
            Backend::Mysql(p) => sqlx::query(sql)
                .bind(status)
                .bind(status)
                .fetch_one(p)
                .await
                .context("Failed to count watchlist")?
                .try_get("count")?,
        };
        Ok(count)
    }

    async fn update(&self, item: &WatchlistItem) -> Result<WatchlistItem> {
        let sql = "UPDATE watchlist_items SET status = ?, rating = ?, notes = ?, updated_at = ? WHERE id = ?";
        let now = Utc::now();
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                sqlx::query(sql)
                    .bind(item.status.as_str())
                    .bind(item.rating)
                    .bind(&item.notes)
                    .bind(now)
                    .bind(item.id)
                    .execute(p)
                    .await
                    .context("Failed to update watchlist item")?;
            }
            Backend::Mysql(p) => {
                sqlx::query(sql)
                    .bind(item.status.as_str())
                    .bind(item.rating)
                    .bind(&item.notes)
                    .bind(now)
                    .bind(item.id)
                    .execute(p)
                    .await
                    .context("Failed to update watchlist item")?;
            }
        }
        self.get_by_id(item.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Watchlist item not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let sql = "DELETE FROM watchlist_items WHERE id = ?";
        let affected = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(sql)
                .bind(id)
                .execute(p)
                .await
                .context("Failed to delete watchlist item")?
                .rows_affected(),
            Backend::Mysql(p) => sqlx::query(sql)
                .bind(id)
                .execute(p)
                .await
                .context("Failed to delete watchlist item")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }
}

const INSERT_ITEM_SQL: &str = r#"
    INSERT INTO watchlist_items (tmdb_id, media_type, title, overview, poster_path, release_date,
                                 vote_average, status, rating, notes, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

// ============================================================================
// SQLite implementations
// ============================================================================

async fn insert_item_sqlite(pool: &SqlitePool, input: &CreateWatchlistItemInput) -> Result<i64> {
    let now = Utc::now();
    let result = sqlx::query(INSERT_ITEM_SQL)
        .bind(input.tmdb_id)
        .bind(input.media_type.as_str())
        .bind(&input.title)
        .bind(&input.overview)
        .bind(&input.poster_path)
        .bind(&input.release_date)
        .bind(input.vote_average)
        .bind(input.status.as_str())
        .bind(input.rating)
        .bind(&input.notes)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to add watchlist item")?;
    Ok(result.last_insert_rowid())
}

fn row_to_item_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<WatchlistItem> {
    let media_type: String = row.try_get("media_type")?;
    let status: String = row.try_get("status")?;
    Ok(WatchlistItem {
        id: row.try_get("id")?,
        tmdb_id: row.try_get("tmdb_id")?,
        media_type: MediaType::from_str(&media_type)
            .ok_or_else(|| anyhow::anyhow!("Invalid media type: {}", media_type))?,
        title: row.try_get("title")?,
        overview: row.try_get("overview")?,
        poster_path: row.try_get("poster_path")?,
        release_date: row.try_get("release_date")?,
        vote_average: row.try_get("vote_average")?,
        status: WatchStatus::from_str(&status)
            .ok_or_else(|| anyhow::anyhow!("Invalid watch status: {}", status))?,
        rating: row.try_get("rating")?,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn insert_item_mysql(pool: &MySqlPool, input: &CreateWatchlistItemInput) -> Result<i64> {
    let now = Utc::now();
    let result = sqlx::query(INSERT_ITEM_SQL)
        .bind(input.tmdb_id)
        .bind(input.media_type.as_str())
        .bind(&input.title)
        .bind(&input.overview)
        .bind(&input.poster_path)
        .bind(&input.release_date)
        .bind(input.vote_average)
        .bind(input.status.as_str())
        .bind(input.rating)
        .bind(&input.notes)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to add watchlist item")?;
    Ok(result.last_insert_id() as i64)
}

fn row_to_item_mysql(row: &sqlx::mysql::MySqlRow) -> Result<WatchlistItem> {
    let media_type: String = row.try_get("media_type")?;
    let status: String = row.try_get("status")?;
    Ok(WatchlistItem {
        id: row.try_get("id")?,
        tmdb_id: row.try_get("tmdb_id")?,
        media_type: MediaType::from_str(&media_type)
            .ok_or_else(|| anyhow::anyhow!("Invalid media type: {}", media_type))?,
        title: row.try_get("title")?,
        overview: row.try_get("overview")?,
        poster_path: row.try_get("poster_path")?,
        release_date: row.try_get("release_date")?,
        vote_average: row.try_get("vote_average")?,
        status: WatchStatus::from_str(&status)
            .ok_or_else(|| anyhow::anyhow!("Invalid watch status: {}", status))?,
        rating: row.try_get("rating")?,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> SqlxWatchlistRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxWatchlistRepository::new(pool)
    }

    fn input(tmdb_id: i64, media_type: MediaType, status: WatchStatus) -> CreateWatchlistItemInput {
        CreateWatchlistItemInput {
            tmdb_id,
            media_type,
            title: format!("Title {}", tmdb_id),
            overview: Some("Overview".into()),
            poster_path: Some("/poster.jpg".into()),
            release_date: Some("1999-03-31".into()),
            vote_average: Some(8.2),
            status,
            rating: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_lookup_by_tmdb() {
        let repo = setup_test_repo().await;
        let item = repo
            .create(&input(603, MediaType::Movie, WatchStatus::Completed))
            .await
            .unwrap();
        assert_eq!(item.vote_average, Some(8.2));

        let found = repo.get_by_tmdb(603, MediaType::Movie).await.unwrap().unwrap();
        assert_eq!(found.id, item.id);
        assert!(repo.get_by_tmdb(603, MediaType::Tv).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_same_tmdb_id_and_type_is_unique() {
        let repo = setup_test_repo().await;
        repo.create(&input(1, MediaType::Movie, WatchStatus::Planned))
            .await
            .unwrap();
        repo.create(&input(1, MediaType::Tv, WatchStatus::Planned))
            .await
            .unwrap();
        assert!(repo
            .create(&input(1, MediaType::Movie, WatchStatus::Planned))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_list_filter_and_update() {
        let repo = setup_test_repo().await;
        let planned = repo
            .create(&input(1, MediaType::Movie, WatchStatus::Planned))
            .await
            .unwrap();
        repo.create(&input(2, MediaType::Tv, WatchStatus::Watching))
            .await
            .unwrap();

        assert_eq!(repo.count(None).await.unwrap(), 2);
        assert_eq!(repo.count(Some(WatchStatus::Planned)).await.unwrap(), 1);

        let mut item = planned;
        item.status = WatchStatus::Completed;
        item.rating = Some(9);
        item.notes = Some("Rewatch".into());
        let updated = repo.update(&item).await.unwrap();
        assert_eq!(updated.status, WatchStatus::Completed);
        assert_eq!(updated.rating, Some(9));

        let completed = repo.list(Some(WatchStatus::Completed), 0, 10).await.unwrap();
        assert_eq!(completed.len(), 1);

        assert!(repo.delete(item.id).await.unwrap());
        assert_eq!(repo.count(None).await.unwrap(), 1);
    }
}
