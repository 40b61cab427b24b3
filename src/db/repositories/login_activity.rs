//! Login activity repository
//!
//! Append-only log of login attempts, pruned by age.

use crate::db::{Backend, DynDatabasePool};
use crate::models::{LoginActivity, NewLoginActivity};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait LoginActivityRepository: Send + Sync {
    async fn record(&self, entry: &NewLoginActivity) -> Result<()>;

    /// Newest first
    async fn list_recent(&self, offset: i64, limit: i64) -> Result<Vec<LoginActivity>>;

    async fn count(&self) -> Result<i64>;

    /// Failed attempts for `username` at or after `since`
    async fn count_failures_since(&self, username: &str, since: DateTime<Utc>) -> Result<i64>;

    /// Delete entries older than `cutoff`, returning how many were removed
    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// SQLx-based login activity repository
pub struct SqlxLoginActivityRepository {
    pool: DynDatabasePool,
}

impl SqlxLoginActivityRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn LoginActivityRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl LoginActivityRepository for SqlxLoginActivityRepository {
    async fn record(&self, entry: &NewLoginActivity) -> Result<()> {
        match self.pool.backend() {
            Backend::Sqlite(p) => record_sqlite(p, entry).await,
            Backend::Mysql(p) => record_mysql(p, entry).await,
        }
    }

    async fn list_recent(&self, offset: i64, limit: i64) -> Result<Vec<LoginActivity>> {
        let sql = "SELECT id, username, ip_address, user_agent, success, failure_reason, created_at \
                   FROM login_activity ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?";
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let rows = sqlx::query(sql)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(p)
                    .await
                    .context("Failed to list login activity")?;
                rows.iter().map(row_to_activity_sqlite).collect()
            }
            Backend::Mysql(p) => {
                let rows = sqlx::query(sql)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(p)
                    .await
                    .context("Failed to list login activity")?;
                rows.iter().map(row_to_activity_mysql).collect()
            }
        }
    }

    async fn count(&self) -> Result<i64> {
        let sql = "SELECT COUNT(*) as count FROM login_activity";
        let count: i64 = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(sql)
                .fetch_one(p)
                .await
                .context("Failed to count login activity")?
                .try_get("count")?,
            Backend::Mysql(p) => sqlx::query(sql)
                .fetch_one(p)
                .await
                .context("Failed to count login activity")?
                .try_get("count")?,
        };
        Ok(count)
    }

    async fn count_failures_since(&self, username: &str, since: DateTime<Utc>) -> Result<i64> {
        let sql = "SELECT COUNT(*) as count FROM login_activity \
                   WHERE username = ? AND success = FALSE AND created_at >= ?";
        let count: i64 = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(sql)
                .bind(username)
                .bind(since)
                .fetch_one(p)
                .await
                .context("Failed to count login failures")?
                .try_get("count")?,
            Backend::Mysql(p) => sqlx::query(sql)
                .bind(username)
                .bind(since)
                .fetch_one(p)
                .await
                .context("Failed to count login failures")?
                .try_get("count")?,
        };
        Ok(count)
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let sql = "DELETE FROM login_activity WHERE created_at < ?";
        let affected = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(sql)
                .bind(cutoff)
                .execute(p)
                .await
                .context("Failed to prune login activity")?
                .rows_affected(),
            Backend::Mysql(p) => sqlx::query(sql)
                .bind(cutoff)
                .execute(p)
                .await
                .context("Failed to prune login activity")?
                .rows_affected(),
        };
        Ok(affected)
    }
}

const INSERT_ACTIVITY_SQL: &str = "INSERT INTO login_activity \
    (username, ip_address, user_agent, success, failure_reason, created_at) VALUES (?, ?, ?, ?, ?, ?)";

// SQLite implementations
async fn record_sqlite(pool: &SqlitePool, entry: &NewLoginActivity) -> Result<()> {
    sqlx::query(INSERT_ACTIVITY_SQL)
        .bind(&entry.username)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(entry.success)
        .bind(&entry.failure_reason)
        .bind(Utc::now())
        .execute(pool)
        .await
        .context("Failed to record login activity")?;
    Ok(())
}

fn row_to_activity_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<LoginActivity> {
    Ok(LoginActivity {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        success: row.try_get("success")?,
        failure_reason: row.try_get("failure_reason")?,
        created_at: row.try_get("created_at")?,
    })
}

// MySQL implementations
async fn record_mysql(pool: &MySqlPool, entry: &NewLoginActivity) -> Result<()> {
    sqlx::query(INSERT_ACTIVITY_SQL)
        .bind(&entry.username)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(entry.success)
        .bind(&entry.failure_reason)
        .bind(Utc::now())
        .execute(pool)
        .await
        .context("Failed to record login activity")?;
    Ok(())
}

fn row_to_activity_mysql(row: &sqlx::mysql::MySqlRow) -> Result<LoginActivity> {
    Ok(LoginActivity {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        success: row.try_get("success")?,
        failure_reason: row.try_get("failure_reason")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use chrono::Duration;

    async fn setup_test_repo() -> (DynDatabasePool, SqlxLoginActivityRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        (pool.clone(), SqlxLoginActivityRepository::new(pool))
    }

    #[tokio::test]
    async fn test_record_and_list() {
        let (_pool, repo) = setup_test_repo().await;
        repo.record(&NewLoginActivity::failure("admin", "10.0.0.1", "invalid credentials"))
            .await
            .unwrap();
        repo.record(
            &NewLoginActivity::success("admin", "10.0.0.1")
                .with_user_agent(Some("curl/8".into())),
        )
        .await
        .unwrap();

        let recent = repo.list_recent(0, 10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent[0].success);
        assert_eq!(recent[0].user_agent.as_deref(), Some("curl/8"));
        assert_eq!(recent[1].failure_reason.as_deref(), Some("invalid credentials"));
        assert_eq!(repo.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_count_failures_since() {
        let (_pool, repo) = setup_test_repo().await;
        let before = Utc::now() - Duration::seconds(5);
        for _ in 0..3 {
            repo.record(&NewLoginActivity::failure("admin", "1.1.1.1", "bad"))
                .await
                .unwrap();
        }
        repo.record(&NewLoginActivity::failure("other", "1.1.1.1", "bad"))
            .await
            .unwrap();
        repo.record(&NewLoginActivity::success("admin", "1.1.1.1"))
            .await
            .unwrap();

        assert_eq!(repo.count_failures_since("admin", before).await.unwrap(), 3);
        let later = Utc::now() + Duration::seconds(5);
        assert_eq!(repo.count_failures_since("admin", later).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_prune_older_than() {
        let (pool, repo) = setup_test_repo().await;
        sqlx::query(
            "INSERT INTO login_activity (username, ip_address, success, created_at) VALUES ('a', 'x', 0, ?)",
        )
        .bind(Utc::now() - Duration::days(100))
        .execute(pool.as_sqlite().unwrap())
        .await
        .unwrap();
        repo.record(&NewLoginActivity::success("a", "x")).await.unwrap();

        let removed = repo
            .prune_older_than(Utc::now() - Duration::days(90))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(repo.count().await.unwrap(), 1);
    }
}
