//! Session repository
//!
//! Bearer-token sessions for the admin API.

use crate::db::{Backend, DynDatabasePool};
use crate::models::Session;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, user_id: i64, token: &str, expires_at: DateTime<Utc>)
        -> Result<Session>;

    async fn get_by_token(&self, token: &str) -> Result<Option<Session>>;

    async fn delete_by_token(&self, token: &str) -> Result<()>;

    /// Delete all sessions for a user
    async fn delete_by_user(&self, user_id: i64) -> Result<u64>;

    /// Delete expired sessions, returning how many were removed
    async fn delete_expired(&self) -> Result<u64>;
}

/// SQLx-based session repository
pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(
        &self,
        user_id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Session> {
        let created_at = Utc::now();
        let id = match self.pool.backend() {
            Backend::Sqlite(p) => {
                create_session_sqlite(p, user_id, token, expires_at, created_at).await?
            }
            Backend::Mysql(p) => {
                create_session_mysql(p, user_id, token, expires_at, created_at).await?
            }
        };
        Ok(Session {
            id,
            user_id,
            token: token.to_string(),
            expires_at,
            created_at,
        })
    }

    async fn get_by_token(&self, token: &str) -> Result<Option<Session>> {
        let sql = "SELECT id, user_id, token, expires_at, created_at FROM sessions WHERE token = ?";
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let row = sqlx::query(sql)
                    .bind(token)
                    .fetch_optional(p)
                    .await
                    .context("Failed to get session")?;
                row.as_ref().map(row_to_session_sqlite).transpose()
            }
            Backend::Mysql(p) => {
                let row = sqlx::query(sql)
                    .bind(token)
                    .fetch_optional(p)
                    .await
                    .context("Failed to get session")?;
                row.as_ref().map(row_to_session_mysql).transpose()
            }
        }
    }

    async fn delete_by_token(&self, token: &str) -> Result<()> {
        let sql = "DELETE FROM sessions WHERE token = ?";
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                sqlx::query(sql)
                    .bind(token)
                    .execute(p)
                    .await
                    .context("Failed to delete session")?;
            }
            Backend::Mysql(p) => {
                sqlx::query(sql)
                    .bind(token)
                    .execute(p)
                    .await
                    .context("Failed to delete session")?;
            }
        }
        Ok(())
    }

    async fn delete_by_user(&self, user_id: i64) -> Result<u64> {
        let sql = "DELETE FROM sessions WHERE user_id = ?";
        let affected = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(sql)
                .bind(user_id)
                .execute(p)
                .await
                .context("Failed to delete user sessions")?
                .rows_affected(),
            Backend::Mysql(p) => sqlx::query(sql)
                .bind(user_id)
                .execute(p)
                .await
                .context("Failed to delete user sessions")?
                .rows_affected(),
        };
        Ok(affected)
    }

    async fn delete_expired(&self) -> Result<u64> {
        let sql = "DELETE FROM sessions WHERE expires_at < ?";
        let now = Utc::now();
        let affected = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(sql)
                .bind(now)
                .execute(p)
                .await
                .context("Failed to delete expired sessions")?
                .rows_affected(),
            Backend::Mysql(p) => sqlx::query(sql)
                .bind(now)
                .execute(p)
                .await
                .context("Failed to delete expired sessions")?
                .rows_affected(),
        };
        Ok(affected)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_session_sqlite(
    pool: &SqlitePool,
    user_id: i64,
    token: &str,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO sessions (user_id, token, expires_at, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(token)
    .bind(expires_at)
    .bind(created_at)
    .execute(pool)
    .await
    .context("Failed to create session")?;

    Ok(result.last_insert_rowid())
}

fn row_to_session_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Session> {
    Ok(Session {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        token: row.try_get("token")?,
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_session_mysql(
    pool: &MySqlPool,
    user_id: i64,
    token: &str,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO sessions (user_id, token, expires_at, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(token)
    .bind(expires_at)
    .bind(created_at)
    .execute(pool)
    .await
    .context("Failed to create session")?;

    Ok(result.last_insert_id() as i64)
}

fn row_to_session_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Session> {
    Ok(Session {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        token: row.try_get("token")?,
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use chrono::Duration;

    async fn setup_test_repo() -> (DynDatabasePool, SqlxSessionRepository, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let user_id = sqlx::query(
            "INSERT INTO users (username, email, password_hash, role) VALUES ('u', 'u@x.io', 'h', 'admin')",
        )
        .execute(pool.as_sqlite().unwrap())
        .await
        .unwrap()
        .last_insert_rowid();
        (pool.clone(), SqlxSessionRepository::new(pool), user_id)
    }

    #[tokio::test]
    async fn test_create_and_get_by_token() {
        let (_pool, repo, user_id) = setup_test_repo().await;
        let expires = Utc::now() + Duration::hours(1);
        let created = repo.create(user_id, "tok-1", expires).await.unwrap();

        let found = repo.get_by_token("tok-1").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.user_id, user_id);
        assert!(!found.is_expired());
        assert!(repo.get_by_token("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_by_token_and_user() {
        let (_pool, repo, user_id) = setup_test_repo().await;
        let expires = Utc::now() + Duration::hours(1);
        repo.create(user_id, "a", expires).await.unwrap();
        repo.create(user_id, "b", expires).await.unwrap();
        repo.create(user_id, "c", expires).await.unwrap();

        repo.delete_by_token("a").await.unwrap();
        assert!(repo.get_by_token("a").await.unwrap().is_none());

        assert_eq!(repo.delete_by_user(user_id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_delete_expired() {
        let (_pool, repo, user_id) = setup_test_repo().await;
        repo.create(user_id, "old", Utc::now() - Duration::hours(1))
            .await
            .unwrap();
        repo.create(user_id, "fresh", Utc::now() + Duration::hours(1))
            .await
            .unwrap();

        assert_eq!(repo.delete_expired().await.unwrap(), 1);
        assert!(repo.get_by_token("fresh").await.unwrap().is_some());
    }
}
