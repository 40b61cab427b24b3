//! Contact message repository

use crate::db::{Backend, DynDatabasePool};
use crate::models::{ContactMessage, CreateContactMessage};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

const MESSAGE_COLUMNS: &str = "id, name, email, subject, message, ip_address, is_read, created_at";

#[async_trait]
pub trait ContactMessageRepository: Send + Sync {
    async fn create(&self, input: &CreateContactMessage) -> Result<ContactMessage>;

    async fn get_by_id(&self, id: i64) -> Result<Option<ContactMessage>>;

    /// Newest first
    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<ContactMessage>>;

    async fn count(&self) -> Result<i64>;

    async fn count_unread(&self) -> Result<i64>;

    /// Returns false if the message does not exist
    async fn mark_read(&self, id: i64, read: bool) -> Result<bool>;

    async fn delete(&self, id: i64) -> Result<bool>;
}

/// SQLx-based contact message repository
pub struct SqlxContactMessageRepository {
    pool: DynDatabasePool,
}

impl SqlxContactMessageRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ContactMessageRepository> {
        Arc::new(Self::new(pool))
    }

    async fn scalar_count(&self, sql: &str) -> Result<i64> {
        let count: i64 = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(sql)
                .fetch_one(p)
                .await
                .context("Failed to count messages")?
                .try_get("count")?,
            Backend::Mysql(p) => sqlx::query(sql)
                .fetch_one(p)
                .await
                .context("Failed to count messages")?
                .try_get("count")?,
        };
        Ok(count)
    }

    async fn execute_by_id(&self, sql: &str, id: i64, read: Option<bool>) -> Result<u64> {
        let affected = match self.pool.backend() {
            Backend::Sqlite(p) => {
                let mut query = sqlx::query(sql);
                if let Some(read) = read {
                    query = query.bind(read);
                }
                query
                    .bind(id)
                    .execute(p)
                    .await
                    .context("Failed to modify message")?
                    .rows_affected()
            }
            Backend::Mysql(p) => {
                let mut query = sqlx::query(sql);
                if let Some(read) = read {
                    query = query.bind(read);
                }
                query
                    .bind(id)
                    .execute(p)
                    .await
                    .context("Failed to modify message")?
                    .rows_affected()
            }
        };
        Ok(affected)
    }
}

#[async_trait]
impl ContactMessageRepository for SqlxContactMessageRepository {
    async fn create(&self, input: &CreateContactMessage) -> Result<ContactMessage> {
        let now = Utc::now();
        let id = match self.pool.backend() {
            Backend::Sqlite(p) => insert_message_sqlite(p, input).await?,
            Backend::Mysql(p) => insert_message_mysql(p, input).await?,
        };
        Ok(ContactMessage {
            id,
            name: input.name.clone(),
            email: input.email.clone(),
            subject: input.subject.clone(),
            message: input.message.clone(),
            ip_address: input.ip_address.clone(),
            read: false,
            created_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<ContactMessage>> {
        let sql = format!("SELECT {} FROM contact_messages WHERE id = ?", MESSAGE_COLUMNS);
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(p)
                    .await
                    .context("Failed to get message")?;
                row.as_ref().map(row_to_message_sqlite).transpose()
            }
            Backend::Mysql(p) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(p)
                    .await
                    .context("Failed to get message")?;
                row.as_ref().map(row_to_message_mysql).transpose()
            }
        }
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<ContactMessage>> {
        let sql = format!(
            "SELECT {} FROM contact_messages ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            MESSAGE_COLUMNS
        );
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let rows = sqlx::query(&sql)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(p)
                    .await
                    .context("Failed to list messages")?;
                rows.iter().map(row_to_message_sqlite).collect()
            }
            Backend::Mysql(p) => {
                let rows = sqlx::query(&sql)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(p)
                    .await
                    .context("Failed to list messages")?;
                rows.iter().map(row_to_message_mysql).collect()
            }
        }
    }

    async fn count(&self) -> Result<i64> {
        self.scalar_count("SELECT COUNT(*) as count FROM contact_messages")
            .await
    }

    async fn count_unread(&self) -> Result<i64> {
        self.scalar_count("SELECT COUNT(*) as count FROM contact_messages WHERE is_read = FALSE")
            .await
    }

    async fn mark_read(&self, id: i64, read: bool) -> Result<bool> {
        let affected = self
            .execute_by_id("UPDATE contact_messages SET is_read = ? WHERE id = ?", id, Some(read))
            .await?;
        Ok(affected > 0)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = self
            .execute_by_id("DELETE FROM contact_messages WHERE id = ?", id, None)
            .await?;
        Ok(affected > 0)
    }
}

const INSERT_MESSAGE_SQL: &str = "INSERT INTO contact_messages \
    (name, email, subject, message, ip_address, is_read, created_at) VALUES (?, ?, ?, ?, ?, FALSE, ?)";

// SQLite implementations
async fn insert_message_sqlite(pool: &SqlitePool, input: &CreateContactMessage) -> Result<i64> {
    let result = sqlx::query(INSERT_MESSAGE_SQL)
        .bind(&input.name)
        .bind(&input.email)
        .bind(&input.subject)
        .bind(&input.message)
        .bind(&input.ip_address)
        .bind(Utc::now())
        .execute(pool)
        .await
        .context("Failed to store contact message")?;
    Ok(result.last_insert_rowid())
}

fn row_to_message_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<ContactMessage> {
    Ok(ContactMessage {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        subject: row.try_get("subject")?,
        message: row.try_get("message")?,
        ip_address: row.try_get("ip_address")?,
        read: row.try_get("is_read")?,
        created_at: row.try_get("created_at")?,
    })
}

// MySQL implementations
async fn insert_message_mysql(pool: &MySqlPool, input: &CreateContactMessage) -> Result<i64> {
    let result = sqlx::query(INSERT_MESSAGE_SQL)
        .bind(&input.name)
        .bind(&input.email)
        .bind(&input.subject)
        .bind(&input.message)
        .bind(&input.ip_address)
        .bind(Utc::now())
        .execute(pool)
        .await
        .context("Failed to store contact message")?;
    Ok(result.last_insert_id() as i64)
}

fn row_to_message_mysql(row: &sqlx::mysql::MySqlRow) -> Result<ContactMessage> {
    Ok(ContactMessage {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        subject: row.try_get("subject")?,
        message: row.try_get("message")?,
        ip_address: row.try_get("ip_address")?,
        read: row.try_get("is_read")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> SqlxContactMessageRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxContactMessageRepository::new(pool)
    }

    fn message(name: &str) -> CreateContactMessage {
        CreateContactMessage {
            name: name.to_string(),
            email: format!("{}@example.com", name),
            subject: Some("Hello".into()),
            message: "I liked your post about lifetimes.".into(),
            ip_address: Some("203.0.113.7".into()),
        }
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let repo = setup_test_repo().await;
        let first = repo.create(&message("ann")).await.unwrap();
        repo.create(&message("bob")).await.unwrap();

        assert!(!first.read);
        assert_eq!(repo.count().await.unwrap(), 2);
        assert_eq!(repo.list(0, 10).await.unwrap().len(), 2);
        assert_eq!(repo.list(1, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mark_read_and_unread_count() {
        let repo = setup_test_repo().await;
        let msg = repo.create(&message("ann")).await.unwrap();
        repo.create(&message("bob")).await.unwrap();
        assert_eq!(repo.count_unread().await.unwrap(), 2);

        assert!(repo.mark_read(msg.id, true).await.unwrap());
        assert_eq!(repo.count_unread().await.unwrap(), 1);
        assert!(repo.get_by_id(msg.id).await.unwrap().unwrap().read);
        assert!(!repo.mark_read(9999, true).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = setup_test_repo().await;
        let msg = repo.create(&message("ann")).await.unwrap();
        assert!(repo.delete(msg.id).await.unwrap());
        assert!(!repo.delete(msg.id).await.unwrap());
    }
}
