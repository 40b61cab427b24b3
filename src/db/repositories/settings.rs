//! Settings repository
//!
//! Key/value storage for editable site settings (site name, hero text,
//! languages, feature toggles).

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::{Backend, DynDatabasePool};

/// A setting key-value pair
#[derive(Debug, Clone)]
pub struct Setting {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Setting>>;

    async fn get_all(&self) -> Result<Vec<Setting>>;

    /// All settings as a map
    async fn get_map(&self) -> Result<HashMap<String, String>>;

    /// The subset of `keys` that exist
    async fn get_many(&self, keys: &[&str]) -> Result<HashMap<String, String>>;

    /// Insert or overwrite a single setting
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn set_many(&self, settings: &HashMap<String, String>) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// SQLx-based settings repository
pub struct SqlxSettingsRepository {
    pool: DynDatabasePool,
}

impl SqlxSettingsRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SettingsRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SettingsRepository for SqlxSettingsRepository {
    async fn get(&self, key: &str) -> Result<Option<Setting>> {
        match self.pool.backend() {
            Backend::Sqlite(p) => get_sqlite(p, key).await,
            Backend::Mysql(p) => get_mysql(p, key).await,
        }
    }

    async fn get_all(&self) -> Result<Vec<Setting>> {
        match self.pool.backend() {
            Backend::Sqlite(p) => get_all_sqlite(p).await,
            Backend::Mysql(p) => get_all_mysql(p).await,
        }
    }

    async fn get_map(&self) -> Result<HashMap<String, String>> {
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .map(|s| (s.key, s.value))
            .collect())
    }

    async fn get_many(&self, keys: &[&str]) -> Result<HashMap<String, String>> {
        let mut result = HashMap::new();
        for key in keys {
            if let Some(setting) = self.get(key).await? {
                result.insert(setting.key, setting.value);
            }
        }
        Ok(result)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        match self.pool.backend() {
            Backend::Sqlite(p) => set_sqlite(p, key, value).await,
            Backend::Mysql(p) => set_mysql(p, key, value).await,
        }
    }

    async fn set_many(&self, settings: &HashMap<String, String>) -> Result<()> {
        for (key, value) in settings {
            self.set(key, value).await?;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                sqlx::query("DELETE FROM settings WHERE key = ?")
                    .bind(key)
                    .execute(p)
                    .await
                    .context("Failed to delete setting")?;
            }
            Backend::Mysql(p) => {
                sqlx::query("DELETE FROM settings WHERE `key` = ?")
                    .bind(key)
                    .execute(p)
                    .await
                    .context("Failed to delete setting")?;
            }
        }
        Ok(())
    }
}

// SQLite implementations
async fn get_sqlite(pool: &SqlitePool, key: &str) -> Result<Option<Setting>> {
    let row = sqlx::query("SELECT key, value, updated_at FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await
        .context("Failed to get setting")?;

    row.map(|r| -> Result<Setting> {
        Ok(Setting {
            key: r.try_get("key")?,
            value: r.try_get("value")?,
            updated_at: r.try_get("updated_at")?,
        })
    })
    .transpose()
}

async fn get_all_sqlite(pool: &SqlitePool) -> Result<Vec<Setting>> {
    let rows = sqlx::query("SELECT key, value, updated_at FROM settings ORDER BY key")
        .fetch_all(pool)
        .await
        .context("Failed to list settings")?;

    rows.into_iter()
        .map(|r| {
            Ok(Setting {
                key: r.try_get("key")?,
                value: r.try_get("value")?,
                updated_at: r.try_get("updated_at")?,
            })
        })
        .collect()
}

async fn set_sqlite(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
    )
    .bind(key)
    .bind(value)
    .bind(Utc::now())
    .execute(pool)
    .await
    .with_context(|| format!("Failed to store setting {}", key))?;
    Ok(())
}

// MySQL implementations
async fn get_mysql(pool: &MySqlPool, key: &str) -> Result<Option<Setting>> {
    let row = sqlx::query("SELECT `key`, value, updated_at FROM settings WHERE `key` = ?")
        .bind(key)
        .fetch_optional(pool)
        .await
        .context("Failed to get setting")?;

    row.map(|r| -> Result<Setting> {
        Ok(Setting {
            key: r.try_get("key")?,
            value: r.try_get("value")?,
            updated_at: r.try_get("updated_at")?,
        })
    })
    .transpose()
}

async fn get_all_mysql(pool: &MySqlPool) -> Result<Vec<Setting>> {
    let rows = sqlx::query("SELECT `key`, value, updated_at FROM settings ORDER BY `key`")
        .fetch_all(pool)
        .await
        .context("Failed to list settings")?;

    rows.into_iter()
        .map(|r| {
            Ok(Setting {
                key: r.try_get("key")?,
                value: r.try_get("value")?,
                updated_at: r.try_get("updated_at")?,
            })
        })
        .collect()
}

async fn set_mysql(pool: &MySqlPool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO settings (`key`, value, updated_at) VALUES (?, ?, ?)
         ON DUPLICATE KEY UPDATE value = VALUES(value), updated_at = VALUES(updated_at)",
    )
    .bind(key)
    .bind(value)
    .bind(Utc::now())
    .execute(pool)
    .await
    .with_context(|| format!("Failed to store setting {}", key))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> SqlxSettingsRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxSettingsRepository::new(pool)
    }

    #[tokio::test]
    async fn test_seeded_defaults() {
        let repo = setup_test_repo().await;
        let map = repo.get_map().await.unwrap();
        assert_eq!(map.get("site_name").map(String::as_str), Some("Folio"));
        assert_eq!(map.get("secondary_language").map(String::as_str), Some("de"));

        let some = repo.get_many(&["site_name", "nope"]).await.unwrap();
        assert_eq!(some.len(), 1);
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let repo = setup_test_repo().await;
        repo.set("site_name", "My Site").await.unwrap();
        repo.set("site_name", "Renamed").await.unwrap();

        let setting = repo.get("site_name").await.unwrap().unwrap();
        assert_eq!(setting.value, "Renamed");
    }

    #[tokio::test]
    async fn test_set_many_and_delete() {
        let repo = setup_test_repo().await;
        let mut values = HashMap::new();
        values.insert("custom_a".to_string(), "1".to_string());
        values.insert("custom_b".to_string(), "2".to_string());
        repo.set_many(&values).await.unwrap();

        assert_eq!(repo.get("custom_b").await.unwrap().unwrap().value, "2");

        repo.delete("custom_a").await.unwrap();
        assert!(repo.get("custom_a").await.unwrap().is_none());
    }
}
