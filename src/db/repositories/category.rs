//! Category repository
//!
//! - `CategoryRepository` trait defining category data access
//! - `SqlxCategoryRepository` implementing it for SQLite and MySQL
//!
//! Deleting a category leaves its posts uncategorised (`ON DELETE SET NULL`).

use crate::db::{Backend, DynDatabasePool};
use crate::models::{Category, CategoryWithCount};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn create(&self, name: &str, slug: &str, description: Option<&str>) -> Result<Category>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>>;

    async fn get_by_name(&self, name: &str) -> Result<Option<Category>>;

    /// All categories by name, each with its number of published posts
    async fn list_with_counts(&self) -> Result<Vec<CategoryWithCount>>;

    async fn update(&self, category: &Category) -> Result<Category>;

    /// Returns false if no row was deleted
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Check if a name is taken by a category other than `exclude_id`
    async fn exists_by_name(&self, name: &str, exclude_id: Option<i64>) -> Result<bool>;

    /// Check if a slug is taken by a category other than `exclude_id`
    async fn exists_by_slug(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool>;
}

/// SQLx-based category repository
pub struct SqlxCategoryRepository {
    pool: DynDatabasePool,
}

impl SqlxCategoryRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool))
    }

    async fn exists_where(&self, column: &str, value: &str, exclude_id: Option<i64>) -> Result<bool> {
        let sql = format!(
            "SELECT COUNT(*) as count FROM categories WHERE {} = ? AND id <> ?",
            column
        );
        let exclude_id = exclude_id.unwrap_or(0);
        let count: i64 = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(&sql)
                .bind(value)
                .bind(exclude_id)
                .fetch_one(p)
                .await
                .context("Failed to check category uniqueness")?
                .try_get("count")?,
            Backend::Mysql(p) => sqlx::query(&sql)
                .bind(value)
                .bind(exclude_id)
                .fetch_one(p)
                .await
                .context("Failed to check category uniqueness")?
                .try_get("count")?,
        };
        Ok(count > 0)
    }
}

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn create(&self, name: &str, slug: &str, description: Option<&str>) -> Result<Category> {
        let now = Utc::now();
        let sql = "INSERT INTO categories (name, slug, description, created_at) VALUES (?, ?, ?, ?)";
        let id = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(sql)
                .bind(name)
                .bind(slug)
                .bind(description)
                .bind(now)
                .execute(p)
                .await
                .context("Failed to create category")?
                .last_insert_rowid(),
            Backend::Mysql(p) => sqlx::query(sql)
                .bind(name)
                .bind(slug)
                .bind(description)
                .bind(now)
                .execute(p)
                .await
                .context("Failed to create category")?
                .last_insert_id() as i64,
        };
        Ok(Category {
            id,
            name: name.to_string(),
            slug: slug.to_string(),
            description: description.map(str::to_string),
            created_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>> {
        let sql = "SELECT id, name, slug, description, created_at FROM categories WHERE id = ?";
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let row = sqlx::query(sql)
                    .bind(id)
                    .fetch_optional(p)
                    .await
                    .context("Failed to get category by ID")?;
                row.as_ref().map(row_to_category_sqlite).transpose()
            }
            Backend::Mysql(p) => {
                let row = sqlx::query(sql)
                    .bind(id)
                    .fetch_optional(p)
                    .await
                    .context("Failed to get category by ID")?;
                row.as_ref().map(row_to_category_mysql).transpose()
            }
        }
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        let sql = "SELECT id, name, slug, description, created_at FROM categories WHERE slug = ?";
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let row = sqlx::query(sql)
                    .bind(slug)
                    .fetch_optional(p)
                    .await
                    .context("Failed to get category by slug")?;
                row.as_ref().map(row_to_category_sqlite).transpose()
            }
            Backend::Mysql(p) => {
                let row = sqlx::query(sql)
                    .bind(slug)
                    .fetch_optional(p)
                    .await
                    .context("Failed to get category by slug")?;
                row.as_ref().map(row_to_category_mysql).transpose()
            }
        }
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Category>> {
        let sql = "SELECT id, name, slug, description, created_at FROM categories WHERE name = ?";
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let row = sqlx::query(sql)
                    .bind(name)
                    .fetch_optional(p)
                    .await
                    .context("Failed to get category by name")?;
                row.as_ref().map(row_to_category_sqlite).transpose()
            }
            Backend::Mysql(p) => {
                let row = sqlx::query(sql)
                    .bind(name)
                    .fetch_optional(p)
                    .await
                    .context("Failed to get category by name")?;
                row.as_ref().map(row_to_category_mysql).transpose()
            }
        }
    }

    async fn list_with_counts(&self) -> Result<Vec<CategoryWithCount>> {
        match self.pool.backend() {
            Backend::Sqlite(p) => list_with_counts_sqlite(p).await,
            Backend::Mysql(p) => list_with_counts_mysql(p).await,
        }
    }

    async fn update(&self, category: &Category) -> Result<Category> {
        let sql = "UPDATE categories SET name = ?, slug = ?, description = ? WHERE id = ?";
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                sqlx::query(sql)
                    .bind(&category.name)
                    .bind(&category.slug)
                    .bind(&category.description)
                    .bind(category.id)
                    .execute(p)
                    .await
                    .context("Failed to update category")?;
            }
            Backend::Mysql(p) => {
                sqlx::query(sql)
                    .bind(&category.name)
                    .bind(&category.slug)
                    .bind(&category.description)
                    .bind(category.id)
                    .execute(p)
                    .await
                    .context("Failed to update category")?;
            }
        }
        self.get_by_id(category.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Category not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let sql = "DELETE FROM categories WHERE id = ?";
        let affected = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(sql)
                .bind(id)
                .execute(p)
                .await
                .context("Failed to delete category")?
                .rows_affected(),
            Backend::Mysql(p) => sqlx::query(sql)
                .bind(id)
                .execute(p)
                .await
                .context("Failed to delete category")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn exists_by_name(&self, name: &str, exclude_id: Option<i64>) -> Result<bool> {
        self.exists_where("name", name, exclude_id).await
    }

    async fn exists_by_slug(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        self.exists_where("slug", slug, exclude_id).await
    }
}

const LIST_WITH_COUNTS_SQL: &str = r#"
    SELECT c.id, c.name, c.slug, c.description, c.created_at,
           COUNT(p.id) as post_count
    FROM categories c
    LEFT JOIN posts p ON p.category_id = c.id AND p.status = 'published'
    GROUP BY c.id, c.name, c.slug, c.description, c.created_at
    ORDER BY c.name
"#;

// ============================================================================
// SQLite implementations
// ============================================================================

async fn list_with_counts_sqlite(pool: &SqlitePool) -> Result<Vec<CategoryWithCount>> {
    let rows = sqlx::query(LIST_WITH_COUNTS_SQL)
        .fetch_all(pool)
        .await
        .context("Failed to list categories")?;

    rows.iter()
        .map(|row| {
            Ok(CategoryWithCount {
                category: row_to_category_sqlite(row)?,
                post_count: row.try_get("post_count")?,
            })
        })
        .collect()
}

fn row_to_category_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Category> {
    Ok(Category {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn list_with_counts_mysql(pool: &MySqlPool) -> Result<Vec<CategoryWithCount>> {
    let rows = sqlx::query(LIST_WITH_COUNTS_SQL)
        .fetch_all(pool)
        .await
        .context("Failed to list categories")?;

    rows.iter()
        .map(|row| {
            Ok(CategoryWithCount {
                category: row_to_category_mysql(row)?,
                post_count: row.try_get("post_count")?,
            })
        })
        .collect()
}

fn row_to_category_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Category> {
    Ok(Category {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> (DynDatabasePool, SqlxCategoryRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        (pool.clone(), SqlxCategoryRepository::new(pool))
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (_pool, repo) = setup_test_repo().await;
        let created = repo.create("Rust", "rust", Some("Systems")).await.unwrap();

        let by_slug = repo.get_by_slug("rust").await.unwrap().unwrap();
        assert_eq!(by_slug.id, created.id);
        assert_eq!(by_slug.description.as_deref(), Some("Systems"));
        assert_eq!(repo.get_by_name("Rust").await.unwrap().unwrap().slug, "rust");
        assert!(repo.get_by_id(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_uniqueness_checks_exclude_self() {
        let (_pool, repo) = setup_test_repo().await;
        let cat = repo.create("Rust", "rust", None).await.unwrap();

        assert!(repo.exists_by_name("Rust", None).await.unwrap());
        assert!(!repo.exists_by_name("Rust", Some(cat.id)).await.unwrap());
        assert!(repo.exists_by_slug("rust", Some(cat.id + 1)).await.unwrap());
        assert!(!repo.exists_by_slug("go", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_with_counts_only_counts_published() {
        let (pool, repo) = setup_test_repo().await;
        let rust = repo.create("Rust", "rust", None).await.unwrap();
        repo.create("Art", "art", None).await.unwrap();

        let sqlite = pool.as_sqlite().unwrap();
        let author = sqlx::query(
            "INSERT INTO users (username, email, password_hash) VALUES ('a', 'a@x.io', 'h')",
        )
        .execute(sqlite)
        .await
        .unwrap()
        .last_insert_rowid();
        for (slug, status) in [("p1", "published"), ("p2", "published"), ("p3", "draft")] {
            sqlx::query(
                "INSERT INTO posts (slug, title, content, content_html, category_id, status, author_id)
                 VALUES (?, 't', 'c', 'c', ?, ?, ?)",
            )
            .bind(slug)
            .bind(rust.id)
            .bind(status)
            .bind(author)
            .execute(sqlite)
            .await
            .unwrap();
        }

        let list = repo.list_with_counts().await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].category.name, "Art");
        assert_eq!(list[0].post_count, 0);
        assert_eq!(list[1].post_count, 2);
    }

    #[tokio::test]
    async fn test_delete_detaches_posts() {
        let (pool, repo) = setup_test_repo().await;
        let cat = repo.create("Temp", "temp", None).await.unwrap();
        let sqlite = pool.as_sqlite().unwrap();
        let author = sqlx::query(
            "INSERT INTO users (username, email, password_hash) VALUES ('a', 'a@x.io', 'h')",
        )
        .execute(sqlite)
        .await
        .unwrap()
        .last_insert_rowid();
        sqlx::query(
            "INSERT INTO posts (slug, title, content, content_html, category_id, author_id)
             VALUES ('p', 't', 'c', 'c', ?, ?)",
        )
        .bind(cat.id)
        .bind(author)
        .execute(sqlite)
        .await
        .unwrap();

        assert!(repo.delete(cat.id).await.unwrap());
        let (category_id,): (Option<i64>,) =
            sqlx::query_as("SELECT category_id FROM posts WHERE slug = 'p'")
                .fetch_one(sqlite)
                .await
                .unwrap();
        assert!(category_id.is_none());
        assert!(!repo.delete(cat.id).await.unwrap());
    }
}
