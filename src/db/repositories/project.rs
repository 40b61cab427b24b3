//! Project repository
//!
//! Portfolio projects. Listings put featured projects first, then follow
//! `sort_order` ascending, newest first within equal order.

use crate::db::{Backend, DynDatabasePool};
use crate::models::{tokens_from_column, tokens_to_column, Project};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

const PROJECT_COLUMNS: &str = "id, slug, title, summary, content, content_html, cover_image, \
    technologies, github_url, live_url, featured, sort_order, published, created_at, updated_at";

const PROJECT_ORDER: &str = "ORDER BY featured DESC, sort_order ASC, created_at DESC, id DESC";

/// A fully prepared project row
#[derive(Debug, Clone, Default)]
pub struct NewProject {
    pub slug: String,
    pub title: String,
    pub summary: Option<String>,
    pub content: String,
    pub content_html: String,
    pub cover_image: Option<String>,
    pub technologies: Vec<String>,
    pub github_url: Option<String>,
    pub live_url: Option<String>,
    pub featured: bool,
    pub sort_order: i64,
    pub published: bool,
}

#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn create(&self, project: &NewProject) -> Result<Project>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Project>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Project>>;

    async fn list(&self, published_only: bool, offset: i64, limit: i64) -> Result<Vec<Project>>;

    async fn count(&self, published_only: bool) -> Result<i64>;

    async fn update(&self, project: &Project) -> Result<Project>;

    async fn delete(&self, id: i64) -> Result<bool>;

    async fn exists_by_slug(&self, slug: &str) -> Result<bool>;

    async fn exists_by_slug_excluding(&self, slug: &str, exclude_id: i64) -> Result<bool>;
}

/// SQLx-based project repository
pub struct SqlxProjectRepository {
    pool: DynDatabasePool,
}

impl SqlxProjectRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ProjectRepository> {
        Arc::new(Self::new(pool))
    }
}

fn published_clause(published_only: bool) -> &'static str {
    if published_only {
        " WHERE published = TRUE"
    } else {
        ""
    }
}

#[async_trait]
impl ProjectRepository for SqlxProjectRepository {
    async fn create(&self, project: &NewProject) -> Result<Project> {
        let id = match self.pool.backend() {
            Backend::Sqlite(p) => insert_project_sqlite(p, project).await?,
            Backend::Mysql(p) => insert_project_mysql(p, project).await?,
        };
        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Project not found after insert"))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Project>> {
        let sql = format!("SELECT {} FROM projects WHERE id = ?", PROJECT_COLUMNS);
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(p)
                    .await
                    .context("Failed to get project by ID")?;
                row.as_ref().map(row_to_project_sqlite).transpose()
            }
            Backend::Mysql(p) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(p)
                    .await
                    .context("Failed to get project by ID")?;
                row.as_ref().map(row_to_project_mysql).transpose()
            }
        }
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Project>> {
        let sql = format!("SELECT {} FROM projects WHERE slug = ?", PROJECT_COLUMNS);
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let row = sqlx::query(&sql)
                    .bind(slug)
                    .fetch_optional(p)
                    .await
                    .context("Failed to get project by slug")?;
                row.as_ref().map(row_to_project_sqlite).transpose()
            }
            Backend::Mysql(p) => {
                let row = sqlx::query(&sql)
                    .bind(slug)
                    .fetch_optional(p)
                    .await
                    .context("Failed to get project by slug")?;
                row.as_ref().map(row_to_project_mysql).transpose()
            }
        }
    }

    async fn list(&self, published_only: bool, offset: i64, limit: i64) -> Result<Vec<Project>> {
        let sql = format!(
            "SELECT {} FROM projects{} {} LIMIT ? OFFSET ?",
            PROJECT_COLUMNS,
            published_clause(published_only),
            PROJECT_ORDER
        );
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let rows = sqlx::query(&sql)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(p)
                    .await
                    .context("Failed to list projects")?;
                rows.iter().map(row_to_project_sqlite).collect()
            }
            Backend::Mysql(p) => {
                let rows = sqlx::query(&sql)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(p)
                    .await
                    .context("Failed to list projects")?;
                rows.iter().map(row_to_project_mysql).collect()
            }
        }
    }

    async fn count(&self, published_only: bool) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) as count FROM projects{}",
            published_clause(published_only)
        );
        let count: i64 = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(&sql)
                .fetch_one(p)
                .await
                .context("Failed to count projects")?
                .try_get("count")?,
            Backend::Mysql(p) => sqlx::query(&sql)
                .fetch_one(p)
                .await
                .context("Failed to count projects")?
                .try_get("count")?,
        };
        Ok(count)
    }

    async fn update(&self, project: &Project) -> Result<Project> {
        match self.pool.backend() {
            Backend::Sqlite(p) => update_project_sqlite(p, project).await?,
            Backend::Mysql(p) => update_project_mysql(p, project).await?,
        }
        self.get_by_id(project.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Project not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let sql = "DELETE FROM projects WHERE id = ?";
        let affected = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(sql)
                .bind(id)
                .execute(p)
                .await
                .context("Failed to delete project")?
                .rows_affected(),
            Backend::Mysql(p) => sqlx::query(sql)
                .bind(id)
                .execute(p)
                .await
                .context("Failed to delete project")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn exists_by_slug(&self, slug: &str) -> Result<bool> {
        self.exists_by_slug_excluding(slug, 0).await
    }

    async fn exists_by_slug_excluding(&self, slug: &str, exclude_id: i64) -> Result<bool> {
        let sql = "SELECT COUNT(*) as count FROM projects WHERE slug = ? AND id <> ?";
        let count: i64 = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(sql)
                .bind(slug)
                .bind(exclude_id)
                .fetch_one(p)
                .await
                .context("Failed to check project slug")?
                .try_get("count")?,
            Backend::Mysql(p) => sqlx::query(sql)
                .bind(slug)
                .bind(exclude_id)
                .fetch_one(p)
                .await
                .context("Failed to check project slug")?
                .try_get("count")?,
        };
        Ok(count > 0)
    }
}

const INSERT_PROJECT_SQL: &str = r#"
    INSERT INTO projects (slug, title, summary, content, content_html, cover_image, technologies,
                          github_url, live_url, featured, sort_order, published, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const UPDATE_PROJECT_SQL: &str = r#"
    UPDATE projects
    SET slug = ?, title = ?, summary = ?, content = ?, content_html = ?, cover_image = ?,
        technologies = ?, github_url = ?, live_url = ?, featured = ?, sort_order = ?,
        published = ?, updated_at = ?
    WHERE id = ?
"#;

// ============================================================================
// SQLite implementations
// ============================================================================

async fn insert_project_sqlite(pool: &SqlitePool, project: &NewProject) -> Result<i64> {
    let now = Utc::now();
    let result = sqlx::query(INSERT_PROJECT_SQL)
        .bind(&project.slug)
        .bind(&project.title)
        .bind(&project.summary)
        .bind(&project.content)
        .bind(&project.content_html)
        .bind(&project.cover_image)
        .bind(tokens_to_column(&project.technologies))
        .bind(&project.github_url)
        .bind(&project.live_url)
        .bind(project.featured)
        .bind(project.sort_order)
        .bind(project.published)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create project")?;

    Ok(result.last_insert_rowid())
}

async fn update_project_sqlite(pool: &SqlitePool, project: &Project) -> Result<()> {
    sqlx::query(UPDATE_PROJECT_SQL)
        .bind(&project.slug)
        .bind(&project.title)
        .bind(&project.summary)
        .bind(&project.content)
        .bind(&project.content_html)
        .bind(&project.cover_image)
        .bind(tokens_to_column(&project.technologies))
        .bind(&project.github_url)
        .bind(&project.live_url)
        .bind(project.featured)
        .bind(project.sort_order)
        .bind(project.published)
        .bind(Utc::now())
        .bind(project.id)
        .execute(pool)
        .await
        .context("Failed to update project")?;
    Ok(())
}

fn row_to_project_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Project> {
    let technologies: String = row.try_get("technologies")?;
    Ok(Project {
        id: row.try_get("id")?,
        slug: row.try_get("slug")?,
        title: row.try_get("title")?,
        summary: row.try_get("summary")?,
        content: row.try_get("content")?,
        content_html: row.try_get("content_html")?,
        cover_image: row.try_get("cover_image")?,
        technologies: tokens_from_column(&technologies),
        github_url: row.try_get("github_url")?,
        live_url: row.try_get("live_url")?,
        featured: row.try_get("featured")?,
        sort_order: row.try_get("sort_order")?,
        published: row.try_get("published")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn insert_project_mysql(pool: &MySqlPool, project: &NewProject) -> Result<i64> {
    let now = Utc::now();
    let result = sqlx::query(INSERT_PROJECT_SQL)
        .bind(&project.slug)
        .bind(&project.title)
        .bind(&project.summary)
        .bind(&project.content)
        .bind(&project.content_html)
        .bind(&project.cover_image)
        .bind(tokens_to_column(&project.technologies))
        .bind(&project.github_url)
        .bind(&project.live_url)
        .bind(project.featured)
        .bind(project.sort_order)
        .bind(project.published)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create project")?;

    Ok(result.last_insert_id() as i64)
}

async fn update_project_mysql(pool: &MySqlPool, project: &Project) -> Result<()> {
    sqlx::query(UPDATE_PROJECT_SQL)
        .bind(&project.slug)
        .bind(&project.title)
        .bind(&project.summary)
        .bind(&project.content)
        .bind(&project.content_html)
        .bind(&project.cover_image)
        .bind(tokens_to_column(&project.technologies))
        .bind(&project.github_url)
        .bind(&project.live_url)
        .bind(project.featured)
        .bind(project.sort_order)
        .bind(project.published)
        .bind(Utc::now())
        .bind(project.id)
        .execute(pool)
        .await
        .context("Failed to update project")?;
    Ok(())
}

fn row_to_project_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Project> {
    let technologies: String = row.try_get("technologies")?;
    Ok(Project {
        id: row.try_get("id")?,
        slug: row.try_get("slug")?,
        title: row.try_get("title")?,
        summary: row.try_get("summary")?,
        content: row.try_get("content")?,
        content_html: row.try_get("content_html")?,
        cover_image: row.try_get("cover_image")?,
        technologies: tokens_from_column(&technologies),
        github_url: row.try_get("github_url")?,
        live_url: row.try_get("live_url")?,
        featured: row.try_get("featured")?,
        sort_order: row.try_get("sort_order")?,
        published: row.try_get("published")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
