//! Post repository
//!
//! - `PostRepository` trait defining post data access
//! - `SqlxPostRepository` implementing it for SQLite and MySQL
//!
//! Tags live in one comma-joined column. Tag matching wraps the column in
//! commas and compares with `LIKE '%,token,%'`, so `rust` never matches
//! `rustacean`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Database, Encode, MySqlPool, QueryBuilder, Row, SqlitePool, Type};
use std::sync::Arc;

use crate::db::{Backend, DynDatabasePool};
use crate::models::{
    tokens_from_column, tokens_to_column, Post, PostFilter, PostStatus, PostTranslation,
};

const POST_COLUMNS: &str = "id, slug, title, excerpt, content, content_html, cover_image, \
    category_id, tags, status, view_count, author_id, translated_title, translated_excerpt, \
    translated_content, translated_content_html, published_at, created_at, updated_at";

const SQLITE_TAGS_EXPR: &str = "(',' || tags || ',')";
const MYSQL_TAGS_EXPR: &str = "CONCAT(',', tags, ',')";

/// A fully prepared post row (slug generated, markdown rendered)
#[derive(Debug, Clone)]
pub struct NewPost {
    pub slug: String,
    pub title: String,
    pub excerpt: Option<String>,
    pub content: String,
    pub content_html: String,
    pub cover_image: Option<String>,
    pub category_id: Option<i64>,
    pub tags: Vec<String>,
    pub status: PostStatus,
    pub author_id: i64,
    pub published_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn create(&self, post: &NewPost) -> Result<Post>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Post>>;

    /// List posts matching the filter, newest first
    async fn list(&self, filter: &PostFilter, offset: i64, limit: i64) -> Result<Vec<Post>>;

    async fn count(&self, filter: &PostFilter) -> Result<i64>;

    /// Persist editable fields of `post` (not views or translation)
    async fn update(&self, post: &Post) -> Result<Post>;

    /// Returns false if no row was deleted
    async fn delete(&self, id: i64) -> Result<bool>;

    async fn exists_by_slug(&self, slug: &str) -> Result<bool>;

    /// Check if a slug is taken by a different post (for updates)
    async fn exists_by_slug_excluding(&self, slug: &str, exclude_id: i64) -> Result<bool>;

    /// Count one view; returns the stored count afterwards
    async fn increment_view_count(&self, id: i64) -> Result<i64>;

    /// Published posts sharing the category of `post` or any of its tags,
    /// excluding `post` itself, by view count then publish date.
    async fn find_related(&self, post: &Post, limit: i64) -> Result<Vec<Post>>;

    /// Store or clear the translated copy
    async fn update_translation(&self, id: i64, translation: Option<&PostTranslation>) -> Result<()>;
}

/// SQLx-based post repository
pub struct SqlxPostRepository {
    pool: DynDatabasePool,
}

impl SqlxPostRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn create(&self, post: &NewPost) -> Result<Post> {
        let id = match self.pool.backend() {
            Backend::Sqlite(p) => insert_post_sqlite(p, post).await?,
            Backend::Mysql(p) => insert_post_mysql(p, post).await?,
        };
        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Post not found after insert"))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>> {
        let sql = format!("SELECT {} FROM posts WHERE id = ?", POST_COLUMNS);
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(p)
                    .await
                    .context("Failed to get post by ID")?;
                row.as_ref().map(row_to_post_sqlite).transpose()
            }
            Backend::Mysql(p) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(p)
                    .await
                    .context("Failed to get post by ID")?;
                row.as_ref().map(row_to_post_mysql).transpose()
            }
        }
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Post>> {
        let sql = format!("SELECT {} FROM posts WHERE slug = ?", POST_COLUMNS);
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let row = sqlx::query(&sql)
                    .bind(slug)
                    .fetch_optional(p)
                    .await
                    .context("Failed to get post by slug")?;
                row.as_ref().map(row_to_post_sqlite).transpose()
            }
            Backend::Mysql(p) => {
                let row = sqlx::query(&sql)
                    .bind(slug)
                    .fetch_optional(p)
                    .await
                    .context("Failed to get post by slug")?;
                row.as_ref().map(row_to_post_mysql).transpose()
            }
        }
    }

    async fn list(&self, filter: &PostFilter, offset: i64, limit: i64) -> Result<Vec<Post>> {
        match self.pool.backend() {
            Backend::Sqlite(p) => list_posts_sqlite(p, filter, offset, limit).await,
            Backend::Mysql(p) => list_posts_mysql(p, filter, offset, limit).await,
        }
    }

    async fn count(&self, filter: &PostFilter) -> Result<i64> {
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let mut qb = QueryBuilder::new("SELECT COUNT(*) as count FROM posts");
                push_filter(&mut qb, filter, SQLITE_TAGS_EXPR);
                let row = qb.build().fetch_one(p).await.context("Failed to count posts")?;
                Ok(row.try_get("count")?)
            }
            Backend::Mysql(p) => {
                let mut qb = QueryBuilder::new("SELECT COUNT(*) as count FROM posts");
                push_filter(&mut qb, filter, MYSQL_TAGS_EXPR);
                let row = qb.build().fetch_one(p).await.context("Failed to count posts")?;
                Ok(row.try_get("count")?)
            }
        }
    }

    async fn update(&self, post: &Post) -> Result<Post> {
        let tags = tokens_to_column(&post.tags);
        let sql = r#"
            UPDATE posts
            SET slug = ?, title = ?, excerpt = ?, content = ?, content_html = ?, cover_image = ?,
                category_id = ?, tags = ?, status = ?, published_at = ?, updated_at = ?
            WHERE id = ?
        "#;
        let now = Utc::now();
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                sqlx::query(sql)
                    .bind(&post.slug)
                    .bind(&post.title)
                    .bind(&post.excerpt)
                    .bind(&post.content)
                    .bind(&post.content_html)
                    .bind(&post.cover_image)
                    .bind(post.category_id)
                    .bind(&tags)
                    .bind(post.status.as_str())
                    .bind(post.published_at)
                    .bind(now)
                    .bind(post.id)
                    .execute(p)
                    .await
                    .context("Failed to update post")?;
            }
            Backend::Mysql(p) => {
                sqlx::query(sql)
                    .bind(&post.slug)
                    .bind(&post.title)
                    .bind(&post.excerpt)
                    .bind(&post.content)
                    .bind(&post.content_html)
                    .bind(&post.cover_image)
                    .bind(post.category_id)
                    .bind(&tags)
                    .bind(post.status.as_str())
                    .bind(post.published_at)
                    .bind(now)
                    .bind(post.id)
                    .execute(p)
                    .await
                    .context("Failed to update post")?;
            }
        }
        self.get_by_id(post.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Post not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query("DELETE FROM posts WHERE id = ?")
                .bind(id)
                .execute(p)
                .await
                .context("Failed to delete post")?
                .rows_affected(),
            Backend::Mysql(p) => sqlx::query("DELETE FROM posts WHERE id = ?")
                .bind(id)
                .execute(p)
                .await
                .context("Failed to delete post")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn exists_by_slug(&self, slug: &str) -> Result<bool> {
        self.exists_by_slug_excluding(slug, 0).await
    }

    async fn exists_by_slug_excluding(&self, slug: &str, exclude_id: i64) -> Result<bool> {
        let sql = "SELECT COUNT(*) as count FROM posts WHERE slug = ? AND id <> ?";
        let count: i64 = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(sql)
                .bind(slug)
                .bind(exclude_id)
                .fetch_one(p)
                .await
                .context("Failed to check post slug")?
                .try_get("count")?,
            Backend::Mysql(p) => sqlx::query(sql)
                .bind(slug)
                .bind(exclude_id)
                .fetch_one(p)
                .await
                .context("Failed to check post slug")?
                .try_get("count")?,
        };
        Ok(count > 0)
    }

    async fn increment_view_count(&self, id: i64) -> Result<i64> {
        let update = "UPDATE posts SET view_count = view_count + 1 WHERE id = ?";
        let select = "SELECT view_count FROM posts WHERE id = ?";
        let count: i64 = match self.pool.backend() {
            Backend::Sqlite(p) => {
                sqlx::query(update).bind(id).execute(p).await.context("Failed to count view")?;
                sqlx::query(select)
                    .bind(id)
                    .fetch_one(p)
                    .await
                    .context("Failed to read view count")?
                    .try_get("view_count")?
            }
            Backend::Mysql(p) => {
                sqlx::query(update).bind(id).execute(p).await.context("Failed to count view")?;
                sqlx::query(select)
                    .bind(id)
                    .fetch_one(p)
                    .await
                    .context("Failed to read view count")?
                    .try_get("view_count")?
            }
        };
        Ok(count)
    }

    async fn find_related(&self, post: &Post, limit: i64) -> Result<Vec<Post>> {
        if post.category_id.is_none() && post.tags.is_empty() {
            return Ok(Vec::new());
        }
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let mut qb = QueryBuilder::new(format!("SELECT {} FROM posts", POST_COLUMNS));
                push_related(&mut qb, post, limit, SQLITE_TAGS_EXPR);
                let rows = qb
                    .build()
                    .fetch_all(p)
                    .await
                    .context("Failed to find related posts")?;
                rows.iter().map(row_to_post_sqlite).collect()
            }
            Backend::Mysql(p) => {
                let mut qb = QueryBuilder::new(format!("SELECT {} FROM posts", POST_COLUMNS));
                push_related(&mut qb, post, limit, MYSQL_TAGS_EXPR);
                let rows = qb
                    .build()
                    .fetch_all(p)
                    .await
                    .context("Failed to find related posts")?;
                rows.iter().map(row_to_post_mysql).collect()
            }
        }
    }

    async fn update_translation(&self, id: i64, translation: Option<&PostTranslation>) -> Result<()> {
        let sql = r#"
            UPDATE posts
            SET translated_title = ?, translated_excerpt = ?, translated_content = ?,
                translated_content_html = ?, updated_at = ?
            WHERE id = ?
        "#;
        let title = translation.map(|t| t.title.as_str());
        let excerpt = translation.and_then(|t| t.excerpt.as_deref());
        let content = translation.map(|t| t.content.as_str());
        let content_html = translation.map(|t| t.content_html.as_str());
        let now = Utc::now();
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                sqlx::query(sql)
                    .bind(title)
                    .bind(excerpt)
                    .bind(content)
                    .bind(content_html)
                    .bind(now)
                    .bind(id)
                    .execute(p)
                    .await
                    .context("Failed to store translation")?;
            }
            Backend::Mysql(p) => {
                sqlx::query(sql)
                    .bind(title)
                    .bind(excerpt)
                    .bind(content)
                    .bind(content_html)
                    .bind(now)
                    .bind(id)
                    .execute(p)
                    .await
                    .context("Failed to store translation")?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// Query building (shared by both drivers)
// ============================================================================

/// Escape a tag token for `LIKE ... ESCAPE '!'` and wrap it in commas
fn tag_like_pattern(token: &str) -> String {
    let escaped = token
        .replace('!', "!!")
        .replace('%', "!%")
        .replace('_', "!_");
    format!("%,{},%", escaped)
}

fn push_filter<'args, DB>(qb: &mut QueryBuilder<'args, DB>, filter: &PostFilter, tags_expr: &str)
where
    DB: Database,
    String: 'args + Encode<'args, DB> + Type<DB> + Send,
    i64: 'args + Encode<'args, DB> + Type<DB> + Send,
{
    let mut first = true;
    let mut and = |qb: &mut QueryBuilder<'args, DB>| {
        qb.push(if first { " WHERE " } else { " AND " });
        first = false;
    };

    if let Some(status) = filter.status {
        and(qb);
        qb.push("status = ").push_bind(status.as_str().to_string());
    }
    if let Some(category_id) = filter.category_id {
        and(qb);
        qb.push("category_id = ").push_bind(category_id);
    }
    if let Some(tag) = filter.tag.as_deref().filter(|t| !t.is_empty()) {
        and(qb);
        qb.push(tags_expr)
            .push(" LIKE ")
            .push_bind(tag_like_pattern(tag))
            .push(" ESCAPE '!'");
    }
}

fn push_related<'args, DB>(qb: &mut QueryBuilder<'args, DB>, post: &Post, limit: i64, tags_expr: &str)
where
    DB: Database,
    String: 'args + Encode<'args, DB> + Type<DB> + Send,
    i64: 'args + Encode<'args, DB> + Type<DB> + Send,
{
    qb.push(" WHERE status = ")
        .push_bind(PostStatus::Published.as_str().to_string())
        .push(" AND id <> ")
        .push_bind(post.id)
        .push(" AND (");

    let mut first = true;
    if let Some(category_id) = post.category_id {
        qb.push("category_id = ").push_bind(category_id);
        first = false;
    }
    for tag in &post.tags {
        if !first {
            qb.push(" OR ");
        }
        qb.push(tags_expr)
            .push(" LIKE ")
            .push_bind(tag_like_pattern(tag))
            .push(" ESCAPE '!'");
        first = false;
    }

    qb.push(") ORDER BY view_count DESC, published_at DESC, id DESC LIMIT ")
        .push_bind(limit);
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn insert_post_sqlite(pool: &SqlitePool, post: &NewPost) -> Result<i64> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO posts (slug, title, excerpt, content, content_html, cover_image, category_id,
                           tags, status, author_id, published_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&post.slug)
    .bind(&post.title)
    .bind(&post.excerpt)
    .bind(&post.content)
    .bind(&post.content_html)
    .bind(&post.cover_image)
    .bind(post.category_id)
    .bind(tokens_to_column(&post.tags))
    .bind(post.status.as_str())
    .bind(post.author_id)
    .bind(post.published_at)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create post")?;

    Ok(result.last_insert_rowid())
}

async fn list_posts_sqlite(
    pool: &SqlitePool,
    filter: &PostFilter,
    offset: i64,
    limit: i64,
) -> Result<Vec<Post>> {
    let mut qb = QueryBuilder::new(format!("SELECT {} FROM posts", POST_COLUMNS));
    push_filter(&mut qb, filter, SQLITE_TAGS_EXPR);
    qb.push(" ORDER BY COALESCE(published_at, created_at) DESC, id DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    let rows = qb.build().fetch_all(pool).await.context("Failed to list posts")?;
    rows.iter().map(row_to_post_sqlite).collect()
}

fn row_to_post_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Post> {
    let status_str: String = row.try_get("status")?;
    let status = PostStatus::from_str(&status_str)
        .ok_or_else(|| anyhow::anyhow!("Invalid post status: {}", status_str))?;
    let tags: String = row.try_get("tags")?;

    let translated_title: Option<String> = row.try_get("translated_title")?;
    let translation = match translated_title {
        Some(title) => Some(PostTranslation {
            title,
            excerpt: row.try_get("translated_excerpt")?,
            content: row.try_get::<Option<String>, _>("translated_content")?.unwrap_or_default(),
            content_html: row
                .try_get::<Option<String>, _>("translated_content_html")?
                .unwrap_or_default(),
        }),
        None => None,
    };

    Ok(Post {
        id: row.try_get("id")?,
        slug: row.try_get("slug")?,
        title: row.try_get("title")?,
        excerpt: row.try_get("excerpt")?,
        content: row.try_get("content")?,
        content_html: row.try_get("content_html")?,
        cover_image: row.try_get("cover_image")?,
        category_id: row.try_get("category_id")?,
        tags: tokens_from_column(&tags),
        status,
        view_count: row.try_get("view_count")?,
        author_id: row.try_get("author_id")?,
        translation,
        published_at: row.try_get("published_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn insert_post_mysql(pool: &MySqlPool, post: &NewPost) -> Result<i64> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO posts (slug, title, excerpt, content, content_html, cover_image, category_id,
                           tags, status, author_id, published_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&post.slug)
    .bind(&post.title)
    .bind(&post.excerpt)
    .bind(&post.content)
    .bind(&post.content_html)
    .bind(&post.cover_image)
    .bind(post.category_id)
    .bind(tokens_to_column(&post.tags))
    .bind(post.status.as_str())
    .bind(post.author_id)
    .bind(post.published_at)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create post")?;

    Ok(result.last_insert_id() as i64)
}

async fn list_posts_mysql(
    pool: &MySqlPool,
    filter: &PostFilter,
    offset: i64,
    limit: i64,
) -> Result<Vec<Post>> {
    let mut qb = QueryBuilder::new(format!("SELECT {} FROM posts", POST_COLUMNS));
    push_filter(&mut qb, filter, MYSQL_TAGS_EXPR);
    qb.push(" ORDER BY COALESCE(published_at, created_at) DESC, id DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    let rows = qb.build().fetch_all(pool).await.context("Failed to list posts")?;
    rows.iter().map(row_to_post_mysql).collect()
}

fn row_to_post_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Post> {
    let status_str: String = row.try_get("status")?;
    let status = PostStatus::from_str(&status_str)
        .ok_or_else(|| anyhow::anyhow!("Invalid post status: {}", status_str))?;
    let tags: String = row.try_get("tags")?;

    let translated_title: Option<String> = row.try_get("translated_title")?;
    let translation = match translated_title {
        Some(title) => Some(PostTranslation {
            title,
            excerpt: row.try_get("translated_excerpt")?,
            content: row.try_get::<Option<String>, _>("translated_content")?.unwrap_or_default(),
            content_html: row
                .try_get::<Option<String>, _>("translated_content_html")?
                .unwrap_or_default(),
        }),
        None => None,
    };

    Ok(Post {
        id: row.try_get("id")?,
        slug: row.try_get("slug")?,
        title: row.try_get("title")?,
        excerpt: row.try_get("excerpt")?,
        content: row.try_get("content")?,
        content_html: row.try_get("content_html")?,
        cover_image: row.try_get("cover_image")?,
        category_id: row.try_get("category_id")?,
        tags: tokens_from_column(&tags),
        status,
        view_count: row.try_get("view_count")?,
        author_id: row.try_get("author_id")?,
        translation,
        published_at: row.try_get("published_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use chrono::Duration;

    async fn setup_test_repo() -> (DynDatabasePool, SqlxPostRepository, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let user_id = sqlx::query(
            "INSERT INTO users (username, email, password_hash, role) VALUES (?, ?, ?, ?)",
        )
        .bind("author")
        .bind("author@example.com")
        .bind("hash")
        .bind("admin")
        .execute(pool.as_sqlite().unwrap())
        .await
        .expect("Failed to create test user")
        .last_insert_rowid();
        let repo = SqlxPostRepository::new(pool.clone());
        (pool, repo, user_id)
    }

    async fn create_category(pool: &DynDatabasePool, name: &str) -> i64 {
        sqlx::query("INSERT INTO categories (name, slug) VALUES (?, ?)")
            .bind(name)
            .bind(name.to_lowercase())
            .execute(pool.as_sqlite().unwrap())
            .await
            .expect("Failed to create category")
            .last_insert_rowid()
    }

    fn new_post(slug: &str, author_id: i64) -> NewPost {
        NewPost {
            slug: slug.to_string(),
            title: format!("Title {}", slug),
            excerpt: None,
            content: "content".to_string(),
            content_html: "<p>content</p>".to_string(),
            cover_image: None,
            category_id: None,
            tags: Vec::new(),
            status: PostStatus::Published,
            author_id,
            published_at: Some(Utc::now()),
        }
    }

    async fn set_views(pool: &DynDatabasePool, id: i64, views: i64) {
        sqlx::query("UPDATE posts SET view_count = ? WHERE id = ?")
            .bind(views)
            .bind(id)
            .execute(pool.as_sqlite().unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (_pool, repo, author) = setup_test_repo().await;

        let mut input = new_post("hello-world", author);
        input.tags = vec!["rust".into(), "web".into()];
        let created = repo.create(&input).await.unwrap();

        assert!(created.id > 0);
        assert_eq!(created.tags, vec!["rust", "web"]);
        assert_eq!(created.view_count, 0);
        assert!(created.translation.is_none());

        let by_slug = repo.get_by_slug("hello-world").await.unwrap().unwrap();
        assert_eq!(by_slug.id, created.id);
        assert!(repo.get_by_id(9999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_slug_rejected_by_database() {
        let (_pool, repo, author) = setup_test_repo().await;
        repo.create(&new_post("same", author)).await.unwrap();
        assert!(repo.create(&new_post("same", author)).await.is_err());
        assert!(repo.exists_by_slug("same").await.unwrap());
    }

    #[tokio::test]
    async fn test_exists_by_slug_excluding() {
        let (_pool, repo, author) = setup_test_repo().await;
        let post = repo.create(&new_post("mine", author)).await.unwrap();

        assert!(!repo.exists_by_slug_excluding("mine", post.id).await.unwrap());
        assert!(repo.exists_by_slug_excluding("mine", post.id + 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_filters_and_count() {
        let (pool, repo, author) = setup_test_repo().await;
        let cat = create_category(&pool, "Rust").await;

        let mut a = new_post("a", author);
        a.category_id = Some(cat);
        a.tags = vec!["async".into()];
        repo.create(&a).await.unwrap();

        let mut b = new_post("b", author);
        b.tags = vec!["asyncio".into()];
        repo.create(&b).await.unwrap();

        let mut c = new_post("c", author);
        c.status = PostStatus::Draft;
        c.published_at = None;
        c.category_id = Some(cat);
        repo.create(&c).await.unwrap();

        let published = PostFilter::published();
        assert_eq!(repo.count(&published).await.unwrap(), 2);
        assert_eq!(repo.count(&PostFilter::default()).await.unwrap(), 3);

        let in_cat = PostFilter::published().with_category(cat);
        let posts = repo.list(&in_cat, 0, 10).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].slug, "a");

        let tagged = PostFilter::published().with_tag("async");
        let posts = repo.list(&tagged, 0, 10).await.unwrap();
        assert_eq!(posts.len(), 1, "tag match must be whole-token");
        assert_eq!(posts[0].slug, "a");
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let (_pool, repo, author) = setup_test_repo().await;
        let mut post = repo.create(&new_post("edit-me", author)).await.unwrap();

        post.title = "Edited".to_string();
        post.tags = vec!["x".into()];
        let updated = repo.update(&post).await.unwrap();
        assert_eq!(updated.title, "Edited");
        assert_eq!(updated.tags, vec!["x"]);

        assert!(repo.delete(post.id).await.unwrap());
        assert!(!repo.delete(post.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_increment_view_count() {
        let (_pool, repo, author) = setup_test_repo().await;
        let post = repo.create(&new_post("viewed", author)).await.unwrap();

        assert_eq!(repo.increment_view_count(post.id).await.unwrap(), 1);
        assert_eq!(repo.increment_view_count(post.id).await.unwrap(), 2);

        assert_eq!(repo.get_by_id(post.id).await.unwrap().unwrap().view_count, 2);
    }

    #[tokio::test]
    async fn test_find_related_matches_category_or_tag() {
        let (pool, repo, author) = setup_test_repo().await;
        let rust = create_category(&pool, "Rust").await;
        let life = create_category(&pool, "Life").await;

        let mut source = new_post("source", author);
        source.category_id = Some(rust);
        source.tags = vec!["axum".into(), "sql".into()];
        let source = repo.create(&source).await.unwrap();

        let mut same_cat = new_post("same-cat", author);
        same_cat.category_id = Some(rust);
        let same_cat = repo.create(&same_cat).await.unwrap();

        let mut shared_tag = new_post("shared-tag", author);
        shared_tag.category_id = Some(life);
        shared_tag.tags = vec!["sql".into()];
        let shared_tag = repo.create(&shared_tag).await.unwrap();

        let mut unrelated = new_post("unrelated", author);
        unrelated.category_id = Some(life);
        unrelated.tags = vec!["sqlite".into()];
        repo.create(&unrelated).await.unwrap();

        let mut draft = new_post("draft", author);
        draft.category_id = Some(rust);
        draft.status = PostStatus::Draft;
        draft.published_at = None;
        repo.create(&draft).await.unwrap();

        set_views(&pool, shared_tag.id, 50).await;
        set_views(&pool, same_cat.id, 10).await;

        let related = repo.find_related(&source, 10).await.unwrap();
        let slugs: Vec<_> = related.iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(slugs, vec!["shared-tag", "same-cat"]);
    }

    #[tokio::test]
    async fn test_find_related_ties_break_on_publish_date_and_limit() {
        let (pool, repo, author) = setup_test_repo().await;
        let cat = create_category(&pool, "Rust").await;
        let now = Utc::now();

        let mut source = new_post("source", author);
        source.category_id = Some(cat);
        let source = repo.create(&source).await.unwrap();

        for (slug, days_ago) in [("old", 30), ("new", 1), ("mid", 10)] {
            let mut p = new_post(slug, author);
            p.category_id = Some(cat);
            p.published_at = Some(now - Duration::days(days_ago));
            repo.create(&p).await.unwrap();
        }

        let related = repo.find_related(&source, 2).await.unwrap();
        let slugs: Vec<_> = related.iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(slugs, vec!["new", "mid"]);
    }

    #[tokio::test]
    async fn test_find_related_without_category_or_tags_is_empty() {
        let (_pool, repo, author) = setup_test_repo().await;
        let source = repo.create(&new_post("lonely", author)).await.unwrap();
        repo.create(&new_post("other", author)).await.unwrap();

        assert!(repo.find_related(&source, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tag_with_like_wildcards_is_literal() {
        let (_pool, repo, author) = setup_test_repo().await;
        let mut p = new_post("c-plus", author);
        p.tags = vec!["c_lang".into()];
        repo.create(&p).await.unwrap();
        let mut q = new_post("c-minus", author);
        q.tags = vec!["cxlang".into()];
        repo.create(&q).await.unwrap();

        let posts = repo
            .list(&PostFilter::published().with_tag("c_lang"), 0, 10)
            .await
            .unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].slug, "c-plus");
    }

    #[tokio::test]
    async fn test_update_translation() {
        let (_pool, repo, author) = setup_test_repo().await;
        let post = repo.create(&new_post("bilingual", author)).await.unwrap();

        let translation = PostTranslation {
            title: "Zweisprachig".into(),
            excerpt: None,
            content: "Inhalt".into(),
            content_html: "<p>Inhalt</p>".into(),
        };
        repo.update_translation(post.id, Some(&translation)).await.unwrap();
        let stored = repo.get_by_id(post.id).await.unwrap().unwrap();
        assert_eq!(stored.translation, Some(translation));

        repo.update_translation(post.id, None).await.unwrap();
        assert!(repo.get_by_id(post.id).await.unwrap().unwrap().translation.is_none());
    }
}
