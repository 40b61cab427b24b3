//! Shared API response types

use serde::Serialize;

use crate::models::{Category, PagedResult, Post, PostTranslation, Project, User};
use crate::services::MarkdownRenderer;

/// Category info embedded in post responses
#[derive(Debug, Serialize, Clone)]
pub struct CategoryInfo {
    pub id: i64,
    pub slug: String,
    pub name: String,
}

impl From<Category> for CategoryInfo {
    fn from(c: Category) -> Self {
        Self {
            id: c.id,
            slug: c.slug,
            name: c.name,
        }
    }
}

/// Full post, used by detail endpoints
#[derive(Debug, Serialize)]
pub struct PostResponse {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub excerpt: Option<String>,
    pub content: String,
    pub content_html: String,
    pub cover_image: Option<String>,
    pub category_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<CategoryInfo>,
    pub tags: Vec<String>,
    pub status: String,
    pub view_count: i64,
    pub reading_time_minutes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation: Option<PostTranslation>,
    pub author_id: i64,
    pub published_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl PostResponse {
    pub fn new(post: Post, renderer: &MarkdownRenderer) -> Self {
        Self {
            reading_time_minutes: renderer.reading_time_minutes(&post.content),
            id: post.id,
            slug: post.slug,
            title: post.title,
            excerpt: post.excerpt,
            content: post.content,
            content_html: post.content_html,
            cover_image: post.cover_image,
            category_id: post.category_id,
            category: None,
            tags: post.tags,
            status: post.status.to_string(),
            view_count: post.view_count,
            translation: post.translation,
            author_id: post.author_id,
            published_at: post.published_at.map(|dt| dt.to_rfc3339()),
            created_at: post.created_at.to_rfc3339(),
            updated_at: post.updated_at.to_rfc3339(),
        }
    }

    pub fn with_category(mut self, category: Option<Category>) -> Self {
        self.category = category.map(Into::into);
        self
    }
}

/// Post without its body, used in listings
#[derive(Debug, Serialize)]
pub struct PostSummary {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub excerpt: Option<String>,
    pub cover_image: Option<String>,
    pub category_id: Option<i64>,
    pub tags: Vec<String>,
    pub status: String,
    pub view_count: i64,
    pub reading_time_minutes: usize,
    pub has_translation: bool,
    pub published_at: Option<String>,
    pub updated_at: String,
}

impl PostSummary {
    pub fn new(post: Post, renderer: &MarkdownRenderer) -> Self {
        Self {
            reading_time_minutes: renderer.reading_time_minutes(&post.content),
            has_translation: post.translation.is_some(),
            id: post.id,
            slug: post.slug,
            title: post.title,
            excerpt: post.excerpt,
            cover_image: post.cover_image,
            category_id: post.category_id,
            tags: post.tags,
            status: post.status.to_string(),
            view_count: post.view_count,
            published_at: post.published_at.map(|dt| dt.to_rfc3339()),
            updated_at: post.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProjectResponse {
    pub id: i64,
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
    pub created_at: String,
    pub updated_at: String,
}

impl From<Project> for ProjectResponse {
    fn from(p: Project) -> Self {
        Self {
            id: p.id,
            slug: p.slug,
            title: p.title,
            summary: p.summary,
            content: p.content,
            content_html: p.content_html,
            cover_image: p.cover_image,
            technologies: p.technologies,
            github_url: p.github_url,
            live_url: p.live_url,
            featured: p.featured,
            sort_order: p.sort_order,
            published: p.published,
            created_at: p.created_at.to_rfc3339(),
            updated_at: p.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: String,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role.to_string(),
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

/// One page of any listing
#[derive(Debug, Serialize)]
pub struct PagedResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

impl<T> PagedResponse<T> {
    pub fn from_result<U>(result: PagedResult<U>, f: impl FnMut(U) -> T) -> Self {
        let total_pages = result.total_pages();
        let result = result.map(f);
        Self {
            items: result.items,
            total: result.total,
            page: result.page,
            per_page: result.per_page,
            total_pages,
        }
    }
}

impl<T> From<PagedResult<T>> for PagedResponse<T> {
    fn from(result: PagedResult<T>) -> Self {
        Self::from_result(result, |item| item)
    }
}
