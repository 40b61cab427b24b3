//! Project service
//!
//! Portfolio projects follow the same slug and Markdown rules as posts.
//! Visibility is a plain `published` flag; featured projects sort first.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{Cache, CacheLayer};
use crate::db::is_unique_violation;
use crate::db::repositories::{NewProject, ProjectRepository};
use crate::models::{
    normalize_tokens, CreateProjectInput, ListParams, PagedResult, Project, UpdateProjectInput,
};
use crate::services::markdown::MarkdownRenderer;
use crate::services::slug::{generate_slug, unique_slug};

pub const MAX_TITLE_LENGTH: usize = 200;
pub const MAX_SUMMARY_LENGTH: usize = 500;
pub const MAX_TECHNOLOGIES: usize = 30;

const PROJECT_CACHE_TTL: Duration = Duration::from_secs(3600);
const LIST_CACHE_TTL: Duration = Duration::from_secs(600);

const CACHE_KEY_PROJECT_BY_SLUG: &str = "project:slug:";
const CACHE_KEY_PROJECT_LIST: &str = "projects:list:";

#[derive(Debug, thiserror::Error)]
pub enum ProjectServiceError {
    #[error("Project not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Project slug already exists: {0}")]
    DuplicateSlug(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct ProjectService {
    repo: Arc<dyn ProjectRepository>,
    cache: Arc<Cache>,
    renderer: MarkdownRenderer,
}

impl ProjectService {
    pub fn new(repo: Arc<dyn ProjectRepository>, cache: Arc<Cache>, renderer: MarkdownRenderer) -> Self {
        Self {
            repo,
            cache,
            renderer,
        }
    }

    pub async fn create(&self, input: CreateProjectInput) -> Result<Project, ProjectServiceError> {
        let title = input.title.trim().to_string();
        validate_title(&title)?;
        let summary = validate_summary(input.summary)?;
        let technologies = normalize_tokens(&input.technologies);
        if technologies.len() > MAX_TECHNOLOGIES {
            return Err(ProjectServiceError::ValidationError(format!(
                "At most {} technologies",
                MAX_TECHNOLOGIES
            )));
        }
        let github_url = validate_url(input.github_url, "github_url")?;
        let live_url = validate_url(input.live_url, "live_url")?;

        let slug = match input.slug.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(requested) => {
                let slug = normalized_slug(requested)?;
                if self.repo.exists_by_slug(&slug).await? {
                    return Err(ProjectServiceError::DuplicateSlug(slug));
                }
                slug
            }
            None => {
                let repo = self.repo.clone();
                unique_slug(&normalized_slug(&title)?, move |candidate| {
                    let repo = repo.clone();
                    async move { repo.exists_by_slug(&candidate).await }
                })
                .await?
            }
        };

        let new_project = NewProject {
            slug,
            title,
            summary,
            content_html: self.renderer.render(&input.content),
            content: input.content,
            cover_image: input.cover_image.filter(|c| !c.trim().is_empty()),
            technologies,
            github_url,
            live_url,
            featured: input.featured,
            sort_order: input.sort_order,
            published: input.published,
        };

        let project = match self.repo.create(&new_project).await {
            Ok(project) => project,
            Err(e) if is_unique_violation(&e) => {
                return Err(ProjectServiceError::DuplicateSlug(new_project.slug))
            }
            Err(e) => return Err(e.context("Failed to create project").into()),
        };

        tracing::info!("Created project {} ({})", project.id, project.slug);
        self.invalidate(&project.slug).await;
        Ok(project)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Project>, ProjectServiceError> {
        Ok(self.repo.get_by_id(id).await?)
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<Project>, ProjectServiceError> {
        Ok(self.repo.get_by_slug(slug).await?)
    }

    pub async fn get_published_by_slug(&self, slug: &str) -> Result<Option<Project>, ProjectServiceError> {
        let key = format!("{}{}", CACHE_KEY_PROJECT_BY_SLUG, slug);
        if let Some(project) = self.cache.get::<Project>(&key).await.ok().flatten() {
            return Ok(Some(project));
        }
        let project = self.repo.get_by_slug(slug).await?.filter(|p| p.published);
        if let Some(ref p) = project {
            let _ = self.cache.set(&key, p, PROJECT_CACHE_TTL).await;
        }
        Ok(project)
    }

    pub async fn list(&self, params: &ListParams) -> Result<PagedResult<Project>, ProjectServiceError> {
        self.list_inner(false, params).await
    }

    pub async fn list_published(&self, params: &ListParams) -> Result<PagedResult<Project>, ProjectServiceError> {
        let key = format!("{}{}:{}", CACHE_KEY_PROJECT_LIST, params.page, params.per_page);
        if let Some(page) = self.cache.get::<PagedResult<Project>>(&key).await.ok().flatten() {
            return Ok(page);
        }
        let page = self.list_inner(true, params).await?;
        let _ = self.cache.set(&key, &page, LIST_CACHE_TTL).await;
        Ok(page)
    }

    async fn list_inner(
        &self,
        published_only: bool,
        params: &ListParams,
    ) -> Result<PagedResult<Project>, ProjectServiceError> {
        let items = self
            .repo
            .list(published_only, params.offset(), params.limit())
            .await?;
        let total = self.repo.count(published_only).await?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn update(&self, id: i64, input: UpdateProjectInput) -> Result<Project, ProjectServiceError> {
        let mut project = self.require(id).await?;
        let old_slug = project.slug.clone();

        if let Some(title) = input.title {
            let title = title.trim().to_string();
            validate_title(&title)?;
            project.title = title;
        }
        if let Some(slug) = input.slug {
            let slug = normalized_slug(&slug)?;
            if slug != project.slug && self.repo.exists_by_slug_excluding(&slug, id).await? {
                return Err(ProjectServiceError::DuplicateSlug(slug));
            }
            project.slug = slug;
        }
        if let Some(summary) = input.summary {
            project.summary = validate_summary(Some(summary))?;
        }
        if let Some(content) = input.content {
            project.content_html = self.renderer.render(&content);
            project.content = content;
        }
        if let Some(cover) = input.cover_image {
            project.cover_image = Some(cover).filter(|c| !c.trim().is_empty());
        }
        if let Some(technologies) = input.technologies {
            project.technologies = normalize_tokens(&technologies);
        }
        if let Some(url) = input.github_url {
            project.github_url = validate_url(Some(url), "github_url")?;
        }
        if let Some(url) = input.live_url {
            project.live_url = validate_url(Some(url), "live_url")?;
        }
        if let Some(featured) = input.featured {
            project.featured = featured;
        }
        if let Some(sort_order) = input.sort_order {
            project.sort_order = sort_order;
        }
        if let Some(published) = input.published {
            project.published = published;
        }

        let updated = match self.repo.update(&project).await {
            Ok(updated) => updated,
            Err(e) if is_unique_violation(&e) => return Err(ProjectServiceError::DuplicateSlug(project.slug)),
            Err(e) => return Err(e.context("Failed to update project").into()),
        };
        self.invalidate(&old_slug).await;
        if updated.slug != old_slug {
            self.invalidate(&updated.slug).await;
        }
        Ok(updated)
    }

    pub async fn set_featured(&self, id: i64, featured: bool) -> Result<Project, ProjectServiceError> {
        self.update(
            id,
            UpdateProjectInput {
                featured: Some(featured),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn delete(&self, id: i64) -> Result<(), ProjectServiceError> {
        let project = self.require(id).await?;
        self.repo.delete(id).await?;
        tracing::info!("Deleted project {} ({})", id, project.slug);
        self.invalidate(&project.slug).await;
        Ok(())
    }

    async fn require(&self, id: i64) -> Result<Project, ProjectServiceError> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| ProjectServiceError::NotFound(id.to_string()))
    }

    async fn invalidate(&self, slug: &str) {
        let _ = self
            .cache
            .delete(&format!("{}{}", CACHE_KEY_PROJECT_BY_SLUG, slug))
            .await;
        let _ = self
            .cache
            .delete_pattern(&format!("{}*", CACHE_KEY_PROJECT_LIST))
            .await;
    }
}

fn normalized_slug(raw: &str) -> Result<String, ProjectServiceError> {
    let slug = generate_slug(raw);
    if slug.is_empty() {
        return Err(ProjectServiceError::ValidationError(
            "Slug must contain at least one letter or digit".to_string(),
        ));
    }
    Ok(slug)
}

fn validate_title(title: &str) -> Result<(), ProjectServiceError> {
    if title.is_empty() || title.chars().count() > MAX_TITLE_LENGTH {
        return Err(ProjectServiceError::ValidationError(format!(
            "Project title must be 1-{} characters",
            MAX_TITLE_LENGTH
        )));
    }
    Ok(())
}

fn validate_summary(summary: Option<String>) -> Result<Option<String>, ProjectServiceError> {
    let summary = summary.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    if summary.as_ref().is_some_and(|s| s.chars().count() > MAX_SUMMARY_LENGTH) {
        return Err(ProjectServiceError::ValidationError(format!(
            "Summary must be at most {} characters",
            MAX_SUMMARY_LENGTH
        )));
    }
    Ok(summary)
}

/// Blank means unset; anything else must be an absolute http(s) URL
fn validate_url(url: Option<String>, field: &str) -> Result<Option<String>, ProjectServiceError> {
    let Some(url) = url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()) else {
        return Ok(None);
    };
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        return Err(ProjectServiceError::ValidationError(format!(
            "{} must start with http:// or https://",
            field
        )));
    }
    Ok(Some(url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::repositories::SqlxProjectRepository;
    use crate::db::{create_test_pool, migrations};

    async fn setup() -> ProjectService {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        ProjectService::new(
            SqlxProjectRepository::boxed(pool),
            Arc::new(Cache::Memory(MemoryCache::new())),
            MarkdownRenderer::new(),
        )
    }

    #[tokio::test]
    async fn test_create_project() {
        let service = setup().await;
        let mut input = CreateProjectInput::new("Folio CMS")
            .with_technologies(&["Rust", "Axum", "rust"])
            .published();
        input.content = "Built with **axum**.".into();
        input.github_url = Some("https://github.com/me/folio".into());

        let project = service.create(input).await.unwrap();
        assert_eq!(project.slug, "folio-cms");
        assert_eq!(project.technologies, vec!["rust", "axum"]);
        assert!(project.content_html.contains("<strong>axum</strong>"));
    }

    #[tokio::test]
    async fn test_create_validation() {
        let service = setup().await;
        assert!(matches!(
            service.create(CreateProjectInput::new("")).await,
            Err(ProjectServiceError::ValidationError(_))
        ));

        let mut bad_url = CreateProjectInput::new("Bad");
        bad_url.live_url = Some("javascript:alert(1)".into());
        assert!(matches!(
            service.create(bad_url).await,
            Err(ProjectServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_slug() {
        let service = setup().await;
        let mut first = CreateProjectInput::new("One");
        first.slug = Some("tool".into());
        service.create(first).await.unwrap();

        let mut second = CreateProjectInput::new("Two");
        second.slug = Some("tool".into());
        assert!(matches!(
            service.create(second).await,
            Err(ProjectServiceError::DuplicateSlug(_))
        ));
    }

    #[tokio::test]
    async fn test_list_published_orders_featured_first() {
        let service = setup().await;
        let older = service.create(CreateProjectInput::new("Older").published()).await.unwrap();
        service.create(CreateProjectInput::new("Hidden")).await.unwrap();
        service.create(CreateProjectInput::new("Newer").published()).await.unwrap();

        let page = service.list_published(&ListParams::default()).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items[0].slug, "newer");

        service.set_featured(older.id, true).await.unwrap();
        let page = service.list_published(&ListParams::default()).await.unwrap();
        assert_eq!(page.items[0].slug, "older");
        assert_eq!(service.list(&ListParams::default()).await.unwrap().total, 3);
    }

    #[tokio::test]
    async fn test_unpublished_hidden_from_public_lookup() {
        let service = setup().await;
        let project = service.create(CreateProjectInput::new("Secret")).await.unwrap();
        assert!(service.get_published_by_slug("secret").await.unwrap().is_none());

        service
            .update(
                project.id,
                UpdateProjectInput {
                    published: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(service.get_published_by_slug("secret").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete() {
        let service = setup().await;
        let project = service.create(CreateProjectInput::new("Temp")).await.unwrap();
        service.delete(project.id).await.unwrap();
        assert!(matches!(
            service.delete(project.id).await,
            Err(ProjectServiceError::NotFound(_))
        ));
    }
}
