//! Category service
//!
//! Names and slugs are unique. Deleting a category leaves its posts
//! uncategorised (the foreign key is `ON DELETE SET NULL`).

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::CategoryRepository;
use crate::db::unique_violation;
use crate::models::{Category, CategoryWithCount, CreateCategoryInput, UpdateCategoryInput};
use crate::services::slug::generate_slug;

pub const MAX_NAME_LENGTH: usize = 100;
pub const MAX_DESCRIPTION_LENGTH: usize = 500;

const CATEGORY_CACHE_TTL: Duration = Duration::from_secs(3600);

const CACHE_KEY_CATEGORY_LIST: &str = "categories:list";

#[derive(Debug, thiserror::Error)]
pub enum CategoryServiceError {
    #[error("Category name already exists: {0}")]
    DuplicateName(String),

    #[error("Category slug already exists: {0}")]
    DuplicateSlug(String),

    #[error("Category not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct CategoryService {
    repo: Arc<dyn CategoryRepository>,
    cache: Arc<Cache>,
}

impl CategoryService {
    pub fn new(repo: Arc<dyn CategoryRepository>, cache: Arc<Cache>) -> Self {
        Self { repo, cache }
    }

    pub async fn create(&self, input: CreateCategoryInput) -> Result<Category, CategoryServiceError> {
        let name = validate_name(&input.name)?;
        let description = validate_description(input.description)?;

        if self
            .repo
            .exists_by_name(&name, None)
            .await
            .context("Failed to check name uniqueness")?
        {
            return Err(CategoryServiceError::DuplicateName(name));
        }

        let slug = slug_for(input.slug.as_deref(), &name)?;
        if self.repo.exists_by_slug(&slug, None).await? {
            return Err(CategoryServiceError::DuplicateSlug(slug));
        }

        let category = match self.repo.create(&name, &slug, description.as_deref()).await {
            Ok(category) => category,
            Err(e) => return Err(duplicate_or(e, name, slug, "Failed to create category")),
        };
        tracing::info!("Created category {} ({})", category.id, category.slug);

        self.invalidate().await;
        Ok(category)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Category>, CategoryServiceError> {
        Ok(self.repo.get_by_id(id).await?)
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>, CategoryServiceError> {
        Ok(self.repo.get_by_slug(slug).await?)
    }

    /// Every category with its published post count, by name
    pub async fn list(&self) -> Result<Vec<CategoryWithCount>, CategoryServiceError> {
        if let Some(list) = self
            .cache
            .get::<Vec<CategoryWithCount>>(CACHE_KEY_CATEGORY_LIST)
            .await
            .ok()
            .flatten()
        {
            return Ok(list);
        }

        let list = self.repo.list_with_counts().await?;
        let _ = self
            .cache
            .set(CACHE_KEY_CATEGORY_LIST, &list, CATEGORY_CACHE_TTL)
            .await;
        Ok(list)
    }

    pub async fn update(&self, id: i64, input: UpdateCategoryInput) -> Result<Category, CategoryServiceError> {
        let mut category = self
            .repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| CategoryServiceError::NotFound(id.to_string()))?;

        if let Some(name) = input.name {
            let name = validate_name(&name)?;
            if self.repo.exists_by_name(&name, Some(id)).await? {
                return Err(CategoryServiceError::DuplicateName(name));
            }
            category.name = name;
        }
        if let Some(slug) = input.slug {
            let slug = slug_for(Some(&slug), &category.name)?;
            if self.repo.exists_by_slug(&slug, Some(id)).await? {
                return Err(CategoryServiceError::DuplicateSlug(slug));
            }
            category.slug = slug;
        }
        if let Some(description) = input.description {
            category.description = validate_description(Some(description))?;
        }

        let updated = match self.repo.update(&category).await {
            Ok(updated) => updated,
            Err(e) => return Err(duplicate_or(e, category.name, category.slug, "Failed to update category")),
        };
        self.invalidate().await;
        Ok(updated)
    }

    /// Delete a category; its posts keep existing without one
    pub async fn delete(&self, id: i64) -> Result<(), CategoryServiceError> {
        if !self.repo.delete(id).await? {
            return Err(CategoryServiceError::NotFound(id.to_string()));
        }
        tracing::info!("Deleted category {}", id);
        self.invalidate().await;
        // cached posts still point at the old category
        let _ = self.cache.delete_pattern("post*").await;
        Ok(())
    }

    async fn invalidate(&self) {
        let _ = self.cache.delete_pattern("categories:*").await;
    }
}

/// Map a unique-constraint failure to the duplicate error for the column
/// it names; anything else stays internal
fn duplicate_or(err: anyhow::Error, name: String, slug: String, context: &'static str) -> CategoryServiceError {
    match unique_violation(&err).map(|db| db.message().to_string()) {
        Some(msg) if msg.contains(".slug") || msg.contains("'slug'") => CategoryServiceError::DuplicateSlug(slug),
        Some(_) => CategoryServiceError::DuplicateName(name),
        None => err.context(context).into(),
    }
}

fn validate_name(name: &str) -> Result<String, CategoryServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CategoryServiceError::ValidationError(
            "Category name cannot be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(CategoryServiceError::ValidationError(format!(
            "Category name must be at most {} characters",
            MAX_NAME_LENGTH
        )));
    }
    Ok(name.to_string())
}

fn validate_description(description: Option<String>) -> Result<Option<String>, CategoryServiceError> {
    let description = description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());
    if description
        .as_ref()
        .is_some_and(|d| d.chars().count() > MAX_DESCRIPTION_LENGTH)
    {
        return Err(CategoryServiceError::ValidationError(format!(
            "Description must be at most {} characters",
            MAX_DESCRIPTION_LENGTH
        )));
    }
    Ok(description)
}

/// Requested slug if present, else derived from the name
fn slug_for(requested: Option<&str>, name: &str) -> Result<String, CategoryServiceError> {
    let source = requested.map(str::trim).filter(|s| !s.is_empty()).unwrap_or(name);
    let slug = generate_slug(source);
    if slug.is_empty() {
        return Err(CategoryServiceError::ValidationError(
            "Slug must contain at least one letter or digit".to_string(),
        ));
    }
    Ok(slug)
}
