//! Blog post model
//!
//! - `Post` entity with its optional second-language translation
//! - `PostStatus` lifecycle: draft -> published -> archived
//! - Input types for creating, updating and filtering posts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Blog post entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    /// URL-friendly slug (unique)
    pub slug: String,
    pub title: String,
    /// Short summary shown in listings
    pub excerpt: Option<String>,
    /// Markdown source
    pub content: String,
    /// Rendered HTML
    pub content_html: String,
    pub cover_image: Option<String>,
    pub category_id: Option<i64>,
    /// Normalised tag tokens
    pub tags: Vec<String>,
    pub status: PostStatus,
    pub view_count: i64,
    pub author_id: i64,
    /// Auto-translated copy in the site's secondary language
    pub translation: Option<PostTranslation>,
    /// Set the first time the post is published
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    pub fn is_published(&self) -> bool {
        self.status == PostStatus::Published
    }
}

/// Translated fields of a post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostTranslation {
    pub title: String,
    pub excerpt: Option<String>,
    pub content: String,
    pub content_html: String,
}

/// Post publication status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    /// Not visible to the public
    #[default]
    Draft,
    Published,
    /// Hidden but kept
    Archived,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Published => "published",
            PostStatus::Archived => "archived",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "draft" => Some(PostStatus::Draft),
            "published" => Some(PostStatus::Published),
            "archived" => Some(PostStatus::Archived),
            _ => None,
        }
    }

    /// Allowed lifecycle moves. Re-publishing an archived post is allowed;
    /// archiving a draft that never went out is not.
    pub fn can_transition_to(&self, next: PostStatus) -> bool {
        use PostStatus::*;
        matches!(
            (self, next),
            (Draft, Draft)
                | (Draft, Published)
                | (Published, Published)
                | (Published, Draft)
                | (Published, Archived)
                | (Archived, Archived)
                | (Archived, Published)
                | (Archived, Draft)
        )
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Input for creating a new post
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreatePostInput {
    pub title: String,
    /// Generated from the title when absent
    pub slug: Option<String>,
    pub excerpt: Option<String>,
    pub content: String,
    pub cover_image: Option<String>,
    pub category_id: Option<i64>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Defaults to draft
    pub status: Option<PostStatus>,
}

impl CreatePostInput {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    pub fn with_category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn with_tags<S: AsRef<str>>(mut self, tags: &[S]) -> Self {
        self.tags = tags.iter().map(|t| t.as_ref().to_string()).collect();
        self
    }

    pub fn with_status(mut self, status: PostStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// Input for updating a post; `None` leaves a field unchanged.
///
/// `category_id: Some(None)` detaches the post from its category.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePostInput {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub excerpt: Option<String>,
    pub content: Option<String>,
    pub cover_image: Option<String>,
    pub category_id: Option<Option<i64>>,
    pub tags: Option<Vec<String>>,
    pub status: Option<PostStatus>,
}

impl UpdatePostInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_category(mut self, category_id: Option<i64>) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn with_tags<S: AsRef<str>>(mut self, tags: &[S]) -> Self {
        self.tags = Some(tags.iter().map(|t| t.as_ref().to_string()).collect());
        self
    }

    pub fn with_status(mut self, status: PostStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn has_changes(&self) -> bool {
        self.title.is_some()
            || self.slug.is_some()
            || self.excerpt.is_some()
            || self.content.is_some()
            || self.cover_image.is_some()
            || self.category_id.is_some()
            || self.tags.is_some()
            || self.status.is_some()
    }
}

/// Filters for post listings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostFilter {
    pub status: Option<PostStatus>,
    pub category_id: Option<i64>,
    /// Single normalised tag token
    pub tag: Option<String>,
}

impl PostFilter {
    pub fn published() -> Self {
        Self {
            status: Some(PostStatus::Published),
            ..Default::default()
        }
    }

    pub fn with_category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into().trim().to_lowercase());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [PostStatus::Draft, PostStatus::Published, PostStatus::Archived] {
            assert_eq!(PostStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(PostStatus::from_str("PUBLISHED"), Some(PostStatus::Published));
        assert_eq!(PostStatus::from_str("deleted"), None);
    }

    #[test]
    fn test_status_transitions() {
        assert!(PostStatus::Draft.can_transition_to(PostStatus::Published));
        assert!(PostStatus::Published.can_transition_to(PostStatus::Archived));
        assert!(PostStatus::Archived.can_transition_to(PostStatus::Published));
        assert!(!PostStatus::Draft.can_transition_to(PostStatus::Archived));
    }

    #[test]
    fn test_update_has_changes() {
        assert!(!UpdatePostInput::new().has_changes());
        assert!(UpdatePostInput::new().with_category(None).has_changes());
    }
}
