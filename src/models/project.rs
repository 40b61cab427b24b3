//! Portfolio project model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Portfolio project entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub slug: String,
    pub title: String,
    /// One-line summary for cards
    pub summary: Option<String>,
    /// Markdown write-up
    pub content: String,
    pub content_html: String,
    pub cover_image: Option<String>,
    /// Normalised technology tokens
    pub technologies: Vec<String>,
    pub github_url: Option<String>,
    pub live_url: Option<String>,
    /// Featured projects are listed first
    pub featured: bool,
    /// Manual ordering inside the featured/non-featured groups
    pub sort_order: i64,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateProjectInput {
    pub title: String,
    pub slug: Option<String>,
    pub summary: Option<String>,
    #[serde(default)]
    pub content: String,
    pub cover_image: Option<String>,
    #[serde(default)]
    pub technologies: Vec<String>,
    pub github_url: Option<String>,
    pub live_url: Option<String>,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub sort_order: i64,
    #[serde(default)]
    pub published: bool,
}

impl CreateProjectInput {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_technologies<S: AsRef<str>>(mut self, technologies: &[S]) -> Self {
        self.technologies = technologies.iter().map(|t| t.as_ref().to_string()).collect();
        self
    }

    pub fn published(mut self) -> Self {
        self.published = true;
        self
    }

    pub fn featured(mut self) -> Self {
        self.featured = true;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProjectInput {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub cover_image: Option<String>,
    pub technologies: Option<Vec<String>>,
    pub github_url: Option<String>,
    pub live_url: Option<String>,
    pub featured: Option<bool>,
    pub sort_order: Option<i64>,
    pub published: Option<bool>,
}

impl UpdateProjectInput {
    pub fn has_changes(&self) -> bool {
        self.title.is_some()
            || self.slug.is_some()
            || self.summary.is_some()
            || self.content.is_some()
            || self.cover_image.is_some()
            || self.technologies.is_some()
            || self.github_url.is_some()
            || self.live_url.is_some()
            || self.featured.is_some()
            || self.sort_order.is_some()
            || self.published.is_some()
    }
}
