//! Settings service
//!
//! Site text and feature toggles live in the `settings` key/value table.
//! `SiteSettings` is the typed view handed to templates and the public
//! `/site` endpoint. A toggle only takes effect if the matching feature
//! is also enabled in configuration.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::cache::{Cache, CacheLayer};
use crate::config::FeaturesConfig;
use crate::db::repositories::SettingsRepository;

const CACHE_KEY_SITE_SETTINGS: &str = "site:settings";

const SETTINGS_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Known setting keys
pub mod keys {
    pub const SITE_NAME: &str = "site_name";
    pub const SITE_DESCRIPTION: &str = "site_description";
    pub const HERO_TITLE: &str = "hero_title";
    pub const HERO_SUBTITLE: &str = "hero_subtitle";
    pub const ABOUT: &str = "about";
    pub const CONTACT_EMAIL: &str = "contact_email";
    pub const GITHUB_URL: &str = "github_url";
    pub const LINKEDIN_URL: &str = "linkedin_url";
    pub const TWITTER_URL: &str = "twitter_url";
    pub const PRIMARY_LANGUAGE: &str = "primary_language";
    pub const SECONDARY_LANGUAGE: &str = "secondary_language";
    pub const POSTS_PER_PAGE: &str = "posts_per_page";
    pub const CONTACT_ENABLED: &str = "contact_enabled";
    pub const WATCHLIST_ENABLED: &str = "watchlist_enabled";
    pub const TRANSLATION_ENABLED: &str = "translation_enabled";

    pub const ALL: &[&str] = &[
        SITE_NAME,
        SITE_DESCRIPTION,
        HERO_TITLE,
        HERO_SUBTITLE,
        ABOUT,
        CONTACT_EMAIL,
        GITHUB_URL,
        LINKEDIN_URL,
        TWITTER_URL,
        PRIMARY_LANGUAGE,
        SECONDARY_LANGUAGE,
        POSTS_PER_PAGE,
        CONTACT_ENABLED,
        WATCHLIST_ENABLED,
        TRANSLATION_ENABLED,
    ];
}

/// Typed site settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteSettings {
    pub site_name: String,
    pub site_description: String,
    pub hero_title: String,
    pub hero_subtitle: String,
    pub about: String,
    pub contact_email: String,
    pub github_url: String,
    pub linkedin_url: String,
    pub twitter_url: String,
    pub primary_language: String,
    /// Target language for post auto-translation
    pub secondary_language: String,
    pub posts_per_page: u32,
    pub contact_enabled: bool,
    pub watchlist_enabled: bool,
    pub translation_enabled: bool,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            site_name: "Folio".to_string(),
            site_description: "Writing and projects".to_string(),
            hero_title: String::new(),
            hero_subtitle: String::new(),
            about: String::new(),
            contact_email: String::new(),
            github_url: String::new(),
            linkedin_url: String::new(),
            twitter_url: String::new(),
            primary_language: "en".to_string(),
            secondary_language: "de".to_string(),
            posts_per_page: 10,
            contact_enabled: true,
            watchlist_enabled: true,
            translation_enabled: true,
        }
    }
}

impl SiteSettings {
    fn from_map(map: &HashMap<String, String>) -> Self {
        let d = Self::default();
        let text = |key: &str, default: String| map.get(key).cloned().unwrap_or(default);
        let flag = |key: &str, default: bool| map.get(key).and_then(|v| parse_bool(v)).unwrap_or(default);

        Self {
            site_name: text(keys::SITE_NAME, d.site_name),
            site_description: text(keys::SITE_DESCRIPTION, d.site_description),
            hero_title: text(keys::HERO_TITLE, d.hero_title),
            hero_subtitle: text(keys::HERO_SUBTITLE, d.hero_subtitle),
            about: text(keys::ABOUT, d.about),
            contact_email: text(keys::CONTACT_EMAIL, d.contact_email),
            github_url: text(keys::GITHUB_URL, d.github_url),
            linkedin_url: text(keys::LINKEDIN_URL, d.linkedin_url),
            twitter_url: text(keys::TWITTER_URL, d.twitter_url),
            primary_language: text(keys::PRIMARY_LANGUAGE, d.primary_language),
            secondary_language: text(keys::SECONDARY_LANGUAGE, d.secondary_language),
            posts_per_page: map
                .get(keys::POSTS_PER_PAGE)
                .and_then(|v| v.trim().parse().ok())
                .filter(|n| (1..=100).contains(n))
                .unwrap_or(d.posts_per_page),
            contact_enabled: flag(keys::CONTACT_ENABLED, d.contact_enabled),
            watchlist_enabled: flag(keys::WATCHLIST_ENABLED, d.watchlist_enabled),
            translation_enabled: flag(keys::TRANSLATION_ENABLED, d.translation_enabled),
        }
    }

    fn to_map(&self) -> HashMap<String, String> {
        let pairs = [
            (keys::SITE_NAME, self.site_name.clone()),
            (keys::SITE_DESCRIPTION, self.site_description.clone()),
            (keys::HERO_TITLE, self.hero_title.clone()),
            (keys::HERO_SUBTITLE, self.hero_subtitle.clone()),
            (keys::ABOUT, self.about.clone()),
            (keys::CONTACT_EMAIL, self.contact_email.clone()),
            (keys::GITHUB_URL, self.github_url.clone()),
            (keys::LINKEDIN_URL, self.linkedin_url.clone()),
            (keys::TWITTER_URL, self.twitter_url.clone()),
            (keys::PRIMARY_LANGUAGE, self.primary_language.clone()),
            (keys::SECONDARY_LANGUAGE, self.secondary_language.clone()),
            (keys::POSTS_PER_PAGE, self.posts_per_page.to_string()),
            (keys::CONTACT_ENABLED, self.contact_enabled.to_string()),
            (keys::WATCHLIST_ENABLED, self.watchlist_enabled.to_string()),
            (keys::TRANSLATION_ENABLED, self.translation_enabled.to_string()),
        ];
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    /// Turn off toggles whose feature is disabled in configuration
    pub fn gated_by(mut self, features: &FeaturesConfig) -> Self {
        self.contact_enabled &= features.contact;
        self.watchlist_enabled &= features.watchlist;
        self.translation_enabled &= features.translation;
        self
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Error)]
pub enum SettingsServiceError {
    #[error("Invalid setting value: {0}")]
    InvalidValue(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct SettingsService {
    repo: Arc<dyn SettingsRepository>,
    cache: Arc<Cache>,
    features: FeaturesConfig,
}

impl SettingsService {
    pub fn new(repo: Arc<dyn SettingsRepository>, cache: Arc<Cache>, features: FeaturesConfig) -> Self {
        Self {
            repo,
            cache,
            features,
        }
    }

    /// Site settings with feature toggles already gated by configuration
    pub async fn get_site_settings(&self) -> Result<SiteSettings, SettingsServiceError> {
        if let Some(cached) = self
            .cache
            .get::<SiteSettings>(CACHE_KEY_SITE_SETTINGS)
            .await
            .ok()
            .flatten()
        {
            return Ok(cached);
        }

        let map = self.repo.get_many(keys::ALL).await?;
        let settings = SiteSettings::from_map(&map).gated_by(&self.features);

        let _ = self
            .cache
            .set(CACHE_KEY_SITE_SETTINGS, &settings, SETTINGS_CACHE_TTL)
            .await;
        Ok(settings)
    }

    pub async fn update_site_settings(
        &self,
        settings: &SiteSettings,
    ) -> Result<SiteSettings, SettingsServiceError> {
        Self::validate(settings)?;
        self.repo.set_many(&settings.to_map()).await?;
        self.invalidate().await;
        tracing::info!("Site settings updated");
        self.get_site_settings().await
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, SettingsServiceError> {
        Ok(self.repo.get(key).await?.map(|s| s.value))
    }

    pub async fn get_all(&self) -> Result<HashMap<String, String>, SettingsServiceError> {
        Ok(self.repo.get_map().await?)
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), SettingsServiceError> {
        let key = key.trim();
        if key.is_empty() || key.len() > 100 {
            return Err(SettingsServiceError::InvalidValue(
                "Setting key must be 1-100 characters".to_string(),
            ));
        }
        if key == keys::POSTS_PER_PAGE && value.trim().parse::<u32>().map_or(true, |n| n == 0 || n > 100) {
            return Err(SettingsServiceError::InvalidValue(
                "posts_per_page must be between 1 and 100".to_string(),
            ));
        }
        self.repo.set(key, value).await?;
        self.invalidate().await;
        Ok(())
    }

    /// Upsert several raw keys at once
    pub async fn set_many(&self, values: &HashMap<String, String>) -> Result<(), SettingsServiceError> {
        for (key, value) in values {
            if key.trim().is_empty() {
                return Err(SettingsServiceError::InvalidValue("Empty setting key".to_string()));
            }
            if key == keys::POSTS_PER_PAGE && value.trim().parse::<u32>().is_err() {
                return Err(SettingsServiceError::InvalidValue(
                    "posts_per_page must be a number".to_string(),
                ));
            }
        }
        self.repo.set_many(values).await?;
        self.invalidate().await;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<(), SettingsServiceError> {
        self.repo.delete(key).await?;
        self.invalidate().await;
        Ok(())
    }

    fn validate(settings: &SiteSettings) -> Result<(), SettingsServiceError> {
        if settings.site_name.trim().is_empty() {
            return Err(SettingsServiceError::InvalidValue(
                "site_name cannot be empty".to_string(),
            ));
        }
        if !(1..=100).contains(&settings.posts_per_page) {
            return Err(SettingsServiceError::InvalidValue(
                "posts_per_page must be between 1 and 100".to_string(),
            ));
        }
        if !settings.contact_email.is_empty() && !crate::services::contact::is_valid_email(&settings.contact_email) {
            return Err(SettingsServiceError::InvalidValue(
                "contact_email is not a valid address".to_string(),
            ));
        }
        Ok(())
    }

    async fn invalidate(&self) {
        let _ = self.cache.delete(CACHE_KEY_SITE_SETTINGS).await;
    }
}
