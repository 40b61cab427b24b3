//! Watchlist service
//!
//! Items are added by TMDB id. Title, poster and release data are fetched
//! once through a [`MetadataProvider`] and copied into the row, so the
//! public page never calls TMDB.

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::cache::{Cache, CacheLayer};
use crate::config::TmdbConfig;
use crate::db::is_unique_violation;
use crate::db::repositories::WatchlistRepository;
use crate::models::{
    CreateWatchlistItemInput, ListParams, MediaType, PagedResult, UpdateWatchlistItemInput,
    WatchStatus, WatchlistItem,
};

pub const MAX_NOTES_LENGTH: usize = 2000;
pub const MAX_QUERY_LENGTH: usize = 200;

const WATCHLIST_CACHE_TTL: Duration = Duration::from_secs(600);
const CACHE_KEY_LIST_PREFIX: &str = "watchlist:list:";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Metadata provider is not configured")]
    NotConfigured,

    #[error("Title not found on metadata provider")]
    NotFound,

    #[error("Metadata provider error: {0}")]
    Upstream(String),
}

#[derive(Debug, Error)]
pub enum WatchlistServiceError {
    #[error("Watchlist item not found: {0}")]
    NotFound(i64),

    #[error("Already on the watchlist: {0}")]
    Duplicate(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("TMDB is not configured")]
    NotConfigured,

    #[error("TMDB error: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<MetadataError> for WatchlistServiceError {
    fn from(e: MetadataError) -> Self {
        match e {
            MetadataError::NotConfigured => WatchlistServiceError::NotConfigured,
            MetadataError::NotFound => {
                WatchlistServiceError::ValidationError("Unknown TMDB id".to_string())
            }
            MetadataError::Upstream(msg) => WatchlistServiceError::Upstream(msg),
        }
    }
}

/// A movie or show as described by the metadata provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaSummary {
    pub tmdb_id: i64,
    pub media_type: MediaType,
    pub title: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub release_date: Option<String>,
    pub vote_average: Option<f64>,
}

/// One page of search results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchPage {
    pub results: Vec<MediaSummary>,
    pub page: u32,
    pub total_pages: u32,
    pub total_results: u64,
}

#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Search movies and shows together. People are left out.
    async fn search_multi(&self, query: &str, page: u32) -> Result<SearchPage, MetadataError>;

    async fn details(&self, tmdb_id: i64, media_type: MediaType) -> Result<MediaSummary, MetadataError>;
}

// TMDB wire types. Movies carry title/release_date, shows name/first_air_date.
#[derive(Debug, Deserialize)]
struct TmdbItem {
    id: i64,
    #[serde(default)]
    media_type: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    overview: Option<String>,
    #[serde(default)]
    poster_path: Option<String>,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    first_air_date: Option<String>,
    #[serde(default)]
    vote_average: Option<f64>,
}

impl TmdbItem {
    fn into_summary(self, media_type: MediaType) -> MediaSummary {
        let non_empty = |s: Option<String>| s.filter(|v| !v.trim().is_empty());
        MediaSummary {
            tmdb_id: self.id,
            media_type,
            title: self
                .title
                .or(self.name)
                .unwrap_or_else(|| format!("#{}", self.id)),
            overview: non_empty(self.overview),
            poster_path: non_empty(self.poster_path),
            release_date: non_empty(self.release_date.or(self.first_air_date)),
            vote_average: self.vote_average,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TmdbSearchResponse {
    page: u32,
    results: Vec<TmdbItem>,
    total_pages: u32,
    total_results: u64,
}

/// TMDB v3 client authenticated with an API key
pub struct TmdbClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    language: String,
}

impl TmdbClient {
    pub fn new(config: &TmdbConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("folio/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            language: config.language.clone(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// GET with retries on 429 and 5xx. 404 maps to `NotFound`.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        extra: &[(&str, String)],
    ) -> Result<T, MetadataError> {
        let api_key = self.api_key.as_deref().ok_or(MetadataError::NotConfigured)?;
        let url = format!("{}{}", self.base_url, path);

        let mut params: Vec<(&str, String)> = vec![
            ("api_key", api_key.to_string()),
            ("language", self.language.clone()),
        ];
        params.extend(extra.iter().cloned());

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.client.get(&url).query(&params).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json::<T>()
                            .await
                            .map_err(|e| MetadataError::Upstream(format!("invalid response: {}", e)));
                    }
                    if status == reqwest::StatusCode::NOT_FOUND {
                        return Err(MetadataError::NotFound);
                    }
                    if (status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error())
                        && attempt < MAX_ATTEMPTS
                    {
                        backoff(attempt).await;
                        continue;
                    }
                    return Err(MetadataError::Upstream(format!("{} returned {}", path, status)));
                }
                Err(e) => {
                    if attempt < MAX_ATTEMPTS {
                        tracing::debug!("TMDB request failed (attempt {}): {}", attempt, e);
                        backoff(attempt).await;
                        continue;
                    }
                    return Err(MetadataError::Upstream(format!("request failed: {}", e)));
                }
            }
        }
    }
}

async fn backoff(attempt: u32) {
    // 300ms, 600ms
    let millis = 2u64.pow(attempt - 1) * 300;
    tokio::time::sleep(Duration::from_millis(millis)).await;
}

#[async_trait]
impl MetadataProvider for TmdbClient {
    async fn search_multi(&self, query: &str, page: u32) -> Result<SearchPage, MetadataError> {
        let response: TmdbSearchResponse = self
            .get_json(
                "/search/multi",
                &[
                    ("query", query.to_string()),
                    ("page", page.to_string()),
                    ("include_adult", "false".to_string()),
                ],
            )
            .await?;

        let results = response
            .results
            .into_iter()
            .filter_map(|item| {
                let media_type = item.media_type.as_deref().and_then(MediaType::from_str)?;
                Some(item.into_summary(media_type))
            })
            .collect();

        Ok(SearchPage {
            results,
            page: response.page,
            total_pages: response.total_pages,
            total_results: response.total_results,
        })
    }

    async fn details(&self, tmdb_id: i64, media_type: MediaType) -> Result<MediaSummary, MetadataError> {
        let path = format!("/{}/{}", media_type.as_str(), tmdb_id);
        let item: TmdbItem = self.get_json(&path, &[]).await?;
        Ok(item.into_summary(media_type))
    }
}

/// Request to put a title on the watchlist
#[derive(Debug, Clone, Deserialize)]
pub struct AddWatchlistItem {
    pub tmdb_id: i64,
    pub media_type: MediaType,
    #[serde(default)]
    pub status: WatchStatus,
    #[serde(default)]
    pub rating: Option<i32>,
    #[serde(default)]
    pub notes: Option<String>,
}

pub struct WatchlistService {
    repo: Arc<dyn WatchlistRepository>,
    provider: Option<Arc<dyn MetadataProvider>>,
    cache: Arc<Cache>,
}

impl WatchlistService {
    pub fn new(
        repo: Arc<dyn WatchlistRepository>,
        provider: Option<Arc<dyn MetadataProvider>>,
        cache: Arc<Cache>,
    ) -> Self {
        Self { repo, provider, cache }
    }

    fn provider(&self) -> Result<&Arc<dyn MetadataProvider>, WatchlistServiceError> {
        self.provider.as_ref().ok_or(WatchlistServiceError::NotConfigured)
    }

    /// Fetch details for the title and store it. A title can be on the
    /// list once per media type.
    pub async fn add(&self, input: AddWatchlistItem) -> Result<WatchlistItem, WatchlistServiceError> {
        if input.tmdb_id <= 0 {
            return Err(WatchlistServiceError::ValidationError("Invalid TMDB id".to_string()));
        }
        validate_rating(input.rating)?;
        let notes = clean_notes(input.notes)?;

        if let Some(existing) = self.repo.get_by_tmdb(input.tmdb_id, input.media_type).await? {
            return Err(WatchlistServiceError::Duplicate(existing.title));
        }

        let details = self
            .provider()?
            .details(input.tmdb_id, input.media_type)
            .await?;

        let new_item = CreateWatchlistItemInput {
            tmdb_id: details.tmdb_id,
            media_type: details.media_type,
            title: details.title,
            overview: details.overview,
            poster_path: details.poster_path,
            release_date: details.release_date,
            vote_average: details.vote_average,
            status: input.status,
            rating: input.rating,
            notes,
        };

        // the same title added concurrently loses on the unique index
        let item = match self.repo.create(&new_item).await {
            Ok(item) => item,
            Err(e) if is_unique_violation(&e) => return Err(WatchlistServiceError::Duplicate(new_item.title)),
            Err(e) => return Err(e.context("Failed to create watchlist item").into()),
        };

        tracing::info!("Added {} {} to watchlist", item.media_type.as_str(), item.title);
        self.invalidate().await;
        Ok(item)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<WatchlistItem, WatchlistServiceError> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or(WatchlistServiceError::NotFound(id))
    }

    pub async fn update(
        &self,
        id: i64,
        input: UpdateWatchlistItemInput,
    ) -> Result<WatchlistItem, WatchlistServiceError> {
        let mut item = self.get_by_id(id).await?;
        if !input.has_changes() {
            return Ok(item);
        }

        if let Some(status) = input.status {
            item.status = status;
        }
        if let Some(rating) = input.rating {
            validate_rating(rating)?;
            item.rating = rating;
        }
        if input.notes.is_some() {
            item.notes = clean_notes(input.notes)?;
        }

        let updated = self.repo.update(&item).await?;
        self.invalidate().await;
        Ok(updated)
    }

    pub async fn delete(&self, id: i64) -> Result<(), WatchlistServiceError> {
        if !self.repo.delete(id).await? {
            return Err(WatchlistServiceError::NotFound(id));
        }
        self.invalidate().await;
        Ok(())
    }

    /// Most recently updated first. Cached, since the public page uses it.
    pub async fn list(
        &self,
        status: Option<WatchStatus>,
        params: &ListParams,
    ) -> Result<PagedResult<WatchlistItem>, WatchlistServiceError> {
        let key = format!(
            "{}{}:{}:{}",
            CACHE_KEY_LIST_PREFIX,
            status.map(|s| s.as_str()).unwrap_or("all"),
            params.page,
            params.per_page
        );
        if let Some(hit) = self
            .cache
            .get::<PagedResult<WatchlistItem>>(&key)
            .await
            .ok()
            .flatten()
        {
            return Ok(hit);
        }

        let items = self.repo.list(status, params.offset(), params.limit()).await?;
        let total = self.repo.count(status).await?;
        let result = PagedResult::new(items, total, params);
        let _ = self.cache.set(&key, &result, WATCHLIST_CACHE_TTL).await;
        Ok(result)
    }

    /// Search TMDB for titles to add
    pub async fn search(&self, query: &str, page: u32) -> Result<SearchPage, WatchlistServiceError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(WatchlistServiceError::ValidationError(
                "Search query cannot be empty".to_string(),
            ));
        }
        if query.chars().count() > MAX_QUERY_LENGTH {
            return Err(WatchlistServiceError::ValidationError(format!(
                "Search query must be at most {} characters",
                MAX_QUERY_LENGTH
            )));
        }
        // TMDB serves at most 500 pages
        let page = page.clamp(1, 500);
        Ok(self.provider()?.search_multi(query, page).await?)
    }

    async fn invalidate(&self) {
        let _ = self
            .cache
            .delete_pattern(&format!("{}*", CACHE_KEY_LIST_PREFIX))
            .await;
    }
}

fn validate_rating(rating: Option<i32>) -> Result<(), WatchlistServiceError> {
    match rating {
        Some(r) if !(1..=10).contains(&r) => Err(WatchlistServiceError::ValidationError(
            "Rating must be between 1 and 10".to_string(),
        )),
        _ => Ok(()),
    }
}

fn clean_notes(notes: Option<String>) -> Result<Option<String>, WatchlistServiceError> {
    let notes = notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
    if notes.as_ref().is_some_and(|n| n.chars().count() > MAX_NOTES_LENGTH) {
        return Err(WatchlistServiceError::ValidationError(format!(
            "Notes must be at most {} characters",
            MAX_NOTES_LENGTH
        )));
    }
    Ok(notes)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::repositories::SqlxWatchlistRepository;
    use crate::db::{create_test_pool, migrations};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider with a fixed catalogue
    #[derive(Default)]
    pub(crate) struct StubProvider {
        pub detail_calls: AtomicUsize,
    }

    fn catalogue() -> Vec<MediaSummary> {
        vec![
            MediaSummary {
                tmdb_id: 603,
                media_type: MediaType::Movie,
                title: "The Matrix".to_string(),
                overview: Some("A hacker learns the truth.".to_string()),
                poster_path: Some("/matrix.jpg".to_string()),
                release_date: Some("1999-03-30".to_string()),
                vote_average: Some(8.2),
            },
            MediaSummary {
                tmdb_id: 1399,
                media_type: MediaType::Tv,
                title: "Game of Thrones".to_string(),
                overview: None,
                poster_path: None,
                release_date: Some("2011-04-17".to_string()),
                vote_average: Some(8.4),
            },
        ]
    }

    #[async_trait]
    impl MetadataProvider for StubProvider {
        async fn search_multi(&self, query: &str, page: u32) -> Result<SearchPage, MetadataError> {
            let q = query.to_lowercase();
            let results: Vec<_> = catalogue()
                .into_iter()
                .filter(|m| m.title.to_lowercase().contains(&q))
                .collect();
            Ok(SearchPage {
                total_results: results.len() as u64,
                results,
                page,
                total_pages: 1,
            })
        }

        async fn details(&self, tmdb_id: i64, media_type: MediaType) -> Result<MediaSummary, MetadataError> {
            self.detail_calls.fetch_add(1, Ordering::SeqCst);
            catalogue()
                .into_iter()
                .find(|m| m.tmdb_id == tmdb_id && m.media_type == media_type)
                .ok_or(MetadataError::NotFound)
        }
    }

    async fn setup(provider: Option<Arc<dyn MetadataProvider>>) -> WatchlistService {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        WatchlistService::new(
            SqlxWatchlistRepository::boxed(pool),
            provider,
            Arc::new(Cache::Memory(MemoryCache::new())),
        )
    }

    fn add(tmdb_id: i64, media_type: MediaType) -> AddWatchlistItem {
        AddWatchlistItem {
            tmdb_id,
            media_type,
            status: WatchStatus::Planned,
            rating: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_add_copies_details() {
        let service = setup(Some(Arc::new(StubProvider::default()))).await;
        let item = service.add(add(603, MediaType::Movie)).await.unwrap();
        assert_eq!(item.title, "The Matrix");
        assert_eq!(item.poster_path.as_deref(), Some("/matrix.jpg"));
        assert_eq!(item.status, WatchStatus::Planned);
    }

    #[tokio::test]
    async fn test_duplicate_rejected_before_provider_call() {
        let provider = Arc::new(StubProvider::default());
        let service = setup(Some(provider.clone())).await;
        service.add(add(603, MediaType::Movie)).await.unwrap();

        let dup = service.add(add(603, MediaType::Movie)).await;
        assert!(matches!(dup, Err(WatchlistServiceError::Duplicate(_))));
        assert_eq!(provider.detail_calls.load(Ordering::SeqCst), 1);
    }

    /// Misses rows on the duplicate lookup, like a writer that raced
    /// past it
    struct LaggingLookup(Arc<dyn WatchlistRepository>);

    #[async_trait]
    impl WatchlistRepository for LaggingLookup {
        async fn create(&self, input: &CreateWatchlistItemInput) -> anyhow::Result<WatchlistItem> {
            self.0.create(input).await
        }
        async fn get_by_id(&self, id: i64) -> anyhow::Result<Option<WatchlistItem>> {
            self.0.get_by_id(id).await
        }
        async fn get_by_tmdb(&self, _tmdb_id: i64, _media_type: MediaType) -> anyhow::Result<Option<WatchlistItem>> {
            Ok(None)
        }
        async fn list(
            &self,
            status: Option<WatchStatus>,
            offset: i64,
            limit: i64,
        ) -> anyhow::Result<Vec<WatchlistItem>> {
            self.0.list(status, offset, limit).await
        }
        async fn count(&self, status: Option<WatchStatus>) -> anyhow::Result<i64> {
            self.0.count(status).await
        }
        async fn update(&self, item: &WatchlistItem) -> anyhow::Result<WatchlistItem> {
            self.0.update(item).await
        }
        async fn delete(&self, id: i64) -> anyhow::Result<bool> {
            self.0.delete(id).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_is_reported_as_duplicate() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxWatchlistRepository::boxed(pool);
        repo.create(&CreateWatchlistItemInput {
            tmdb_id: 603,
            media_type: MediaType::Movie,
            title: "The Matrix".to_string(),
            overview: None,
            poster_path: None,
            release_date: None,
            vote_average: None,
            status: WatchStatus::Completed,
            rating: None,
            notes: None,
        })
        .await
        .unwrap();

        let service = WatchlistService::new(
            Arc::new(LaggingLookup(repo)),
            Some(Arc::new(StubProvider::default())),
            Arc::new(Cache::Memory(MemoryCache::new())),
        );
        let dup = service.add(add(603, MediaType::Movie)).await;
        assert!(matches!(dup, Err(WatchlistServiceError::Duplicate(t)) if t == "The Matrix"));
    }

    #[tokio::test]
    async fn test_unknown_title_and_missing_provider() {
        let service = setup(Some(Arc::new(StubProvider::default()))).await;
        assert!(matches!(
            service.add(add(1, MediaType::Movie)).await,
            Err(WatchlistServiceError::ValidationError(_))
        ));

        let unconfigured = setup(None).await;
        assert!(matches!(
            unconfigured.add(add(603, MediaType::Movie)).await,
            Err(WatchlistServiceError::NotConfigured)
        ));
        assert!(matches!(
            unconfigured.search("matrix", 1).await,
            Err(WatchlistServiceError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn test_update_rating_bounds_and_clear() {
        let service = setup(Some(Arc::new(StubProvider::default()))).await;
        let item = service.add(add(1399, MediaType::Tv)).await.unwrap();

        let bad = service
            .update(
                item.id,
                UpdateWatchlistItemInput {
                    rating: Some(Some(11)),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(bad, Err(WatchlistServiceError::ValidationError(_))));

        let rated = service
            .update(
                item.id,
                UpdateWatchlistItemInput {
                    status: Some(WatchStatus::Completed),
                    rating: Some(Some(9)),
                    notes: Some("  Strong start ".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(rated.rating, Some(9));
        assert_eq!(rated.notes.as_deref(), Some("Strong start"));

        let cleared = service
            .update(
                item.id,
                UpdateWatchlistItemInput {
                    rating: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(cleared.rating, None);
        assert_eq!(cleared.status, WatchStatus::Completed);
    }

    #[tokio::test]
    async fn test_list_by_status_sees_writes() {
        let service = setup(Some(Arc::new(StubProvider::default()))).await;
        let params = ListParams::default();
        let movie = service.add(add(603, MediaType::Movie)).await.unwrap();
        service.add(add(1399, MediaType::Tv)).await.unwrap();

        assert_eq!(service.list(None, &params).await.unwrap().total, 2);
        assert_eq!(
            service
                .list(Some(WatchStatus::Completed), &params)
                .await
                .unwrap()
                .total,
            0
        );

        service
            .update(
                movie.id,
                UpdateWatchlistItemInput {
                    status: Some(WatchStatus::Completed),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let completed = service.list(Some(WatchStatus::Completed), &params).await.unwrap();
        assert_eq!(completed.total, 1);
        assert_eq!(completed.items[0].tmdb_id, 603);

        service.delete(movie.id).await.unwrap();
        assert_eq!(service.list(None, &params).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_search() {
        let service = setup(Some(Arc::new(StubProvider::default()))).await;
        let page = service.search("  matrix ", 0).await.unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.results.len(), 1);
        assert!(matches!(
            service.search("   ", 1).await,
            Err(WatchlistServiceError::ValidationError(_))
        ));
    }

    #[test]
    fn test_tmdb_item_mapping() {
        let json = r#"{"id": 1399, "media_type": "tv", "name": "Game of Thrones",
            "first_air_date": "2011-04-17", "poster_path": "", "vote_average": 8.4}"#;
        let item: TmdbItem = serde_json::from_str(json).unwrap();
        let summary = item.into_summary(MediaType::Tv);
        assert_eq!(summary.title, "Game of Thrones");
        assert_eq!(summary.release_date.as_deref(), Some("2011-04-17"));
        assert_eq!(summary.poster_path, None);
    }

    #[tokio::test]
    async fn test_tmdb_client_without_key() {
        let client = TmdbClient::new(&TmdbConfig::default()).unwrap();
        assert!(!client.is_configured());
        assert!(matches!(
            client.search_multi("x", 1).await,
            Err(MetadataError::NotConfigured)
        ));
    }
}
