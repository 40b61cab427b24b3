//! Public HTML pages
//!
//! - `/` - Hero, featured projects and latest posts
//! - `/blog`, `/blog/{slug}`
//! - `/portfolio`, `/portfolio/{slug}`
//! - `/watchlist` - only while the feature is on
//!
//! Unknown paths get the 404 page.

use axum::{
    extract::{Path, Query, State},
    http::{StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tera::Context as TeraContext;

use crate::api::middleware::AppState;
use crate::api::responses::{PostResponse, PostSummary};
use crate::models::{ListParams, PagedResult, WatchStatus};
use crate::services::SiteSettings;
use crate::site::StandardVars;

const HOME_POSTS: u32 = 5;
const HOME_PROJECTS: u32 = 6;
const PROJECTS_PER_PAGE: u32 = 12;
const WATCHLIST_PER_PAGE: u32 = 24;
const RELATED_POSTS: u32 = 3;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/blog", get(blog))
        .route("/blog/{slug}", get(post_page))
        .route("/portfolio", get(portfolio))
        .route("/portfolio/{slug}", get(project_page))
        .route("/watchlist", get(watchlist))
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct BlogQuery {
    pub page: Option<u32>,
    pub category: Option<String>,
    pub tag: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PostQuery {
    /// Show the translated copy when this matches the secondary language
    pub lang: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WatchlistQuery {
    pub page: Option<u32>,
    pub status: Option<String>,
}

/// Page links for list templates
#[derive(Debug, Serialize)]
struct Pagination {
    page: u32,
    total_pages: u32,
    has_prev: bool,
    has_next: bool,
}

impl<T> From<&PagedResult<T>> for Pagination {
    fn from(result: &PagedResult<T>) -> Self {
        Self {
            page: result.page,
            total_pages: result.total_pages(),
            has_prev: result.has_prev(),
            has_next: result.has_next(),
        }
    }
}

enum PageError {
    NotFound,
    Internal(String),
}

impl<E: std::error::Error> From<E> for PageError {
    fn from(e: E) -> Self {
        PageError::Internal(e.to_string())
    }
}

type PageResult = Result<(&'static str, TeraContext), PageError>;

async fn site_settings(state: &AppState) -> SiteSettings {
    match state.settings_service.get_site_settings().await {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!("Failed to load site settings, using defaults: {}", e);
            SiteSettings::default()
        }
    }
}

/// Render the outcome of a page handler with the standard variables
fn finish(state: &AppState, settings: SiteSettings, path: &str, result: PageResult) -> Response {
    let vars = StandardVars::new(settings, path);
    let renderer = &state.site_renderer;

    match result {
        Ok((template, context)) => Html(renderer.render_with_fallback(template, &context, &vars)).into_response(),
        Err(PageError::NotFound) => {
            let mut context = TeraContext::new();
            context.insert("status", &404);
            context.insert("error_message", "The page you are looking for does not exist.");
            let html = renderer.render_with_fallback("error.html", &context, &vars);
            (StatusCode::NOT_FOUND, Html(html)).into_response()
        }
        Err(PageError::Internal(message)) => {
            tracing::error!("Failed to build page {}: {}", path, message);
            let mut context = TeraContext::new();
            context.insert("status", &500);
            context.insert("error_message", "Something went wrong while loading this page.");
            let html = renderer.render_with_fallback("error.html", &context, &vars);
            (StatusCode::INTERNAL_SERVER_ERROR, Html(html)).into_response()
        }
    }
}

async fn home(State(state): State<AppState>, uri: Uri) -> Response {
    let settings = site_settings(&state).await;
    let result = home_page(&state).await;
    finish(&state, settings, uri.path(), result)
}

async fn home_page(state: &AppState) -> PageResult {
    let posts = state
        .post_service
        .list_published(None, None, &ListParams::new(1, HOME_POSTS))
        .await?;
    let projects = state
        .project_service
        .list_published(&ListParams::new(1, HOME_PROJECTS))
        .await?;
    let renderer = state.post_service.renderer();

    let mut context = TeraContext::new();
    let posts: Vec<PostSummary> = posts.items.into_iter().map(|p| PostSummary::new(p, renderer)).collect();
    context.insert("posts", &posts);
    context.insert("projects", &projects.items);
    Ok(("index.html", context))
}

async fn blog(State(state): State<AppState>, uri: Uri, Query(query): Query<BlogQuery>) -> Response {
    let settings = site_settings(&state).await;
    let result = blog_page(&state, &settings, query).await;
    finish(&state, settings, uri.path(), result)
}

async fn blog_page(state: &AppState, settings: &SiteSettings, query: BlogQuery) -> PageResult {
    let params = ListParams::new(query.page.unwrap_or(1), settings.posts_per_page);
    let categories = state.category_service.list().await?;

    let mut context = TeraContext::new();
    let category = match query.category.as_deref().filter(|s| !s.is_empty()) {
        Some(slug) => Some(
            state
                .category_service
                .get_by_slug(slug)
                .await?
                .ok_or(PageError::NotFound)?,
        ),
        None => None,
    };
    let tag = query.tag.filter(|t| !t.trim().is_empty());

    let result = state
        .post_service
        .list_published(category.as_ref().map(|c| c.id), tag.as_deref(), &params)
        .await?;
    let renderer = state.post_service.renderer();

    context.insert("pagination", &Pagination::from(&result));
    let posts: Vec<PostSummary> = result.items.into_iter().map(|p| PostSummary::new(p, renderer)).collect();
    context.insert("posts", &posts);
    context.insert("categories", &categories);
    context.insert("category", &category);
    context.insert("tag", &tag);
    Ok(("blog.html", context))
}

async fn post_page(
    State(state): State<AppState>,
    uri: Uri,
    Path(slug): Path<String>,
    Query(query): Query<PostQuery>,
) -> Response {
    let settings = site_settings(&state).await;
    let result = render_post(&state, &settings, &slug, query).await;
    finish(&state, settings, uri.path(), result)
}

async fn render_post(state: &AppState, settings: &SiteSettings, slug: &str, query: PostQuery) -> PageResult {
    let mut post = state
        .post_service
        .get_published_by_slug(slug)
        .await?
        .ok_or(PageError::NotFound)?;

    match state.post_service.record_view(post.id).await {
        Ok(count) => post.view_count = count,
        Err(e) => tracing::warn!("Failed to record view for post {}: {}", post.id, e),
    }

    let related = state.post_service.related(&post, Some(RELATED_POSTS)).await?;
    let category = match post.category_id {
        Some(id) => state.category_service.get_by_id(id).await?,
        None => None,
    };

    let has_translation = settings.translation_enabled && post.translation.is_some();
    let translated = has_translation
        && query
            .lang
            .as_deref()
            .is_some_and(|l| l.eq_ignore_ascii_case(&settings.secondary_language));
    if translated {
        if let Some(t) = post.translation.clone() {
            post.title = t.title;
            post.excerpt = t.excerpt;
            post.content = t.content;
            post.content_html = t.content_html;
        }
    }

    let renderer = state.post_service.renderer();
    let related: Vec<PostSummary> = related.into_iter().map(|p| PostSummary::new(p, renderer)).collect();
    let post = PostResponse::new(post, renderer).with_category(category);

    let mut context = TeraContext::new();
    context.insert("post", &post);
    context.insert("related", &related);
    context.insert("has_translation", &has_translation);
    context.insert("translated", &translated);
    Ok(("post.html", context))
}

async fn portfolio(State(state): State<AppState>, uri: Uri, Query(query): Query<PageQuery>) -> Response {
    let settings = site_settings(&state).await;
    let result = portfolio_page(&state, query).await;
    finish(&state, settings, uri.path(), result)
}

async fn portfolio_page(state: &AppState, query: PageQuery) -> PageResult {
    let params = ListParams::new(query.page.unwrap_or(1), PROJECTS_PER_PAGE);
    let result = state.project_service.list_published(&params).await?;

    let mut context = TeraContext::new();
    context.insert("pagination", &Pagination::from(&result));
    context.insert("projects", &result.items);
    Ok(("portfolio.html", context))
}

async fn project_page(State(state): State<AppState>, uri: Uri, Path(slug): Path<String>) -> Response {
    let settings = site_settings(&state).await;
    let result = render_project(&state, &slug).await;
    finish(&state, settings, uri.path(), result)
}

async fn render_project(state: &AppState, slug: &str) -> PageResult {
    let project = state
        .project_service
        .get_published_by_slug(slug)
        .await?
        .ok_or(PageError::NotFound)?;

    let mut context = TeraContext::new();
    context.insert("project", &project);
    Ok(("project.html", context))
}

async fn watchlist(State(state): State<AppState>, uri: Uri, Query(query): Query<WatchlistQuery>) -> Response {
    let settings = site_settings(&state).await;
    let result = if settings.watchlist_enabled {
        watchlist_page(&state, query).await
    } else {
        Err(PageError::NotFound)
    };
    finish(&state, settings, uri.path(), result)
}

async fn watchlist_page(state: &AppState, query: WatchlistQuery) -> PageResult {
    let status = query.status.as_deref().and_then(WatchStatus::from_str);
    let params = ListParams::new(query.page.unwrap_or(1), WATCHLIST_PER_PAGE);
    let result = state.watchlist_service.list(status, &params).await?;

    let mut context = TeraContext::new();
    context.insert("pagination", &Pagination::from(&result));
    context.insert("items", &result.items);
    context.insert("status", &status.map(|s| s.as_str()));
    context.insert("image_base_url", &state.config.integrations.tmdb.image_base_url);
    Ok(("watchlist.html", context))
}

/// Fallback for paths no route matched
pub async fn not_found(State(state): State<AppState>, uri: Uri) -> Response {
    let settings = site_settings(&state).await;
    finish(&state, settings, uri.path(), Err(PageError::NotFound))
}
