//! Post API endpoints
//!
//! Public:
//! - GET /api/v1/posts - Published posts (page, per_page, category, tag)
//! - GET /api/v1/posts/{slug} - One published post, counts a view
//! - GET /api/v1/posts/{slug}/related - Related published posts
//!
//! Admin:
//! - GET/POST /api/v1/admin/posts
//! - GET/PUT/DELETE /api/v1/admin/posts/{id}
//! - POST /api/v1/admin/posts/{id}/publish, /archive, /translate

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{default_page, default_per_page, double_option};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::{PagedResponse, PostResponse, PostSummary};
use crate::models::{
    CreatePostInput, ListParams, PagedResult, PostFilter, PostStatus, UpdatePostInput,
};

#[derive(Debug, Deserialize)]
pub struct ListPostsQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    /// Category slug
    pub category: Option<String>,
    pub tag: Option<String>,
    /// Admin only
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RelatedQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePostRequest {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub excerpt: Option<String>,
    pub content: Option<String>,
    pub cover_image: Option<String>,
    /// `null` removes the category
    #[serde(default, deserialize_with = "double_option")]
    pub category_id: Option<Option<i64>>,
    pub tags: Option<Vec<String>>,
    pub status: Option<PostStatus>,
}

impl From<UpdatePostRequest> for UpdatePostInput {
    fn from(req: UpdatePostRequest) -> Self {
        Self {
            title: req.title,
            slug: req.slug,
            excerpt: req.excerpt,
            content: req.content,
            cover_image: req.cover_image,
            category_id: req.category_id,
            tags: req.tags,
            status: req.status,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TranslatePostRequest {
    /// Defaults to the site's secondary language
    pub target_language: Option<String>,
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_published))
        .route("/{slug}", get(get_published))
        .route("/{slug}/related", get(related))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_all).post(create_post))
        .route("/{id}", get(get_by_id).put(update_post).delete(delete_post))
        .route("/{id}/publish", post(publish_post))
        .route("/{id}/archive", post(archive_post))
        .route("/{id}/translate", post(translate_post))
}

/// Resolve a category slug; an unknown slug yields an empty listing
async fn category_filter(
    state: &AppState,
    slug: Option<&str>,
) -> Result<Option<Option<i64>>, ApiError> {
    match slug.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(slug) => Ok(Some(
            state.category_service.get_by_slug(slug).await?.map(|c| c.id),
        )),
    }
}

/// GET /api/v1/posts
async fn list_published(
    State(state): State<AppState>,
    Query(query): Query<ListPostsQuery>,
) -> Result<Json<PagedResponse<PostSummary>>, ApiError> {
    let params = ListParams::new(query.page, query.per_page);
    let category_id = match category_filter(&state, query.category.as_deref()).await? {
        Some(None) => return Ok(Json(PagedResult::new(Vec::new(), 0, &params).into())),
        Some(Some(id)) => Some(id),
        None => None,
    };

    let result = state
        .post_service
        .list_published(category_id, query.tag.as_deref(), &params)
        .await?;
    let renderer = state.post_service.renderer();
    Ok(Json(PagedResponse::from_result(result, |p| PostSummary::new(p, renderer))))
}

/// GET /api/v1/posts/{slug}
async fn get_published(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<PostResponse>, ApiError> {
    let mut post = state
        .post_service
        .get_published_by_slug(&slug)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Post not found: {}", slug)))?;

    match state.post_service.record_view(post.id).await {
        Ok(count) => post.view_count = count,
        Err(e) => tracing::warn!("Failed to record view for post {}: {}", post.id, e),
    }

    let category = match post.category_id {
        Some(id) => state.category_service.get_by_id(id).await?,
        None => None,
    };
    Ok(Json(
        PostResponse::new(post, state.post_service.renderer()).with_category(category),
    ))
}

/// GET /api/v1/posts/{slug}/related?limit=
async fn related(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<RelatedQuery>,
) -> Result<Json<Vec<PostSummary>>, ApiError> {
    let post = state
        .post_service
        .get_published_by_slug(&slug)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Post not found: {}", slug)))?;

    let related = state.post_service.related(&post, query.limit).await?;
    let renderer = state.post_service.renderer();
    Ok(Json(
        related
            .into_iter()
            .map(|p| PostSummary::new(p, renderer))
            .collect(),
    ))
}

/// GET /api/v1/admin/posts
async fn list_all(
    State(state): State<AppState>,
    Query(query): Query<ListPostsQuery>,
) -> Result<Json<PagedResponse<PostSummary>>, ApiError> {
    let params = ListParams::new(query.page, query.per_page);
    let mut filter = PostFilter::default();
    if let Some(status) = query.status.as_deref().filter(|s| !s.is_empty()) {
        filter.status = Some(
            PostStatus::from_str(status)
                .ok_or_else(|| ApiError::validation_error(format!("Unknown status: {}", status)))?,
        );
    }
    match category_filter(&state, query.category.as_deref()).await? {
        Some(None) => return Ok(Json(PagedResult::new(Vec::new(), 0, &params).into())),
        Some(Some(id)) => filter.category_id = Some(id),
        None => {}
    }
    if let Some(tag) = query.tag.as_deref().filter(|t| !t.trim().is_empty()) {
        filter = filter.with_tag(tag);
    }

    let result = state.post_service.list(&filter, &params).await?;
    let renderer = state.post_service.renderer();
    Ok(Json(PagedResponse::from_result(result, |p| PostSummary::new(p, renderer))))
}

/// POST /api/v1/admin/posts
async fn create_post(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(input): Json<CreatePostInput>,
) -> Result<(StatusCode, Json<PostResponse>), ApiError> {
    let post = state.post_service.create(input, user.0.id).await?;
    Ok((
        StatusCode::CREATED,
        Json(PostResponse::new(post, state.post_service.renderer())),
    ))
}

/// GET /api/v1/admin/posts/{id}
async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PostResponse>, ApiError> {
    let post = state
        .post_service
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Post not found: {}", id)))?;
    Ok(Json(PostResponse::new(post, state.post_service.renderer())))
}

/// PUT /api/v1/admin/posts/{id}
async fn update_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdatePostRequest>,
) -> Result<Json<PostResponse>, ApiError> {
    let post = state.post_service.update(id, req.into()).await?;
    Ok(Json(PostResponse::new(post, state.post_service.renderer())))
}

/// DELETE /api/v1/admin/posts/{id}
async fn delete_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.post_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn publish_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PostResponse>, ApiError> {
    let post = state.post_service.publish(id).await?;
    Ok(Json(PostResponse::new(post, state.post_service.renderer())))
}

async fn archive_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PostResponse>, ApiError> {
    let post = state.post_service.archive(id).await?;
    Ok(Json(PostResponse::new(post, state.post_service.renderer())))
}

/// POST /api/v1/admin/posts/{id}/translate
async fn translate_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Option<Json<TranslatePostRequest>>,
) -> Result<Json<PostResponse>, ApiError> {
    let site = state.settings_service.get_site_settings().await?;
    if !site.translation_enabled {
        return Err(ApiError::not_found("Translation is disabled"));
    }

    let target = body
        .and_then(|Json(b)| b.target_language)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or(site.secondary_language);

    let post = state.post_service.auto_translate(id, &target).await?;
    Ok(Json(PostResponse::new(post, state.post_service.renderer())))
}
