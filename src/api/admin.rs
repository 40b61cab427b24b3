//! Admin API endpoints
//!
//! - GET /api/v1/admin/dashboard - Content counts
//! - GET/PUT /api/v1/admin/settings - Typed site settings
//! - GET/PUT /api/v1/admin/settings/raw, DELETE /api/v1/admin/settings/raw/{key}
//! - GET /api/v1/admin/login-activity
//! - POST /api/v1/admin/translate - Free text translation

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::api::common::PaginationQuery;
use crate::api::middleware::{ApiError, AppState};
use crate::api::responses::PagedResponse;
use crate::models::{ListParams, LoginActivity, PostFilter, PostStatus};
use crate::services::SiteSettings;

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub total_posts: i64,
    pub published_posts: i64,
    pub draft_posts: i64,
    pub total_projects: i64,
    pub watchlist_items: i64,
    pub unread_messages: i64,
}

#[derive(Debug, Deserialize)]
pub struct TranslateRequest {
    pub text: String,
    /// Defaults to the site's primary language
    pub source: Option<String>,
    /// Defaults to the site's secondary language
    pub target: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TranslateResponse {
    pub translated_text: String,
    pub source: String,
    pub target: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(get_dashboard))
        .route("/settings", get(get_settings).put(update_settings))
        .route("/settings/raw", get(get_raw_settings).put(update_raw_settings))
        .route("/settings/raw/{key}", delete(delete_raw_setting))
        .route("/login-activity", get(list_login_activity))
        .route("/translate", post(translate))
}

/// GET /api/v1/admin/dashboard
async fn get_dashboard(State(state): State<AppState>) -> Result<Json<DashboardResponse>, ApiError> {
    let probe = ListParams::new(1, 1);
    let total_posts = count_posts(&state, PostFilter::default()).await?;
    let published_posts = count_posts(&state, PostFilter::published()).await?;
    let draft_posts = count_posts(
        &state,
        PostFilter {
            status: Some(PostStatus::Draft),
            ..Default::default()
        },
    )
    .await?;
    let total_projects = state.project_service.list(&probe).await?.total;
    let watchlist_items = state.watchlist_service.list(None, &probe).await?.total;
    let unread_messages = state.contact_service.count_unread().await?;

    Ok(Json(DashboardResponse {
        total_posts,
        published_posts,
        draft_posts,
        total_projects,
        watchlist_items,
        unread_messages,
    }))
}

/// A one-item page is enough to read the total
async fn count_posts(state: &AppState, filter: PostFilter) -> Result<i64, ApiError> {
    let result = state.post_service.list(&filter, &ListParams::new(1, 1)).await?;
    Ok(result.total)
}

/// GET /api/v1/admin/settings
async fn get_settings(State(state): State<AppState>) -> Result<Json<SiteSettings>, ApiError> {
    Ok(Json(state.settings_service.get_site_settings().await?))
}

/// PUT /api/v1/admin/settings
async fn update_settings(
    State(state): State<AppState>,
    Json(settings): Json<SiteSettings>,
) -> Result<Json<SiteSettings>, ApiError> {
    Ok(Json(state.settings_service.update_site_settings(&settings).await?))
}

async fn get_raw_settings(
    State(state): State<AppState>,
) -> Result<Json<HashMap<String, String>>, ApiError> {
    Ok(Json(state.settings_service.get_all().await?))
}

async fn update_raw_settings(
    State(state): State<AppState>,
    Json(values): Json<HashMap<String, String>>,
) -> Result<Json<HashMap<String, String>>, ApiError> {
    state.settings_service.set_many(&values).await?;
    Ok(Json(state.settings_service.get_all().await?))
}

async fn delete_raw_setting(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.settings_service.delete(&key).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/admin/login-activity - newest first
async fn list_login_activity(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PagedResponse<LoginActivity>>, ApiError> {
    let result = state.user_service.list_login_activity(&query.params()).await?;
    Ok(Json(result.into()))
}

/// POST /api/v1/admin/translate
async fn translate(
    State(state): State<AppState>,
    Json(body): Json<TranslateRequest>,
) -> Result<Json<TranslateResponse>, ApiError> {
    let site = state.settings_service.get_site_settings().await?;
    if !site.translation_enabled {
        return Err(ApiError::not_found("Translation is disabled"));
    }

    let pick = |value: Option<String>, default: String| {
        value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(default)
    };
    let source = pick(body.source, site.primary_language);
    let target = pick(body.target, site.secondary_language);

    let translated_text = state
        .translation_service
        .translate_document(&body.text, &source, &target)
        .await?;

    Ok(Json(TranslateResponse {
        translated_text,
        source,
        target,
    }))
}
