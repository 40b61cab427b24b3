//! Watchlist endpoints
//!
//! Public:
//! - GET /api/v1/watchlist?status= - 404 while the feature is turned off
//!
//! Admin:
//! - GET/POST /api/v1/admin/watchlist
//! - GET/PUT/DELETE /api/v1/admin/watchlist/{id}
//! - GET /api/v1/admin/tmdb/search?q=&page=

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{default_page, default_per_page, double_option};
use crate::api::middleware::{ApiError, AppState};
use crate::api::responses::PagedResponse;
use crate::models::{ListParams, UpdateWatchlistItemInput, WatchStatus, WatchlistItem};
use crate::services::watchlist::SearchPage;
use crate::services::AddWatchlistItem;

#[derive(Debug, Deserialize)]
pub struct ListWatchlistQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    pub status: Option<String>,
}

impl ListWatchlistQuery {
    fn status(&self) -> Result<Option<WatchStatus>, ApiError> {
        match self.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(None),
            Some(s) => WatchStatus::from_str(s)
                .map(Some)
                .ok_or_else(|| ApiError::validation_error(format!("Unknown status: {}", s))),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateWatchlistRequest {
    pub status: Option<WatchStatus>,
    /// `null` clears the rating
    #[serde(default, deserialize_with = "double_option")]
    pub rating: Option<Option<i32>>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    #[serde(default = "default_page")]
    pub page: u32,
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/", get(list_public))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_all).post(add_item))
        .route("/{id}", get(get_item).put(update_item).delete(delete_item))
}

pub fn search_router() -> Router<AppState> {
    Router::new().route("/search", get(search))
}

/// GET /api/v1/watchlist
async fn list_public(
    State(state): State<AppState>,
    Query(query): Query<ListWatchlistQuery>,
) -> Result<Json<PagedResponse<WatchlistItem>>, ApiError> {
    let site = state.settings_service.get_site_settings().await?;
    if !site.watchlist_enabled {
        return Err(ApiError::not_found("Watchlist is disabled"));
    }

    let params = ListParams::new(query.page, query.per_page);
    let result = state.watchlist_service.list(query.status()?, &params).await?;
    Ok(Json(result.into()))
}

/// GET /api/v1/admin/watchlist - works while the public page is off
async fn list_all(
    State(state): State<AppState>,
    Query(query): Query<ListWatchlistQuery>,
) -> Result<Json<PagedResponse<WatchlistItem>>, ApiError> {
    let params = ListParams::new(query.page, query.per_page);
    let result = state.watchlist_service.list(query.status()?, &params).await?;
    Ok(Json(result.into()))
}

async fn add_item(
    State(state): State<AppState>,
    Json(input): Json<AddWatchlistItem>,
) -> Result<(StatusCode, Json<WatchlistItem>), ApiError> {
    let item = state.watchlist_service.add(input).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<WatchlistItem>, ApiError> {
    Ok(Json(state.watchlist_service.get_by_id(id).await?))
}

async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateWatchlistRequest>,
) -> Result<Json<WatchlistItem>, ApiError> {
    let input = UpdateWatchlistItemInput {
        status: req.status,
        rating: req.rating,
        notes: req.notes,
    };
    Ok(Json(state.watchlist_service.update(id, input).await?))
}

async fn delete_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.watchlist_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/admin/tmdb/search?q=&page=
async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchPage>, ApiError> {
    Ok(Json(state.watchlist_service.search(&query.q, query.page).await?))
}
