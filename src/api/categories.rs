//! Category API endpoints
//!
//! - GET /api/v1/categories - All categories with their published post count
//! - POST /api/v1/admin/categories
//! - GET/PUT/DELETE /api/v1/admin/categories/{id}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState};
use crate::models::{Category, CategoryWithCount, CreateCategoryInput, UpdateCategoryInput};

pub fn public_router() -> Router<AppState> {
    Router::new().route("/", get(list_categories))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_categories).post(create_category))
        .route(
            "/{id}",
            get(get_category).put(update_category).delete(delete_category),
        )
}

async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<CategoryWithCount>>, ApiError> {
    Ok(Json(state.category_service.list().await?))
}

async fn create_category(
    State(state): State<AppState>,
    Json(input): Json<CreateCategoryInput>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let category = state.category_service.create(input).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Category>, ApiError> {
    state
        .category_service
        .get_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Category not found: {}", id)))
}

async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateCategoryInput>,
) -> Result<Json<Category>, ApiError> {
    Ok(Json(state.category_service.update(id, input).await?))
}

/// Posts in the category are kept and lose their category
async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.category_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
