//! Project API endpoints
//!
//! - GET /api/v1/projects - Published projects, featured first
//! - GET /api/v1/projects/{slug}
//! - GET/POST /api/v1/admin/projects
//! - GET/PUT/DELETE /api/v1/admin/projects/{id}
//! - PUT /api/v1/admin/projects/{id}/featured

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::PaginationQuery;
use crate::api::middleware::{ApiError, AppState};
use crate::api::responses::{PagedResponse, ProjectResponse};
use crate::models::{CreateProjectInput, UpdateProjectInput};

#[derive(Debug, Deserialize)]
pub struct SetFeaturedRequest {
    pub featured: bool,
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_published))
        .route("/{slug}", get(get_published))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_all).post(create_project))
        .route("/{id}", get(get_by_id).put(update_project).delete(delete_project))
        .route("/{id}/featured", put(set_featured))
}

async fn list_published(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PagedResponse<ProjectResponse>>, ApiError> {
    let result = state.project_service.list_published(&query.params()).await?;
    Ok(Json(PagedResponse::from_result(result, ProjectResponse::from)))
}

async fn get_published(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<ProjectResponse>, ApiError> {
    let project = state
        .project_service
        .get_published_by_slug(&slug)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Project not found: {}", slug)))?;
    Ok(Json(project.into()))
}

/// Drafts included
async fn list_all(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PagedResponse<ProjectResponse>>, ApiError> {
    let result = state.project_service.list(&query.params()).await?;
    Ok(Json(PagedResponse::from_result(result, ProjectResponse::from)))
}

async fn create_project(
    State(state): State<AppState>,
    Json(input): Json<CreateProjectInput>,
) -> Result<(StatusCode, Json<ProjectResponse>), ApiError> {
    let project = state.project_service.create(input).await?;
    Ok((StatusCode::CREATED, Json(project.into())))
}

async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ProjectResponse>, ApiError> {
    let project = state
        .project_service
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Project not found: {}", id)))?;
    Ok(Json(project.into()))
}

async fn update_project(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateProjectInput>,
) -> Result<Json<ProjectResponse>, ApiError> {
    let project = state.project_service.update(id, input).await?;
    Ok(Json(project.into()))
}

async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.project_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_featured(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<SetFeaturedRequest>,
) -> Result<Json<ProjectResponse>, ApiError> {
    let project = state.project_service.set_featured(id, body.featured).await?;
    Ok(Json(project.into()))
}
