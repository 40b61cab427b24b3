//! Media library endpoints
//!
//! - POST /api/v1/admin/media - multipart upload, one field named "file"
//! - GET /api/v1/admin/media?kind=image|video
//! - GET/DELETE /api/v1/admin/media/{id}

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{default_page, default_per_page};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::PagedResponse;
use crate::models::{ListParams, Media, MediaKind};
use crate::services::UploadedFile;

/// Room for the multipart framing around the largest allowed file
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
pub struct ListMediaQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    pub kind: Option<String>,
}

/// `max_upload` is the largest per-kind size limit in bytes
pub fn admin_router(max_upload: u64) -> Router<AppState> {
    let body_limit = usize::try_from(max_upload)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/", get(list_media).post(upload_media))
        .route("/{id}", get(get_media).delete(delete_media))
        .layer(DefaultBodyLimit::max(body_limit))
}

/// POST /api/v1/admin/media
async fn upload_media(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Media>), ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation_error(format!("Failed to read multipart: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let original_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::validation_error(format!("Failed to read file: {}", e)))?;

        let media = state
            .media_service
            .upload(
                UploadedFile {
                    original_name,
                    content_type,
                    data: data.to_vec(),
                },
                Some(user.0.id),
            )
            .await?;
        return Ok((StatusCode::CREATED, Json(media)));
    }

    Err(ApiError::validation_error("No file provided"))
}

async fn list_media(
    State(state): State<AppState>,
    Query(query): Query<ListMediaQuery>,
) -> Result<Json<PagedResponse<Media>>, ApiError> {
    let kind = match query.kind.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        None => None,
        Some(k) => Some(
            MediaKind::from_str(k)
                .ok_or_else(|| ApiError::validation_error(format!("Unknown media kind: {}", k)))?,
        ),
    };
    let params = ListParams::new(query.page, query.per_page);
    let result = state.media_service.list(kind, &params).await?;
    Ok(Json(result.into()))
}

async fn get_media(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Media>, ApiError> {
    Ok(Json(state.media_service.get_by_id(id).await?))
}

/// Removes the row and the file on disk
async fn delete_media(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.media_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
