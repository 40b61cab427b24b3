//! Contact form endpoints
//!
//! - POST /api/v1/contact - Submit the public contact form
//! - GET /api/v1/admin/messages - Stored messages, newest first
//! - GET/PUT/DELETE /api/v1/admin/messages/{id}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::PaginationQuery;
use crate::api::middleware::{ApiError, AppState, ClientIp};
use crate::api::responses::PagedResponse;
use crate::models::ContactMessage;
use crate::services::{ContactSubmission, SubmitOutcome};

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub success: bool,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct MessageListResponse {
    #[serde(flatten)]
    pub page: PagedResponse<ContactMessage>,
    pub unread: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMessageRequest {
    pub read: bool,
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/", post(submit))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_messages))
        .route(
            "/{id}",
            get(get_message).put(update_message).delete(delete_message),
        )
}

/// POST /api/v1/contact
///
/// A filled honeypot gets the same answer as a stored message.
async fn submit(
    State(state): State<AppState>,
    ip: ClientIp,
    Json(submission): Json<ContactSubmission>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    match state.contact_service.submit(submission, &ip.0).await? {
        SubmitOutcome::Stored(_) | SubmitOutcome::Discarded => Ok((
            StatusCode::CREATED,
            Json(SubmitResponse {
                success: true,
                message: "Thanks, your message has been sent",
            }),
        )),
    }
}

async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<MessageListResponse>, ApiError> {
    let result = state.contact_service.list(&query.params()).await?;
    let unread = state.contact_service.count_unread().await?;
    Ok(Json(MessageListResponse {
        page: result.into(),
        unread,
    }))
}

async fn get_message(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ContactMessage>, ApiError> {
    Ok(Json(state.contact_service.get_by_id(id).await?))
}

/// PUT /api/v1/admin/messages/{id} - mark read or unread
async fn update_message(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateMessageRequest>,
) -> Result<Json<ContactMessage>, ApiError> {
    Ok(Json(state.contact_service.mark_read(id, body.read).await?))
}

async fn delete_message(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.contact_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
