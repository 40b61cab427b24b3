//! API middleware
//!
//! Contains:
//! - `AppState`, the shared services handed to every handler
//! - `ApiError`, the JSON error envelope and its status mapping
//! - session authentication and the admin role check
//! - the `ClientIp` extractor used for rate limiting and logging

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::Config;
use crate::models::{User, UserRole};
use crate::services::{
    CategoryService, CategoryServiceError, ContactService, ContactServiceError, LoginRateLimiter,
    MediaService, MediaServiceError, PostService, PostServiceError, ProjectService, ProjectServiceError,
    SettingsService, SettingsServiceError, TranslationError, TranslationService, UserService,
    UserServiceError, WatchlistService, WatchlistServiceError,
};
use crate::site::SiteRenderer;

/// Name of the session cookie set on login
pub const SESSION_COOKIE: &str = "session";

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub user_service: Arc<UserService>,
    pub post_service: Arc<PostService>,
    pub project_service: Arc<ProjectService>,
    pub category_service: Arc<CategoryService>,
    pub settings_service: Arc<SettingsService>,
    pub media_service: Arc<MediaService>,
    pub watchlist_service: Arc<WatchlistService>,
    pub translation_service: Arc<TranslationService>,
    pub contact_service: Arc<ContactService>,
    pub login_limiter: Arc<LoginRateLimiter>,
    pub site_renderer: Arc<SiteRenderer>,
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn rate_limited(retry_after: u64) -> Self {
        Self::with_details(
            "RATE_LIMIT",
            format!("Too many requests, retry in {} seconds", retry_after),
            serde_json::json!({ "retry_after": retry_after }),
        )
    }

    pub fn captcha_failed(message: impl Into<String>) -> Self {
        Self::new("CAPTCHA_FAILED", message)
    }

    pub fn not_configured(message: impl Into<String>) -> Self {
        Self::new("NOT_CONFIGURED", message)
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new("UPSTREAM_ERROR", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    /// Log the cause and answer with a generic 500
    fn internal(err: impl std::fmt::Display) -> Self {
        tracing::error!("Internal error: {}", err);
        Self::internal_error("Internal server error")
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" | "CAPTCHA_FAILED" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "CONFLICT" => StatusCode::CONFLICT,
            "RATE_LIMIT" => StatusCode::TOO_MANY_REQUESTS,
            "UPSTREAM_ERROR" => StatusCode::BAD_GATEWAY,
            "NOT_CONFIGURED" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retry_after = self
            .error
            .details
            .as_ref()
            .and_then(|d| d.get("retry_after"))
            .and_then(|v| v.as_u64());

        let mut response = (status, Json(self)).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<PostServiceError> for ApiError {
    fn from(e: PostServiceError) -> Self {
        match e {
            PostServiceError::NotFound(_) => ApiError::not_found(e.to_string()),
            PostServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            PostServiceError::DuplicateSlug(_) => ApiError::conflict(e.to_string()),
            PostServiceError::InvalidTransition { .. } => ApiError::conflict(e.to_string()),
            PostServiceError::Translation(t) => t.into(),
            PostServiceError::InternalError(err) => ApiError::internal(err),
        }
    }
}

impl From<ProjectServiceError> for ApiError {
    fn from(e: ProjectServiceError) -> Self {
        match e {
            ProjectServiceError::NotFound(_) => ApiError::not_found(e.to_string()),
            ProjectServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            ProjectServiceError::DuplicateSlug(_) => ApiError::conflict(e.to_string()),
            ProjectServiceError::InternalError(err) => ApiError::internal(err),
        }
    }
}

impl From<CategoryServiceError> for ApiError {
    fn from(e: CategoryServiceError) -> Self {
        match e {
            CategoryServiceError::NotFound(_) => ApiError::not_found(e.to_string()),
            CategoryServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            CategoryServiceError::DuplicateName(_) | CategoryServiceError::DuplicateSlug(_) => {
                ApiError::conflict(e.to_string())
            }
            CategoryServiceError::InternalError(err) => ApiError::internal(err),
        }
    }
}

impl From<SettingsServiceError> for ApiError {
    fn from(e: SettingsServiceError) -> Self {
        match e {
            SettingsServiceError::InvalidValue(msg) => ApiError::validation_error(msg),
            SettingsServiceError::InternalError(err) => ApiError::internal(err),
        }
    }
}

impl From<MediaServiceError> for ApiError {
    fn from(e: MediaServiceError) -> Self {
        match e {
            MediaServiceError::NotFound(_) => ApiError::not_found(e.to_string()),
            MediaServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            MediaServiceError::InternalError(err) => ApiError::internal(err),
        }
    }
}

impl From<WatchlistServiceError> for ApiError {
    fn from(e: WatchlistServiceError) -> Self {
        match e {
            WatchlistServiceError::NotFound(_) => ApiError::not_found(e.to_string()),
            WatchlistServiceError::Duplicate(_) => ApiError::conflict(e.to_string()),
            WatchlistServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            WatchlistServiceError::NotConfigured => ApiError::not_configured(e.to_string()),
            WatchlistServiceError::Upstream(msg) => ApiError::upstream(msg),
            WatchlistServiceError::InternalError(err) => ApiError::internal(err),
        }
    }
}

impl From<TranslationError> for ApiError {
    fn from(e: TranslationError) -> Self {
        match e {
            TranslationError::NotConfigured => ApiError::not_configured(e.to_string()),
            TranslationError::ValidationError(msg) => ApiError::validation_error(msg),
            TranslationError::Upstream(msg) => ApiError::upstream(msg),
            TranslationError::InternalError(err) => ApiError::internal(err),
        }
    }
}

impl From<ContactServiceError> for ApiError {
    fn from(e: ContactServiceError) -> Self {
        match e {
            ContactServiceError::Disabled => ApiError::not_found("Not found"),
            ContactServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            ContactServiceError::RateLimited(secs) => ApiError::rate_limited(secs),
            ContactServiceError::CaptchaFailed(msg) => ApiError::captcha_failed(msg),
            ContactServiceError::NotFound(_) => ApiError::not_found(e.to_string()),
            ContactServiceError::InternalError(err) => ApiError::internal(err),
        }
    }
}

impl From<UserServiceError> for ApiError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::AuthenticationError(msg) => ApiError::unauthorized(msg),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::SetupDone => ApiError::forbidden(e.to_string()),
            UserServiceError::RateLimited(secs) => ApiError::rate_limited(secs),
            UserServiceError::InternalError(err) => ApiError::internal(err),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::internal(e)
    }
}

/// Session token from `Authorization: Bearer` or the session cookie
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        return Some(token.to_string());
    }

    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies
        .split(';')
        .filter_map(|c| c.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_session_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let user = state
        .user_service
        .validate_session(&token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Admin authorization middleware. Runs after `require_auth`.
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if user.0.role != UserRole::Admin {
        return Err(ApiError::forbidden("Admin privileges required"));
    }

    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// Best-effort client address: first `x-forwarded-for` entry, then
/// `x-real-ip`, then the socket peer, else `"unknown"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

impl ClientIp {
    pub fn from_parts(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        let header_value = |name: &str| {
            headers
                .get(name)
                .and_then(|h| h.to_str().ok())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let forwarded = header_value("x-forwarded-for").and_then(|v| {
            v.split(',')
                .next()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        });

        let ip = forwarded
            .or_else(|| header_value("x-real-ip"))
            .or_else(|| peer.map(|addr| addr.ip().to_string()))
            .unwrap_or_else(|| "unknown".to_string());
        ClientIp(ip)
    }
}

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(ClientIp::from_parts(&parts.headers, peer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::validation_error("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::captcha_failed("x").status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::rate_limited(5).status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ApiError::not_configured("x").status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ApiError::upstream("x").status(), StatusCode::BAD_GATEWAY);
        assert_eq!(ApiError::new("SOMETHING", "x").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_rate_limit_sets_retry_after_header() {
        let response = ApiError::rate_limited(42).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "42");
    }

    #[test]
    fn test_extract_session_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_session_token(&headers), None);

        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; session=abc123"));
        assert_eq!(extract_session_token(&headers).as_deref(), Some("abc123"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        assert_eq!(extract_session_token(&headers).as_deref(), Some("xyz"));
    }

    #[test]
    fn test_client_ip_precedence() {
        let peer: SocketAddr = "192.168.1.9:5000".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(ClientIp::from_parts(&headers, None).0, "unknown");
        assert_eq!(ClientIp::from_parts(&headers, Some(peer)).0, "192.168.1.9");

        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(ClientIp::from_parts(&headers, Some(peer)).0, "10.0.0.2");

        headers.insert("x-forwarded-for", HeaderValue::from_static(" 203.0.113.7, 10.0.0.1"));
        assert_eq!(ClientIp::from_parts(&headers, Some(peer)).0, "203.0.113.7");
    }
}
