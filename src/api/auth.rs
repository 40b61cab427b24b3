//! Authentication API endpoints
//!
//! Public:
//! - POST /api/v1/auth/login - Log in, sets the session cookie
//! - POST /api/v1/auth/setup - Create the first admin (only while no user exists)
//!
//! Authenticated:
//! - POST /api/v1/auth/logout
//! - GET /api/v1/auth/me
//! - PUT /api/v1/auth/password

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{
    extract_session_token, ApiError, AppState, AuthenticatedUser, ClientIp, SESSION_COOKIE,
};
use crate::api::responses::UserResponse;
use crate::models::Session;
use crate::services::{ClientInfo, LoginInput, SetupInput};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Username or email
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub token: String,
    pub expires_at: String,
}

#[derive(Debug, Serialize)]
pub struct SetupStatusResponse {
    pub needs_setup: bool,
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/setup", get(setup_status).post(setup))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route("/password", put(change_password))
}

fn client_info(ip: ClientIp, headers: &HeaderMap) -> ClientInfo {
    ClientInfo {
        ip: ip.0,
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .map(String::from),
    }
}

fn session_cookie(session: &Session) -> Result<HeaderMap, ApiError> {
    let max_age = (session.expires_at - chrono::Utc::now()).num_seconds().max(0);
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, session.token, max_age
    );
    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie)
            .map_err(|e| ApiError::internal_error(format!("Invalid cookie: {}", e)))?,
    );
    Ok(headers)
}

fn auth_response(session: &Session, user: crate::models::User) -> AuthResponse {
    AuthResponse {
        user: user.into(),
        token: session.token.clone(),
        expires_at: session.expires_at.to_rfc3339(),
    }
}

/// POST /api/v1/auth/login
///
/// Every attempt, successful or not, lands in the login activity log.
async fn login(
    State(state): State<AppState>,
    ip: ClientIp,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let client = client_info(ip, &headers);
    let (session, user) = state
        .user_service
        .login(LoginInput::new(body.username, body.password), &client)
        .await?;

    let cookie = session_cookie(&session)?;
    Ok((cookie, Json(auth_response(&session, user))))
}

/// GET /api/v1/auth/setup
async fn setup_status(State(state): State<AppState>) -> Result<Json<SetupStatusResponse>, ApiError> {
    Ok(Json(SetupStatusResponse {
        needs_setup: state.user_service.needs_setup().await?,
    }))
}

/// POST /api/v1/auth/setup - creates the admin and logs it in
async fn setup(
    State(state): State<AppState>,
    ip: ClientIp,
    headers: HeaderMap,
    Json(body): Json<SetupInput>,
) -> Result<impl IntoResponse, ApiError> {
    let password = body.password.clone();
    let user = state.user_service.setup_admin(body).await?;

    let client = client_info(ip, &headers);
    let (session, user) = state
        .user_service
        .login(LoginInput::new(user.username, password), &client)
        .await?;

    let cookie = session_cookie(&session)?;
    Ok((StatusCode::CREATED, cookie, Json(auth_response(&session, user))))
}

/// POST /api/v1/auth/logout
async fn logout(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = extract_session_token(&headers)
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;
    state.user_service.logout(&token).await?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_static("session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"),
    );
    Ok((StatusCode::NO_CONTENT, response_headers))
}

/// GET /api/v1/auth/me
async fn me(user: AuthenticatedUser) -> Json<UserResponse> {
    Json(user.0.into())
}

/// PUT /api/v1/auth/password
///
/// Ends every session of the user and hands back a new one.
async fn change_password(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .user_service
        .change_password(user.0.id, &body.current_password, &body.new_password)
        .await?;

    let cookie = session_cookie(&session)?;
    Ok((cookie, Json(auth_response(&session, user.0))))
}
