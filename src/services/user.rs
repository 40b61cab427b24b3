//! User service
//!
//! - one-time setup of the first admin account
//! - rate-limited login creating session tokens
//! - logout, session validation and password change
//! - login activity log
//!
//! Every login attempt, successful or not, is written to the activity log.
//! Attempts are counted against the client and the account before the
//! password is checked; a successful login clears both counts.

use crate::db::repositories::{LoginActivityRepository, SessionRepository, UserRepository};
use crate::models::{ListParams, LoginActivity, NewLoginActivity, PagedResult, Session, User, UserRole};
use crate::services::contact::is_valid_email;
use crate::services::password::{hash_password, validate_password_strength, verify_password};
use crate::services::rate_limiter::LoginRateLimiter;
use anyhow::Context;
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

const INVALID_CREDENTIALS: &str = "Invalid username or password";

#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Setup has already been completed")]
    SetupDone,

    #[error("Too many login attempts, retry in {0} seconds")]
    RateLimited(u64),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetupInput {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    /// Username or email address
    pub username: String,
    pub password: String,
}

impl LoginInput {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Where a login attempt came from
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub ip: String,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            user_agent: None,
        }
    }
}

pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    activity_repo: Arc<dyn LoginActivityRepository>,
    limiter: Arc<LoginRateLimiter>,
    session_ttl: Duration,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        activity_repo: Arc<dyn LoginActivityRepository>,
        limiter: Arc<LoginRateLimiter>,
        session_ttl_hours: i64,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            activity_repo,
            limiter,
            session_ttl: Duration::hours(session_ttl_hours.max(1)),
        }
    }

    /// True until the first account exists
    pub async fn needs_setup(&self) -> Result<bool, UserServiceError> {
        Ok(self.user_repo.count().await? == 0)
    }

    /// Create the admin account. Only allowed while no user exists.
    pub async fn setup_admin(&self, input: SetupInput) -> Result<User, UserServiceError> {
        if !self.needs_setup().await? {
            return Err(UserServiceError::SetupDone);
        }

        let username = input.username.trim();
        validate_username(username)?;
        let email = input.email.trim().to_lowercase();
        if !is_valid_email(&email) {
            return Err(UserServiceError::ValidationError("Invalid email address".to_string()));
        }
        validate_password_strength(&input.password).map_err(UserServiceError::ValidationError)?;

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;
        let user = self
            .user_repo
            .create(username, &email, &password_hash, UserRole::Admin)
            .await
            .context("Failed to create admin user")?;

        tracing::info!("Admin account '{}' created", user.username);
        Ok(user)
    }

    /// Count the attempt, verify the password and open a session
    pub async fn login(&self, input: LoginInput, client: &ClientInfo) -> Result<(Session, User), UserServiceError> {
        let username = input.username.trim();
        if username.is_empty() || input.password.is_empty() {
            return Err(UserServiceError::ValidationError(
                "Username and password are required".to_string(),
            ));
        }

        let user = if username.contains('@') {
            self.user_repo.get_by_email(&username.to_lowercase()).await?
        } else {
            self.user_repo.get_by_username(username).await?
        };

        // username and email of one account share a window
        let account = match &user {
            Some(user) => format!("user:{}", user.id),
            None => format!("name:{}", username),
        };

        if let Err(retry_after) = self.limiter.try_acquire(&client.ip, &account).await {
            tracing::warn!("Login rate limited for '{}' from {}", username, client.ip);
            self.record_activity(NewLoginActivity::failure(username, &client.ip, "rate_limited"), client)
                .await;
            return Err(UserServiceError::RateLimited(retry_after));
        }

        let Some(user) = user else {
            self.fail(username, client, "unknown_user").await;
            return Err(UserServiceError::AuthenticationError(INVALID_CREDENTIALS.to_string()));
        };

        if !verify_password(&input.password, &user.password_hash).context("Failed to verify password")? {
            self.fail(username, client, "invalid_password").await;
            return Err(UserServiceError::AuthenticationError(INVALID_CREDENTIALS.to_string()));
        }

        self.limiter.reset(&client.ip, &account).await;
        let session = self.create_session(user.id).await?;
        self.record_activity(NewLoginActivity::success(&user.username, &client.ip), client)
            .await;
        tracing::info!("User '{}' logged in from {}", user.username, client.ip);

        Ok((session, user))
    }

    pub async fn logout(&self, token: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete_by_token(token)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// The session's user, or `None` for unknown and expired tokens.
    /// Expired sessions are deleted on sight.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let Some(session) = self.session_repo.get_by_token(token).await? else {
            return Ok(None);
        };

        if session.is_expired() {
            let _ = self.session_repo.delete_by_token(token).await;
            return Ok(None);
        }

        Ok(self.user_repo.get_by_id(session.user_id).await?)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        Ok(self.user_repo.get_by_id(id).await?)
    }

    /// Replace the password, end every session of the user and open a
    /// fresh one for the caller
    pub async fn change_password(
        &self,
        user_id: i64,
        current_password: &str,
        new_password: &str,
    ) -> Result<Session, UserServiceError> {
        let user = self
            .user_repo
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| UserServiceError::AuthenticationError("User not found".to_string()))?;

        if !verify_password(current_password, &user.password_hash).context("Failed to verify password")? {
            return Err(UserServiceError::AuthenticationError(
                "Current password is incorrect".to_string(),
            ));
        }
        validate_password_strength(new_password).map_err(UserServiceError::ValidationError)?;
        if current_password == new_password {
            return Err(UserServiceError::ValidationError(
                "New password must differ from the current one".to_string(),
            ));
        }

        let hash = hash_password(new_password).context("Failed to hash password")?;
        self.user_repo.update_password(user_id, &hash).await?;
        let ended = self.session_repo.delete_by_user(user_id).await?;
        tracing::info!("Password changed for user {}, {} session(s) ended", user_id, ended);

        self.create_session(user_id).await
    }

    pub async fn cleanup_expired_sessions(&self) -> Result<u64, UserServiceError> {
        Ok(self.session_repo.delete_expired().await?)
    }

    /// Newest first
    pub async fn list_login_activity(
        &self,
        params: &ListParams,
    ) -> Result<PagedResult<LoginActivity>, UserServiceError> {
        let items = self
            .activity_repo
            .list_recent(params.offset(), params.limit())
            .await?;
        let total = self.activity_repo.count().await?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn prune_login_activity(&self, retention_days: i64) -> Result<u64, UserServiceError> {
        let cutoff = Utc::now() - Duration::days(retention_days.max(1));
        Ok(self.activity_repo.prune_older_than(cutoff).await?)
    }

    async fn fail(&self, username: &str, client: &ClientInfo, reason: &str) {
        self.record_activity(NewLoginActivity::failure(username, &client.ip, reason), client)
            .await;
    }

    async fn record_activity(&self, entry: NewLoginActivity, client: &ClientInfo) {
        let entry = entry.with_user_agent(client.user_agent.clone());
        if let Err(e) = self.activity_repo.record(&entry).await {
            tracing::warn!("Failed to record login activity: {}", e);
        }
    }

    async fn create_session(&self, user_id: i64) -> Result<Session, UserServiceError> {
        let token = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        let session = self
            .session_repo
            .create(user_id, &token, Utc::now() + self.session_ttl)
            .await
            .context("Failed to create session")?;
        Ok(session)
    }
}

fn validate_username(username: &str) -> Result<(), UserServiceError> {
    let len = username.chars().count();
    if !(3..=32).contains(&len) {
        return Err(UserServiceError::ValidationError(
            "Username must be 3 to 32 characters".to_string(),
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(UserServiceError::ValidationError(
            "Username may contain letters, digits, '_' and '-'".to_string(),
        ));
    }
    Ok(())
}
