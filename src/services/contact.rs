//! Contact form service
//!
//! A submission goes through these steps in order:
//! 1. honeypot: a filled hidden field is accepted and dropped silently
//! 2. field validation
//! 3. per-client hourly limit
//! 4. CAPTCHA
//! 5. store, then notify the site owner by email (best effort)

use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::db::repositories::ContactMessageRepository;
use crate::models::{ContactMessage, CreateContactMessage, ListParams, PagedResult};
use crate::services::captcha::{CaptchaCheck, CaptchaOutcome};
use crate::services::email::{contact_notification, MailSender};
use crate::services::rate_limiter::FixedWindowLimiter;
use crate::services::settings::SettingsService;

pub const MAX_NAME_LENGTH: usize = 100;
pub const MAX_EMAIL_LENGTH: usize = 254;
pub const MAX_SUBJECT_LENGTH: usize = 200;
pub const MIN_MESSAGE_LENGTH: usize = 10;
pub const MAX_MESSAGE_LENGTH: usize = 5000;

/// local@label.label, labels may not start or end with a hyphen
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@\p{Cc}]+@(?:[\p{L}\p{N}](?:[\p{L}\p{N}-]*[\p{L}\p{N}])?\.)+[\p{L}\p{N}](?:[\p{L}\p{N}-]*[\p{L}\p{N}])?$")
        .expect("email pattern compiles")
});

#[derive(Debug, Error)]
pub enum ContactServiceError {
    #[error("Contact form is disabled")]
    Disabled,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Too many messages, retry in {0} seconds")]
    RateLimited(u64),

    #[error("CAPTCHA verification failed: {0}")]
    CaptchaFailed(String),

    #[error("Message not found: {0}")]
    NotFound(i64),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Form fields as posted by the browser
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactSubmission {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub subject: Option<String>,
    pub message: String,
    /// Hidden field that people leave empty
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub captcha_token: Option<String>,
}

/// What happened to an accepted submission
#[derive(Debug)]
pub enum SubmitOutcome {
    Stored(ContactMessage),
    /// Honeypot was filled. The client is told it succeeded.
    Discarded,
}

pub struct ContactService {
    repo: Arc<dyn ContactMessageRepository>,
    settings: Arc<SettingsService>,
    captcha: Arc<dyn CaptchaCheck>,
    mailer: Arc<dyn MailSender>,
    limiter: FixedWindowLimiter,
}

impl ContactService {
    pub fn new(
        repo: Arc<dyn ContactMessageRepository>,
        settings: Arc<SettingsService>,
        captcha: Arc<dyn CaptchaCheck>,
        mailer: Arc<dyn MailSender>,
        max_per_hour: u32,
    ) -> Self {
        Self {
            repo,
            settings,
            captcha,
            mailer,
            limiter: FixedWindowLimiter::new(max_per_hour, Duration::from_secs(3600)),
        }
    }

    pub async fn submit(
        &self,
        submission: ContactSubmission,
        client_ip: &str,
    ) -> Result<SubmitOutcome, ContactServiceError> {
        let site = self
            .settings
            .get_site_settings()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to load settings: {}", e))?;
        if !site.contact_enabled {
            return Err(ContactServiceError::Disabled);
        }

        if submission.website.as_deref().is_some_and(|w| !w.trim().is_empty()) {
            tracing::info!("Contact honeypot triggered from {}, discarding", client_ip);
            return Ok(SubmitOutcome::Discarded);
        }

        let input = validate(&submission, client_ip)?;

        self.limiter
            .hit(client_ip)
            .await
            .map_err(ContactServiceError::RateLimited)?;

        if let CaptchaOutcome::Rejected(reason) = self
            .captcha
            .verify(submission.captcha_token.as_deref(), Some(client_ip))
            .await
        {
            return Err(ContactServiceError::CaptchaFailed(reason));
        }

        let message = self
            .repo
            .create(&input)
            .await
            .context("Failed to store contact message")?;
        tracing::info!("Stored contact message {} from {}", message.id, client_ip);

        if !site.contact_email.is_empty() && self.mailer.is_configured() {
            let mail = contact_notification(&site.contact_email, &site.site_name, &message);
            if let Err(e) = self.mailer.send(mail).await {
                tracing::warn!("Failed to send contact notification: {}", e);
            }
        }

        Ok(SubmitOutcome::Stored(message))
    }

    pub async fn list(&self, params: &ListParams) -> Result<PagedResult<ContactMessage>, ContactServiceError> {
        let items = self.repo.list(params.offset(), params.limit()).await?;
        let total = self.repo.count().await?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<ContactMessage, ContactServiceError> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or(ContactServiceError::NotFound(id))
    }

    pub async fn mark_read(&self, id: i64, read: bool) -> Result<ContactMessage, ContactServiceError> {
        if !self.repo.mark_read(id, read).await? {
            return Err(ContactServiceError::NotFound(id));
        }
        self.get_by_id(id).await
    }

    pub async fn delete(&self, id: i64) -> Result<(), ContactServiceError> {
        if !self.repo.delete(id).await? {
            return Err(ContactServiceError::NotFound(id));
        }
        Ok(())
    }

    pub async fn count_unread(&self) -> Result<i64, ContactServiceError> {
        Ok(self.repo.count_unread().await?)
    }

    /// Drop expired rate-limit windows
    pub async fn cleanup(&self) -> usize {
        self.limiter.cleanup().await
    }
}

fn validate(submission: &ContactSubmission, client_ip: &str) -> Result<CreateContactMessage, ContactServiceError> {
    let invalid = |msg: String| ContactServiceError::ValidationError(msg);

    let name = submission.name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LENGTH {
        return Err(invalid(format!("Name must be 1 to {} characters", MAX_NAME_LENGTH)));
    }

    let email = submission.email.trim();
    if !is_valid_email(email) {
        return Err(invalid("Invalid email address".to_string()));
    }

    let subject = submission
        .subject
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    if subject.is_some_and(|s| s.chars().count() > MAX_SUBJECT_LENGTH) {
        return Err(invalid(format!(
            "Subject must be at most {} characters",
            MAX_SUBJECT_LENGTH
        )));
    }

    let message = submission.message.trim();
    let len = message.chars().count();
    if !(MIN_MESSAGE_LENGTH..=MAX_MESSAGE_LENGTH).contains(&len) {
        return Err(invalid(format!(
            "Message must be {} to {} characters",
            MIN_MESSAGE_LENGTH, MAX_MESSAGE_LENGTH
        )));
    }

    Ok(CreateContactMessage {
        name: name.to_string(),
        email: email.to_string(),
        subject: subject.map(str::to_string),
        message: message.to_string(),
        ip_address: Some(client_ip.to_string()).filter(|ip| ip != "unknown"),
    })
}

/// Shape check: one `@`, non-empty local part, dotted domain, no spaces
pub fn is_valid_email(email: &str) -> bool {
    email.len() <= MAX_EMAIL_LENGTH && EMAIL_RE.is_match(email)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Cache, MemoryCache};
    use crate::config::FeaturesConfig;
    use crate::db::repositories::{SqlxContactMessageRepository, SqlxSettingsRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::services::captcha::tests::FixedCaptcha;
    use crate::services::email::OutgoingMail;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<OutgoingMail>>,
    }

    #[async_trait]
    impl MailSender for RecordingMailer {
        fn is_configured(&self) -> bool {
            true
        }

        async fn send(&self, mail: OutgoingMail) -> anyhow::Result<()> {
            self.sent.lock().await.push(mail);
            Ok(())
        }
    }

    struct Fixture {
        service: ContactService,
        settings: Arc<SettingsService>,
        mailer: Arc<RecordingMailer>,
    }

    async fn setup(max_per_hour: u32) -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let cache = Arc::new(Cache::Memory(MemoryCache::new()));
        let settings = Arc::new(SettingsService::new(
            SqlxSettingsRepository::boxed(pool.clone()),
            cache,
            FeaturesConfig::default(),
        ));
        let mailer = Arc::new(RecordingMailer::default());
        let service = ContactService::new(
            SqlxContactMessageRepository::boxed(pool),
            settings.clone(),
            Arc::new(FixedCaptcha),
            mailer.clone(),
            max_per_hour,
        );
        Fixture {
            service,
            settings,
            mailer,
        }
    }

    fn submission() -> ContactSubmission {
        ContactSubmission {
            name: "Ada".into(),
            email: "ada@example.com".into(),
            subject: Some("Hello".into()),
            message: "I enjoyed your post on parsers.".into(),
            website: None,
            captcha_token: Some("pass".into()),
        }
    }

    #[tokio::test]
    async fn test_submit_stores_and_notifies() {
        let f = setup(5).await;
        f.settings
            .set(crate::services::settings::keys::CONTACT_EMAIL, "owner@example.com")
            .await
            .unwrap();

        let outcome = f.service.submit(submission(), "10.0.0.1").await.unwrap();
        let SubmitOutcome::Stored(message) = outcome else {
            panic!("expected stored message");
        };
        assert_eq!(message.ip_address.as_deref(), Some("10.0.0.1"));
        assert!(!message.read);

        let sent = f.mailer.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "owner@example.com");
    }

    #[tokio::test]
    async fn test_honeypot_is_discarded_silently() {
        let f = setup(5).await;
        let mut spam = submission();
        spam.website = Some("http://spam.example".into());
        spam.captcha_token = None;

        assert!(matches!(
            f.service.submit(spam, "10.0.0.1").await.unwrap(),
            SubmitOutcome::Discarded
        ));
        assert_eq!(f.service.list(&ListParams::default()).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_validation_runs_before_captcha() {
        let f = setup(5).await;
        let mut short = submission();
        short.message = "hi".into();
        short.captcha_token = None;
        assert!(matches!(
            f.service.submit(short, "10.0.0.1").await,
            Err(ContactServiceError::ValidationError(_))
        ));

        let mut bad_captcha = submission();
        bad_captcha.captcha_token = Some("nope".into());
        assert!(matches!(
            f.service.submit(bad_captcha, "10.0.0.1").await,
            Err(ContactServiceError::CaptchaFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_rate_limited_per_client() {
        let f = setup(2).await;
        f.service.submit(submission(), "10.0.0.1").await.unwrap();
        f.service.submit(submission(), "10.0.0.1").await.unwrap();
        assert!(matches!(
            f.service.submit(submission(), "10.0.0.1").await,
            Err(ContactServiceError::RateLimited(secs)) if secs > 0
        ));
        assert!(f.service.submit(submission(), "10.0.0.2").await.is_ok());
    }

    #[tokio::test]
    async fn test_disabled_by_setting() {
        let f = setup(5).await;
        f.settings
            .set(crate::services::settings::keys::CONTACT_ENABLED, "false")
            .await
            .unwrap();
        assert!(matches!(
            f.service.submit(submission(), "10.0.0.1").await,
            Err(ContactServiceError::Disabled)
        ));
    }

    #[tokio::test]
    async fn test_admin_operations() {
        let f = setup(5).await;
        let SubmitOutcome::Stored(message) = f.service.submit(submission(), "unknown").await.unwrap() else {
            panic!("expected stored message");
        };
        assert_eq!(message.ip_address, None);
        assert_eq!(f.service.count_unread().await.unwrap(), 1);

        let read = f.service.mark_read(message.id, true).await.unwrap();
        assert!(read.read);
        assert_eq!(f.service.count_unread().await.unwrap(), 0);

        f.service.delete(message.id).await.unwrap();
        assert!(matches!(
            f.service.delete(message.id).await,
            Err(ContactServiceError::NotFound(_))
        ));
    }

    #[test]
    fn test_is_valid_email() {
        assert!(is_valid_email("a@example.com"));
        assert!(is_valid_email("first.last+tag@sub.example.co"));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("a@localhost"));
        assert!(!is_valid_email("a@b@example.com"));
        assert!(!is_valid_email("a b@example.com"));
        assert!(!is_valid_email("a@-bad.com"));
        assert!(!is_valid_email("a@example..com"));
    }
}
