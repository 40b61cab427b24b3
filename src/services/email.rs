//! Email service for contact notifications

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use lettre::{
    message::header::ContentType,
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::SmtpConfig;
use crate::models::ContactMessage;

/// A plain-text mail ready to send
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMail {
    pub to: String,
    pub reply_to: Option<String>,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait MailSender: Send + Sync {
    fn is_configured(&self) -> bool;

    async fn send(&self, mail: OutgoingMail) -> Result<()>;
}

/// SMTP sender built from `integrations.smtp`
pub struct EmailService {
    config: SmtpConfig,
}

impl EmailService {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn sender_address(&self) -> Option<&str> {
        self.config
            .from
            .as_deref()
            .or(self.config.username.as_deref())
            .filter(|s| !s.trim().is_empty())
    }

    fn transport(&self, host: &str) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| anyhow!("Failed to create SMTP transport: {}", e))?
            .port(self.config.port);

        if let (Some(user), Some(pass)) = (&self.config.username, &self.config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        Ok(builder.build())
    }
}

#[async_trait]
impl MailSender for EmailService {
    fn is_configured(&self) -> bool {
        self.config.host.as_deref().is_some_and(|h| !h.trim().is_empty()) && self.sender_address().is_some()
    }

    async fn send(&self, mail: OutgoingMail) -> Result<()> {
        let host = self
            .config
            .host
            .as_deref()
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| anyhow!("SMTP host not configured"))?;
        let from = self
            .sender_address()
            .ok_or_else(|| anyhow!("SMTP from address not configured"))?;

        let mut builder = Message::builder()
            .from(from.parse().map_err(|e| anyhow!("Invalid from address: {}", e))?)
            .to(mail.to.parse().map_err(|e| anyhow!("Invalid to address: {}", e))?)
            .subject(mail.subject)
            .header(ContentType::TEXT_PLAIN);
        if let Some(reply_to) = &mail.reply_to {
            builder = builder.reply_to(
                reply_to
                    .parse()
                    .map_err(|e| anyhow!("Invalid reply-to address: {}", e))?,
            );
        }
        let email = builder
            .body(mail.body)
            .map_err(|e| anyhow!("Failed to build email: {}", e))?;

        self.transport(host)?
            .send(email)
            .await
            .map_err(|e| anyhow!("Failed to send email: {}", e))?;
        Ok(())
    }
}

/// Notification sent to the site owner for a new contact message
pub fn contact_notification(to: &str, site_name: &str, message: &ContactMessage) -> OutgoingMail {
    let subject = match &message.subject {
        Some(subject) => format!("[{}] {}", site_name, subject),
        None => format!("[{}] New message from {}", site_name, message.name),
    };
    let body = format!(
        "From: {} <{}>\nReceived: {}\n\n{}\n",
        message.name,
        message.email,
        message.created_at.format("%Y-%m-%d %H:%M UTC"),
        message.message
    );

    OutgoingMail {
        to: to.to_string(),
        reply_to: Some(message.email.clone()),
        subject,
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_is_configured() {
        let mut config = SmtpConfig::default();
        assert!(!EmailService::new(config.clone()).is_configured());

        config.host = Some("smtp.example.com".into());
        assert!(!EmailService::new(config.clone()).is_configured());

        config.username = Some("me@example.com".into());
        assert!(EmailService::new(config).is_configured());
    }

    #[tokio::test]
    async fn test_send_without_host_fails() {
        let service = EmailService::new(SmtpConfig::default());
        let result = service
            .send(OutgoingMail {
                to: "a@example.com".into(),
                reply_to: None,
                subject: "hi".into(),
                body: "body".into(),
            })
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_contact_notification() {
        let message = ContactMessage {
            id: 1,
            name: "Ada".into(),
            email: "ada@example.com".into(),
            subject: None,
            message: "Hello there, nice site!".into(),
            ip_address: None,
            read: false,
            created_at: Utc::now(),
        };
        let mail = contact_notification("owner@example.com", "Folio", &message);
        assert_eq!(mail.subject, "[Folio] New message from Ada");
        assert_eq!(mail.reply_to.as_deref(), Some("ada@example.com"));
        assert!(mail.body.contains("Hello there"));
    }
}
