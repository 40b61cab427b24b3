//! CAPTCHA verification
//!
//! Speaks the `siteverify` protocol shared by Cloudflare Turnstile and
//! hCaptcha: a form post of `secret`, `response` and `remoteip` answered
//! with `{"success": bool, "error-codes": [..]}`.
//!
//! In production every failure is a rejection, including a missing
//! secret. In development a missing secret lets submissions through.

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::{CaptchaConfig, Environment};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of a verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptchaOutcome {
    Passed,
    Rejected(String),
}

impl CaptchaOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, CaptchaOutcome::Passed)
    }
}

#[async_trait]
pub trait CaptchaCheck: Send + Sync {
    async fn verify(&self, token: Option<&str>, remote_ip: Option<&str>) -> CaptchaOutcome;
}

#[derive(Debug, Deserialize)]
struct SiteverifyResponse {
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

pub struct CaptchaVerifier {
    client: reqwest::Client,
    secret: Option<String>,
    verify_url: String,
    environment: Environment,
}

impl CaptchaVerifier {
    pub fn new(config: &CaptchaConfig, environment: Environment) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            secret: config.secret.clone().filter(|s| !s.trim().is_empty()),
            verify_url: config.verify_url.clone(),
            environment,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }
}

#[async_trait]
impl CaptchaCheck for CaptchaVerifier {
    async fn verify(&self, token: Option<&str>, remote_ip: Option<&str>) -> CaptchaOutcome {
        let Some(secret) = self.secret.as_deref() else {
            if self.environment.is_production() {
                tracing::error!("CAPTCHA secret missing in production, rejecting submission");
                return CaptchaOutcome::Rejected("captcha not configured".to_string());
            }
            tracing::warn!("CAPTCHA secret missing, skipping verification (development)");
            return CaptchaOutcome::Passed;
        };

        let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) else {
            return CaptchaOutcome::Rejected("missing captcha token".to_string());
        };

        let mut form = vec![("secret", secret), ("response", token)];
        if let Some(ip) = remote_ip.filter(|ip| *ip != "unknown") {
            form.push(("remoteip", ip));
        }

        let response = match self.client.post(&self.verify_url).form(&form).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("CAPTCHA verification request failed: {}", e);
                return CaptchaOutcome::Rejected("captcha verification unavailable".to_string());
            }
        };

        match response.json::<SiteverifyResponse>().await {
            Ok(body) if body.success => CaptchaOutcome::Passed,
            Ok(body) => {
                tracing::debug!("CAPTCHA rejected: {:?}", body.error_codes);
                CaptchaOutcome::Rejected(
                    body.error_codes
                        .first()
                        .cloned()
                        .unwrap_or_else(|| "captcha rejected".to_string()),
                )
            }
            Err(e) => {
                tracing::warn!("Invalid CAPTCHA verification response: {}", e);
                CaptchaOutcome::Rejected("captcha verification unavailable".to_string())
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Passes exactly the token "pass"
    pub(crate) struct FixedCaptcha;

    #[async_trait]
    impl CaptchaCheck for FixedCaptcha {
        async fn verify(&self, token: Option<&str>, _remote_ip: Option<&str>) -> CaptchaOutcome {
            if token == Some("pass") {
                CaptchaOutcome::Passed
            } else {
                CaptchaOutcome::Rejected("bad token".to_string())
            }
        }
    }

    #[tokio::test]
    async fn test_missing_secret_fails_closed_in_production() {
        let verifier = CaptchaVerifier::new(&CaptchaConfig::default(), Environment::Production).unwrap();
        assert!(!verifier.is_configured());
        assert!(!verifier.verify(Some("token"), None).await.is_passed());
    }

    #[tokio::test]
    async fn test_missing_secret_passes_in_development() {
        let verifier = CaptchaVerifier::new(&CaptchaConfig::default(), Environment::Development).unwrap();
        assert!(verifier.verify(None, None).await.is_passed());
    }

    #[tokio::test]
    async fn test_missing_token_rejected() {
        let config = CaptchaConfig {
            secret: Some("secret".into()),
            ..Default::default()
        };
        let verifier = CaptchaVerifier::new(&config, Environment::Development).unwrap();
        assert_eq!(
            verifier.verify(Some("  "), None).await,
            CaptchaOutcome::Rejected("missing captcha token".to_string())
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_rejected() {
        let config = CaptchaConfig {
            secret: Some("secret".into()),
            site_key: None,
            verify_url: "http://127.0.0.1:9/siteverify".into(),
        };
        let verifier = CaptchaVerifier::new(&config, Environment::Production).unwrap();
        assert!(!verifier.verify(Some("token"), Some("10.0.0.1")).await.is_passed());
    }

    #[test]
    fn test_parse_siteverify_response() {
        let body: SiteverifyResponse =
            serde_json::from_str(r#"{"success": false, "error-codes": ["invalid-input-response"]}"#).unwrap();
        assert!(!body.success);
        assert_eq!(body.error_codes, vec!["invalid-input-response"]);
    }
}
