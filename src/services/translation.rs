//! Translation service
//!
//! - `TranslationProvider`: the seam to the external translation API
//! - `LibreTranslateClient`: provider for LibreTranslate-compatible
//!   `/translate` endpoints
//! - `TranslationService`: validation, caching and chunking of long
//!   documents on top of a provider

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::cache::{Cache, CacheLayer};
use crate::config::TranslationConfig;

/// Longest text accepted in one request
pub const MAX_TEXT_LENGTH: usize = 20_000;

const CACHE_KEY_PREFIX: &str = "translation:";

const PARAGRAPH_BREAK: &str = "\n\n";

const TRANSLATION_CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("Translation is not configured")]
    NotConfigured,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Translation provider error: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

#[async_trait]
pub trait TranslationProvider: Send + Sync {
    /// Translate plain text. `source` may be `auto`.
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String, TranslationError>;
}

#[derive(Debug, Serialize)]
struct LibreTranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LibreTranslateResponse {
    translated_text: Option<String>,
    error: Option<String>,
}

/// Client for LibreTranslate-compatible APIs
pub struct LibreTranslateClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl LibreTranslateClient {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("folio/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }

    /// `None` when no endpoint is configured
    pub fn from_config(config: &TranslationConfig) -> anyhow::Result<Option<Self>> {
        match config.endpoint.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
            Some(endpoint) => Ok(Some(Self::new(endpoint, config.api_key.clone())?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl TranslationProvider for LibreTranslateClient {
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String, TranslationError> {
        let body = LibreTranslateRequest {
            q: text,
            source,
            target,
            format: "text",
            api_key: self.api_key.as_deref(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| TranslationError::Upstream(format!("request failed: {}", e)))?;

        let status = response.status();
        let parsed: LibreTranslateResponse = response
            .json()
            .await
            .map_err(|e| TranslationError::Upstream(format!("invalid response ({}): {}", status, e)))?;

        if !status.is_success() {
            let message = parsed.error.unwrap_or_else(|| status.to_string());
            return Err(TranslationError::Upstream(message));
        }

        parsed
            .translated_text
            .ok_or_else(|| TranslationError::Upstream("response has no translatedText".to_string()))
    }
}

pub struct TranslationService {
    provider: Option<Arc<dyn TranslationProvider>>,
    cache: Arc<Cache>,
}

impl TranslationService {
    pub fn new(provider: Option<Arc<dyn TranslationProvider>>, cache: Arc<Cache>) -> Self {
        Self { provider, cache }
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    /// Translate `text`, serving repeats from the cache
    pub async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String, TranslationError> {
        let provider = self.provider.as_ref().ok_or(TranslationError::NotConfigured)?;

        if text.trim().is_empty() {
            return Err(TranslationError::ValidationError("Text cannot be empty".to_string()));
        }
        if text.chars().count() > MAX_TEXT_LENGTH {
            return Err(TranslationError::ValidationError(format!(
                "Text exceeds {} characters",
                MAX_TEXT_LENGTH
            )));
        }
        validate_language(source, true)?;
        validate_language(target, false)?;
        if source == target {
            return Ok(text.to_string());
        }

        let key = cache_key(source, target, text);
        if let Some(hit) = self.cache.get::<String>(&key).await.ok().flatten() {
            tracing::debug!("Translation cache hit ({} -> {})", source, target);
            return Ok(hit);
        }

        let translated = provider.translate(text, source, target).await?;
        let _ = self.cache.set(&key, &translated, TRANSLATION_CACHE_TTL).await;
        Ok(translated)
    }

    /// Translate a document of any length.
    ///
    /// Long documents go out in chunks below the per-request limit. The
    /// text between chunks (paragraph breaks, whitespace around a chunk)
    /// is kept as it was.
    pub async fn translate_document(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<String, TranslationError> {
        if text.chars().count() <= MAX_TEXT_LENGTH {
            return self.translate(text, source, target).await;
        }

        let mut out = String::with_capacity(text.len());
        for chunk in split_into_chunks(text, MAX_TEXT_LENGTH) {
            out.push_str(chunk.sep);

            let core = chunk.text.trim();
            if core.is_empty() {
                out.push_str(&chunk.text);
                continue;
            }
            let lead = &chunk.text[..chunk.text.len() - chunk.text.trim_start().len()];
            let tail = &chunk.text[chunk.text.trim_end().len()..];
            out.push_str(lead);
            out.push_str(&self.translate(core, source, target).await?);
            out.push_str(tail);
        }
        Ok(out)
    }
}

fn cache_key(source: &str, target: &str, text: &str) -> String {
    let digest = md5::compute(format!("{}|{}|{}", source, target, text));
    format!("{}{:x}", CACHE_KEY_PREFIX, digest)
}

/// Accepts `en`, `pt-BR`, `zh-Hans`; `auto` only as a source
fn validate_language(code: &str, allow_auto: bool) -> Result<(), TranslationError> {
    if allow_auto && code == "auto" {
        return Ok(());
    }
    let mut parts = code.splitn(2, '-');
    let primary = parts.next().unwrap_or_default();
    let primary_ok = (2..=3).contains(&primary.len()) && primary.chars().all(|c| c.is_ascii_lowercase());
    let region_ok = parts
        .next()
        .map_or(true, |r| (2..=4).contains(&r.len()) && r.chars().all(|c| c.is_ascii_alphanumeric()));

    if primary_ok && region_ok {
        Ok(())
    } else {
        Err(TranslationError::ValidationError(format!(
            "Invalid language code: {}",
            code
        )))
    }
}

/// A piece of a document and the separator that preceded it
#[derive(Debug, PartialEq)]
struct Chunk {
    sep: &'static str,
    text: String,
}

/// Split on blank lines, packing paragraphs into chunks of at most `max`
/// characters. A paragraph longer than `max` is cut at whitespace where
/// possible. Concatenating every `sep` and `text` gives back `text`.
fn split_into_chunks(text: &str, max: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut current: Option<Chunk> = None;

    for (i, para) in text.split(PARAGRAPH_BREAK).enumerate() {
        let sep = if i == 0 { "" } else { PARAGRAPH_BREAK };
        let para_len = para.chars().count();

        if para_len > max {
            chunks.extend(current.take());
            for (j, piece) in split_long_paragraph(para, max).into_iter().enumerate() {
                chunks.push(Chunk {
                    sep: if j == 0 { sep } else { "" },
                    text: piece,
                });
            }
            continue;
        }

        match current.as_mut() {
            Some(chunk) if chunk.text.chars().count() + sep.len() + para_len <= max => {
                chunk.text.push_str(sep);
                chunk.text.push_str(para);
            }
            _ => {
                chunks.extend(current.take());
                current = Some(Chunk {
                    sep,
                    text: para.to_string(),
                });
            }
        }
    }
    chunks.extend(current);
    chunks
}

/// Cut after the last whitespace inside each `max`-char window, or at
/// `max` when the window has none
fn split_long_paragraph(para: &str, max: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = para;

    while rest.chars().count() > max {
        let limit = rest.char_indices().nth(max).map_or(rest.len(), |(i, _)| i);
        let cut = rest[..limit]
            .char_indices()
            .filter(|(_, c)| c.is_whitespace())
            .last()
            .map_or(limit, |(i, c)| i + c.len_utf8());
        pieces.push(rest[..cut].to_string());
        rest = &rest[cut..];
    }
    if !rest.is_empty() {
        pieces.push(rest.to_string());
    }
    pieces
}
