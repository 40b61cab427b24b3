//! Site rendering errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SiteError {
    /// Template could not be parsed or rendered
    #[error("Template error: {0}")]
    TemplateError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
