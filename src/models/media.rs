//! Uploaded media model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Uploaded image or video
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Media {
    pub id: i64,
    /// Stored file name (uuid + extension)
    pub filename: String,
    /// Name of the file on the uploader's machine
    pub original_name: String,
    /// Public URL, e.g. `/uploads/<filename>`
    pub url: String,
    pub content_type: String,
    pub kind: MediaKind,
    pub size: i64,
    pub uploaded_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "image" => Some(MediaKind::Image),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateMediaInput {
    pub filename: String,
    pub original_name: String,
    pub url: String,
    pub content_type: String,
    pub kind: MediaKind,
    pub size: i64,
    pub uploaded_by: Option<i64>,
}
