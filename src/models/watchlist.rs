//! Watchlist model
//!
//! Movies and shows tracked on the public watchlist page. Titles, posters
//! and release data are copied from TMDB when an item is added.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistItem {
    pub id: i64,
    /// TMDB identifier, unique together with `media_type`
    pub tmdb_id: i64,
    pub media_type: MediaType,
    pub title: String,
    pub overview: Option<String>,
    /// TMDB poster path (relative to the image base URL)
    pub poster_path: Option<String>,
    pub release_date: Option<String>,
    pub vote_average: Option<f64>,
    pub status: WatchStatus,
    /// Personal rating, 1..=10
    pub rating: Option<i32>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Tv,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Tv => "tv",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "movie" => Some(MediaType::Movie),
            "tv" => Some(MediaType::Tv),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WatchStatus {
    #[default]
    Planned,
    Watching,
    Completed,
    Dropped,
}

impl WatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchStatus::Planned => "planned",
            WatchStatus::Watching => "watching",
            WatchStatus::Completed => "completed",
            WatchStatus::Dropped => "dropped",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "planned" => Some(WatchStatus::Planned),
            "watching" => Some(WatchStatus::Watching),
            "completed" => Some(WatchStatus::Completed),
            "dropped" => Some(WatchStatus::Dropped),
            _ => None,
        }
    }
}

/// Row data for a new watchlist item, usually built from TMDB details
#[derive(Debug, Clone)]
pub struct CreateWatchlistItemInput {
    pub tmdb_id: i64,
    pub media_type: MediaType,
    pub title: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub release_date: Option<String>,
    pub vote_average: Option<f64>,
    pub status: WatchStatus,
    pub rating: Option<i32>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateWatchlistItemInput {
    pub status: Option<WatchStatus>,
    /// `Some(None)` clears the rating
    pub rating: Option<Option<i32>>,
    pub notes: Option<String>,
}

impl UpdateWatchlistItemInput {
    pub fn has_changes(&self) -> bool {
        self.status.is_some() || self.rating.is_some() || self.notes.is_some()
    }
}
