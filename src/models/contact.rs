//! Contact form messages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message left through the public contact form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactMessage {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub subject: Option<String>,
    pub message: String,
    pub ip_address: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// A validated message about to be stored
#[derive(Debug, Clone)]
pub struct CreateContactMessage {
    pub name: String,
    pub email: String,
    pub subject: Option<String>,
    pub message: String,
    pub ip_address: Option<String>,
}
