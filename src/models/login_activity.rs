//! Login activity log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recorded login attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginActivity {
    pub id: i64,
    pub username: String,
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub success: bool,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A login attempt about to be recorded
#[derive(Debug, Clone)]
pub struct NewLoginActivity {
    pub username: String,
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub success: bool,
    pub failure_reason: Option<String>,
}

impl NewLoginActivity {
    pub fn success(username: impl Into<String>, ip_address: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ip_address: ip_address.into(),
            user_agent: None,
            success: true,
            failure_reason: None,
        }
    }

    pub fn failure(
        username: impl Into<String>,
        ip_address: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            ip_address: ip_address.into(),
            user_agent: None,
            success: false,
            failure_reason: Some(reason.into()),
        }
    }

    pub fn with_user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }
}
