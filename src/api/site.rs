//! Public site information API
//!
//! GET /api/v1/site returns the site settings, with the feature toggles
//! already gated by configuration, plus the public keys a frontend needs.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::api::middleware::{ApiError, AppState};
use crate::services::SiteSettings;

#[derive(Debug, Serialize)]
pub struct SiteInfoResponse {
    pub version: &'static str,
    #[serde(flatten)]
    pub settings: SiteSettings,
    /// Public CAPTCHA key for the contact form widget
    pub captcha_site_key: Option<String>,
    /// Prefix for watchlist poster paths
    pub tmdb_image_base_url: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_site_info))
}

/// GET /api/v1/site
async fn get_site_info(State(state): State<AppState>) -> Result<Json<SiteInfoResponse>, ApiError> {
    let settings = state.settings_service.get_site_settings().await?;
    let integrations = &state.config.integrations;

    Ok(Json(SiteInfoResponse {
        version: env!("CARGO_PKG_VERSION"),
        settings,
        captcha_site_key: integrations.captcha.site_key.clone(),
        tmdb_image_base_url: integrations.tmdb.image_base_url.clone(),
    }))
}
