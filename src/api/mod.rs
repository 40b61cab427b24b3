//! API layer - HTTP handlers and routing
//!
//! JSON endpoints live under `/api/v1`:
//! - public reads (posts, projects, categories, site, watchlist) and the
//!   contact form
//! - session auth (`/auth`)
//! - admin management (`/admin/...`), behind `require_auth` + `require_admin`
//!
//! `build_router` adds the server-rendered site pages, `/uploads` and the
//! tower-http layers on top.

pub mod admin;
pub mod auth;
pub mod categories;
pub mod common;
pub mod contact;
pub mod media;
pub mod middleware;
pub mod posts;
pub mod projects;
pub mod responses;
pub mod site;
pub mod watchlist;

use anyhow::Context;
use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::cache::Cache;
use crate::config::Config;
use crate::db::repositories::{
    SqlxCategoryRepository, SqlxContactMessageRepository, SqlxLoginActivityRepository,
    SqlxMediaRepository, SqlxPostRepository, SqlxProjectRepository, SqlxSessionRepository,
    SqlxSettingsRepository, SqlxUserRepository, SqlxWatchlistRepository,
};
use crate::db::DynDatabasePool;
use crate::services::{
    CaptchaCheck, CaptchaVerifier, CategoryService, ContactService, EmailService,
    LibreTranslateClient, LoginRateLimiter, MailSender, MarkdownRenderer, MediaService,
    MetadataProvider, PostService, ProjectService, SettingsService, TmdbClient,
    TranslationProvider, TranslationService, UserService, WatchlistService,
};
use crate::site::SiteRenderer;

pub use middleware::{ApiError, AppState, AuthenticatedUser, ClientIp};

/// Wire repositories, services and external clients from configuration
pub fn build_state(config: Config, pool: DynDatabasePool, cache: Arc<Cache>) -> anyhow::Result<AppState> {
    let renderer = MarkdownRenderer::new();

    let settings_service = Arc::new(SettingsService::new(
        SqlxSettingsRepository::boxed(pool.clone()),
        cache.clone(),
        config.features.clone(),
    ));

    let translation_provider = LibreTranslateClient::from_config(&config.integrations.translation)?
        .map(|client| Arc::new(client) as Arc<dyn TranslationProvider>);
    if translation_provider.is_none() {
        tracing::info!("Translation endpoint not configured, auto-translation disabled");
    }
    let translation_service = Arc::new(TranslationService::new(translation_provider, cache.clone()));

    let post_service = Arc::new(
        PostService::new(
            SqlxPostRepository::boxed(pool.clone()),
            SqlxCategoryRepository::boxed(pool.clone()),
            cache.clone(),
            renderer.clone(),
        )
        .with_translator(translation_service.clone()),
    );
    let project_service = Arc::new(ProjectService::new(
        SqlxProjectRepository::boxed(pool.clone()),
        cache.clone(),
        renderer,
    ));
    let category_service = Arc::new(CategoryService::new(
        SqlxCategoryRepository::boxed(pool.clone()),
        cache.clone(),
    ));
    let media_service = Arc::new(MediaService::new(
        SqlxMediaRepository::boxed(pool.clone()),
        config.upload.clone(),
    ));

    let tmdb = TmdbClient::new(&config.integrations.tmdb)?;
    let metadata_provider = if tmdb.is_configured() {
        Some(Arc::new(tmdb) as Arc<dyn MetadataProvider>)
    } else {
        tracing::info!("TMDB API key not configured, watchlist search disabled");
        None
    };
    let watchlist_service = Arc::new(WatchlistService::new(
        SqlxWatchlistRepository::boxed(pool.clone()),
        metadata_provider,
        cache.clone(),
    ));

    let captcha = CaptchaVerifier::new(&config.integrations.captcha, config.server.environment)?;
    if !captcha.is_configured() {
        tracing::warn!("CAPTCHA secret not configured");
    }
    let mailer: Arc<dyn MailSender> = Arc::new(EmailService::new(config.integrations.smtp.clone()));
    let contact_service = Arc::new(ContactService::new(
        SqlxContactMessageRepository::boxed(pool.clone()),
        settings_service.clone(),
        Arc::new(captcha) as Arc<dyn CaptchaCheck>,
        mailer,
        config.security.contact_max_per_hour,
    ));

    let login_limiter = Arc::new(LoginRateLimiter::new(
        config.security.login_max_attempts,
        Duration::from_secs(config.security.login_window_seconds),
    ));
    let user_service = Arc::new(UserService::new(
        SqlxUserRepository::boxed(pool.clone()),
        SqlxSessionRepository::boxed(pool.clone()),
        SqlxLoginActivityRepository::boxed(pool.clone()),
        login_limiter.clone(),
        config.security.session_ttl_hours,
    ));

    let site_renderer = Arc::new(
        SiteRenderer::new(&config.site.templates_path).context("Failed to load site templates")?,
    );

    Ok(AppState {
        config: Arc::new(config),
        user_service,
        post_service,
        project_service,
        category_service,
        settings_service,
        media_service,
        watchlist_service,
        translation_service,
        contact_service,
        login_limiter,
        site_renderer,
    })
}

/// Build the `/api/v1` router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    let upload = &state.config.upload;
    let max_upload = upload.max_image_size.max(upload.max_video_size);

    let admin_routes = Router::new()
        .nest("/admin", admin::router())
        .nest("/admin/posts", posts::admin_router())
        .nest("/admin/projects", projects::admin_router())
        .nest("/admin/categories", categories::admin_router())
        .nest("/admin/media", media::admin_router(max_upload))
        .nest("/admin/watchlist", watchlist::admin_router())
        .nest("/admin/tmdb", watchlist::search_router())
        .nest("/admin/messages", contact::admin_router())
        .route_layer(axum_middleware::from_fn(middleware::require_admin))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_auth,
        ));

    Router::new()
        .nest("/posts", posts::public_router())
        .nest("/projects", projects::public_router())
        .nest("/categories", categories::public_router())
        .nest("/site", site::router())
        .nest("/watchlist", watchlist::public_router())
        .nest("/contact", contact::public_router())
        .nest("/auth", auth::public_router())
        .merge(admin_routes)
        .merge(protected_routes)
        .fallback(api_not_found)
}

async fn api_not_found() -> ApiError {
    ApiError::not_found("No such endpoint")
}

/// `*` allows any origin without credentials, an empty value disables CORS
fn cors_layer(origin: &str) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE]);

    match origin.trim() {
        "" => CorsLayer::new(),
        "*" => base.allow_origin(AllowOrigin::any()),
        origin => match origin.parse::<HeaderValue>() {
            Ok(value) => base.allow_origin(value).allow_credentials(true),
            Err(e) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}: {}", origin, e);
                CorsLayer::new()
            }
        },
    }
}

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.cors_origin);
    let uploads = ServeDir::new(state.media_service.upload_dir());

    Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .merge(crate::site::pages::router())
        .nest_service("/uploads", uploads)
        .fallback(crate::site::pages::not_found)
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
