//! Folio - portfolio and blog CMS

use anyhow::Result;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use folio::{api, cache::create_cache, config::Config, db};

const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);
const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);
const ACTIVITY_PRUNE_INTERVAL: Duration = Duration::from_secs(24 * 3600);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "folio=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Folio v{}", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::var("FOLIO_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.yml"));
    let config = Config::load_with_env(&config_path)?;
    tracing::info!(
        "Configuration loaded from {:?} ({:?})",
        config_path,
        config.server.environment
    );

    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    let applied = db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed ({} applied)", applied);

    let cache = create_cache(&config.cache).await?;
    tracing::info!("Cache initialized: {:?}", config.cache.driver);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let retention_days = config.security.login_activity_retention_days;
    let state = api::build_state(config, pool, cache)?;

    #[cfg(feature = "demo")]
    {
        use folio::services::SetupInput;

        if state.user_service.needs_setup().await? {
            tracing::info!("Demo mode: creating admin user (demo/demo12345)");
            state
                .user_service
                .setup_admin(SetupInput {
                    username: "demo".to_string(),
                    email: "demo@folio.local".to_string(),
                    password: "demo12345".to_string(),
                })
                .await?;
        }
    }

    {
        let limiter = state.login_limiter.clone();
        let contact = state.contact_service.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                let removed = limiter.cleanup().await + contact.cleanup().await;
                if removed > 0 {
                    tracing::debug!("Removed {} expired rate-limit windows", removed);
                }
            }
        });
    }

    {
        let users = state.user_service.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SESSION_CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                match users.cleanup_expired_sessions().await {
                    Ok(0) => {}
                    Ok(n) => tracing::info!("Removed {} expired sessions", n),
                    Err(e) => tracing::warn!("Session cleanup failed: {}", e),
                }
            }
        });
    }

    {
        let users = state.user_service.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(ACTIVITY_PRUNE_INTERVAL);
            loop {
                interval.tick().await;
                match users.prune_login_activity(retention_days).await {
                    Ok(0) => {}
                    Ok(n) => tracing::info!("Pruned {} login activity records", n),
                    Err(e) => tracing::warn!("Login activity pruning failed: {}", e),
                }
            }
        });
    }

    let app = api::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
