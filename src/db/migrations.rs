//! Database migrations
//!
//! Migrations are embedded in the binary as SQL strings, one variant per
//! backend, and tracked in the `_migrations` table.
//!
//! ```ignore
//! use folio::db::{create_pool, migrations};
//!
//! let pool = create_pool(&config).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};

use super::{Backend, DynDatabasePool};
use crate::config::DatabaseDriver;

/// A database migration with SQL for both SQLite and MySQL
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (unique, ascending)
    pub version: i32,
    pub name: &'static str,
    pub up_sqlite: &'static str,
    pub up_mysql: &'static str,
}

/// Migration record stored in the database
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_users",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username VARCHAR(50) NOT NULL UNIQUE,
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                role VARCHAR(20) NOT NULL DEFAULT 'editor',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                username VARCHAR(50) NOT NULL UNIQUE,
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                role VARCHAR(20) NOT NULL DEFAULT 'editor',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
    },
    Migration {
        version: 2,
        name: "create_sessions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                token VARCHAR(128) NOT NULL UNIQUE,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                user_id BIGINT NOT NULL,
                token VARCHAR(128) NOT NULL UNIQUE,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_sessions_user_id ON sessions(user_id);
            CREATE INDEX idx_sessions_expires_at ON sessions(expires_at);
        "#,
    },
    Migration {
        version: 3,
        name: "create_categories",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(100) NOT NULL UNIQUE,
                slug VARCHAR(100) NOT NULL UNIQUE,
                description TEXT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS categories (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                name VARCHAR(100) NOT NULL UNIQUE,
                slug VARCHAR(100) NOT NULL UNIQUE,
                description TEXT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
    },
    Migration {
        version: 4,
        name: "create_posts",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slug VARCHAR(255) NOT NULL UNIQUE,
                title VARCHAR(255) NOT NULL,
                excerpt TEXT,
                content TEXT NOT NULL,
                content_html TEXT NOT NULL,
                cover_image VARCHAR(512),
                category_id INTEGER,
                tags TEXT NOT NULL DEFAULT '',
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                view_count INTEGER NOT NULL DEFAULT 0,
                author_id INTEGER NOT NULL,
                translated_title VARCHAR(255),
                translated_excerpt TEXT,
                translated_content TEXT,
                translated_content_html TEXT,
                published_at TIMESTAMP,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE SET NULL,
                FOREIGN KEY (author_id) REFERENCES users(id)
            );
            CREATE INDEX IF NOT EXISTS idx_posts_status ON posts(status);
            CREATE INDEX IF NOT EXISTS idx_posts_category_id ON posts(category_id);
            CREATE INDEX IF NOT EXISTS idx_posts_published_at ON posts(published_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS posts (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                slug VARCHAR(255) NOT NULL UNIQUE,
                title VARCHAR(255) NOT NULL,
                excerpt TEXT,
                content LONGTEXT NOT NULL,
                content_html LONGTEXT NOT NULL,
                cover_image VARCHAR(512),
                category_id BIGINT NULL,
                tags VARCHAR(1024) NOT NULL DEFAULT '',
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                view_count BIGINT NOT NULL DEFAULT 0,
                author_id BIGINT NOT NULL,
                translated_title VARCHAR(255),
                translated_excerpt TEXT,
                translated_content LONGTEXT,
                translated_content_html LONGTEXT,
                published_at TIMESTAMP NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE SET NULL,
                FOREIGN KEY (author_id) REFERENCES users(id)
            );
            CREATE INDEX idx_posts_status ON posts(status);
            CREATE INDEX idx_posts_category_id ON posts(category_id);
            CREATE INDEX idx_posts_published_at ON posts(published_at);
        "#,
    },
    Migration {
        version: 5,
        name: "create_projects",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS projects (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slug VARCHAR(255) NOT NULL UNIQUE,
                title VARCHAR(255) NOT NULL,
                summary TEXT,
                content TEXT NOT NULL,
                content_html TEXT NOT NULL,
                cover_image VARCHAR(512),
                technologies TEXT NOT NULL DEFAULT '',
                github_url VARCHAR(512),
                live_url VARCHAR(512),
                featured INTEGER NOT NULL DEFAULT 0,
                sort_order INTEGER NOT NULL DEFAULT 0,
                published INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_projects_published ON projects(published);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS projects (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                slug VARCHAR(255) NOT NULL UNIQUE,
                title VARCHAR(255) NOT NULL,
                summary TEXT,
                content LONGTEXT NOT NULL,
                content_html LONGTEXT NOT NULL,
                cover_image VARCHAR(512),
                technologies VARCHAR(1024) NOT NULL DEFAULT '',
                github_url VARCHAR(512),
                live_url VARCHAR(512),
                featured BOOLEAN NOT NULL DEFAULT FALSE,
                sort_order BIGINT NOT NULL DEFAULT 0,
                published BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX idx_projects_published ON projects(published);
        "#,
    },
    Migration {
        version: 6,
        name: "create_settings",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS settings (
                key VARCHAR(100) PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            INSERT OR IGNORE INTO settings (key, value) VALUES ('site_name', 'Folio');
            INSERT OR IGNORE INTO settings (key, value) VALUES ('site_description', 'Writing and projects');
            INSERT OR IGNORE INTO settings (key, value) VALUES ('hero_title', 'Hi, welcome to my corner of the web');
            INSERT OR IGNORE INTO settings (key, value) VALUES ('hero_subtitle', '');
            INSERT OR IGNORE INTO settings (key, value) VALUES ('about', '');
            INSERT OR IGNORE INTO settings (key, value) VALUES ('contact_email', '');
            INSERT OR IGNORE INTO settings (key, value) VALUES ('primary_language', 'en');
            INSERT OR IGNORE INTO settings (key, value) VALUES ('secondary_language', 'de');
            INSERT OR IGNORE INTO settings (key, value) VALUES ('posts_per_page', '10');
            INSERT OR IGNORE INTO settings (key, value) VALUES ('contact_enabled', 'true');
            INSERT OR IGNORE INTO settings (key, value) VALUES ('watchlist_enabled', 'true');
            INSERT OR IGNORE INTO settings (key, value) VALUES ('translation_enabled', 'true');
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS settings (
                `key` VARCHAR(100) PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            INSERT IGNORE INTO settings (`key`, value) VALUES ('site_name', 'Folio');
            INSERT IGNORE INTO settings (`key`, value) VALUES ('site_description', 'Writing and projects');
            INSERT IGNORE INTO settings (`key`, value) VALUES ('hero_title', 'Hi, welcome to my corner of the web');
            INSERT IGNORE INTO settings (`key`, value) VALUES ('hero_subtitle', '');
            INSERT IGNORE INTO settings (`key`, value) VALUES ('about', '');
            INSERT IGNORE INTO settings (`key`, value) VALUES ('contact_email', '');
            INSERT IGNORE INTO settings (`key`, value) VALUES ('primary_language', 'en');
            INSERT IGNORE INTO settings (`key`, value) VALUES ('secondary_language', 'de');
            INSERT IGNORE INTO settings (`key`, value) VALUES ('posts_per_page', '10');
            INSERT IGNORE INTO settings (`key`, value) VALUES ('contact_enabled', 'true');
            INSERT IGNORE INTO settings (`key`, value) VALUES ('watchlist_enabled', 'true');
            INSERT IGNORE INTO settings (`key`, value) VALUES ('translation_enabled', 'true');
        "#,
    },
    Migration {
        version: 7,
        name: "create_media",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS media (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                filename VARCHAR(255) NOT NULL UNIQUE,
                original_name VARCHAR(255) NOT NULL,
                url VARCHAR(512) NOT NULL,
                content_type VARCHAR(100) NOT NULL,
                kind VARCHAR(10) NOT NULL,
                size INTEGER NOT NULL,
                uploaded_by INTEGER,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (uploaded_by) REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_media_kind ON media(kind);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS media (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                filename VARCHAR(255) NOT NULL UNIQUE,
                original_name VARCHAR(255) NOT NULL,
                url VARCHAR(512) NOT NULL,
                content_type VARCHAR(100) NOT NULL,
                kind VARCHAR(10) NOT NULL,
                size BIGINT NOT NULL,
                uploaded_by BIGINT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (uploaded_by) REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE INDEX idx_media_kind ON media(kind);
        "#,
    },
    Migration {
        version: 8,
        name: "create_watchlist",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS watchlist_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tmdb_id INTEGER NOT NULL,
                media_type VARCHAR(10) NOT NULL,
                title VARCHAR(255) NOT NULL,
                overview TEXT,
                poster_path VARCHAR(255),
                release_date VARCHAR(20),
                vote_average REAL,
                status VARCHAR(20) NOT NULL DEFAULT 'planned',
                rating INTEGER,
                notes TEXT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (tmdb_id, media_type)
            );
            CREATE INDEX IF NOT EXISTS idx_watchlist_status ON watchlist_items(status);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS watchlist_items (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                tmdb_id BIGINT NOT NULL,
                media_type VARCHAR(10) NOT NULL,
                title VARCHAR(255) NOT NULL,
                overview TEXT,
                poster_path VARCHAR(255),
                release_date VARCHAR(20),
                vote_average DOUBLE,
                status VARCHAR(20) NOT NULL DEFAULT 'planned',
                rating INT,
                notes TEXT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE KEY uq_watchlist_tmdb (tmdb_id, media_type)
            );
            CREATE INDEX idx_watchlist_status ON watchlist_items(status);
        "#,
    },
    Migration {
        version: 9,
        name: "create_login_activity",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS login_activity (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username VARCHAR(100) NOT NULL,
                ip_address VARCHAR(64) NOT NULL,
                user_agent VARCHAR(512),
                success INTEGER NOT NULL,
                failure_reason VARCHAR(255),
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_login_activity_created_at ON login_activity(created_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS login_activity (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                username VARCHAR(100) NOT NULL,
                ip_address VARCHAR(64) NOT NULL,
                user_agent VARCHAR(512),
                success BOOLEAN NOT NULL,
                failure_reason VARCHAR(255),
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX idx_login_activity_created_at ON login_activity(created_at);
        "#,
    },
    Migration {
        version: 10,
        name: "create_contact_messages",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS contact_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(100) NOT NULL,
                email VARCHAR(255) NOT NULL,
                subject VARCHAR(200),
                message TEXT NOT NULL,
                ip_address VARCHAR(64),
                is_read INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS contact_messages (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                name VARCHAR(100) NOT NULL,
                email VARCHAR(255) NOT NULL,
                subject VARCHAR(200),
                message TEXT NOT NULL,
                ip_address VARCHAR(64),
                is_read BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
    },
];

/// Run all pending migrations, returning how many were applied
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool).await?;
    let applied_versions: Vec<i64> = applied.iter().map(|m| m.version).collect();

    let mut count = 0;

    for migration in MIGRATIONS {
        if !applied_versions.contains(&(migration.version as i64)) {
            tracing::info!("Applying migration {}: {}", migration.version, migration.name);
            apply_migration(pool, migration)
                .await
                .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
            count += 1;
        }
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
        DatabaseDriver::Mysql => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INT PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
    };

    pool.execute(sql).await?;
    Ok(())
}

async fn get_applied_migrations(pool: &DynDatabasePool) -> Result<Vec<MigrationRecord>> {
    match pool.backend() {
        Backend::Sqlite(p) => get_applied_migrations_sqlite(p).await,
        Backend::Mysql(p) => get_applied_migrations_mysql(p).await,
    }
}

async fn get_applied_migrations_sqlite(pool: &SqlitePool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await?;

    rows.iter()
        .map(|row| {
            Ok(MigrationRecord {
                version: row.try_get("version")?,
                name: row.try_get("name")?,
                applied_at: row.try_get("applied_at")?,
            })
        })
        .collect()
}

async fn get_applied_migrations_mysql(pool: &MySqlPool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await?;

    rows.iter()
        .map(|row| {
            let version: i32 = row.try_get("version")?;
            Ok(MigrationRecord {
                version: version as i64,
                name: row.try_get("name")?,
                applied_at: row.try_get("applied_at")?,
            })
        })
        .collect()
}

async fn apply_migration(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    match pool.backend() {
        Backend::Sqlite(p) => apply_migration_sqlite(p, migration).await,
        Backend::Mysql(p) => apply_migration_mysql(p, migration).await,
    }
}

async fn apply_migration_sqlite(pool: &SqlitePool, migration: &Migration) -> Result<()> {
    let mut tx = pool.begin().await?;
    for statement in split_sql_statements(migration.up_sqlite) {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(())
}

// MySQL DDL commits implicitly, so there is nothing to gain from a transaction here.
async fn apply_migration_mysql(pool: &MySqlPool, migration: &Migration) -> Result<()> {
    for statement in split_sql_statements(migration.up_mysql) {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(pool)
        .await?;

    Ok(())
}

fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split SQL into individual statements, skipping comment-only fragments
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty() && !is_comment_only(s))
        .collect()
}

fn is_comment_only(s: &str) -> bool {
    s.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

/// Whether every migration has been applied
pub async fn is_up_to_date(pool: &DynDatabasePool) -> Result<bool> {
    Ok(pending_count(pool).await? == 0)
}

pub async fn pending_count(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;
    let applied = get_applied_migrations(pool).await?;
    Ok(MIGRATIONS.len().saturating_sub(applied.len()))
}
