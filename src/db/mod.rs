//! Database layer
//!
//! SQLite (default, single-file deployment) and MySQL are both supported.
//! The driver is chosen from configuration and hidden behind the
//! `DatabasePool` trait; repositories match on `DatabasePool::backend()`
//! to run driver-specific SQL.

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, Backend, DatabasePool, DynDatabasePool, MysqlDatabase,
    SqliteDatabase,
};

/// The database error behind `err` if a unique constraint rejected the
/// write. Repositories wrap sqlx errors in context, so the whole chain is
/// searched.
pub fn unique_violation(err: &anyhow::Error) -> Option<&(dyn sqlx::error::DatabaseError + 'static)> {
    err.chain().find_map(|cause| match cause.downcast_ref::<sqlx::Error>() {
        Some(sqlx::Error::Database(db)) if db.is_unique_violation() => Some(&**db),
        _ => None,
    })
}

pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    unique_violation(err).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::models::UserRole;
    use anyhow::Context;

    #[tokio::test]
    async fn test_unique_violation_found_through_context() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let users = SqlxUserRepository::new(pool);
        users
            .create("admin", "admin@example.com", "hash", UserRole::Admin)
            .await
            .unwrap();

        let err = users
            .create("admin", "other@example.com", "hash", UserRole::Editor)
            .await
            .context("Failed to create user")
            .unwrap_err();
        assert!(is_unique_violation(&err));
        assert!(unique_violation(&err).unwrap().message().contains("username"));
    }

    #[test]
    fn test_other_errors_are_not_unique_violations() {
        assert!(!is_unique_violation(&anyhow::anyhow!("UNIQUE constraint failed")));
        let wrapped = anyhow::Error::new(sqlx::Error::RowNotFound).context("lookup");
        assert!(!is_unique_violation(&wrapped));
    }
}
