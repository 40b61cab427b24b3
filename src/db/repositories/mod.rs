//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the queries for one entity on both drivers.

pub mod category;
pub mod contact_message;
pub mod login_activity;
pub mod media;
pub mod post;
pub mod project;
pub mod session;
pub mod settings;
pub mod user;
pub mod watchlist;

pub use category::{CategoryRepository, SqlxCategoryRepository};
pub use contact_message::{ContactMessageRepository, SqlxContactMessageRepository};
pub use login_activity::{LoginActivityRepository, SqlxLoginActivityRepository};
pub use media::{MediaRepository, SqlxMediaRepository};
pub use post::{NewPost, PostRepository, SqlxPostRepository};
pub use project::{NewProject, ProjectRepository, SqlxProjectRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use settings::{Setting, SettingsRepository, SqlxSettingsRepository};
pub use user::{SqlxUserRepository, UserRepository};
pub use watchlist::{SqlxWatchlistRepository, WatchlistRepository};
