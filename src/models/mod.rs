//! Data models
//!
//! Database entities (Post, Project, Category, Media, WatchlistItem, User,
//! Session, LoginActivity, ContactMessage), the inputs used to create and
//! update them, and pagination types shared by list queries.

mod contact;
mod category;
mod login_activity;
mod media;
mod pagination;
mod post;
mod project;
mod session;
mod tokens;
mod user;
mod watchlist;

pub use category::{Category, CategoryWithCount, CreateCategoryInput, UpdateCategoryInput};
pub use contact::{ContactMessage, CreateContactMessage};
pub use login_activity::{LoginActivity, NewLoginActivity};
pub use media::{CreateMediaInput, Media, MediaKind};
pub use pagination::{ListParams, PagedResult};
pub use post::{CreatePostInput, Post, PostFilter, PostStatus, PostTranslation, UpdatePostInput};
pub use project::{CreateProjectInput, Project, UpdateProjectInput};
pub use session::Session;
pub use tokens::{normalize_tokens, tokens_from_column, tokens_to_column};
pub use user::{User, UserRole};
pub use watchlist::{
    CreateWatchlistItemInput, MediaType, UpdateWatchlistItemInput, WatchStatus, WatchlistItem,
};
