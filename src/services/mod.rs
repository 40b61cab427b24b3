//! Services layer - Business logic
//!
//! Services validate input, apply business rules, coordinate repositories
//! with the cache and talk to external APIs (TMDB, translation, CAPTCHA,
//! SMTP) through small provider traits.

pub mod captcha;
pub mod category;
pub mod contact;
pub mod email;
pub mod markdown;
pub mod media;
pub mod password;
pub mod post;
pub mod project;
pub mod rate_limiter;
pub mod settings;
pub mod slug;
pub mod translation;
pub mod user;
pub mod watchlist;

pub use captcha::{CaptchaCheck, CaptchaOutcome, CaptchaVerifier};
pub use category::{CategoryService, CategoryServiceError};
pub use contact::{ContactService, ContactServiceError, ContactSubmission, SubmitOutcome};
pub use email::{EmailService, MailSender, OutgoingMail};
pub use markdown::MarkdownRenderer;
pub use media::{MediaService, MediaServiceError, UploadedFile};
pub use password::{hash_password, verify_password};
pub use post::{PostService, PostServiceError};
pub use project::{ProjectService, ProjectServiceError};
pub use rate_limiter::{FixedWindowLimiter, LoginRateLimiter};
pub use settings::{SettingsService, SettingsServiceError, SiteSettings};
pub use slug::generate_slug;
pub use translation::{LibreTranslateClient, TranslationError, TranslationProvider, TranslationService};
pub use user::{ClientInfo, LoginInput, SetupInput, UserService, UserServiceError};
pub use watchlist::{
    AddWatchlistItem, MetadataProvider, TmdbClient, WatchlistService, WatchlistServiceError,
};
