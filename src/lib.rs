//! Folio - portfolio and blog CMS
//!
//! Blog posts with optional auto-translation, portfolio projects, a
//! TMDB-backed watchlist and a contact form, served as a JSON API plus
//! server-rendered pages.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod site;
