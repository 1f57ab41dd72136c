//! BookLend Server
//!
//! Tracks books lent out to friends and emails owners when a loan is about
//! to come due or has gone overdue. Exposes a REST JSON API for lending,
//! returns and per-user notification settings.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
    pub repository: repository::Repository,
}
