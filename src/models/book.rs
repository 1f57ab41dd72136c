//! Book model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

/// Book owned by a user
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i32,
    #[serde(skip)]
    pub user_id: i32,
    pub title: String,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub genre: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Short book representation embedded in loan listings
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BookShort {
    pub id: i32,
    #[serde(skip)]
    pub user_id: i32,
    pub title: String,
    pub author: Option<String>,
    pub isbn: Option<String>,
}

/// Create book request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 1, max = 500, message = "Title is required"))]
    pub title: String,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub genre: Option<String>,
    #[serde(default)]
    pub read: bool,
}

/// Update book request; absent fields are left unchanged
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateBook {
    #[validate(length(min = 1, max = 500, message = "Title must not be empty"))]
    pub title: Option<String>,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub genre: Option<String>,
    pub read: Option<bool>,
}

/// Trim a free-text field, treating blank input as absent
pub fn normalize(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}
