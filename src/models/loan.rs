//! Loan (lend event) model and related types

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use super::book::BookShort;
use crate::error::{AppError, AppResult};

/// Loan model from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Loan {
    pub id: i32,
    pub book_id: i32,
    #[sqlx(rename = "user_id")]
    pub owner_id: i32,
    pub borrower_name: String,
    pub lent_at: DateTime<Utc>,
    pub due_at: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
    pub last_reminder_sent_at: Option<DateTime<Utc>>,
}

impl Loan {
    /// A loan stays active until it is returned
    pub fn is_active(&self) -> bool {
        self.returned_at.is_none()
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_active()
            && self
                .due_at
                .map(|due| due.date_naive() < now.date_naive())
                .unwrap_or(false)
    }
}

/// Loan with its book for display
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoanDetails {
    #[serde(flatten)]
    pub loan: Loan,
    pub book: BookShort,
    pub is_overdue: bool,
}

/// Create loan request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateLoan {
    pub book_id: i32,
    /// Name of the person the book is lent to
    #[validate(length(min = 1, message = "Borrower name is required"))]
    pub borrower_name: String,
    /// Due date (YYYY-MM-DD); empty means no due date
    pub due_date: Option<String>,
}

impl CreateLoan {
    /// Due dates are stored at midnight UTC of the given day
    pub fn due_at(&self) -> AppResult<Option<DateTime<Utc>>> {
        let Some(raw) = self.due_date.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(None);
        };
        let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|_| AppError::BadRequest("Invalid due date format".to_string()))?;
        Ok(Some(date.and_time(NaiveTime::MIN).and_utc()))
    }
}

/// Active loan joined with what a reminder needs to be rendered and addressed
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ReminderCandidate {
    #[sqlx(flatten)]
    pub loan: Loan,
    pub owner_email: String,
    pub book_title: String,
    pub book_author: Option<String>,
}
