//! Reminder payloads and sweep reporting

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::loan::ReminderCandidate;

/// Which single-loan template to render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderKind {
    Upcoming,
    Overdue,
}

/// Everything a single-loan reminder shows
#[derive(Debug, Clone, PartialEq)]
pub struct LoanNotice {
    pub loan_id: i32,
    pub book_title: String,
    pub book_author: Option<String>,
    pub borrower_name: String,
    pub due_at: DateTime<Utc>,
    /// Days until due for upcoming reminders, days overdue for overdue ones
    pub days: i64,
}

/// One line of an overdue digest
#[derive(Debug, Clone, PartialEq)]
pub struct OverdueItem {
    pub loan_id: i32,
    pub book_title: String,
    pub book_author: Option<String>,
    pub borrower_name: String,
    pub due_at: DateTime<Utc>,
    pub days_overdue: i64,
}

/// Whole days elapsed between `due_at` and `now`, truncated
pub fn days_overdue(due_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - due_at).num_days()
}

/// Whole days remaining until `due_at`, counted on calendar dates
pub fn days_until_due(due_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (due_at.date_naive() - now.date_naive()).num_days()
}

impl OverdueItem {
    pub fn from_candidate(candidate: &ReminderCandidate, due_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            loan_id: candidate.loan.id,
            book_title: candidate.book_title.clone(),
            book_author: candidate.book_author.clone(),
            borrower_name: candidate.loan.borrower_name.clone(),
            due_at,
            days_overdue: days_overdue(due_at, now),
        }
    }
}

/// Outcome of one reminder sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SweepReport {
    /// Upcoming-due reminders sent
    pub upcoming_sent: u32,
    /// Overdue digest emails sent (one per owner)
    pub overdue_digests_sent: u32,
    /// Loans covered by the digests that were sent
    pub overdue_loans_covered: u32,
}
