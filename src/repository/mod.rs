//! Repository layer for database operations

pub mod books;
pub mod loans;
pub mod settings;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::{NotificationPreferences, ReminderCandidate},
    services::reminders::LendingStore,
};

/// Main repository struct holding database connection pool
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
    pub books: books::BooksRepository,
    pub loans: loans::LoansRepository,
    pub settings: settings::SettingsRepository,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            books: books::BooksRepository::new(pool.clone()),
            loans: loans::LoansRepository::new(pool.clone()),
            settings: settings::SettingsRepository::new(pool.clone()),
            pool,
        }
    }

    /// Round-trip to the database, used by the readiness probe
    pub async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl LendingStore for Repository {
    async fn list_active_loans_due_on(&self, date: NaiveDate) -> AppResult<Vec<ReminderCandidate>> {
        self.loans.list_due_on(date).await
    }

    async fn list_active_overdue_loans(&self, as_of: NaiveDate) -> AppResult<Vec<ReminderCandidate>> {
        self.loans.list_overdue(as_of).await
    }

    async fn get_owner_preferences(&self, owner_id: i32) -> AppResult<NotificationPreferences> {
        self.settings.get_preferences(owner_id).await
    }

    async fn mark_reminder_sent(
        &self,
        loan_id: i32,
        at: DateTime<Utc>,
        not_after: DateTime<Utc>,
    ) -> AppResult<bool> {
        self.loans.mark_reminder_sent(loan_id, at, not_after).await
    }

    async fn mark_reminders_sent_batch(
        &self,
        loan_ids: &[i32],
        at: DateTime<Utc>,
        not_after: DateTime<Utc>,
    ) -> AppResult<u64> {
        self.loans.mark_reminders_sent(loan_ids, at, not_after).await
    }
}
