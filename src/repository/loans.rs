//! Loans repository for database operations

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Pool, Postgres, Row};

use crate::{
    error::{AppError, AppResult},
    models::{
        book::BookShort,
        loan::{CreateLoan, Loan, LoanDetails, ReminderCandidate},
    },
};

const REMINDER_SELECT: &str = r#"
    SELECT l.id, l.book_id, l.user_id, l.borrower_name, l.lent_at, l.due_at,
           l.returned_at, l.last_reminder_sent_at,
           u.email AS owner_email, b.title AS book_title, b.author AS book_author
    FROM loans l
    JOIN users u ON l.user_id = u.id
    JOIN books b ON l.book_id = b.id
    WHERE l.returned_at IS NULL
      AND l.due_at IS NOT NULL
"#;

const DETAILS_SELECT: &str = r#"
    SELECT l.*, b.title, b.author, b.isbn
    FROM loans l
    JOIN books b ON l.book_id = b.id
"#;

#[derive(Clone)]
pub struct LoansRepository {
    pool: Pool<Postgres>,
}

impl LoansRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get loan by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }

    fn details_from_row(row: &sqlx::postgres::PgRow, now: DateTime<Utc>) -> AppResult<LoanDetails> {
        let loan = Loan {
            id: row.try_get("id")?,
            book_id: row.try_get("book_id")?,
            owner_id: row.try_get("user_id")?,
            borrower_name: row.try_get("borrower_name")?,
            lent_at: row.try_get("lent_at")?,
            due_at: row.try_get("due_at")?,
            returned_at: row.try_get("returned_at")?,
            last_reminder_sent_at: row.try_get("last_reminder_sent_at")?,
        };
        let book = BookShort {
            id: loan.book_id,
            user_id: loan.owner_id,
            title: row.try_get("title")?,
            author: row.try_get("author")?,
            isbn: row.try_get("isbn")?,
        };
        let is_overdue = loan.is_overdue(now);
        Ok(LoanDetails {
            loan,
            book,
            is_overdue,
        })
    }

    /// Active loans of an owner, most recent first
    pub async fn list_active(&self, owner_id: i32) -> AppResult<Vec<LoanDetails>> {
        let rows = sqlx::query(&format!(
            "{} WHERE l.user_id = $1 AND l.returned_at IS NULL ORDER BY l.lent_at DESC",
            DETAILS_SELECT
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        let now = Utc::now();
        rows.iter().map(|row| Self::details_from_row(row, now)).collect()
    }

    /// Every loan of an owner, optionally restricted to one book
    pub async fn history(&self, owner_id: i32, book_id: Option<i32>) -> AppResult<Vec<LoanDetails>> {
        let rows = sqlx::query(&format!(
            "{} WHERE l.user_id = $1 AND ($2::INTEGER IS NULL OR l.book_id = $2) ORDER BY l.lent_at DESC",
            DETAILS_SELECT
        ))
        .bind(owner_id)
        .bind(book_id)
        .fetch_all(&self.pool)
        .await?;

        let now = Utc::now();
        rows.iter().map(|row| Self::details_from_row(row, now)).collect()
    }

    /// Create a new loan; the caller has already checked book ownership
    pub async fn create(
        &self,
        owner_id: i32,
        loan: &CreateLoan,
        due_at: Option<DateTime<Utc>>,
    ) -> AppResult<Loan> {
        let already_lent: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM loans WHERE book_id = $1 AND returned_at IS NULL)",
        )
        .bind(loan.book_id)
        .fetch_one(&self.pool)
        .await?;

        if already_lent {
            return Err(AppError::Conflict("Book is already lent out".to_string()));
        }

        // The partial unique index still guards against a concurrent insert
        let created = sqlx::query_as::<_, Loan>(
            r#"
            INSERT INTO loans (book_id, user_id, borrower_name, lent_at, due_at)
            VALUES ($1, $2, $3, NOW(), $4)
            RETURNING *
            "#,
        )
        .bind(loan.book_id)
        .bind(owner_id)
        .bind(loan.borrower_name.trim())
        .bind(due_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db) = &e {
                if db.is_unique_violation() {
                    return AppError::Conflict("Book is already lent out".to_string());
                }
            }
            AppError::Database(e)
        })?;

        Ok(created)
    }

    /// Mark a loan as returned; returned loans are never modified again
    pub async fn return_loan(&self, owner_id: i32, loan_id: i32) -> AppResult<Loan> {
        let loan = self.get_by_id(loan_id).await?;

        if loan.owner_id != owner_id {
            return Err(AppError::Authorization("Loan belongs to another user".to_string()));
        }

        sqlx::query_as::<_, Loan>(
            "UPDATE loans SET returned_at = NOW() WHERE id = $1 AND returned_at IS NULL RETURNING *",
        )
        .bind(loan_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Loan not found or already returned".to_string()))
    }

    /// Active loans due on the given UTC calendar day
    pub async fn list_due_on(&self, date: NaiveDate) -> AppResult<Vec<ReminderCandidate>> {
        let candidates = sqlx::query_as::<_, ReminderCandidate>(&format!(
            "{} AND (l.due_at AT TIME ZONE 'UTC')::date = $1 ORDER BY l.due_at",
            REMINDER_SELECT
        ))
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        Ok(candidates)
    }

    /// Active loans whose due day is before `as_of`
    pub async fn list_overdue(&self, as_of: NaiveDate) -> AppResult<Vec<ReminderCandidate>> {
        let candidates = sqlx::query_as::<_, ReminderCandidate>(&format!(
            "{} AND (l.due_at AT TIME ZONE 'UTC')::date < $1 ORDER BY l.user_id, l.due_at",
            REMINDER_SELECT
        ))
        .bind(as_of)
        .fetch_all(&self.pool)
        .await?;

        Ok(candidates)
    }

    /// Record a reminder unless the loan was returned or reminded after `not_after` meanwhile.
    /// The stored time is never earlier than `lent_at`.
    pub async fn mark_reminder_sent(
        &self,
        loan_id: i32,
        at: DateTime<Utc>,
        not_after: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE loans SET last_reminder_sent_at = GREATEST($2, lent_at)
            WHERE id = $1
              AND returned_at IS NULL
              AND (last_reminder_sent_at IS NULL OR last_reminder_sent_at < $3)
            "#,
        )
        .bind(loan_id)
        .bind(at)
        .bind(not_after)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Batch variant of `mark_reminder_sent`, all or nothing: if any loan no longer
    /// qualifies the transaction is rolled back and 0 is returned.
    pub async fn mark_reminders_sent(
        &self,
        loan_ids: &[i32],
        at: DateTime<Utc>,
        not_after: DateTime<Utc>,
    ) -> AppResult<u64> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE loans SET last_reminder_sent_at = GREATEST($2, lent_at)
            WHERE id = ANY($1)
              AND returned_at IS NULL
              AND (last_reminder_sent_at IS NULL OR last_reminder_sent_at < $3)
            "#,
        )
        .bind(loan_ids)
        .bind(at)
        .bind(not_after)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() != loan_ids.len() as u64 {
            tx.rollback().await?;
            return Ok(0);
        }

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    /// Count active loans
    pub async fn count_active(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM loans WHERE returned_at IS NULL")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Count overdue loans
    pub async fn count_overdue(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM loans
            WHERE returned_at IS NULL
              AND due_at IS NOT NULL
              AND (due_at AT TIME ZONE 'UTC')::date < (NOW() AT TIME ZONE 'UTC')::date
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
