//! Loan management service

use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::loan::{CreateLoan, Loan, LoanDetails},
    repository::Repository,
};

#[derive(Clone)]
pub struct LoansService {
    repository: Repository,
}

impl LoansService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Active loans of an owner
    pub async fn list_active(&self, owner_id: i32) -> AppResult<Vec<LoanDetails>> {
        self.repository.loans.list_active(owner_id).await
    }

    /// Lend one of the owner's books
    pub async fn create_loan(&self, owner_id: i32, loan: CreateLoan) -> AppResult<Loan> {
        loan.validate()?;

        if loan.borrower_name.trim().is_empty() {
            return Err(AppError::Validation("Borrower name must not be empty".to_string()));
        }

        let due_at = loan.due_at()?;

        // Verify the book exists and belongs to the caller
        let book = self.repository.books.get_by_id(loan.book_id).await?;
        if book.user_id != owner_id {
            return Err(AppError::Authorization("Book belongs to another user".to_string()));
        }

        let created = self.repository.loans.create(owner_id, &loan, due_at).await?;
        tracing::info!(loan_id = created.id, book_id = created.book_id, owner_id, "Book lent");
        Ok(created)
    }

    /// Mark a loan as returned
    pub async fn return_loan(&self, owner_id: i32, loan_id: i32) -> AppResult<Loan> {
        let loan = self.repository.loans.return_loan(owner_id, loan_id).await?;
        tracing::info!(loan_id, owner_id, "Book returned");
        Ok(loan)
    }

    /// Lending history of an owner, optionally for one book
    pub async fn history(&self, owner_id: i32, book_id: Option<i32>) -> AppResult<Vec<LoanDetails>> {
        if let Some(book_id) = book_id {
            let book = self.repository.books.get_by_id(book_id).await?;
            if book.user_id != owner_id {
                return Err(AppError::Authorization("Book belongs to another user".to_string()));
            }
        }
        self.repository.loans.history(owner_id, book_id).await
    }

    /// Count active loans
    pub async fn count_active(&self) -> AppResult<i64> {
        self.repository.loans.count_active().await
    }

    /// Count overdue loans
    pub async fn count_overdue(&self) -> AppResult<i64> {
        self.repository.loans.count_overdue().await
    }
}
