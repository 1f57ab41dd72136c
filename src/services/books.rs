//! Book collection service

use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::book::{Book, CreateBook, UpdateBook},
    repository::Repository,
};

#[derive(Clone)]
pub struct BooksService {
    repository: Repository,
}

impl BooksService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Books owned by the caller
    pub async fn list_books(&self, owner_id: i32) -> AppResult<Vec<Book>> {
        self.repository.books.list(owner_id).await
    }

    /// Get one of the caller's books
    pub async fn get_book(&self, owner_id: i32, id: i32) -> AppResult<Book> {
        let book = self.repository.books.get(id).await?;
        ensure_owner(book.user_id, owner_id)?;
        Ok(book)
    }

    /// Add a book to the caller's collection
    pub async fn create_book(&self, owner_id: i32, book: CreateBook) -> AppResult<Book> {
        book.validate()?;
        if book.title.trim().is_empty() {
            return Err(AppError::Validation("Title must not be empty".to_string()));
        }

        let created = self.repository.books.create(owner_id, &book).await?;
        tracing::info!(book_id = created.id, owner_id, "Book created");
        Ok(created)
    }

    /// Update one of the caller's books
    pub async fn update_book(&self, owner_id: i32, id: i32, book: UpdateBook) -> AppResult<Book> {
        book.validate()?;
        let existing = self.repository.books.get_by_id(id).await?;
        ensure_owner(existing.user_id, owner_id)?;

        self.repository.books.update(owner_id, id, &book).await
    }

    /// Delete one of the caller's books
    pub async fn delete_book(&self, owner_id: i32, id: i32, force: bool) -> AppResult<()> {
        let existing = self.repository.books.get_by_id(id).await?;
        ensure_owner(existing.user_id, owner_id)?;

        self.repository.books.delete(owner_id, id, force).await?;
        tracing::info!(book_id = id, owner_id, force, "Book deleted");
        Ok(())
    }
}

fn ensure_owner(book_owner: i32, caller: i32) -> AppResult<()> {
    if book_owner == caller {
        Ok(())
    } else {
        Err(AppError::Authorization("Book belongs to another user".to_string()))
    }
}
