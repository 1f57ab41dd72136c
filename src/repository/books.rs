//! Books repository

use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::book::{normalize, Book, BookShort, CreateBook, UpdateBook},
};

const DUPLICATE_ISBN: &str = "You already own a book with this ISBN";

fn duplicate_isbn(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return AppError::Conflict(DUPLICATE_ISBN.to_string());
        }
    }
    AppError::Database(e)
}

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get book by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<BookShort> {
        sqlx::query_as::<_, BookShort>("SELECT id, user_id, title, author, isbn FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Full book record by ID
    pub async fn get(&self, id: i32) -> AppResult<Book> {
        sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Books of an owner, by title
    pub async fn list(&self, owner_id: i32) -> AppResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE user_id = $1 ORDER BY title, id")
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(books)
    }

    /// Whether the owner already has a book with this ISBN, other than `except_id`
    pub async fn isbn_taken(&self, owner_id: i32, isbn: &str, except_id: Option<i32>) -> AppResult<bool> {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM books WHERE user_id = $1 AND isbn = $2 AND ($3::INTEGER IS NULL OR id <> $3))",
        )
        .bind(owner_id)
        .bind(isbn)
        .bind(except_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(taken)
    }

    /// Create a new book for an owner
    pub async fn create(&self, owner_id: i32, book: &CreateBook) -> AppResult<Book> {
        let isbn = normalize(book.isbn.as_deref());
        if let Some(isbn) = &isbn {
            if self.isbn_taken(owner_id, isbn, None).await? {
                return Err(AppError::Conflict(DUPLICATE_ISBN.to_string()));
            }
        }

        sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (user_id, title, author, isbn, genre, read)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(owner_id)
        .bind(book.title.trim())
        .bind(normalize(book.author.as_deref()))
        .bind(isbn)
        .bind(normalize(book.genre.as_deref()))
        .bind(book.read)
        .fetch_one(&self.pool)
        .await
        .map_err(duplicate_isbn)
    }

    /// Apply a partial update; blank text fields are left unchanged
    pub async fn update(&self, owner_id: i32, id: i32, book: &UpdateBook) -> AppResult<Book> {
        let isbn = normalize(book.isbn.as_deref());
        if let Some(isbn) = &isbn {
            if self.isbn_taken(owner_id, isbn, Some(id)).await? {
                return Err(AppError::Conflict(DUPLICATE_ISBN.to_string()));
            }
        }

        sqlx::query_as::<_, Book>(
            r#"
            UPDATE books SET
                title = COALESCE($3, title),
                author = COALESCE($4, author),
                isbn = COALESCE($5, isbn),
                genre = COALESCE($6, genre),
                read = COALESCE($7, read)
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .bind(normalize(book.title.as_deref()))
        .bind(normalize(book.author.as_deref()))
        .bind(isbn)
        .bind(normalize(book.genre.as_deref()))
        .bind(book.read)
        .fetch_optional(&self.pool)
        .await
        .map_err(duplicate_isbn)?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Delete a book and its lending history.
    /// A book currently lent out is only deleted with `force`.
    pub async fn delete(&self, owner_id: i32, id: i32, force: bool) -> AppResult<()> {
        let lent: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM loans WHERE book_id = $1 AND returned_at IS NULL)",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        if lent && !force {
            return Err(AppError::Conflict(
                "Book is currently lent out. Use force=true to delete anyway.".to_string(),
            ));
        }

        let result = sqlx::query("DELETE FROM books WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(owner_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }
        Ok(())
    }
}
