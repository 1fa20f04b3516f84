pub use in_memory_books_repository::InMemoryBookRepository;
pub use postgres_books_repository::{PostgresBooksRepository, PostgresBooksRepositoryConfig};

use crate::api::{Book, BookId, BookPage, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

mod in_memory_books_repository;
mod postgres_books_repository;

#[derive(thiserror::Error, Debug)]
pub enum BookRepositoryError {
    #[error("Book {0} not found")]
    NotFound(BookId),

    #[error("Book with title {0:?} already exists")]
    DuplicateTitle(String),

    #[error("DatabaseFailure failure {0}")]
    DatabaseFailure(#[from] tokio_postgres::Error),

    #[error("Other error {0}")]
    Other(String),
}

#[async_trait::async_trait]
pub trait BookRepository: Send + Sync {
    /// Lists books ordered by creation time, starting right after the book identified by `cursor`.
    /// A cursor that does not match any book restarts the listing from the first page.
    async fn list_books(
        &self,
        limit: i64,
        cursor: Option<&str>,
    ) -> Result<BookPage, BookRepositoryError>;
    /// Retrieves a copy of the book
    async fn get_book(&self, book_id: &str) -> Result<Book, BookRepositoryError>;
    /// Stores a new book, fails if another book already has the same title
    async fn add_book(&self, book: Book) -> Result<Book, BookRepositoryError>;
    /// Replaces the stored book with the same id, fails if it is missing
    /// or if a different book already has the same title
    async fn update_book(&self, book: Book) -> Result<Book, BookRepositoryError>;
    /// Removes the book
    async fn delete_book(&self, book_id: &str) -> Result<(), BookRepositoryError>;
}

/// Page size actually used for a requested limit, always within `1..=MAX_PAGE_SIZE`
pub fn effective_page_size(limit: i64) -> usize {
    let limit = if limit <= 0 {
        DEFAULT_PAGE_SIZE
    } else {
        limit.min(MAX_PAGE_SIZE)
    };
    usize::try_from(limit).unwrap_or(DEFAULT_PAGE_SIZE as usize)
}
