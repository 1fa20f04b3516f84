use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::api::{Book, BookId, BookPage};
use crate::books_repository::{effective_page_size, BookRepository, BookRepositoryError};

#[derive(Default)]
pub struct InMemoryBookRepository {
    books: parking_lot::RwLock<HashMap<BookId, Book>>,
}

#[async_trait::async_trait]
impl BookRepository for InMemoryBookRepository {
    async fn list_books(
        &self,
        limit: i64,
        cursor: Option<&str>,
    ) -> Result<BookPage, BookRepositoryError> {
        let page_size = effective_page_size(limit);
        let locked_books = self.books.read();

        let mut sorted: Vec<&Book> = locked_books.values().collect();
        // id breaks ties so that books created at the same instant keep a stable order
        sorted.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        let start = match cursor.filter(|cursor| !cursor.is_empty()) {
            Some(cursor) => match sorted.iter().position(|book| book.id == cursor) {
                Some(position) => position + 1,
                None => {
                    tracing::warn!("Unknown cursor {}, listing from the first page", cursor);
                    0
                }
            },
            None => 0,
        };
        let end = (start + page_size).min(sorted.len());

        let books: Vec<Book> = sorted[start..end].iter().map(|&book| book.clone()).collect();
        let next_cursor = if end < sorted.len() {
            books.last().map(|book| book.id.clone())
        } else {
            None
        };

        Ok(BookPage { books, next_cursor })
    }

    async fn get_book(&self, book_id: &str) -> Result<Book, BookRepositoryError> {
        self.books
            .read()
            .get(book_id)
            .cloned()
            .ok_or_else(|| BookRepositoryError::NotFound(book_id.to_string()))
    }

    async fn add_book(&self, book: Book) -> Result<Book, BookRepositoryError> {
        let mut locked_books = self.books.write();

        if locked_books
            .values()
            .any(|existing| existing.title == book.title)
        {
            return Err(BookRepositoryError::DuplicateTitle(book.title));
        }

        match locked_books.entry(book.id.clone()) {
            Entry::Occupied(_) => Err(BookRepositoryError::Other(format!(
                "Book id {} already taken",
                book.id
            ))),
            Entry::Vacant(entry) => Ok(entry.insert(book).clone()),
        }
    }

    async fn update_book(&self, book: Book) -> Result<Book, BookRepositoryError> {
        let mut locked_books = self.books.write();

        if !locked_books.contains_key(&book.id) {
            return Err(BookRepositoryError::NotFound(book.id));
        }

        if locked_books
            .iter()
            .any(|(id, existing)| id != &book.id && existing.title == book.title)
        {
            return Err(BookRepositoryError::DuplicateTitle(book.title));
        }

        locked_books.insert(book.id.clone(), book.clone());
        Ok(book)
    }

    async fn delete_book(&self, book_id: &str) -> Result<(), BookRepositoryError> {
        self.books
            .write()
            .remove(book_id)
            .map(|_| ())
            .ok_or_else(|| BookRepositoryError::NotFound(book_id.to_string()))
    }
}
