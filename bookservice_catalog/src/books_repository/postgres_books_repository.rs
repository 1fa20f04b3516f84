use anyhow::Context;
use chrono::{DateTime, Utc};
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, NoTls, Row, Statement};

use crate::api::{Book, BookPage};
use crate::books_repository::{effective_page_size, BookRepository, BookRepositoryError};

const BOOK_COLUMNS: &str = "id, title, author, price, currency, stock, created_at, updated_at";
const UNIQUE_TITLE_CONSTRAINT: &str = "books_title_key";

pub struct PostgresBooksRepository {
    client: Client,
}

pub struct PostgresBooksRepositoryConfig {
    pub hostname: String,
    pub username: String,
    pub password: String,
}

impl PostgresBooksRepository {
    pub async fn init(config: PostgresBooksRepositoryConfig) -> anyhow::Result<Self> {
        let connection_str = format!(
            "postgresql://{}:{}@{}",
            config.username, config.password, config.hostname
        );
        tracing::info!(
            "Connecting to postgres at {} as {}",
            config.hostname,
            config.username
        );
        let (client, connection) = tokio_postgres::connect(&connection_str, NoTls)
            .await
            .context("Failed to start postgres")?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("Postgres connection error: {}", e);
            }
        });

        client
            .batch_execute(
                "
        CREATE TABLE IF NOT EXISTS books (
            id              TEXT PRIMARY KEY,
            title           TEXT NOT NULL UNIQUE,
            author          TEXT NOT NULL,
            price           DOUBLE PRECISION NOT NULL,
            currency        TEXT NOT NULL,
            stock           BIGINT NOT NULL,
            created_at      TIMESTAMPTZ NOT NULL,
            updated_at      TIMESTAMPTZ NOT NULL
            );
        CREATE INDEX IF NOT EXISTS books_created_at_id_idx ON books (created_at, id);
        ",
            )
            .await
            .context("Failed to setup table")?;
        Ok(Self { client })
    }
}

fn book_from_row(row: &Row) -> Result<Book, tokio_postgres::Error> {
    Ok(Book {
        id: row.try_get(0)?,
        title: row.try_get(1)?,
        author: row.try_get(2)?,
        price: row.try_get(3)?,
        currency: row.try_get(4)?,
        stock: row.try_get(5)?,
        created_at: row.try_get(6)?,
        updated_at: row.try_get(7)?,
    })
}

/// Maps unique violations to repository errors, everything else is a database failure
fn map_write_error(err: tokio_postgres::Error, book: &Book) -> BookRepositoryError {
    if err.code() != Some(&SqlState::UNIQUE_VIOLATION) {
        return BookRepositoryError::DatabaseFailure(err);
    }
    let constraint = err.as_db_error().and_then(|db_error| db_error.constraint());
    if constraint == Some(UNIQUE_TITLE_CONSTRAINT) {
        BookRepositoryError::DuplicateTitle(book.title.clone())
    } else {
        BookRepositoryError::Other(format!("Book id {} already taken", book.id))
    }
}

#[async_trait::async_trait]
impl BookRepository for PostgresBooksRepository {
    async fn list_books(
        &self,
        limit: i64,
        cursor: Option<&str>,
    ) -> Result<BookPage, BookRepositoryError> {
        let page_size = effective_page_size(limit);

        let mut position: Option<(DateTime<Utc>, String)> = None;
        if let Some(cursor) = cursor.filter(|cursor| !cursor.is_empty()) {
            let stmt: Statement = self
                .client
                .prepare("SELECT created_at FROM books WHERE id = ($1)")
                .await?;
            match self.client.query_opt(&stmt, &[&cursor]).await? {
                Some(row) => position = Some((row.try_get(0)?, cursor.to_string())),
                None => tracing::warn!("Unknown cursor {}, listing from the first page", cursor),
            }
        }

        // one extra row tells whether another page exists
        let fetch_limit =
            i64::try_from(page_size).map_or(i64::MAX, |size| size.saturating_add(1));
        let rows = match position {
            Some((created_at, id)) => {
                let stmt: Statement = self
                    .client
                    .prepare(&format!(
                        "SELECT {BOOK_COLUMNS} FROM books
                         WHERE (created_at, id) > (($1), ($2))
                         ORDER BY created_at, id LIMIT ($3)"
                    ))
                    .await?;
                self.client
                    .query(&stmt, &[&created_at, &id, &fetch_limit])
                    .await?
            }
            None => {
                let stmt: Statement = self
                    .client
                    .prepare(&format!(
                        "SELECT {BOOK_COLUMNS} FROM books ORDER BY created_at, id LIMIT ($1)"
                    ))
                    .await?;
                self.client.query(&stmt, &[&fetch_limit]).await?
            }
        };

        let mut books = rows
            .iter()
            .map(book_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        let next_cursor = if books.len() > page_size {
            books.truncate(page_size);
            books.last().map(|book| book.id.clone())
        } else {
            None
        };

        Ok(BookPage { books, next_cursor })
    }

    async fn get_book(&self, book_id: &str) -> Result<Book, BookRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare(&format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = ($1)"))
            .await?;

        let row = self
            .client
            .query_opt(&stmt, &[&book_id])
            .await?
            .ok_or_else(|| BookRepositoryError::NotFound(book_id.to_string()))?;

        Ok(book_from_row(&row)?)
    }

    async fn add_book(&self, book: Book) -> Result<Book, BookRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare(&format!(
                "INSERT INTO books ({BOOK_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                 RETURNING {BOOK_COLUMNS}"
            ))
            .await?;

        let row = self
            .client
            .query_one(
                &stmt,
                &[
                    &book.id,
                    &book.title,
                    &book.author,
                    &book.price,
                    &book.currency,
                    &book.stock,
                    &book.created_at,
                    &book.updated_at,
                ],
            )
            .await
            .map_err(|err| map_write_error(err, &book))?;

        Ok(book_from_row(&row)?)
    }

    async fn update_book(&self, book: Book) -> Result<Book, BookRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare(&format!(
                "UPDATE books
                 SET title = ($2), author = ($3), price = ($4), currency = ($5),
                     stock = ($6), updated_at = ($7)
                 WHERE id = ($1)
                 RETURNING {BOOK_COLUMNS}"
            ))
            .await?;

        let row = self
            .client
            .query_opt(
                &stmt,
                &[
                    &book.id,
                    &book.title,
                    &book.author,
                    &book.price,
                    &book.currency,
                    &book.stock,
                    &book.updated_at,
                ],
            )
            .await
            .map_err(|err| map_write_error(err, &book))?
            .ok_or_else(|| BookRepositoryError::NotFound(book.id.clone()))?;

        Ok(book_from_row(&row)?)
    }

    async fn delete_book(&self, book_id: &str) -> Result<(), BookRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("DELETE FROM books WHERE id = ($1)")
            .await?;

        let deleted = self.client.execute(&stmt, &[&book_id]).await?;
        if deleted == 0 {
            return Err(BookRepositoryError::NotFound(book_id.to_string()));
        }
        Ok(())
    }
}
