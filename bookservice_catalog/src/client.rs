use anyhow::{bail, Context};
use reqwest::header::LOCATION;
use reqwest::{Response, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_tracing::TracingMiddleware;

use crate::api::{
    Book, BookId, BookPage, CreateBookParams, ErrorResponse, MessageId, PurchaseRequest,
    PurchaseResponse, UpdateBookParams,
};

pub struct BookServiceCatalogClient {
    url: String,
    client: ClientWithMiddleware,
}

/// Reads the error body, falls back to the status when the body is not an `ErrorResponse`
async fn describe_failure(response: Response) -> String {
    let status = response.status();
    match response.json::<ErrorResponse>().await {
        Ok(error) => format!("{} ({}): {}", status, error.code, error.error),
        Err(_) => status.to_string(),
    }
}

impl BookServiceCatalogClient {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        let reqwest_client = reqwest::Client::builder()
            .build()
            .context("Failed to build reqwest client")?;
        let client = ClientBuilder::new(reqwest_client)
            // Insert the tracing middleware
            .with(TracingMiddleware::default())
            .build();

        Ok(Self {
            url: url.to_string(),
            client,
        })
    }

    /// Calls POST /api/book endpoint
    /// Returns the created book, its id is cross-checked with the location header
    pub async fn add_book(&self, params: CreateBookParams) -> anyhow::Result<Book> {
        let response = self
            .client
            .post(format!("{}/api/book", self.url))
            .json(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            bail!("Failed to add book {}", describe_failure(response).await)
        }

        let location_id: BookId = response
            .headers()
            .get(LOCATION)
            .context("No location header")?
            .to_str()
            .context("Failed to convert header to str")?
            .strip_prefix("/api/book/")
            .context("Invalid location header")?
            .to_string();

        let book: Book = response.json().await.context("Failed to parse book")?;
        if book.id != location_id {
            bail!(
                "Location header points at {} but book {} was returned",
                location_id,
                book.id
            )
        }
        Ok(book)
    }

    /// Calls GET /api/book/{book_id} endpoint
    /// Returns None if the book is not in the catalog
    pub async fn get_book(&self, book_id: &str) -> anyhow::Result<Option<Book>> {
        let response = self
            .client
            .get(format!("{}/api/book/{}", self.url, book_id))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            Ok(None)
        } else if response.status().is_success() {
            Ok(Some(response.json().await?))
        } else {
            bail!("Failed to get book {}", describe_failure(response).await)
        }
    }

    /// Calls GET /api/books endpoint
    pub async fn list_books(&self, limit: i64, cursor: Option<&str>) -> anyhow::Result<BookPage> {
        let mut request = self
            .client
            .get(format!("{}/api/books", self.url))
            .query(&[("limit", limit.to_string())]);
        if let Some(cursor) = cursor {
            request = request.query(&[("cursor", cursor)]);
        }

        let response = request.send().await?;
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            bail!("Failed to list books {}", describe_failure(response).await)
        }
    }

    /// Calls PATCH /api/book/{book_id} endpoint
    /// Returns None if the book is not in the catalog
    pub async fn update_book(
        &self,
        book_id: &str,
        params: UpdateBookParams,
    ) -> anyhow::Result<Option<Book>> {
        let response = self
            .client
            .patch(format!("{}/api/book/{}", self.url, book_id))
            .json(&params)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            Ok(None)
        } else if response.status().is_success() {
            Ok(Some(response.json().await?))
        } else {
            bail!("Failed to update book {}", describe_failure(response).await)
        }
    }

    /// Calls DELETE /api/book/{book_id} endpoint
    /// Returns false if the book was not in the catalog
    pub async fn delete_book(&self, book_id: &str) -> anyhow::Result<bool> {
        let response = self
            .client
            .delete(format!("{}/api/book/{}", self.url, book_id))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            Ok(false)
        } else if response.status().is_success() {
            Ok(true)
        } else {
            bail!("Failed to delete book {}", describe_failure(response).await)
        }
    }

    /// Calls POST /api/book/{book_id}/purchase endpoint
    /// Returns the id of the queued purchase message
    pub async fn purchase_book(
        &self,
        book_id: &str,
        quantity: i64,
        customer_id: &str,
    ) -> anyhow::Result<MessageId> {
        let response = self
            .client
            .post(format!("{}/api/book/{}/purchase", self.url, book_id))
            .json(&PurchaseRequest {
                quantity,
                customer_id: customer_id.to_string(),
            })
            .send()
            .await?;
        if response.status().is_success() {
            let body: PurchaseResponse = response.json().await?;
            Ok(body.message_id)
        } else {
            bail!("Failed to purchase book {}", describe_failure(response).await)
        }
    }
}
