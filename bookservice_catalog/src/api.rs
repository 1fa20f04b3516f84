use chrono::{DateTime, Utc};
use paperclip::actix::Apiv2Schema;
use serde::{Deserialize, Serialize};

use crate::validation::{normalize_currency, ValidationError};

pub type BookId = String;
pub type CustomerId = String;
pub type MessageId = String;

/// Currency assigned to books created without one
pub const DEFAULT_CURRENCY: &str = "USD";
/// Page size used when the caller asks for a non-positive limit
pub const DEFAULT_PAGE_SIZE: i64 = 50;
/// Largest page returned, bigger limits are clamped to it
pub const MAX_PAGE_SIZE: i64 = 1000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Apiv2Schema)]
/// Single catalog entry as stored by the repository
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub author: String,
    pub price: f64,
    pub currency: String,
    pub stock: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Apiv2Schema)]
/// Payload required to create a book. Missing fields fall back to their zero values
/// so that validation can report every problem at once.
pub struct CreateBookParams {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default)]
    pub stock: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Apiv2Schema)]
/// Partial update of a book. Only the fields that are present are applied.
pub struct UpdateBookParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<i64>,
}

impl UpdateBookParams {
    /// True when no field is present
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.author.is_none()
            && self.price.is_none()
            && self.currency.is_none()
            && self.stock.is_none()
    }

    /// Copies present fields onto the book, trimming text and normalizing the currency.
    /// Assumes the params were validated.
    pub fn apply_to(&self, book: &mut Book) {
        if let Some(title) = &self.title {
            book.title = title.trim().to_string();
        }
        if let Some(author) = &self.author {
            book.author = author.trim().to_string();
        }
        if let Some(price) = self.price {
            book.price = price;
        }
        if let Some(currency) = &self.currency {
            book.currency = normalize_currency(currency);
        }
        if let Some(stock) = self.stock {
            book.stock = stock;
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Apiv2Schema)]
pub struct ListBooksQuery {
    pub limit: Option<i64>,
    pub cursor: Option<BookId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Apiv2Schema)]
/// One page of books ordered by creation time.
/// `next_cursor` is set only when more books remain after this page.
pub struct BookPage {
    pub books: Vec<Book>,
    pub next_cursor: Option<BookId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Apiv2Schema)]
pub struct PurchaseRequest {
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub customer_id: CustomerId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Apiv2Schema)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Apiv2Schema)]
pub struct PurchaseResponse {
    pub message_id: MessageId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Apiv2Schema)]
/// Body returned with every non-2xx response
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<ValidationError>,
}
