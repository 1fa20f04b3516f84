use paperclip::actix::Apiv2Schema;
use serde::{Deserialize, Serialize};

use crate::api::{CreateBookParams, UpdateBookParams, DEFAULT_CURRENCY};

/// Upper bound for title and author, counted in unicode code points
pub const MAX_TEXT_LENGTH: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Apiv2Schema)]
/// Single invalid field together with the reason it was rejected
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

#[derive(thiserror::Error, Debug, Clone, Default, PartialEq, Eq)]
#[error("{} validation error(s): {}", .0.len(), join_errors(.0))]
/// All field violations found in one payload, in field order
pub struct ValidationErrors(Vec<ValidationError>);

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationErrors {
    pub fn push(&mut self, field: &str, reason: &str) {
        self.0.push(ValidationError {
            field: field.to_string(),
            reason: reason.to_string(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.0.iter()
    }

    pub fn contains_field(&self, field: &str) -> bool {
        self.0.iter().any(|error| error.field == field)
    }

    pub fn into_inner(self) -> Vec<ValidationError> {
        self.0
    }

    fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

/// Trims and uppercases a currency code, blank input becomes the default currency
pub fn normalize_currency(currency: &str) -> String {
    let trimmed = currency.trim();
    if trimmed.is_empty() {
        DEFAULT_CURRENCY.to_string()
    } else {
        trimmed.to_uppercase()
    }
}

fn is_currency_code(code: &str) -> bool {
    code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase())
}

fn check_text(errors: &mut ValidationErrors, field: &str, value: &str, empty_reason: &str) {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        errors.push(field, empty_reason);
    } else if trimmed.chars().count() > MAX_TEXT_LENGTH {
        errors.push(field, "must be at most 200 characters");
    }
}

fn check_price(errors: &mut ValidationErrors, price: f64) {
    if !price.is_finite() {
        errors.push("price", "must be a finite number");
    } else if price < 0.0 {
        errors.push("price", "must be >= 0");
    }
}

fn check_currency(errors: &mut ValidationErrors, currency: &str) {
    if !is_currency_code(&normalize_currency(currency)) {
        errors.push("currency", "must be a 3-letter ISO 4217 code");
    }
}

fn check_stock(errors: &mut ValidationErrors, stock: i64) {
    if stock < 0 {
        errors.push("stock", "must be >= 0");
    }
}

/// Validates a create payload, collecting every violation
pub fn validate_create(params: &CreateBookParams) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();
    check_text(&mut errors, "title", &params.title, "is required");
    check_text(&mut errors, "author", &params.author, "is required");
    check_price(&mut errors, params.price);
    if let Some(currency) = &params.currency {
        check_currency(&mut errors, currency);
    }
    check_stock(&mut errors, params.stock);
    errors.into_result()
}

/// Validates a partial update. An update without any field is rejected.
pub fn validate_update(params: &UpdateBookParams) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();
    if params.is_empty() {
        errors.push("body", "must include at least one field");
        return errors.into_result();
    }

    if let Some(title) = &params.title {
        check_text(&mut errors, "title", title, "cannot be empty");
    }
    if let Some(author) = &params.author {
        check_text(&mut errors, "author", author, "cannot be empty");
    }
    if let Some(price) = params.price {
        check_price(&mut errors, price);
    }
    if let Some(currency) = &params.currency {
        check_currency(&mut errors, currency);
    }
    if let Some(stock) = params.stock {
        check_stock(&mut errors, stock);
    }
    errors.into_result()
}

pub fn validate_purchase(quantity: i64, customer_id: &str) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();
    if quantity <= 0 {
        errors.push("quantity", "must be > 0");
    }
    if customer_id.trim().is_empty() {
        errors.push("customer_id", "is required");
    }
    errors.into_result()
}
