//! Helpers shared by the system tests. The tests expect a running catalog,
//! see `tests/system_tests.rs`.

use bookservice_catalog::api::CreateBookParams;

/// Env var with the base url of the catalog under test
pub const CATALOG_URL_ENV: &str = "BOOKSERVICE_CATALOG_URL";
const DEFAULT_CATALOG_URL: &str = "http://127.0.0.1:8080";

pub fn catalog_url() -> String {
    std::env::var(CATALOG_URL_ENV).unwrap_or_else(|_| DEFAULT_CATALOG_URL.to_string())
}

/// Create params with a title that does not collide with books left by earlier runs
pub fn unique_book(prefix: &str, stock: i64) -> CreateBookParams {
    CreateBookParams {
        title: format!("{} {}", prefix, uuid::Uuid::new_v4()),
        author: "System Test".to_string(),
        price: 19.99,
        currency: Some("eur".to_string()),
        stock,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_book_titles_differ() {
        let first = unique_book("title", 1);
        let second = unique_book("title", 1);
        assert_ne!(first.title, second.title);
        assert!(first.title.starts_with("title "));
    }
}
