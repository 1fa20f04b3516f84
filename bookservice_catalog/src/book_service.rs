use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::api::{
    Book, BookId, BookPage, CreateBookParams, MessageId, UpdateBookParams, DEFAULT_CURRENCY,
};
use crate::books_repository::{BookRepository, BookRepositoryError};
use crate::events_publisher::{BookEvent, EventPublisher, PublisherError};
use crate::validation::{self, normalize_currency, ValidationErrors};

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(thiserror::Error, Debug)]
pub enum BookServiceError {
    #[error("{0}")]
    Validation(#[from] ValidationErrors),

    #[error("Book {0} not found")]
    NotFound(BookId),

    #[error("Book with title {0:?} already exists")]
    DuplicateTitle(String),

    #[error("Insufficient stock for book {book_id}: requested {requested}, available {available}")]
    InsufficientStock {
        book_id: BookId,
        requested: i64,
        available: i64,
    },

    #[error("Purchase publisher is not configured")]
    PublisherUnconfigured,

    #[error("Failed to publish event: {0}")]
    Publisher(#[from] PublisherError),

    #[error("Repository failure: {0}")]
    Repository(BookRepositoryError),
}

impl From<BookRepositoryError> for BookServiceError {
    fn from(err: BookRepositoryError) -> Self {
        match err {
            BookRepositoryError::NotFound(book_id) => BookServiceError::NotFound(book_id),
            BookRepositoryError::DuplicateTitle(title) => BookServiceError::DuplicateTitle(title),
            other => BookServiceError::Repository(other),
        }
    }
}

/// Validates and normalizes requests before handing them to the repository.
///
/// Creation events are published best-effort: a failing publisher is logged and the
/// created book is still returned. Purchase events are part of the purchase, so a
/// missing or failing publisher fails the call.
#[derive(Clone)]
pub struct BookService {
    books_repository: Arc<dyn BookRepository>,
    publisher: Option<Arc<dyn EventPublisher>>,
    clock: Clock,
}

impl BookService {
    pub fn new(books_repository: Arc<dyn BookRepository>) -> Self {
        Self {
            books_repository,
            publisher: None,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Next `updated_at` for a mutated book, always later than the previous one
    fn next_updated_at(&self, previous: DateTime<Utc>) -> DateTime<Utc> {
        let now = (self.clock)();
        // postgres keeps microseconds, so the minimal step is one microsecond
        let minimal = previous + Duration::microseconds(1);
        now.max(minimal)
    }

    pub async fn create(&self, params: CreateBookParams) -> Result<Book, BookServiceError> {
        validation::validate_create(&params)?;

        let now = (self.clock)();
        let book = Book {
            id: uuid::Uuid::new_v4().to_string(),
            title: params.title.trim().to_string(),
            author: params.author.trim().to_string(),
            price: params.price,
            currency: params
                .currency
                .as_deref()
                .map(normalize_currency)
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            stock: params.stock,
            created_at: now,
            updated_at: now,
        };

        let book = self.books_repository.add_book(book).await?;
        tracing::info!("Book {} created", book.id);

        if let Some(publisher) = &self.publisher {
            let event = BookEvent::BookCreated {
                book_id: book.id.clone(),
                title: book.title.clone(),
                price: book.price,
                currency: book.currency.clone(),
            };
            match publisher.publish(event).await {
                Ok(message_id) => {
                    tracing::info!("Book created event {} published for {}", message_id, book.id)
                }
                Err(err) => tracing::error!(
                    "Failed to publish book created event for {}: {}",
                    book.id,
                    err
                ),
            }
        }

        Ok(book)
    }

    pub async fn get(&self, book_id: &str) -> Result<Book, BookServiceError> {
        Ok(self.books_repository.get_book(book_id).await?)
    }

    pub async fn list(&self, limit: i64, cursor: Option<&str>) -> Result<BookPage, BookServiceError> {
        Ok(self.books_repository.list_books(limit, cursor).await?)
    }

    /// Applies only the present fields on top of the stored book.
    /// A concurrent delete between the read and the write surfaces as `NotFound`.
    pub async fn update(
        &self,
        book_id: &str,
        params: UpdateBookParams,
    ) -> Result<Book, BookServiceError> {
        validation::validate_update(&params)?;

        let mut book = self.books_repository.get_book(book_id).await?;
        params.apply_to(&mut book);
        book.updated_at = self.next_updated_at(book.updated_at);

        let book = self.books_repository.update_book(book).await?;
        tracing::info!("Book {} updated", book.id);
        Ok(book)
    }

    pub async fn delete(&self, book_id: &str) -> Result<(), BookServiceError> {
        self.books_repository.delete_book(book_id).await?;
        tracing::info!("Book {} deleted", book_id);
        Ok(())
    }

    /// Takes `quantity` items out of stock and publishes the purchase.
    /// The stock is not restored when publishing fails.
    pub async fn purchase(
        &self,
        book_id: &str,
        quantity: i64,
        customer_id: &str,
    ) -> Result<MessageId, BookServiceError> {
        validation::validate_purchase(quantity, customer_id)?;
        let publisher = self
            .publisher
            .as_ref()
            .ok_or(BookServiceError::PublisherUnconfigured)?;

        let mut book = self.books_repository.get_book(book_id).await?;
        if book.stock < quantity {
            return Err(BookServiceError::InsufficientStock {
                book_id: book.id,
                requested: quantity,
                available: book.stock,
            });
        }
        book.stock -= quantity;
        book.updated_at = self.next_updated_at(book.updated_at);
        let book = self.books_repository.update_book(book).await?;

        let message_id = publisher
            .publish(BookEvent::BookPurchased {
                book_id: book.id.clone(),
                quantity,
                customer_id: customer_id.trim().to_string(),
            })
            .await?;
        tracing::info!(
            "Purchase of {} x {} queued as {}, {} left",
            quantity,
            book.id,
            message_id,
            book.stock
        );
        Ok(message_id)
    }
}

#[cfg(test)]
mod book_service_tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicI64, Ordering};

    use chrono::TimeZone;

    use super::*;
    use crate::books_repository::InMemoryBookRepository;
    use crate::events_publisher::LogPublisher;

    #[derive(Default)]
    struct RecordingPublisher {
        events: parking_lot::Mutex<Vec<BookEvent>>,
    }

    #[async_trait::async_trait]
    impl EventPublisher for RecordingPublisher {
        async fn publish(&self, event: BookEvent) -> Result<MessageId, PublisherError> {
            let mut events = self.events.lock();
            events.push(event);
            Ok(format!("message-{}", events.len()))
        }
    }

    struct FailingPublisher;

    #[async_trait::async_trait]
    impl EventPublisher for FailingPublisher {
        async fn publish(&self, _event: BookEvent) -> Result<MessageId, PublisherError> {
            Err(PublisherError::Other("broker unavailable".to_string()))
        }
    }

    /// Repository where every read races with a delete: the book is returned
    /// and removed right after, so the following write finds nothing
    #[derive(Default)]
    struct DeletedAfterReadRepository {
        inner: InMemoryBookRepository,
    }

    #[async_trait::async_trait]
    impl BookRepository for DeletedAfterReadRepository {
        async fn list_books(
            &self,
            limit: i64,
            cursor: Option<&str>,
        ) -> Result<BookPage, BookRepositoryError> {
            self.inner.list_books(limit, cursor).await
        }

        async fn get_book(&self, book_id: &str) -> Result<Book, BookRepositoryError> {
            let book = self.inner.get_book(book_id).await?;
            self.inner.delete_book(book_id).await?;
            Ok(book)
        }

        async fn add_book(&self, book: Book) -> Result<Book, BookRepositoryError> {
            self.inner.add_book(book).await
        }

        async fn update_book(&self, book: Book) -> Result<Book, BookRepositoryError> {
            self.inner.update_book(book).await
        }

        async fn delete_book(&self, book_id: &str) -> Result<(), BookRepositoryError> {
            self.inner.delete_book(book_id).await
        }
    }

    /// Clock advancing by one second on every reading
    fn ticking_clock() -> Clock {
        let ticks = Arc::new(AtomicI64::new(0));
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Arc::new(move || start + Duration::seconds(ticks.fetch_add(1, Ordering::SeqCst)))
    }

    fn service_with(publisher: Option<Arc<dyn EventPublisher>>) -> BookService {
        let service = BookService::new(Arc::new(InMemoryBookRepository::default()))
            .with_clock(ticking_clock());
        match publisher {
            Some(publisher) => service.with_publisher(publisher),
            None => service,
        }
    }

    fn params(title: &str, stock: i64) -> CreateBookParams {
        CreateBookParams {
            title: title.to_string(),
            author: "A".to_string(),
            price: 10.0,
            currency: None,
            stock,
        }
    }

    #[tokio::test]
    /// Create -> purchase -> failed purchase -> delete -> get
    async fn test_purchase_scenario() {
        let service = service_with(Some(Arc::new(LogPublisher)));

        let book = service
            .create(CreateBookParams {
                currency: Some("".to_string()),
                ..params("Go", 2)
            })
            .await
            .expect("Failed to create book");
        assert_eq!(book.title, "Go");
        assert_eq!(book.currency, "USD");
        assert_eq!(book.stock, 2);

        let message_id = service.purchase(&book.id, 1, "cust").await.unwrap();
        assert!(!message_id.is_empty());
        let after_purchase = service.get(&book.id).await.unwrap();
        assert_eq!(after_purchase.stock, 1);
        assert!(after_purchase.updated_at > book.updated_at);

        let insufficient = service.purchase(&book.id, 5, "cust").await;
        assert!(matches!(
            insufficient,
            Err(BookServiceError::InsufficientStock {
                requested: 5,
                available: 1,
                ..
            })
        ));
        assert_eq!(service.get(&book.id).await.unwrap(), after_purchase);

        service.delete(&book.id).await.unwrap();
        assert!(matches!(
            service.get(&book.id).await,
            Err(BookServiceError::NotFound(..))
        ));
    }

    #[tokio::test]
    async fn test_create_trims_and_normalizes() {
        let service = service_with(None);
        let book = service
            .create(CreateBookParams {
                title: "  Dune ".to_string(),
                author: " Frank Herbert  ".to_string(),
                price: 0.0,
                currency: Some(" eur".to_string()),
                stock: 0,
            })
            .await
            .unwrap();

        assert_eq!(book.title, "Dune");
        assert_eq!(book.author, "Frank Herbert");
        assert_eq!(book.currency, "EUR");
        assert_eq!(book.created_at, book.updated_at);
        assert_eq!(service.get(&book.id).await.unwrap(), book);
    }

    #[tokio::test]
    async fn test_create_reports_every_invalid_field() {
        let service = service_with(None);
        let result = service
            .create(CreateBookParams {
                title: "".to_string(),
                author: " ".to_string(),
                price: -1.0,
                currency: Some("x".to_string()),
                stock: -1,
            })
            .await;

        match result {
            Err(BookServiceError::Validation(errors)) => assert!(errors.len() >= 4),
            other => panic!("Expected validation error, got {other:?}"),
        }
        assert!(service.list(10, None).await.unwrap().books.is_empty());
    }

    #[tokio::test]
    async fn test_create_assigns_fresh_ids_and_rejects_duplicate_titles() {
        let service = service_with(None);
        let first = service.create(params("one", 1)).await.unwrap();
        let second = service.create(params("two", 1)).await.unwrap();
        assert_ne!(first.id, second.id);

        // titles are compared after trimming
        let duplicate = service.create(params(" one ", 1)).await;
        assert!(matches!(
            duplicate,
            Err(BookServiceError::DuplicateTitle(title)) if title == "one"
        ));
    }

    #[tokio::test]
    /// Updating one field leaves the others untouched and moves updated_at forward
    async fn test_update_merges_present_fields_only() {
        let service = service_with(None);
        let book = service.create(params("Original", 3)).await.unwrap();

        let updated = service
            .update(
                &book.id,
                UpdateBookParams {
                    price: Some(25.5),
                    ..UpdateBookParams::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(
            updated,
            Book {
                price: 25.5,
                updated_at: updated.updated_at,
                ..book.clone()
            }
        );
        assert!(updated.updated_at > book.updated_at);
        assert_eq!(updated.created_at, book.created_at);

        let renamed = service
            .update(
                &book.id,
                UpdateBookParams {
                    title: Some(" Renamed ".to_string()),
                    currency: Some("pln".to_string()),
                    ..UpdateBookParams::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.title, "Renamed");
        assert_eq!(renamed.currency, "PLN");
        assert_eq!(renamed.price, 25.5);
        assert_eq!(renamed.stock, 3);
        assert!(renamed.updated_at > updated.updated_at);
    }

    #[tokio::test]
    async fn test_updated_at_moves_forward_with_a_frozen_clock() {
        let frozen = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let service = BookService::new(Arc::new(InMemoryBookRepository::default()))
            .with_clock(Arc::new(move || frozen));
        let book = service.create(params("Frozen", 1)).await.unwrap();
        let updated = service
            .update(
                &book.id,
                UpdateBookParams {
                    stock: Some(2),
                    ..UpdateBookParams::default()
                },
            )
            .await
            .unwrap();
        assert!(updated.updated_at > book.updated_at);
    }

    #[tokio::test]
    async fn test_update_failures() {
        let service = service_with(None);
        let book = service.create(params("First", 1)).await.unwrap();
        service.create(params("Second", 1)).await.unwrap();

        let empty = service.update(&book.id, UpdateBookParams::default()).await;
        assert!(matches!(empty, Err(BookServiceError::Validation(..))));

        let missing = service
            .update(
                "missing",
                UpdateBookParams {
                    stock: Some(1),
                    ..UpdateBookParams::default()
                },
            )
            .await;
        assert!(matches!(missing, Err(BookServiceError::NotFound(..))));

        let collision = service
            .update(
                &book.id,
                UpdateBookParams {
                    title: Some("Second".to_string()),
                    ..UpdateBookParams::default()
                },
            )
            .await;
        assert!(matches!(collision, Err(BookServiceError::DuplicateTitle(..))));

        let own_title = service
            .update(
                &book.id,
                UpdateBookParams {
                    title: Some("First".to_string()),
                    ..UpdateBookParams::default()
                },
            )
            .await;
        assert!(own_title.is_ok());
    }

    #[tokio::test]
    async fn test_create_publishes_event_and_ignores_publisher_failure() {
        let publisher = Arc::new(RecordingPublisher::default());
        let service = service_with(Some(publisher.clone()));
        let book = service.create(params("Published", 1)).await.unwrap();
        assert_eq!(
            publisher.events.lock().clone(),
            vec![BookEvent::BookCreated {
                book_id: book.id.clone(),
                title: "Published".to_string(),
                price: 10.0,
                currency: "USD".to_string(),
            }]
        );

        let service = service_with(Some(Arc::new(FailingPublisher)));
        let book = service.create(params("Not published", 1)).await.unwrap();
        assert_eq!(service.get(&book.id).await.unwrap(), book);
    }

    #[tokio::test]
    async fn test_purchase_validation_does_not_touch_the_store() {
        let publisher = Arc::new(RecordingPublisher::default());
        let service = service_with(Some(publisher.clone()));
        let book = service.create(params("Stocked", 5)).await.unwrap();
        publisher.events.lock().clear();

        for quantity in [0, -2] {
            let result = service.purchase(&book.id, quantity, "cust").await;
            assert!(matches!(result, Err(BookServiceError::Validation(..))));
        }
        assert_eq!(service.get(&book.id).await.unwrap(), book);
        assert!(publisher.events.lock().is_empty());

        assert!(matches!(
            service.purchase("missing", 1, "cust").await,
            Err(BookServiceError::NotFound(..))
        ));
    }

    #[tokio::test]
    async fn test_purchase_publishes_event_with_exact_decrement() {
        let publisher = Arc::new(RecordingPublisher::default());
        let service = service_with(Some(publisher.clone()));
        let book = service.create(params("Stocked", 5)).await.unwrap();

        let message_id = service.purchase(&book.id, 5, " cust-1 ").await.unwrap();
        assert_eq!(message_id, "message-2");
        assert_eq!(service.get(&book.id).await.unwrap().stock, 0);
        assert_eq!(
            publisher.events.lock().last().cloned(),
            Some(BookEvent::BookPurchased {
                book_id: book.id.clone(),
                quantity: 5,
                customer_id: "cust-1".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_purchase_requires_working_publisher() {
        let service = service_with(None);
        let book = service.create(params("No publisher", 5)).await.unwrap();
        assert!(matches!(
            service.purchase(&book.id, 1, "cust").await,
            Err(BookServiceError::PublisherUnconfigured)
        ));
        assert_eq!(service.get(&book.id).await.unwrap().stock, 5);

        let service = service_with(Some(Arc::new(FailingPublisher)));
        let book = service.create(params("Failing publisher", 5)).await.unwrap();
        assert!(matches!(
            service.purchase(&book.id, 1, "cust").await,
            Err(BookServiceError::Publisher(..))
        ));
        assert_eq!(service.get(&book.id).await.unwrap().stock, 4);
    }

    #[tokio::test]
    async fn test_delete_between_read_and_write_surfaces_not_found() {
        let publisher = Arc::new(RecordingPublisher::default());
        let repository = Arc::new(DeletedAfterReadRepository::default());
        let service = BookService::new(repository.clone())
            .with_clock(ticking_clock())
            .with_publisher(publisher.clone());

        let book = service.create(params("Vanishing", 5)).await.unwrap();
        let update = UpdateBookParams {
            stock: Some(1),
            ..UpdateBookParams::default()
        };
        assert!(matches!(
            service.update(&book.id, update).await,
            Err(BookServiceError::NotFound(id)) if id == book.id
        ));

        let book = service.create(params("Vanishing again", 5)).await.unwrap();
        assert!(matches!(
            service.purchase(&book.id, 1, "cust").await,
            Err(BookServiceError::NotFound(id)) if id == book.id
        ));

        // only the two creation events, nothing for the failed purchase
        let events = publisher.events.lock();
        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .all(|event| matches!(event, BookEvent::BookCreated { .. })));
        drop(events);
        assert!(repository.inner.list_books(0, None).await.unwrap().books.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_produce_distinct_ids() {
        const CALLERS: usize = 50;
        let service = BookService::new(Arc::new(InMemoryBookRepository::default()));

        let handles: Vec<_> = (0..CALLERS)
            .map(|i| {
                let service = service.clone();
                tokio::spawn(async move { service.create(params(&format!("title {i}"), 1)).await })
            })
            .collect();

        let mut ids = HashSet::new();
        for handle in handles {
            ids.insert(handle.await.unwrap().unwrap().id);
        }
        assert_eq!(ids.len(), CALLERS);
        assert_eq!(service.list(0, None).await.unwrap().books.len(), CALLERS);
    }
}
