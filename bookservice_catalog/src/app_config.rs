use std::sync::Arc;

use actix_cors::Cors;
use actix_web::http::header;
use actix_web::middleware::Condition;
use anyhow::Context;
use paperclip::actix::web;

use crate::book_service::BookService;
use crate::books_repository::{BookRepository, InMemoryBookRepository, PostgresBooksRepository};
use crate::events_publisher::{log_queued_messages, ChannelPublisher, LogPublisher};
use crate::handlers;
use crate::settings::{CorsSettings, PublisherKind, Settings};

pub fn config_app(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(handlers::health)))
        .service(
            web::scope("/api")
                .service(web::resource("/books").route(web::get().to(handlers::list_books)))
                .service(
                    web::scope("/book")
                        .service(web::resource("").route(web::post().to(handlers::add_book)))
                        .service(
                            web::resource("/{book_id}")
                                .route(web::get().to(handlers::get_book))
                                .route(web::patch().to(handlers::update_book))
                                .route(web::delete().to(handlers::delete_book)),
                        )
                        .service(
                            web::resource("/{book_id}/purchase")
                                .route(web::post().to(handlers::purchase_book)),
                        ),
                ),
        );
}

/// Permissive CORS for browser clients, a no-op when disabled in the settings
pub fn build_cors(settings: &CorsSettings) -> Condition<Cors> {
    let cors = Cors::default()
        .allow_any_origin()
        .send_wildcard()
        .allowed_methods(vec!["GET", "POST", "PATCH", "DELETE", "OPTIONS"])
        .allowed_headers(vec![
            header::ACCEPT,
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ORIGIN,
        ])
        .max_age(settings.max_age_seconds);
    Condition::new(settings.enabled, cors)
}

/// Builds the book service with the backends selected in the settings.
/// Must run inside a tokio runtime: the postgres connection and the queue consumer are spawned on it.
pub async fn build_book_service(settings: &Settings) -> anyhow::Result<BookService> {
    let books_repository: Arc<dyn BookRepository> = if settings.database.use_in_memory_db {
        tracing::info!("Using in-memory books repository");
        Arc::new(InMemoryBookRepository::default())
    } else {
        Arc::new(
            PostgresBooksRepository::init(settings.database.postgres_config())
                .await
                .context("Failed to init postgres")?,
        )
    };

    let book_service = BookService::new(books_repository);
    Ok(match settings.publisher.kind {
        PublisherKind::Log => book_service.with_publisher(Arc::new(LogPublisher)),
        PublisherKind::Queue => {
            let (publisher, receiver) = ChannelPublisher::new(settings.publisher.queue_capacity);
            tokio::spawn(log_queued_messages(receiver));
            book_service.with_publisher(Arc::new(publisher))
        }
        PublisherKind::Disabled => {
            tracing::warn!("Event publisher disabled; book purchases will be rejected");
            book_service
        }
    })
}
