use actix_web::http::header::LOCATION;
use actix_web::web::Data;
use actix_web::{Error, HttpResponse};
use paperclip::actix::{
    api_v2_operation,
    web::{self},
};

use crate::api::{
    BookId, CreateBookParams, ErrorResponse, HealthResponse, ListBooksQuery, PurchaseRequest,
    PurchaseResponse, UpdateBookParams,
};
use crate::book_service::{BookService, BookServiceError};

fn error_body(code: &str, err: &BookServiceError) -> ErrorResponse {
    ErrorResponse {
        error: err.to_string(),
        code: code.to_string(),
        details: vec![],
    }
}

/// Maps service errors to responses, only unexpected failures are logged
fn error_response(operation: &str, err: BookServiceError) -> HttpResponse {
    match err {
        BookServiceError::Validation(ref errors) => {
            HttpResponse::BadRequest().json(ErrorResponse {
                details: errors.clone().into_inner(),
                ..error_body("validation_failed", &err)
            })
        }
        BookServiceError::NotFound(_) => {
            HttpResponse::NotFound().json(error_body("not_found", &err))
        }
        BookServiceError::DuplicateTitle(_) => {
            HttpResponse::Conflict().json(error_body("duplicate_title", &err))
        }
        BookServiceError::InsufficientStock { .. } => {
            HttpResponse::Conflict().json(error_body("insufficient_stock", &err))
        }
        BookServiceError::PublisherUnconfigured => {
            HttpResponse::ServiceUnavailable().json(error_body("publisher_unconfigured", &err))
        }
        BookServiceError::Publisher(_) | BookServiceError::Repository(_) => {
            tracing::error!("{} failed {}", operation, err);
            HttpResponse::InternalServerError().json(error_body("internal", &err))
        }
    }
}

#[api_v2_operation]
pub async fn health() -> Result<HttpResponse, Error> {
    Ok(HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
    }))
}

#[api_v2_operation]
pub async fn list_books(
    book_service: Data<BookService>,
    query: web::Query<ListBooksQuery>,
) -> Result<HttpResponse, Error> {
    let query = query.into_inner();
    Ok(
        match book_service
            .list(query.limit.unwrap_or_default(), query.cursor.as_deref())
            .await
        {
            Ok(page) => HttpResponse::Ok().json(page),
            Err(err) => error_response("List books", err),
        },
    )
}

#[api_v2_operation]
pub async fn add_book(
    book_service: Data<BookService>,
    params: web::Json<CreateBookParams>,
) -> Result<HttpResponse, Error> {
    Ok(match book_service.create(params.into_inner()).await {
        Ok(book) => HttpResponse::Created()
            .append_header((LOCATION, format!("/api/book/{}", book.id)))
            .json(book),
        Err(err) => error_response("Add book", err),
    })
}

#[api_v2_operation]
pub async fn get_book(
    book_service: Data<BookService>,
    book_id: web::Path<BookId>,
) -> Result<HttpResponse, Error> {
    Ok(match book_service.get(&book_id.into_inner()).await {
        Ok(book) => HttpResponse::Ok().json(book),
        Err(err) => error_response("Get book", err),
    })
}

#[api_v2_operation]
pub async fn update_book(
    book_service: Data<BookService>,
    book_id: web::Path<BookId>,
    params: web::Json<UpdateBookParams>,
) -> Result<HttpResponse, Error> {
    Ok(
        match book_service
            .update(&book_id.into_inner(), params.into_inner())
            .await
        {
            Ok(book) => HttpResponse::Ok().json(book),
            Err(err) => error_response("Update book", err),
        },
    )
}

#[api_v2_operation]
pub async fn delete_book(
    book_service: Data<BookService>,
    book_id: web::Path<BookId>,
) -> Result<HttpResponse, Error> {
    Ok(match book_service.delete(&book_id.into_inner()).await {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(err) => error_response("Delete book", err),
    })
}

#[api_v2_operation]
pub async fn purchase_book(
    book_service: Data<BookService>,
    book_id: web::Path<BookId>,
    request: web::Json<PurchaseRequest>,
) -> Result<HttpResponse, Error> {
    let request = request.into_inner();
    Ok(
        match book_service
            .purchase(&book_id.into_inner(), request.quantity, &request.customer_id)
            .await
        {
            Ok(message_id) => HttpResponse::Accepted().json(PurchaseResponse { message_id }),
            Err(err) => error_response("Purchase book", err),
        },
    )
}
