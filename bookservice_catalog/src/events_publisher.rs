use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::api::{BookId, CustomerId, MessageId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
/// Domain events emitted by the book service
pub enum BookEvent {
    BookCreated {
        book_id: BookId,
        title: String,
        price: f64,
        currency: String,
    },
    BookPurchased {
        book_id: BookId,
        quantity: i64,
        customer_id: CustomerId,
    },
}

impl BookEvent {
    pub fn book_id(&self) -> &str {
        match self {
            BookEvent::BookCreated { book_id, .. } | BookEvent::BookPurchased { book_id, .. } => {
                book_id
            }
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            BookEvent::BookCreated { .. } => "BOOK_CREATED",
            BookEvent::BookPurchased { .. } => "BOOK_PURCHASED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Event together with the id assigned by the publisher
pub struct PublishedMessage {
    pub message_id: MessageId,
    pub published_at: DateTime<Utc>,
    pub event: BookEvent,
}

#[derive(thiserror::Error, Debug)]
pub enum PublisherError {
    #[error("Event queue is full")]
    QueueFull,

    #[error("Event queue is closed")]
    QueueClosed,

    #[error("Failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Other error {0}")]
    Other(String),
}

#[async_trait::async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes the event once, returns the id of the published message
    async fn publish(&self, event: BookEvent) -> Result<MessageId, PublisherError>;
}

fn new_message_id() -> MessageId {
    uuid::Uuid::new_v4().to_string()
}

/// Publisher that only writes events to the log
#[derive(Default)]
pub struct LogPublisher;

#[async_trait::async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, event: BookEvent) -> Result<MessageId, PublisherError> {
        let payload = serde_json::to_string(&event)?;
        let message_id = new_message_id();
        tracing::info!(
            message_id = %message_id,
            event_type = event.event_type(),
            book_id = event.book_id(),
            payload = %payload,
            "Book event published"
        );
        Ok(message_id)
    }
}

/// Publisher backed by a bounded in-process queue.
/// Never waits for room in the queue, a full queue fails the publish.
pub struct ChannelPublisher {
    sender: mpsc::Sender<PublishedMessage>,
}

impl ChannelPublisher {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<PublishedMessage>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait::async_trait]
impl EventPublisher for ChannelPublisher {
    async fn publish(&self, event: BookEvent) -> Result<MessageId, PublisherError> {
        let message_id = new_message_id();
        let message = PublishedMessage {
            message_id: message_id.clone(),
            published_at: Utc::now(),
            event,
        };
        self.sender.try_send(message).map_err(|err| match err {
            TrySendError::Full(_) => PublisherError::QueueFull,
            TrySendError::Closed(_) => PublisherError::QueueClosed,
        })?;
        Ok(message_id)
    }
}

/// Drains the queue until every sender is dropped, logging each message
pub async fn log_queued_messages(mut receiver: mpsc::Receiver<PublishedMessage>) -> usize {
    let mut consumed = 0;
    while let Some(message) = receiver.recv().await {
        tracing::info!(
            message_id = %message.message_id,
            event_type = message.event.event_type(),
            book_id = message.event.book_id(),
            "Consumed queued book event"
        );
        consumed += 1;
    }
    tracing::info!("Book event queue closed after {} messages", consumed);
    consumed
}
