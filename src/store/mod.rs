//! Persistence for orders and push recipients.
//!
//! The store performs no deduplication of its own beyond its unique keys
//! (`id`, `order_number`, `session_id`); idempotent reconciliation is built
//! on [`OrderStore::insert_if_absent`].

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{Order, OrderStatus, PushRecipient};
use crate::domain::value_objects::PushToken;

pub mod memory;
pub mod postgres;

pub use memory::{MemoryOrderStore, MemoryPushRecipientStore};
pub use postgres::{PgOrderStore, PgPushRecipientStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("order {0} not found")]
    NotFound(Uuid),

    /// A unique key is already taken.
    #[error("conflict on {0}")]
    Conflict(&'static str),

    /// The stored status no longer matches what the caller read.
    #[error("order {id} changed concurrently (now {actual})")]
    StaleStatus { id: Uuid, actual: OrderStatus },

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Result of an insert keyed on a payment session.
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    Inserted(Order),
    /// Another insert for the same session won; carries the stored order.
    AlreadyExists(Order),
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Stores a new order. Unique-key violations surface as [`StoreError::Conflict`].
    async fn insert(&self, order: &Order) -> Result<Uuid, StoreError>;

    /// Atomically stores `order` unless an order with the same session id exists.
    async fn insert_if_absent(&self, order: &Order) -> Result<InsertOutcome, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, StoreError>;

    async fn find_by_session_id(&self, session_id: &str) -> Result<Option<Order>, StoreError>;

    /// Compare-and-set on status; also derives `fulfilled`. Financial fields are untouched.
    async fn update_status(&self, id: Uuid, expected: OrderStatus, next: OrderStatus) -> Result<(), StoreError>;

    /// Newest first.
    async fn list_all(&self) -> Result<Vec<Order>, StoreError>;
}

#[async_trait]
pub trait PushRecipientStore: Send + Sync {
    async fn upsert(&self, token: PushToken) -> Result<PushRecipient, StoreError>;
    async fn list(&self) -> Result<Vec<PushRecipient>, StoreError>;
}
