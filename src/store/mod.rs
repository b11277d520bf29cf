//! Storage contracts consumed by the engine.
//!
//! Two backends are provided: an in-memory implementation backed by
//! `DashMap` (tests, embedding) and a PostgreSQL implementation backed by
//! `sqlx`. Both enforce the uniqueness backstop on
//! (item_type, item_id, recipient_id): the batched insert silently skips
//! rows that already exist and reports only the rows it actually wrote.

mod memory;
mod postgres;

pub use memory::{MemoryNotificationStore, MemoryRecipientStore};
pub use postgres::{PostgresNotificationStore, PostgresRecipientStore};

use std::collections::HashSet;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{LoadOptions, Notification, NotificationMatch, RecipientRecord, Subscription, UpdateFields};

/// Transport or constraint failure from a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Notification persistence.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Paginated, ordered read of one recipient's notifications.
    async fn select(&self, options: &LoadOptions) -> Result<Vec<Notification>, StorageError>;

    /// Insert a batch of rows, skipping any that collide with the unique
    /// key on (item_type, item_id, recipient_id).
    ///
    /// Returns the rows actually inserted; a skipped row means the
    /// recipient was already notified (an expected dedup outcome, not an
    /// error).
    async fn batch_insert(
        &self,
        rows: Vec<Notification>,
    ) -> Result<Vec<Notification>, StorageError>;

    /// Apply fields to every matched row. Returns the affected row count.
    async fn update(
        &self,
        matcher: &NotificationMatch,
        fields: &UpdateFields,
    ) -> Result<u64, StorageError>;

    /// Delete every matched row. Returns the affected row count; matching
    /// nothing is a no-op, not an error.
    async fn delete(&self, matcher: &NotificationMatch) -> Result<u64, StorageError>;

    /// Recipient ids already notified for one item.
    async fn existing_recipients(
        &self,
        item_type: &str,
        item_id: i64,
    ) -> Result<HashSet<i64>, StorageError>;

    /// Record a channel opt-in for one item. Idempotent.
    async fn insert_subscription(&self, subscription: Subscription) -> Result<(), StorageError>;

    /// Remove a user's opt-ins for one item.
    async fn delete_subscription(
        &self,
        item_type: &str,
        item_id: i64,
        recipient_id: i64,
    ) -> Result<(), StorageError>;
}

/// Recipient identity reads, always batched.
#[async_trait]
pub trait RecipientStore: Send + Sync {
    /// Fetch the records for the given ids. Unknown ids are simply absent
    /// from the result.
    async fn batch_get(&self, ids: &[i64]) -> Result<Vec<RecipientRecord>, StorageError>;
}
