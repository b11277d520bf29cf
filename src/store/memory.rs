//! In-memory storage backends using DashMap.
//!
//! Rows live in a map keyed by (item_type, item_id, recipient_id), so the
//! per-key atomicity of `DashMap::entry` doubles as the unique-key backstop
//! that guards the dedup-then-insert race.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::model::{
    LoadOptions, Notification, NotificationMatch, OrderBy, OrderDir, RecipientRecord,
    Subscription, UpdateFields,
};

use super::{NotificationStore, RecipientStore, StorageError};

type RowKey = (String, i64, i64);
type SubscriptionKey = (String, i64, i64, String);

/// In-memory notification store.
#[derive(Default)]
pub struct MemoryNotificationStore {
    rows: DashMap<RowKey, Notification>,
    subscriptions: DashMap<SubscriptionKey, Subscription>,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total persisted rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Whether a row exists for the triple.
    pub fn contains(&self, item_type: &str, item_id: i64, recipient_id: i64) -> bool {
        self.rows
            .contains_key(&(item_type.to_string(), item_id, recipient_id))
    }

    /// Snapshot of a single row.
    pub fn row(&self, item_type: &str, item_id: i64, recipient_id: i64) -> Option<Notification> {
        self.rows
            .get(&(item_type.to_string(), item_id, recipient_id))
            .map(|r| r.clone())
    }

    /// Total persisted subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn has_subscription(
        &self,
        item_type: &str,
        item_id: i64,
        recipient_id: i64,
        channel: &str,
    ) -> bool {
        self.subscriptions.contains_key(&(
            item_type.to_string(),
            item_id,
            recipient_id,
            channel.to_string(),
        ))
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn select(&self, options: &LoadOptions) -> Result<Vec<Notification>, StorageError> {
        let mut rows: Vec<Notification> = self
            .rows
            .iter()
            .filter(|r| r.recipient_id == options.recipient_id)
            .map(|r| r.clone())
            .collect();

        rows.sort_by(|a, b| {
            let ord = match options.order_by {
                OrderBy::CreatedAt => a.created_at.cmp(&b.created_at),
                OrderBy::ItemId => a.item_id.cmp(&b.item_id),
            };
            match options.order_dir {
                OrderDir::Asc => ord,
                OrderDir::Desc => ord.reverse(),
            }
        });

        Ok(rows
            .into_iter()
            .skip(options.offset as usize)
            .take(options.limit as usize)
            .collect())
    }

    async fn batch_insert(
        &self,
        rows: Vec<Notification>,
    ) -> Result<Vec<Notification>, StorageError> {
        let mut inserted = Vec::with_capacity(rows.len());

        for row in rows {
            let key = (row.item_type.clone(), row.item_id, row.recipient_id);
            match self.rows.entry(key) {
                dashmap::mapref::entry::Entry::Occupied(_) => {
                    // Lost the race or double-add; the existing row wins.
                    tracing::debug!(
                        item_type = %row.item_type,
                        item_id = row.item_id,
                        recipient_id = row.recipient_id,
                        "Skipping insert, recipient already notified"
                    );
                }
                dashmap::mapref::entry::Entry::Vacant(entry) => {
                    entry.insert(row.clone());
                    inserted.push(row);
                }
            }
        }

        Ok(inserted)
    }

    async fn update(
        &self,
        matcher: &NotificationMatch,
        fields: &UpdateFields,
    ) -> Result<u64, StorageError> {
        if fields.is_empty() {
            return Ok(0);
        }

        let mut affected = 0;
        for mut entry in self.rows.iter_mut() {
            if !matcher.matches(entry.value()) {
                continue;
            }
            if let Some(payload) = &fields.payload {
                entry.payload = payload.clone();
            }
            if let Some(read) = fields.read {
                entry.read = read;
            }
            affected += 1;
        }

        Ok(affected)
    }

    async fn delete(&self, matcher: &NotificationMatch) -> Result<u64, StorageError> {
        let keys: Vec<RowKey> = self
            .rows
            .iter()
            .filter(|r| matcher.matches(r.value()))
            .map(|r| r.key().clone())
            .collect();

        let mut removed = 0;
        for key in keys {
            if self.rows.remove(&key).is_some() {
                removed += 1;
            }
        }

        Ok(removed)
    }

    async fn existing_recipients(
        &self,
        item_type: &str,
        item_id: i64,
    ) -> Result<HashSet<i64>, StorageError> {
        Ok(self
            .rows
            .iter()
            .filter(|r| r.item_type == item_type && r.item_id == item_id)
            .map(|r| r.recipient_id)
            .collect())
    }

    async fn insert_subscription(&self, subscription: Subscription) -> Result<(), StorageError> {
        let key = (
            subscription.item_type.clone(),
            subscription.item_id,
            subscription.recipient_id,
            subscription.channel.as_str().to_string(),
        );
        self.subscriptions.entry(key).or_insert(subscription);
        Ok(())
    }

    async fn delete_subscription(
        &self,
        item_type: &str,
        item_id: i64,
        recipient_id: i64,
    ) -> Result<(), StorageError> {
        self.subscriptions.retain(|(t, i, r, _), _| {
            !(t.as_str() == item_type && *i == item_id && *r == recipient_id)
        });
        Ok(())
    }
}

/// In-memory recipient store.
///
/// Tracks how many batched reads were issued, so tests can assert the cache
/// never re-reads an already-loaded id.
#[derive(Default)]
pub struct MemoryRecipientStore {
    records: DashMap<i64, RecipientRecord>,
    batch_reads: AtomicUsize,
}

impl MemoryRecipientStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a recipient record.
    pub fn insert(&self, record: RecipientRecord) {
        self.records.insert(record.id, record);
    }

    /// Number of `batch_get` calls issued so far.
    pub fn batch_reads(&self) -> usize {
        self.batch_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecipientStore for MemoryRecipientStore {
    async fn batch_get(&self, ids: &[i64]) -> Result<Vec<RecipientRecord>, StorageError> {
        self.batch_reads.fetch_add(1, Ordering::SeqCst);
        Ok(ids
            .iter()
            .filter_map(|id| self.records.get(id).map(|r| r.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn store_with_rows(rows: Vec<Notification>) -> MemoryNotificationStore {
        let store = MemoryNotificationStore::new();
        for row in &rows {
            let key = (row.item_type.clone(), row.item_id, row.recipient_id);
            store.rows.insert(key, row.clone());
        }
        store
    }

    #[tokio::test]
    async fn test_batch_insert_skips_existing_triple() {
        let store = MemoryNotificationStore::new();

        let first = store
            .batch_insert(vec![Notification::new("reply", 7, 42, json!({"rev": 1}))])
            .await
            .unwrap();
        assert_eq!(first.len(), 1);

        let second = store
            .batch_insert(vec![
                Notification::new("reply", 7, 42, json!({"rev": 2})),
                Notification::new("reply", 7, 43, json!({"rev": 2})),
            ])
            .await
            .unwrap();

        assert_eq!(second.len(), 1);
        assert_eq!(second[0].recipient_id, 43);
        assert_eq!(store.row_count(), 2);
        // The original payload survived the duplicate insert.
        assert_eq!(store.row("reply", 7, 42).unwrap().payload, json!({"rev": 1}));
    }

    #[tokio::test]
    async fn test_select_orders_and_paginates() {
        let mut rows = Vec::new();
        for item in 1..=4 {
            let mut n = Notification::new("reply", item, 42, json!({}));
            n.created_at = chrono::Utc::now() + chrono::Duration::seconds(item);
            rows.push(n);
        }
        let store = store_with_rows(rows);

        let opts = LoadOptions::for_recipient(42).limit(2);
        let page = store.select(&opts).await.unwrap();
        assert_eq!(page.len(), 2);
        // Newest first by default.
        assert_eq!(page[0].item_id, 4);
        assert_eq!(page[1].item_id, 3);

        let rest = store.select(&opts.clone().offset(2)).await.unwrap();
        assert_eq!(rest[0].item_id, 2);
        assert_eq!(rest[1].item_id, 1);
    }

    #[tokio::test]
    async fn test_update_applies_fields_to_matched_rows() {
        let store = store_with_rows(vec![
            Notification::new("reply", 7, 42, json!({"rev": 1})),
            Notification::new("reply", 7, 43, json!({"rev": 1})),
            Notification::new("reply", 8, 42, json!({"rev": 1})),
        ]);

        let affected = store
            .update(
                &NotificationMatch::item("reply", 7),
                &UpdateFields::payload(json!({"rev": 2})),
            )
            .await
            .unwrap();

        assert_eq!(affected, 2);
        assert_eq!(store.row("reply", 7, 42).unwrap().payload, json!({"rev": 2}));
        assert_eq!(store.row("reply", 8, 42).unwrap().payload, json!({"rev": 1}));
    }

    #[tokio::test]
    async fn test_delete_missing_item_is_noop() {
        let store = store_with_rows(vec![Notification::new("reply", 7, 42, json!({}))]);

        let removed = store
            .delete(&NotificationMatch::item("reply", 999))
            .await
            .unwrap();

        assert_eq!(removed, 0);
        assert_eq!(store.row_count(), 1);
    }

    #[tokio::test]
    async fn test_existing_recipients() {
        let store = store_with_rows(vec![
            Notification::new("reply", 7, 42, json!({})),
            Notification::new("reply", 7, 43, json!({})),
            Notification::new("mention", 7, 44, json!({})),
        ]);

        let existing = store.existing_recipients("reply", 7).await.unwrap();
        assert_eq!(existing, HashSet::from([42, 43]));
    }

    #[tokio::test]
    async fn test_subscription_roundtrip() {
        use crate::channel::ChannelTag;

        let store = MemoryNotificationStore::new();
        let sub = Subscription::new("reply", 7, 42, ChannelTag::email());

        store.insert_subscription(sub.clone()).await.unwrap();
        store.insert_subscription(sub).await.unwrap();
        assert_eq!(store.subscription_count(), 1);
        assert!(store.has_subscription("reply", 7, 42, "email"));

        store.delete_subscription("reply", 7, 42).await.unwrap();
        assert_eq!(store.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_recipient_store_counts_reads() {
        let store = MemoryRecipientStore::new();
        store.insert(RecipientRecord::new(42, "alice"));

        let records = store.batch_get(&[42, 99]).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(store.batch_reads(), 1);
    }
}
