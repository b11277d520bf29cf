//! Mention notifications: the recipient's name was mentioned in a post.
//!
//! Demonstrates the update-hook override: a retracted mention (the edit
//! removed the recipient's name) deletes the superseded rows and stops the
//! default update logic instead of refreshing the rows in place.

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::Result;
use crate::model::{Notification, NotificationMatch};
use crate::store::NotificationStore;

use super::{parse_recipient_map, require_i64, ItemType, RecipientMap};

#[derive(Default)]
pub struct MentionType;

impl MentionType {
    pub const TYPE_ID: &'static str = "mention";

    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ItemType for MentionType {
    fn item_id(&self, data: &Value) -> Result<i64> {
        require_i64(data, "post_id", Self::TYPE_ID)
    }

    fn resolve_recipients(&self, data: &Value) -> Result<RecipientMap> {
        parse_recipient_map(data, "mentioned", Self::TYPE_ID)
    }

    fn insert_payload(&self, data: &Value, _recipient_id: i64) -> Result<Value> {
        Ok(json!({
            "post_id": require_i64(data, "post_id", Self::TYPE_ID)?,
            "mentioned_by": require_i64(data, "author_id", Self::TYPE_ID)?,
        }))
    }

    fn update_payload(&self, data: &Value) -> Result<Value> {
        Ok(json!({
            "post_id": require_i64(data, "post_id", Self::TYPE_ID)?,
            "mentioned_by": require_i64(data, "author_id", Self::TYPE_ID)?,
        }))
    }

    fn recipients_to_render(&self, notification: &Notification) -> HashSet<i64> {
        notification
            .payload
            .get("mentioned_by")
            .and_then(Value::as_i64)
            .into_iter()
            .collect()
    }

    async fn update_hook(&self, store: &dyn NotificationStore, data: &Value) -> Result<bool> {
        let retracted = data
            .get("retracted")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !retracted {
            return Ok(true);
        }

        // The mention no longer exists; its notifications are superseded.
        let item_id = self.item_id(data)?;
        let removed = store
            .delete(&NotificationMatch::item(Self::TYPE_ID, item_id))
            .await?;
        tracing::debug!(
            item_id = item_id,
            removed = removed,
            "Retracted mention, deleted superseded notifications"
        );
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use crate::store::MemoryNotificationStore;

    use super::*;

    fn event(retracted: bool) -> Value {
        json!({
            "post_id": 9,
            "author_id": 1,
            "retracted": retracted,
            "mentioned": {"42": ["in_app"]}
        })
    }

    #[test]
    fn test_resolve_mentioned_recipients() {
        let map = MentionType::new().resolve_recipients(&event(false)).unwrap();
        assert_eq!(map.len(), 1);
        assert!(map.contains_key(&42));
    }

    #[tokio::test]
    async fn test_hook_continues_for_normal_update() {
        let store = MemoryNotificationStore::new();
        let cont = MentionType::new()
            .update_hook(&store, &event(false))
            .await
            .unwrap();
        assert!(cont);
    }

    #[tokio::test]
    async fn test_retraction_deletes_and_stops() {
        let store = MemoryNotificationStore::new();
        store
            .batch_insert(vec![Notification::new(MentionType::TYPE_ID, 9, 42, json!({}))])
            .await
            .unwrap();

        let cont = MentionType::new()
            .update_hook(&store, &event(true))
            .await
            .unwrap();

        assert!(!cont);
        assert_eq!(store.row_count(), 0);
    }
}
