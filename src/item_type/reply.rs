//! Reply notifications: someone replied in a topic the recipient follows.
//!
//! Event data shape:
//!
//! ```json
//! {
//!   "post_id": 7,
//!   "topic_id": 3,
//!   "author_id": 1,
//!   "excerpt": "…",
//!   "recipients": { "42": ["email"], "43": ["none"] }
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::Result;
use crate::model::Notification;

use super::{parse_recipient_map, require_i64, AuxDataSource, ItemType, RecipientMap};

pub struct ReplyType {
    /// Topic metadata (titles) for the read path, one batched load per call.
    topics: Arc<dyn AuxDataSource>,
}

impl ReplyType {
    pub const TYPE_ID: &'static str = "reply";

    pub fn new(topics: Arc<dyn AuxDataSource>) -> Self {
        Self { topics }
    }
}

#[async_trait]
impl ItemType for ReplyType {
    fn item_id(&self, data: &Value) -> Result<i64> {
        require_i64(data, "post_id", Self::TYPE_ID)
    }

    fn resolve_recipients(&self, data: &Value) -> Result<RecipientMap> {
        parse_recipient_map(data, "recipients", Self::TYPE_ID)
    }

    fn insert_payload(&self, data: &Value, _recipient_id: i64) -> Result<Value> {
        Ok(json!({
            "post_id": require_i64(data, "post_id", Self::TYPE_ID)?,
            "topic_id": require_i64(data, "topic_id", Self::TYPE_ID)?,
            "author_id": require_i64(data, "author_id", Self::TYPE_ID)?,
            "excerpt": data.get("excerpt").cloned().unwrap_or(Value::Null),
        }))
    }

    fn update_payload(&self, data: &Value) -> Result<Value> {
        // An edited reply refreshes the excerpt on every existing row.
        Ok(json!({
            "post_id": require_i64(data, "post_id", Self::TYPE_ID)?,
            "topic_id": require_i64(data, "topic_id", Self::TYPE_ID)?,
            "author_id": require_i64(data, "author_id", Self::TYPE_ID)?,
            "excerpt": data.get("excerpt").cloned().unwrap_or(Value::Null),
        }))
    }

    fn recipients_to_render(&self, notification: &Notification) -> HashSet<i64> {
        notification
            .payload
            .get("author_id")
            .and_then(Value::as_i64)
            .into_iter()
            .collect()
    }

    fn special_keys(&self, notification: &Notification) -> Vec<i64> {
        notification
            .payload
            .get("topic_id")
            .and_then(Value::as_i64)
            .into_iter()
            .collect()
    }

    async fn load_special(&self, keys: &[i64]) -> Result<HashMap<i64, Value>> {
        Ok(self.topics.batch_get(keys).await?)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::EngineError;
    use crate::item_type::MemoryAuxSource;
    use crate::store::StorageError;

    use super::*;

    fn reply_type() -> ReplyType {
        ReplyType::new(Arc::new(MemoryAuxSource::new()))
    }

    fn event() -> Value {
        json!({
            "post_id": 7,
            "topic_id": 3,
            "author_id": 1,
            "excerpt": "quoted text",
            "recipients": {"42": ["email"], "43": ["none"]}
        })
    }

    #[test]
    fn test_item_id_from_post() {
        assert_eq!(reply_type().item_id(&event()).unwrap(), 7);
        assert!(reply_type().item_id(&json!({})).is_err());
    }

    #[test]
    fn test_insert_payload_carries_render_fields() {
        let payload = reply_type().insert_payload(&event(), 42).unwrap();
        assert_eq!(payload["post_id"], 7);
        assert_eq!(payload["author_id"], 1);
        assert_eq!(payload["excerpt"], "quoted text");
    }

    #[test]
    fn test_render_set_is_the_author() {
        let payload = reply_type().insert_payload(&event(), 42).unwrap();
        let notification = Notification::new(ReplyType::TYPE_ID, 7, 42, payload);
        assert_eq!(
            reply_type().recipients_to_render(&notification),
            HashSet::from([1])
        );
    }

    #[tokio::test]
    async fn test_special_data_from_topic_source() {
        let topics = Arc::new(MemoryAuxSource::new());
        topics.insert(3, json!({"title": "Release planning"}));
        let reply = ReplyType::new(topics);

        let payload = reply.insert_payload(&event(), 42).unwrap();
        let notification = Notification::new(ReplyType::TYPE_ID, 7, 42, payload);
        assert_eq!(reply.special_keys(&notification), vec![3]);

        let special = reply.load_special(&[3]).await.unwrap();
        assert_eq!(special[&3]["title"], "Release planning");
    }

    struct UnavailableSource;

    #[async_trait]
    impl AuxDataSource for UnavailableSource {
        async fn batch_get(
            &self,
            _keys: &[i64],
        ) -> std::result::Result<HashMap<i64, Value>, StorageError> {
            Err(StorageError::Unavailable("topic store offline".into()))
        }
    }

    #[tokio::test]
    async fn test_special_data_failure_surfaces_as_storage_error() {
        let reply = ReplyType::new(Arc::new(UnavailableSource));

        let error = reply.load_special(&[3]).await.unwrap_err();
        assert!(matches!(error, EngineError::Storage(_)));
    }
}
