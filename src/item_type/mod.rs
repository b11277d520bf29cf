//! Item types: the polymorphic behavior bundle keyed by a string tag.
//!
//! Each tracked item type (reply, mention, ...) registers one stateless
//! descriptor implementing [`ItemType`] at process start. The dispatch
//! engine resolves the descriptor by tag and delegates item-id computation,
//! recipient resolution, and payload construction to it.

mod mention;
mod registry;
mod reply;

pub use mention::MentionType;
pub use registry::TypeRegistry;
pub use reply::ReplyType;

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::channel::ChannelTag;
use crate::error::{EngineError, Result};
use crate::model::Notification;
use crate::store::{NotificationStore, StorageError};

/// Candidate recipients for one item, each with the channel tags they
/// should be delivered through. The `none` tag means record-only.
pub type RecipientMap = HashMap<i64, HashSet<ChannelTag>>;

/// Behavior descriptor for one item type.
///
/// Descriptors are stateless and registered once at startup; the engine
/// never mutates them. Payload methods are pure over the supplied event
/// data; only the update hook and the auxiliary load touch storage.
#[async_trait]
pub trait ItemType: Send + Sync {
    /// Compute the subject entity id from the event data.
    fn item_id(&self, data: &Value) -> Result<i64>;

    /// Resolve which users should be told, and through which channels.
    fn resolve_recipients(&self, data: &Value) -> Result<RecipientMap>;

    /// Build the payload persisted for one recipient's row.
    fn insert_payload(&self, data: &Value, recipient_id: i64) -> Result<Value>;

    /// Build the payload applied to all pre-existing rows for the item.
    fn update_payload(&self, data: &Value) -> Result<Value>;

    /// Recipient ids needed to render or deliver one notification.
    fn recipients_to_render(&self, notification: &Notification) -> HashSet<i64>;

    /// Optional override of the default update behavior.
    ///
    /// Runs before the default "apply update payload to existing rows"
    /// logic; returning `false` skips that logic, and abandons an in-flight
    /// add entirely (the item counts as already handled).
    async fn update_hook(&self, _store: &dyn NotificationStore, _data: &Value) -> Result<bool> {
        Ok(true)
    }

    /// Auxiliary data keys this notification needs on the read path.
    /// Types without auxiliary data return nothing.
    fn special_keys(&self, _notification: &Notification) -> Vec<i64> {
        Vec::new()
    }

    /// One batched load of auxiliary data for all collected keys of this
    /// type within a load call.
    async fn load_special(&self, _keys: &[i64]) -> Result<HashMap<i64, Value>> {
        Ok(HashMap::new())
    }
}

/// Batched source of type-specific auxiliary data (topic titles, post
/// bodies, ...). Item types that declare special data hold one of these.
#[async_trait]
pub trait AuxDataSource: Send + Sync {
    async fn batch_get(&self, keys: &[i64]) -> std::result::Result<HashMap<i64, Value>, StorageError>;
}

/// In-memory auxiliary data source for tests and embedding.
#[derive(Default)]
pub struct MemoryAuxSource {
    entries: DashMap<i64, Value>,
}

impl MemoryAuxSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: i64, value: Value) {
        self.entries.insert(key, value);
    }
}

#[async_trait]
impl AuxDataSource for MemoryAuxSource {
    async fn batch_get(&self, keys: &[i64]) -> std::result::Result<HashMap<i64, Value>, StorageError> {
        Ok(keys
            .iter()
            .filter_map(|k| self.entries.get(k).map(|v| (*k, v.clone())))
            .collect())
    }
}

pub(crate) fn require_i64(data: &Value, key: &str, item_type: &str) -> Result<i64> {
    data.get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| EngineError::invalid_data(item_type, format!("missing integer field `{key}`")))
}

/// Parse a `{"recipient_id": ["tag", ...]}` object into a recipient map.
pub(crate) fn parse_recipient_map(data: &Value, key: &str, item_type: &str) -> Result<RecipientMap> {
    let object = data
        .get(key)
        .and_then(Value::as_object)
        .ok_or_else(|| EngineError::invalid_data(item_type, format!("missing object field `{key}`")))?;

    let mut map = RecipientMap::new();
    for (raw_id, tags) in object {
        let recipient_id: i64 = raw_id.parse().map_err(|_| {
            EngineError::invalid_data(item_type, format!("non-integer recipient id `{raw_id}`"))
        })?;
        let tags = tags
            .as_array()
            .ok_or_else(|| {
                EngineError::invalid_data(item_type, format!("channel list for `{raw_id}` is not an array"))
            })?
            .iter()
            .filter_map(Value::as_str)
            .map(ChannelTag::from)
            .collect();
        map.insert(recipient_id, tags);
    }

    Ok(map)
}
