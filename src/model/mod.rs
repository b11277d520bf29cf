//! Core data model: notification rows, recipient records, subscriptions,
//! and the typed read/update/delete filters the stores consume.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::channel::ChannelTag;

/// One persisted notification: a single (item, recipient) pair.
///
/// The uniqueness invariant is one row per
/// (`item_type`, `item_id`, `recipient_id`) triple, enforced by the dedup
/// read in the engine and backstopped by the store's unique key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Row identifier
    pub id: Uuid,
    /// Type identifier selecting the registered descriptor
    pub item_type: String,
    /// Subject entity id within the type's namespace
    pub item_id: i64,
    /// Recipient user id; never the anonymous sentinel or the acting user
    pub recipient_id: i64,
    /// Type-specific payload used to render the notification later
    pub payload: serde_json::Value,
    /// Creation timestamp, used for ordering
    pub created_at: DateTime<Utc>,
    /// Read flag, false on insert
    pub read: bool,
}

impl Notification {
    /// Create a fresh unread row for one recipient.
    pub fn new(
        item_type: impl Into<String>,
        item_id: i64,
        recipient_id: i64,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            item_type: item_type.into(),
            item_id,
            recipient_id,
            payload,
            created_at: Utc::now(),
            read: false,
        }
    }
}

/// Identity record for one recipient, loaded in batches by the cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientRecord {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl RecipientRecord {
    pub fn new(id: i64, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// A user's opt-in to a delivery channel for one item.
///
/// Subscriptions and notifications are separate entities sharing only the
/// item identity; a subscription may exist before any notification does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub item_type: String,
    pub item_id: i64,
    pub recipient_id: i64,
    pub channel: ChannelTag,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    pub fn new(
        item_type: impl Into<String>,
        item_id: i64,
        recipient_id: i64,
        channel: ChannelTag,
    ) -> Self {
        Self {
            item_type: item_type.into(),
            item_id,
            recipient_id,
            channel,
            created_at: Utc::now(),
        }
    }
}

/// Column to order a notification read by.
///
/// A closed enum instead of a raw column string keeps the order clause out
/// of untrusted input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderBy {
    #[default]
    CreatedAt,
    ItemId,
}

impl OrderBy {
    pub fn column(&self) -> &'static str {
        match self {
            OrderBy::CreatedAt => "created_at",
            OrderBy::ItemId => "item_id",
        }
    }
}

/// Order direction for a notification read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderDir {
    Asc,
    #[default]
    Desc,
}

impl OrderDir {
    pub fn keyword(&self) -> &'static str {
        match self {
            OrderDir::Asc => "ASC",
            OrderDir::Desc => "DESC",
        }
    }
}

/// Default page size for notification reads.
pub const DEFAULT_PAGE_SIZE: u32 = 5;

/// Filter for the paginated read path.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Recipient whose notifications are loaded
    pub recipient_id: i64,
    pub order_by: OrderBy,
    pub order_dir: OrderDir,
    pub limit: u32,
    pub offset: u32,
}

impl LoadOptions {
    /// Options for one recipient with the default ordering (newest first)
    /// and page size.
    pub fn for_recipient(recipient_id: i64) -> Self {
        Self {
            recipient_id,
            order_by: OrderBy::default(),
            order_dir: OrderDir::default(),
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    pub fn order(mut self, by: OrderBy, dir: OrderDir) -> Self {
        self.order_by = by;
        self.order_dir = dir;
        self
    }
}

/// Row match for update and delete operations: one item type, one or more
/// item ids, optionally narrowed to a single recipient.
#[derive(Debug, Clone)]
pub struct NotificationMatch {
    pub item_type: String,
    pub item_ids: Vec<i64>,
    pub recipient_id: Option<i64>,
}

impl NotificationMatch {
    pub fn item(item_type: impl Into<String>, item_id: i64) -> Self {
        Self {
            item_type: item_type.into(),
            item_ids: vec![item_id],
            recipient_id: None,
        }
    }

    pub fn items(item_type: impl Into<String>, item_ids: Vec<i64>) -> Self {
        Self {
            item_type: item_type.into(),
            item_ids,
            recipient_id: None,
        }
    }

    pub fn for_recipient(mut self, recipient_id: i64) -> Self {
        self.recipient_id = Some(recipient_id);
        self
    }

    /// Whether a row belongs to this match.
    pub fn matches(&self, row: &Notification) -> bool {
        row.item_type == self.item_type
            && self.item_ids.contains(&row.item_id)
            && self.recipient_id.map_or(true, |r| r == row.recipient_id)
    }
}

/// Fields applied to every matched row by an update.
#[derive(Debug, Clone, Default)]
pub struct UpdateFields {
    /// Replacement payload
    pub payload: Option<serde_json::Value>,
    /// New read-flag value
    pub read: Option<bool>,
}

impl UpdateFields {
    pub fn payload(payload: serde_json::Value) -> Self {
        Self {
            payload: Some(payload),
            read: None,
        }
    }

    pub fn mark_read() -> Self {
        Self {
            payload: None,
            read: Some(true),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_none() && self.read.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_notification_is_unread() {
        let n = Notification::new("reply", 7, 42, json!({"post_id": 7}));
        assert!(!n.read);
        assert_eq!(n.item_type, "reply");
        assert_eq!(n.item_id, 7);
        assert_eq!(n.recipient_id, 42);
    }

    #[test]
    fn test_load_options_defaults() {
        let opts = LoadOptions::for_recipient(42);
        assert_eq!(opts.recipient_id, 42);
        assert_eq!(opts.order_by, OrderBy::CreatedAt);
        assert_eq!(opts.order_dir, OrderDir::Desc);
        assert_eq!(opts.limit, DEFAULT_PAGE_SIZE);
        assert_eq!(opts.offset, 0);
    }

    #[test]
    fn test_match_narrowed_to_recipient() {
        let row = Notification::new("reply", 7, 42, json!({}));
        let m = NotificationMatch::item("reply", 7);
        assert!(m.matches(&row));
        assert!(m.clone().for_recipient(42).matches(&row));
        assert!(!m.for_recipient(43).matches(&row));
    }

    #[test]
    fn test_match_multiple_items() {
        let row = Notification::new("reply", 9, 42, json!({}));
        let m = NotificationMatch::items("reply", vec![7, 9]);
        assert!(m.matches(&row));
        assert!(!NotificationMatch::items("reply", vec![7, 8]).matches(&row));
        assert!(!NotificationMatch::items("mention", vec![9]).matches(&row));
    }

    #[test]
    fn test_order_columns() {
        assert_eq!(OrderBy::CreatedAt.column(), "created_at");
        assert_eq!(OrderDir::Desc.keyword(), "DESC");
    }
}
