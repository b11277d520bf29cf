//! Channel sender contract and the process-wide sender registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::model::Notification;
use crate::recipient::RecipientCache;

use super::ChannelTag;

/// Errors reported by a channel flush.
///
/// These are reported per channel and never abort sibling channels or the
/// already-committed notification rows.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The sender rejected or failed the whole batch.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// A notification was queued for a tag with no registered sender.
    #[error("no sender registered for channel {0}")]
    NoSender(ChannelTag),
}

/// Per-notification outcome of a batch send.
#[derive(Debug, Clone, Serialize)]
pub struct SendOutcome {
    pub notification_id: Uuid,
    pub delivered: bool,
}

impl SendOutcome {
    pub fn delivered(notification_id: Uuid) -> Self {
        Self {
            notification_id,
            delivered: true,
        }
    }

    pub fn failed(notification_id: Uuid) -> Self {
        Self {
            notification_id,
            delivered: false,
        }
    }
}

/// One delivery transport (SMTP, push gateway, ...).
///
/// The engine guarantees every notification in the batch is already
/// persisted before `send` is invoked, and that the recipients returned by
/// the item type's render set are loaded in the supplied cache.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// Deliver a batch, reporting a per-item outcome.
    async fn send(
        &self,
        batch: &[Notification],
        recipients: &RecipientCache,
    ) -> Result<Vec<SendOutcome>, ChannelError>;
}

/// Process-wide registry mapping channel tags to senders.
///
/// Built once at startup, then frozen behind an `Arc`; reads need no
/// synchronization.
#[derive(Default)]
pub struct ChannelRegistry {
    senders: HashMap<ChannelTag, Arc<dyn ChannelSender>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sender for a tag. Replaces any previous sender for the
    /// same tag; record-only tags are ignored since they never flush.
    pub fn register(&mut self, tag: ChannelTag, sender: Arc<dyn ChannelSender>) {
        if tag.is_record_only() {
            tracing::warn!(channel = %tag, "Ignoring sender registration for record-only tag");
            return;
        }
        self.senders.insert(tag, sender);
    }

    pub fn get(&self, tag: &ChannelTag) -> Option<&Arc<dyn ChannelSender>> {
        self.senders.get(tag)
    }

    pub fn is_registered(&self, tag: &ChannelTag) -> bool {
        self.senders.contains_key(tag)
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}
