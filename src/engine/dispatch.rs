use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::channel::{ChannelFlushResult, ChannelQueues, ChannelRegistry, ChannelTag};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::item_type::{ItemType, RecipientMap, TypeRegistry};
use crate::metrics::{DEDUP_SKIPPED_TOTAL, NOTIFICATIONS_DELETED_TOTAL, NOTIFICATIONS_INSERTED_TOTAL};
use crate::model::{Notification, NotificationMatch, Subscription, UpdateFields};
use crate::recipient::RecipientCache;
use crate::store::{NotificationStore, RecipientStore};

/// Result of one add operation.
#[derive(Debug, Serialize)]
pub struct DispatchResult {
    /// Subject item id computed by the type descriptor
    pub item_id: i64,
    /// Rows persisted by this call
    pub inserted: usize,
    /// Candidates dropped by the dedup read (already notified)
    pub skipped_existing: usize,
    /// Rows dropped by the store's unique key (lost a concurrent race)
    pub deduped_on_insert: usize,
    /// The type's update hook consumed the event; nothing was added
    pub handled_by_type: bool,
    /// Per-channel flush outcomes, one entry per flushed channel
    pub channels: Vec<ChannelFlushResult>,
}

impl DispatchResult {
    fn empty(item_id: i64) -> Self {
        Self {
            item_id,
            inserted: 0,
            skipped_existing: 0,
            deduped_on_insert: 0,
            handled_by_type: false,
            channels: Vec::new(),
        }
    }

    fn handled(item_id: i64) -> Self {
        Self {
            handled_by_type: true,
            ..Self::empty(item_id)
        }
    }
}

/// Orchestrates notification fan-out.
///
/// Holds the process-wide registries and store handles; everything
/// session-scoped lives inside the individual operations.
pub struct DispatchEngine {
    types: Arc<TypeRegistry>,
    channels: Arc<ChannelRegistry>,
    notifications: Arc<dyn NotificationStore>,
    recipients: Arc<dyn RecipientStore>,
    config: EngineConfig,
}

impl DispatchEngine {
    pub fn new(
        types: Arc<TypeRegistry>,
        channels: Arc<ChannelRegistry>,
        notifications: Arc<dyn NotificationStore>,
        recipients: Arc<dyn RecipientStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            types,
            channels,
            notifications,
            recipients,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub(crate) fn notification_store(&self) -> &Arc<dyn NotificationStore> {
        &self.notifications
    }

    pub(crate) fn recipient_store(&self) -> &Arc<dyn RecipientStore> {
        &self.recipients
    }

    /// Add a notification for an event, letting the item type resolve the
    /// recipients.
    ///
    /// Pre-existing rows for the item are refreshed first; if the type's
    /// update hook reports the event as fully handled, the add is
    /// abandoned.
    #[tracing::instrument(
        name = "engine.add_notification",
        skip(self, data),
        fields(item_type = %type_id, acting_user = acting_user)
    )]
    pub async fn add_notification(
        &self,
        acting_user: i64,
        type_id: &str,
        data: &Value,
    ) -> Result<DispatchResult> {
        let descriptor = self.types.resolve(type_id)?;
        let item_id = descriptor.item_id(data)?;

        if !self.run_update(descriptor.as_ref(), type_id, data).await? {
            tracing::debug!(item_id = item_id, "Update hook consumed the event, abandoning add");
            return Ok(DispatchResult::handled(item_id));
        }

        let recipients = descriptor.resolve_recipients(data)?;
        self.add_notifications_for_users(acting_user, type_id, data, recipients)
            .await
    }

    /// Add a notification for an explicit recipient map.
    ///
    /// The anonymous sentinel and the acting user are stripped, then every
    /// recipient already notified for this item. Surviving recipients get
    /// one row each, persisted in a single batched insert; only rows the
    /// store actually wrote are queued for delivery, so a row lost to a
    /// concurrent writer is neither duplicated nor delivered twice from
    /// here.
    #[tracing::instrument(
        name = "engine.add_notifications_for_users",
        skip(self, data, recipients),
        fields(item_type = %type_id, acting_user = acting_user, candidates = recipients.len())
    )]
    pub async fn add_notifications_for_users(
        &self,
        acting_user: i64,
        type_id: &str,
        data: &Value,
        mut recipients: RecipientMap,
    ) -> Result<DispatchResult> {
        let descriptor = self.types.resolve(type_id)?;
        let item_id = descriptor.item_id(data)?;

        // Never notify the anonymous user or the actor themselves.
        recipients.remove(&self.config.anonymous_recipient_id);
        recipients.remove(&acting_user);

        // Dedup read: an item may gain new eligible users after it already
        // exists, so drop everyone notified before.
        let already = self
            .notifications
            .existing_recipients(type_id, item_id)
            .await?;
        let candidates = recipients.len();
        recipients.retain(|id, _| !already.contains(id));
        let skipped_existing = candidates - recipients.len();
        if skipped_existing > 0 {
            DEDUP_SKIPPED_TOTAL.inc_by(skipped_existing as u64);
            tracing::debug!(
                item_id = item_id,
                skipped = skipped_existing,
                "Dropped already-notified recipients"
            );
        }

        if recipients.is_empty() {
            return Ok(DispatchResult {
                skipped_existing,
                ..DispatchResult::empty(item_id)
            });
        }

        let mut rows = Vec::with_capacity(recipients.len());
        for &recipient_id in recipients.keys() {
            let payload = descriptor.insert_payload(data, recipient_id)?;
            rows.push(Notification::new(type_id, item_id, recipient_id, payload));
        }

        let inserted = self.notifications.batch_insert(rows).await?;
        NOTIFICATIONS_INSERTED_TOTAL.inc_by(inserted.len() as u64);
        let deduped_on_insert = recipients.len() - inserted.len();
        if deduped_on_insert > 0 {
            DEDUP_SKIPPED_TOTAL.inc_by(deduped_on_insert as u64);
            tracing::debug!(
                item_id = item_id,
                skipped = deduped_on_insert,
                "Concurrent writer already notified some recipients"
            );
        }

        // Deliver-after-persist: only committed rows reach a channel.
        let mut queues = ChannelQueues::new();
        let mut needed: HashSet<i64> = HashSet::new();
        for row in &inserted {
            if let Some(tags) = recipients.get(&row.recipient_id) {
                for tag in tags {
                    queues.enqueue(tag, row);
                }
            }
            needed.extend(descriptor.recipients_to_render(row));
        }

        let mut cache = RecipientCache::new(self.recipients.clone());
        cache.ensure_loaded(needed).await?;

        let channels = queues.flush_all(&self.channels, &cache).await;

        tracing::info!(
            item_type = %type_id,
            item_id = item_id,
            inserted = inserted.len(),
            channels = channels.len(),
            "Dispatched notifications"
        );

        Ok(DispatchResult {
            item_id,
            inserted: inserted.len(),
            skipped_existing,
            deduped_on_insert,
            handled_by_type: false,
            channels,
        })
    }

    /// Refresh all pre-existing rows for an item.
    ///
    /// Returns `false` when the type's hook short-circuited the default
    /// update logic.
    #[tracing::instrument(
        name = "engine.update_notifications",
        skip(self, data),
        fields(item_type = %type_id)
    )]
    pub async fn update_notifications(&self, type_id: &str, data: &Value) -> Result<bool> {
        let descriptor = self.types.resolve(type_id)?;
        self.run_update(descriptor.as_ref(), type_id, data).await
    }

    async fn run_update(
        &self,
        descriptor: &dyn ItemType,
        type_id: &str,
        data: &Value,
    ) -> Result<bool> {
        if !descriptor
            .update_hook(self.notifications.as_ref(), data)
            .await?
        {
            return Ok(false);
        }

        let item_id = descriptor.item_id(data)?;
        let payload = descriptor.update_payload(data)?;
        let affected = self
            .notifications
            .update(
                &NotificationMatch::item(type_id, item_id),
                &UpdateFields::payload(payload),
            )
            .await?;

        if affected > 0 {
            tracing::debug!(
                item_type = %type_id,
                item_id = item_id,
                affected = affected,
                "Refreshed existing notifications"
            );
        }

        Ok(true)
    }

    /// Delete all rows for one or more items of a type.
    ///
    /// Idempotent: deleting a non-existent item removes zero rows and is
    /// not an error.
    #[tracing::instrument(name = "engine.delete_notifications", skip(self), fields(item_type = %type_id))]
    pub async fn delete_notifications(&self, type_id: &str, item_ids: Vec<i64>) -> Result<u64> {
        let removed = self
            .notifications
            .delete(&NotificationMatch::items(type_id, item_ids))
            .await?;
        NOTIFICATIONS_DELETED_TOTAL.inc_by(removed);
        Ok(removed)
    }

    /// Mark one recipient's rows for an item as read.
    #[tracing::instrument(name = "engine.mark_read", skip(self), fields(item_type = %type_id))]
    pub async fn mark_read(&self, recipient_id: i64, type_id: &str, item_id: i64) -> Result<u64> {
        let affected = self
            .notifications
            .update(
                &NotificationMatch::item(type_id, item_id).for_recipient(recipient_id),
                &UpdateFields::mark_read(),
            )
            .await?;
        Ok(affected)
    }

    /// Record the acting user's opt-in to a channel for an item.
    ///
    /// Subscriptions and notifications are separate entities sharing only
    /// the item identity; no notification row needs to exist yet.
    #[tracing::instrument(name = "engine.add_subscription", skip(self), fields(item_type = %type_id))]
    pub async fn add_subscription(
        &self,
        acting_user: i64,
        type_id: &str,
        item_id: i64,
        channel: ChannelTag,
    ) -> Result<()> {
        self.types.resolve(type_id)?;
        self.notifications
            .insert_subscription(Subscription::new(type_id, item_id, acting_user, channel))
            .await?;
        Ok(())
    }

    /// Remove the acting user's opt-ins for an item.
    #[tracing::instrument(name = "engine.delete_subscription", skip(self), fields(item_type = %type_id))]
    pub async fn delete_subscription(
        &self,
        acting_user: i64,
        type_id: &str,
        item_id: i64,
    ) -> Result<()> {
        self.notifications
            .delete_subscription(type_id, item_id, acting_user)
            .await?;
        Ok(())
    }
}
