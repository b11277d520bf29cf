//! Read path: paginated retrieval plus batched hydration.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;
use crate::item_type::ItemType;
use crate::model::{LoadOptions, Notification, RecipientRecord};
use crate::recipient::RecipientCache;

use super::DispatchEngine;

/// One page of a recipient's notifications, with the identity and
/// auxiliary data needed to render them.
///
/// The recipient cache is handed back to the caller so render code can
/// resolve any id the loaded types declared, without further store reads.
pub struct LoadedNotifications {
    notifications: Vec<Notification>,
    recipients: RecipientCache,
    special: HashMap<String, HashMap<i64, Value>>,
}

impl LoadedNotifications {
    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn into_notifications(self) -> Vec<Notification> {
        self.notifications
    }

    pub fn len(&self) -> usize {
        self.notifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }

    /// Resolve a recipient referenced by the loaded notifications.
    pub fn recipient(&self, recipient_id: i64) -> Result<&RecipientRecord> {
        self.recipients.get(recipient_id)
    }

    /// Auxiliary data one type loaded for this page, keyed by its own ids.
    pub fn special(&self, type_id: &str) -> Option<&HashMap<i64, Value>> {
        self.special.get(type_id)
    }
}

impl DispatchEngine {
    /// Load options for a recipient using the configured page size.
    pub fn default_load_options(&self, recipient_id: i64) -> LoadOptions {
        LoadOptions::for_recipient(recipient_id).limit(self.config().page_size)
    }

    /// Load a page of a recipient's notifications.
    ///
    /// After the primary read: one batched recipient load covering the
    /// union of every type's render set, then one auxiliary load per type
    /// that declared special keys, regardless of how many rows of that
    /// type were loaded. Item types read back from storage are sanitized
    /// before lookup.
    #[tracing::instrument(
        name = "engine.load",
        skip(self, options),
        fields(recipient_id = options.recipient_id, limit = options.limit, offset = options.offset)
    )]
    pub async fn load(&self, options: LoadOptions) -> Result<LoadedNotifications> {
        let notifications = self.notification_store().select(&options).await?;

        let mut needed: HashSet<i64> = HashSet::new();
        let mut per_type: HashMap<String, (Arc<dyn ItemType>, Vec<i64>)> = HashMap::new();

        for row in &notifications {
            let (type_id, descriptor) = self.types().resolve_stored(&row.item_type)?;
            needed.extend(descriptor.recipients_to_render(row));

            let entry = per_type
                .entry(type_id)
                .or_insert_with(|| (descriptor, Vec::new()));
            entry.1.extend(entry.0.special_keys(row));
        }

        let mut recipients = RecipientCache::new(self.recipient_store().clone());
        recipients.ensure_loaded(needed).await?;

        let mut special = HashMap::new();
        for (type_id, (descriptor, mut keys)) in per_type {
            keys.sort_unstable();
            keys.dedup();
            if keys.is_empty() {
                continue;
            }
            let data = descriptor.load_special(&keys).await?;
            tracing::debug!(
                item_type = %type_id,
                keys = keys.len(),
                "Loaded type-specific auxiliary data"
            );
            special.insert(type_id, data);
        }

        Ok(LoadedNotifications {
            notifications,
            recipients,
            special,
        })
    }
}
