//! Session-scoped recipient identity cache.
//!
//! One cache lives for the duration of a single dispatch or load call and
//! is discarded afterwards, so stale identity data never leaks across
//! unrelated operations. All reads against the recipient store are batched:
//! `ensure_loaded` fetches exactly the ids not yet cached, and `get` never
//! falls back to a lazy single-id fetch.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{EngineError, Result};
use crate::metrics::RECIPIENT_BATCH_LOADS_TOTAL;
use crate::model::RecipientRecord;
use crate::store::RecipientStore;

pub struct RecipientCache {
    store: Arc<dyn RecipientStore>,
    records: HashMap<i64, RecipientRecord>,
    /// Ids we already asked for, including ones the store did not know.
    ensured: HashSet<i64>,
}

impl RecipientCache {
    pub fn new(store: Arc<dyn RecipientStore>) -> Self {
        Self {
            store,
            records: HashMap::new(),
            ensured: HashSet::new(),
        }
    }

    /// Load any of the given ids not yet in the cache, in one batched read.
    ///
    /// Calling this repeatedly with overlapping id sets issues at most one
    /// store read per id over the cache's lifetime.
    pub async fn ensure_loaded(&mut self, ids: impl IntoIterator<Item = i64>) -> Result<()> {
        let missing: Vec<i64> = ids
            .into_iter()
            .filter(|id| !self.ensured.contains(id))
            .collect::<HashSet<i64>>()
            .into_iter()
            .collect();

        if missing.is_empty() {
            return Ok(());
        }

        RECIPIENT_BATCH_LOADS_TOTAL.inc();
        tracing::debug!(count = missing.len(), "Loading recipients into session cache");

        let records = self.store.batch_get(&missing).await?;
        for record in records {
            self.records.insert(record.id, record);
        }
        self.ensured.extend(missing);

        Ok(())
    }

    /// Get a cached record.
    ///
    /// Fails with `NotLoaded` if the id was never passed to
    /// `ensure_loaded`; that is a caller bug. An id that was ensured but
    /// unknown to the store also reports `NotLoaded`.
    pub fn get(&self, recipient_id: i64) -> Result<&RecipientRecord> {
        self.records
            .get(&recipient_id)
            .ok_or(EngineError::NotLoaded(recipient_id))
    }

    /// Whether a record is present.
    pub fn contains(&self, recipient_id: i64) -> bool {
        self.records.contains_key(&recipient_id)
    }

    /// Number of cached records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
