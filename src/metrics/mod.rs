//! Prometheus metrics for the notification engine.
//!
//! Counters cover the write path (inserts, dedup skips, deletes), channel
//! flushing, and recipient batch loads.

use lazy_static::lazy_static;
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "mira";

lazy_static! {
    /// Notification rows persisted by the batched insert
    pub static ref NOTIFICATIONS_INSERTED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_notifications_inserted_total", METRIC_PREFIX),
        "Notification rows persisted by the batched insert"
    ).unwrap();

    /// Candidate recipients dropped because they were already notified
    pub static ref DEDUP_SKIPPED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_dedup_skipped_total", METRIC_PREFIX),
        "Candidate recipients dropped because they were already notified for the item"
    ).unwrap();

    /// Notification rows removed by delete operations
    pub static ref NOTIFICATIONS_DELETED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_notifications_deleted_total", METRIC_PREFIX),
        "Notification rows removed by delete operations"
    ).unwrap();

    /// Channel flushes attempted, by channel tag
    pub static ref CHANNEL_FLUSH_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_channel_flush_total", METRIC_PREFIX),
        "Channel flushes attempted",
        &["channel"]
    ).unwrap();

    /// Channel flushes that failed, by channel tag
    pub static ref CHANNEL_FLUSH_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_channel_flush_failures_total", METRIC_PREFIX),
        "Channel flushes that reported a sender failure",
        &["channel"]
    ).unwrap();

    /// Batched recipient reads issued by the recipient cache
    pub static ref RECIPIENT_BATCH_LOADS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_recipient_batch_loads_total", METRIC_PREFIX),
        "Batched recipient reads issued by the recipient cache"
    ).unwrap();
}
