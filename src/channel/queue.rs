//! Session-scoped per-channel batching.
//!
//! One `ChannelQueues` instance lives for the duration of a single dispatch
//! call. Notifications are bucketed per channel as they are persisted, then
//! every non-empty queue is flushed exactly once and the instance is
//! discarded.

use serde::Serialize;

use crate::metrics::{CHANNEL_FLUSH_FAILURES_TOTAL, CHANNEL_FLUSH_TOTAL};
use crate::model::Notification;
use crate::recipient::RecipientCache;

use super::{ChannelError, ChannelRegistry, ChannelTag};

/// Outcome of flushing one channel's batch.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelFlushResult {
    pub channel: ChannelTag,
    /// Notifications handed to the sender
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Batch-level failure, if the sender (or its absence) failed the flush
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-channel pending batches for one dispatch session.
///
/// Queues are created lazily on first use and flushed in first-enqueue
/// order. That order is stable but carries no contract for senders:
/// channels must not assume an ordering relative to each other.
#[derive(Default)]
pub struct ChannelQueues {
    queues: Vec<(ChannelTag, Vec<Notification>)>,
}

impl ChannelQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a notification to a channel's pending batch.
    /// Record-only tags are never queued.
    pub fn enqueue(&mut self, tag: &ChannelTag, notification: &Notification) {
        if tag.is_record_only() {
            return;
        }

        match self.queues.iter_mut().find(|(t, _)| t == tag) {
            Some((_, batch)) => batch.push(notification.clone()),
            None => self
                .queues
                .push((tag.clone(), vec![notification.clone()])),
        }
    }

    /// Number of notifications pending for a channel.
    pub fn pending(&self, tag: &ChannelTag) -> usize {
        self.queues
            .iter()
            .find(|(t, _)| t == tag)
            .map(|(_, batch)| batch.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.queues.iter().all(|(_, batch)| batch.is_empty())
    }

    /// Flush every non-empty queue exactly once, consuming the session.
    ///
    /// A sender failure (including a missing sender) is captured in that
    /// channel's result and does not prevent other channels from flushing.
    pub async fn flush_all(
        self,
        registry: &ChannelRegistry,
        recipients: &RecipientCache,
    ) -> Vec<ChannelFlushResult> {
        let mut results = Vec::with_capacity(self.queues.len());

        for (tag, batch) in self.queues {
            if batch.is_empty() {
                continue;
            }

            let attempted = batch.len();
            CHANNEL_FLUSH_TOTAL.with_label_values(&[tag.as_str()]).inc();

            let outcome = match registry.get(&tag) {
                Some(sender) => sender.send(&batch, recipients).await,
                None => Err(ChannelError::NoSender(tag.clone())),
            };

            let result = match outcome {
                Ok(outcomes) => {
                    let delivered = outcomes.iter().filter(|o| o.delivered).count();
                    let failed = attempted - delivered;
                    tracing::debug!(
                        channel = %tag,
                        attempted = attempted,
                        delivered = delivered,
                        failed = failed,
                        "Flushed channel batch"
                    );
                    ChannelFlushResult {
                        channel: tag,
                        attempted,
                        delivered,
                        failed,
                        error: None,
                    }
                }
                Err(e) => {
                    CHANNEL_FLUSH_FAILURES_TOTAL
                        .with_label_values(&[tag.as_str()])
                        .inc();
                    tracing::warn!(
                        channel = %tag,
                        attempted = attempted,
                        error = %e,
                        "Channel flush failed; rows remain persisted"
                    );
                    ChannelFlushResult {
                        channel: tag,
                        attempted,
                        delivered: 0,
                        failed: attempted,
                        error: Some(e.to_string()),
                    }
                }
            };

            results.push(result);
        }

        results
    }
}
