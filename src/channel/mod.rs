//! Delivery channels.
//!
//! A channel is a delivery mechanism (in-app, email, push) identified by a
//! tag. The engine batches notifications per channel during one dispatch and
//! hands each batch to the channel's registered sender exactly once. The
//! reserved `none` tag means "record only": the row is persisted but no
//! sender is invoked.

mod queue;
mod sender;

pub use queue::{ChannelFlushResult, ChannelQueues};
pub use sender::{ChannelError, ChannelRegistry, ChannelSender, SendOutcome};

use serde::{Deserialize, Serialize};

/// Tag identifying one delivery channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelTag(String);

impl ChannelTag {
    /// Reserved tag for record-only notifications.
    pub const RECORD_ONLY: &'static str = "none";

    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// The record-only tag.
    pub fn none() -> Self {
        Self(Self::RECORD_ONLY.to_string())
    }

    pub fn email() -> Self {
        Self("email".to_string())
    }

    pub fn push() -> Self {
        Self("push".to_string())
    }

    pub fn in_app() -> Self {
        Self("in_app".to_string())
    }

    /// Whether this tag means "persist the row but deliver nothing".
    /// An empty tag is treated the same as the reserved `none` tag.
    pub fn is_record_only(&self) -> bool {
        self.0.is_empty() || self.0 == Self::RECORD_ONLY
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChannelTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelTag {
    fn from(tag: &str) -> Self {
        Self(tag.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_only_tags() {
        assert!(ChannelTag::none().is_record_only());
        assert!(ChannelTag::new("").is_record_only());
        assert!(!ChannelTag::email().is_record_only());
        assert!(!ChannelTag::new("push").is_record_only());
    }

    #[test]
    fn test_tag_display() {
        assert_eq!(ChannelTag::email().to_string(), "email");
        assert_eq!(ChannelTag::from("webhook").as_str(), "webhook");
    }
}
