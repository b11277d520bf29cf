use thiserror::Error;

use crate::store::StorageError;

/// Errors surfaced by the dispatch engine and its collaborators.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An item type identifier that was never registered.
    #[error("unknown item type: {0}")]
    UnknownType(String),

    /// An attempt to register a type identifier twice.
    #[error("item type already registered: {0}")]
    DuplicateType(String),

    /// A recipient was read from the cache without being ensured first.
    /// This is a caller bug, not a runtime condition.
    #[error("recipient {0} was not loaded into the cache")]
    NotLoaded(i64),

    /// The item data did not contain what the type descriptor expected.
    #[error("invalid item data for type {item_type}: {reason}")]
    InvalidData { item_type: String, reason: String },

    /// Storage-level failure; the operation aborts.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration error at startup.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl EngineError {
    /// Shorthand for descriptor data-extraction failures.
    pub fn invalid_data(item_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidData {
            item_type: item_type.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
