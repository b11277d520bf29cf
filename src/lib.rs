// Infrastructure layer (shared components)
pub mod config;
pub mod error;
pub mod metrics;

// Domain layer (business logic)
pub mod channel;
pub mod engine;
pub mod item_type;
pub mod model;
pub mod recipient;
pub mod store;

pub use channel::{ChannelRegistry, ChannelSender, ChannelTag};
pub use engine::{DispatchEngine, DispatchResult, LoadedNotifications};
pub use error::{EngineError, Result};
pub use item_type::{ItemType, TypeRegistry};
pub use model::{LoadOptions, Notification, RecipientRecord};
