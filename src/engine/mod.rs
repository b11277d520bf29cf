//! The dispatch engine: fan-out on the write path, batched hydration on
//! the read path.
//!
//! One engine instance is shared process-wide; every operation is a single
//! logical task, safe to run concurrently with any number of independent
//! operations. Session state (the recipient cache, the per-channel queues)
//! is created inside the operation and discarded when it returns.

mod dispatch;
mod loader;

pub use dispatch::{DispatchEngine, DispatchResult};
pub use loader::LoadedNotifications;
