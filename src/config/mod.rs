mod settings;

pub use settings::{DatabaseConfig, EngineConfig, Settings};
