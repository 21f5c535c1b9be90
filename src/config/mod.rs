//! Configuration for the query session and the engine defaults it restores.

mod loader;
mod types;

pub use loader::{ConfigError, MAX_VERSION, MIN_VERSION};
pub use types::{Config, EngineConfig, SessionConfig};
