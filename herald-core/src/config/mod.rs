//! Runtime configuration types for the Herald engine.
//!
//! Loading and parsing the configuration file is the server's job; these are
//! the validated values the engine runs with.

mod config_store;
mod engine;

pub use config_store::ConfigStore;
pub use engine::{EngineConfig, QueueIntervals};
