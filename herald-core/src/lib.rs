#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod channels;
pub mod config;
pub mod engine;
pub mod entities;
pub mod events;
pub mod framework;
pub mod processors;
pub mod store;
pub mod utils;

#[cfg(test)]
mod testing;

pub use engine::{CreateOutcome, Engine, EngineBuilder, EngineHandles};
