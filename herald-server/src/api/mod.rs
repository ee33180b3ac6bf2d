//! HTTP API.
//!
//! Every handler goes through the [`Engine`](herald_core::Engine) held in
//! [`AppState`](crate::state::AppState); none of them touch storage or
//! channels directly.

pub mod attendance;
pub mod changes;
pub mod cycles;
pub mod error;
pub mod events;
pub mod extractors;
pub mod push;
