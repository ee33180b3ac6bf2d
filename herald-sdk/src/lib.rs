//! Shared types for Herald.
//!
//! Nothing in this crate performs I/O; it only defines what travels over the
//! wire and how it is signed.

pub mod objects;
pub mod signature;
