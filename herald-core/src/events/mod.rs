//! In-process notification plumbing.
//!
//! # Flow
//!
//! 1. Signed RSVP pushes arrive at the server and are forwarded through the
//!    `RsvpUpdate` channel to the `AttendanceReconciler`
//! 2. Every component broadcasts a `StateChange` after it changed something
//!    UI collaborators display
//!
//! State changes carry identifiers and small summaries; subscribers that
//! need the full record re-read it.

pub mod channels;
pub mod types;

pub use channels::{
    DEFAULT_CHANNEL_BUFFER, RsvpUpdateReceiver, RsvpUpdateSender, StateChangeReceiver,
    StateChangeSender, rsvp_update_channel, state_change_channel,
};

pub use types::StateChange;
