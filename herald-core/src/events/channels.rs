//! Event channel factories and handles.

use super::types::StateChange;
use herald_sdk::objects::RsvpUpdateNotification;
use tokio::sync::{broadcast, mpsc};

/// Default buffer size for event channels.
///
/// A lagging state-change subscriber loses the oldest frames instead of
/// holding back the engine.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Sender handle for StateChange notifications.
pub type StateChangeSender = broadcast::Sender<StateChange>;
/// Receiver handle for StateChange notifications.
pub type StateChangeReceiver = broadcast::Receiver<StateChange>;

/// Sender handle for pushed RSVP updates.
pub type RsvpUpdateSender = mpsc::Sender<RsvpUpdateNotification>;
/// Receiver handle for pushed RSVP updates.
pub type RsvpUpdateReceiver = mpsc::Receiver<RsvpUpdateNotification>;

/// Create the StateChange broadcast channel.
///
/// Additional receivers are obtained with `Sender::subscribe`.
pub fn state_change_channel() -> (StateChangeSender, StateChangeReceiver) {
    broadcast::channel(DEFAULT_CHANNEL_BUFFER)
}

/// Create a new RsvpUpdateNotification channel.
pub fn rsvp_update_channel() -> (RsvpUpdateSender, RsvpUpdateReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}
