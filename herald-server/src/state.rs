//! Application state shared across all request handlers.

use herald_core::Engine;
use herald_core::events::RsvpUpdateSender;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    /// Secret RSVP pushes are signed with (can be reloaded via SIGHUP).
    pub push_secret: Arc<RwLock<Option<Box<[u8]>>>>,
    /// Forwards verified RSVP pushes to the attendance reconciler.
    pub rsvp_tx: RsvpUpdateSender,
}

impl AppState {
    pub fn new(
        engine: Arc<Engine>,
        push_secret: Option<Box<[u8]>>,
        rsvp_tx: RsvpUpdateSender,
    ) -> Self {
        Self {
            engine,
            push_secret: Arc::new(RwLock::new(push_secret)),
            rsvp_tx,
        }
    }
}
