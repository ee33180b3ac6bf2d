//! Signed RSVP push endpoint.
//!
//! Channels push a complete RSVP snapshot for one message whenever it
//! changes. Delivery is at-least-once; the reconciler drops duplicates and
//! stale pushes.

use axum::{Router, extract::State, http::StatusCode, routing::post};
use herald_sdk::objects::RsvpUpdateNotification;

use crate::api::error::ApiError;
use crate::api::extractors::SignedBody;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/push/rsvp", post(push_rsvp))
}

async fn push_rsvp(
    state: State<AppState>,
    SignedBody(notification): SignedBody<RsvpUpdateNotification>,
) -> Result<StatusCode, ApiError> {
    tracing::debug!(
        message_id = %notification.source_message_id,
        records = notification.snapshot.len(),
        "RSVP push received"
    );
    state
        .rsvp_tx
        .send(notification)
        .await
        .map_err(|_| ApiError::EventChannelClosed)?;
    Ok(StatusCode::ACCEPTED)
}
