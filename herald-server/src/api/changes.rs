//! `GET /changes/ws`: WebSocket stream of state changes.
//!
//! Every [`StateChange`](herald_core::events::StateChange) the engine
//! broadcasts is forwarded as a JSON [`StateChangeFrame`] text frame. The
//! stream is for re-rendering only; a client that falls behind gets a
//! `resync` notice and should re-read what it displays.

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use herald_core::events::StateChangeReceiver;
use herald_sdk::objects::StateChangeFrame;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/changes/ws", get(changes_ws))
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ControlFrame {
    Resync { skipped: u64 },
}

async fn changes_ws(state: State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    // Subscribe before the upgrade so nothing emitted in between is lost.
    let changes_rx = state.engine.subscribe();
    ws.on_upgrade(move |socket| handle_changes_ws(socket, changes_rx))
}

/// Relay state changes until the client disconnects or the engine goes away.
async fn handle_changes_ws(mut socket: WebSocket, mut changes_rx: StateChangeReceiver) {
    loop {
        tokio::select! {
            result = changes_rx.recv() => {
                match result {
                    Ok(change) => {
                        let frame = StateChangeFrame::from(change);
                        if send_json(&mut socket, &frame).await.is_err() {
                            return;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "WS: state change receiver lagged");
                        if send_json(&mut socket, &ControlFrame::Resync { skipped })
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    let _ = socket.send(Message::Close(None)).await;
}

/// Serialize `value` as JSON and send it as a text WebSocket frame.
///
/// Returns `Err(())` if the send fails (client disconnected).
async fn send_json<T: Serialize>(socket: &mut WebSocket, value: &T) -> Result<(), ()> {
    let json = serde_json::to_string(value).map_err(|_| ())?;
    socket
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}
