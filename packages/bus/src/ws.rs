//! WebSocket transport glue.
//!
//! Binds the bus to axum's WebSocket upgrade. Each connection gets a writer
//! task fed by the client's unbounded sender, so publishes never await a
//! socket.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::bus::EventBus;

/// Router fragment exposing the bus at `/ws`.
pub fn router(bus: Arc<EventBus>) -> Router {
    Router::new().route("/ws", get(upgrade)).with_state(bus)
}

async fn upgrade(ws: WebSocketUpgrade, State(bus): State<Arc<EventBus>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(bus, socket))
}

async fn handle_socket(bus: Arc<EventBus>, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let id = bus.register(tx);

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if ws_tx.send(message).await.is_err() || closing {
                break;
            }
        }
    });

    while let Some(Ok(message)) = ws_rx.next().await {
        match message {
            Message::Text(text) => bus.handle_text(id, text.as_str()),
            Message::Pong(_) => bus.mark_alive(id),
            Message::Ping(_) => bus.mark_alive(id),
            Message::Close(_) => break,
            Message::Binary(_) => {}
        }
    }

    bus.remove(id);
    writer.abort();
}
