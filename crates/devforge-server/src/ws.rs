//! The `/ws` endpoint (spec §6): upgrades to a message-oriented JSON
//! WebSocket backed by the broadcast fabric. Served on its own listener
//! (`WS_PORT`), separate from the health/metrics HTTP surface.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use devforge_broadcast::{BroadcastHub, ClientMessage, DisconnectReason, Topic};
use futures::{SinkExt, StreamExt};
use tracing::{debug, warn};

pub fn router(hub: Arc<BroadcastHub>) -> Router {
    Router::new().route("/ws", get(upgrade)).with_state(hub)
}

async fn upgrade(ws: WebSocketUpgrade, State(hub): State<Arc<BroadcastHub>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn handle_socket(socket: WebSocket, hub: Arc<BroadcastHub>) {
    let subscriber = hub.subscribe(std::iter::empty());
    let (mut sink, mut stream) = socket.split();

    let reader_subscriber = subscriber.clone();
    let reader_hub = hub.clone();
    let reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = stream.next().await {
            reader_subscriber.record_activity();
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Subscribe { topics }) => {
                        let topics: Vec<Topic> = topics.iter().filter_map(|t| Topic::parse(t)).collect();
                        reader_hub.update_topics(reader_subscriber.id, topics, Vec::new());
                    }
                    Ok(ClientMessage::Unsubscribe { topics }) => {
                        let topics: Vec<Topic> = topics.iter().filter_map(|t| Topic::parse(t)).collect();
                        reader_hub.update_topics(reader_subscriber.id, Vec::new(), topics);
                    }
                    Ok(ClientMessage::Pong) => {}
                    Err(err) => debug!(error = %err, "ignoring malformed client message"),
                },
                Message::Close(_) => {
                    reader_hub.disconnect(reader_subscriber.id, DisconnectReason::ClientClosed);
                    break;
                }
                _ => {}
            }
        }
    });

    while let Some(message) = subscriber.recv().await {
        let payload = match serde_json::to_string(&message) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "failed to serialize broadcast message");
                continue;
            }
        };
        if sink.send(Message::Text(payload)).await.is_err() {
            break;
        }
    }

    reader.abort();
    hub.disconnect(subscriber.id, DisconnectReason::ClientClosed);
}
