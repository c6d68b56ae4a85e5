use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::services::network::Connectivity;
use crate::services::notifier::NotificationEvent;
use crate::worker::push::ClientMessage;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    url: Option<String>,
}

/// Everything a window receives over the socket.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Outbound {
    Notification(NotificationEvent),
    Worker(ClientMessage),
}

/// Messages a window may send.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Inbound {
    Network { online: bool },
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Response {
    let url = query.url.unwrap_or_else(|| "/".into());
    ws.on_upgrade(move |socket| handle_socket(socket, state, url))
}

async fn handle_socket(socket: WebSocket, state: AppState, url: String) {
    let (mut sender, mut receiver) = socket.split();

    let client_id = state.push.clients().register(url).await;
    tracing::debug!(client_id = %client_id, "WebSocket connection established");

    let mut notifications = state.notifier.subscribe();
    let mut worker = state.push.subscribe();

    let mut send_task = tokio::spawn(async move {
        loop {
            let outbound = tokio::select! {
                event = notifications.recv() => match event {
                    Ok(event) => Outbound::Notification(event),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(client_id = %client_id, skipped, "WebSocket client lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
                message = worker.recv() => match message {
                    Ok(message) => {
                        if !addressed_to(&message, client_id) {
                            continue;
                        }
                        Outbound::Worker(message)
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(client_id = %client_id, skipped, "WebSocket client lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };

            let text = match serde_json::to_string(&outbound) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to encode WebSocket message");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let network = state.network.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<Inbound>(&text) {
                    Ok(Inbound::Network { online }) => {
                        network.report(Connectivity::from_online(online));
                    }
                    Err(_) => {
                        tracing::debug!(client_id = %client_id, message = %text, "Ignoring WebSocket message");
                    }
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.push.clients().unregister(client_id).await;
    tracing::debug!(client_id = %client_id, "WebSocket connection closed");
}

/// Focus requests go to one window; everything else is broadcast.
fn addressed_to(message: &ClientMessage, client_id: Uuid) -> bool {
    match message {
        ClientMessage::Focus { client_id: target } => *target == client_id,
        _ => true,
    }
}
