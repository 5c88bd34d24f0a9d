use std::sync::Arc;

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, warn};

use crate::{
    broadcaster::{Broadcaster, ClientEvent, SessionId},
    state::AppState,
};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let broadcaster = state.broadcaster.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, broadcaster))
}

async fn handle_socket(socket: WebSocket, broadcaster: Arc<Broadcaster>) {
    let (session_id, mut events) = broadcaster.connect().await;
    let (mut sink, mut stream) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to encode event for session {session_id}: {e}");
                    continue;
                }
            };

            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_broadcaster = broadcaster.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = stream.next().await {
            match message {
                Message::Text(text) => {
                    handle_client_event(&recv_broadcaster, session_id, text.as_str()).await
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    broadcaster.disconnect(session_id).await;
}

pub async fn handle_client_event(broadcaster: &Broadcaster, session_id: SessionId, text: &str) {
    match serde_json::from_str::<ClientEvent>(text) {
        Ok(ClientEvent::Join(user_id)) => {
            broadcaster.join_room(session_id, &user_id).await;
        }
        Err(e) => debug!("Ignoring frame from session {session_id}: {e}"),
    }
}
