use super::AppState;
use crate::protocol::{LiveClientMessage, LiveServerMessage};
use crate::shared::names::{player_id_for_name, sanitize_player_name};
use crate::store::{wait_for_change, PresenceEntry};
use axum::{
    extract::ws::{Message, WebSocket},
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Pushes a snapshot whenever the store changes (or on every poll for stores
/// that cannot push). The player that joined over this socket is removed
/// from presence when it closes.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let send_task = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if sender.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    let push_state = Arc::clone(&state);
    let push_tx = tx.clone();
    let push_task = tokio::spawn(async move {
        let mut changes = push_state.store.subscribe();
        let mut interval = tokio::time::interval(push_state.settings.live_poll_interval);
        let mut last_sent: Option<String> = None;
        loop {
            let store_alive = tokio::select! {
                _ = interval.tick() => true,
                alive = wait_for_change(&mut changes) => alive,
            };
            if !store_alive {
                changes = None;
            }
            let payload = match snapshot_payload(&push_state).await {
                Ok(payload) => payload,
                Err(error) => {
                    tracing::warn!(?error, "live snapshot failed");
                    continue;
                }
            };
            if last_sent.as_deref() == Some(payload.as_str()) {
                continue;
            }
            if push_tx.send(payload.clone()).is_err() {
                break;
            }
            last_sent = Some(payload);
        }
    });

    let mut joined: Option<PresenceEntry> = None;
    while let Some(result) = receiver.next().await {
        let Ok(message) = result else { break };
        match message {
            Message::Text(text) => {
                let reply = match serde_json::from_str::<LiveClientMessage>(&text) {
                    Ok(message) => apply_client_message(&state, &mut joined, message).await,
                    Err(_) => Some("Invalid message".to_string()),
                };
                if let Some(error) = reply {
                    let payload = serde_json::to_string(&LiveServerMessage::Error { error }).unwrap_or_default();
                    if tx.send(payload).is_err() {
                        break;
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    push_task.abort();
    send_task.abort();
    if let Some(entry) = joined {
        if let Err(error) = state.store.remove_presence(&entry.player_id).await {
            tracing::warn!(?error, player_id = %entry.player_id, "failed to clear presence on disconnect");
        }
    }
}

/// Applies a join or status message. Returns an error text for the client
/// when the message cannot be honoured.
pub(crate) async fn apply_client_message(
    state: &AppState,
    joined: &mut Option<PresenceEntry>,
    message: LiveClientMessage,
) -> Option<String> {
    let now = state.clock.now_millis();
    let entry = match message {
        LiveClientMessage::Join { player_id, username } => {
            let username = sanitize_player_name(username.as_deref().unwrap_or_default(), "");
            if username.is_empty() {
                return Some("Username is required".to_string());
            }
            let player_id = player_id
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| player_id_for_name(&username));
            if let Some(previous) = joined.as_ref().filter(|previous| previous.player_id != player_id) {
                if let Err(error) = state.store.remove_presence(&previous.player_id).await {
                    tracing::warn!(?error, "failed to clear previous live identity");
                }
            }
            PresenceEntry {
                player_id,
                username,
                last_active_at: now,
                is_playing: true,
            }
        }
        LiveClientMessage::Status { is_playing } => {
            let Some(current) = joined.as_ref() else {
                return Some("Join before sending status".to_string());
            };
            PresenceEntry {
                last_active_at: now,
                is_playing,
                ..current.clone()
            }
        }
    };

    match state.store.set_presence(entry.clone()).await {
        Ok(()) => {
            *joined = Some(entry);
            None
        }
        Err(error) => {
            tracing::warn!(?error, "live presence update failed");
            Some("Presence update failed".to_string())
        }
    }
}

pub(crate) async fn snapshot_payload(state: &AppState) -> Result<String, crate::error::SyncError> {
    let scores = state.board(state.settings.max_entries).await?;
    let view = state.presence_view(state.settings.active_window).await?;
    let message = LiveServerMessage::Snapshot {
        scores,
        active_players: view.count,
        players: view.entries,
    };
    Ok(serde_json::to_string(&message)?)
}
