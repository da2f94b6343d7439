use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use crate::error::AppError;
use crate::models::identity::Session;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct WsQuery {
    pub identity: String,
}

/// Streams match updates that involve the subscribing identity, as rider or host.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let session = state.store.session(&query.identity)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, session)))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, session: Session) {
    let (mut sender, mut receiver) = socket.split();
    let identity_id = session.identity_id().to_string();
    let mut updates = BroadcastStream::new(state.match_events_tx.subscribe());

    info!(identity_id = %identity_id, "websocket client connected");

    let watched = identity_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(next) = updates.next().await {
            let update = match next {
                Ok(update) => update,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(identity_id = %watched, skipped, "websocket subscriber lagged");
                    continue;
                }
            };
            if update.rider_id != watched && update.host_id != watched {
                continue;
            }

            let json = match serde_json::to_string(&update) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize match update for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!(identity_id = %identity_id, "websocket client disconnected");
}
