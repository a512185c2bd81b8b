//! `/mesh/ws`: the persistent push channel.
//!
//! Agents behind NAT (and overlay coordinators) hold this socket so the
//! coordinator can push gossip without inbound connectivity. Authentication
//! is the mesh token as a query parameter; the socket registers into the
//! mesh socket registry and inbound frames run the same envelope validation
//! as `POST /mesh/ingest`.

use crate::domain::error::ApiError;
use crate::middleware::auth::token_matches;
use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use shared_types::MeshMessage;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Query parameters for the upgrade.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsQuery {
    pub peer_id: String,
    #[serde(default)]
    pub token: String,
}

/// `GET /mesh/ws?peerId&token`
pub async fn mesh_ws(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    if !token_matches(&query.token, &state.config.mesh_token) {
        return Err(ApiError::mesh_unauthorized());
    }
    let peer_id = query.peer_id;
    Ok(ws.on_upgrade(move |socket| socket_loop(state, peer_id, socket)))
}

async fn socket_loop(state: AppState, peer_id: String, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    state.mesh.sockets().attach(&peer_id, tx);

    // Writer: frames queued by broadcast go down the socket.
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    // Reader: inbound frames run the normal envelope pipeline.
    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(frame) => {
                let envelope: MeshMessage = match serde_json::from_str(&frame) {
                    Ok(envelope) => envelope,
                    Err(error) => {
                        debug!(peer_id, %error, "unparseable ws frame");
                        continue;
                    }
                };
                let now_ms = state.now_ms();
                if let Err(error) = state.mesh.handle_message(envelope, now_ms).await {
                    warn!(peer_id, %error, "ws envelope rejected");
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.mesh.sockets().detach(&peer_id);
    writer.abort();
    debug!(peer_id, "mesh socket closed");
}
