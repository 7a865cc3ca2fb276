//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::constants::MAX_MSG_BYTES;
use crate::game::world::{ConnId, Outbound, WorldInput, OUTBOUND_CAPACITY};
use crate::ws::ingress::{Ingress, Verdict};
use crate::ws::protocol::ServerMsg;

/// WebSocket upgrade handler. Identity is established by the JOIN message.
/// The transport refuses anything over the byte ceiling before it is buffered.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.max_message_size(MAX_MSG_BYTES)
        .max_frame_size(MAX_MSG_BYTES)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id: ConnId = Uuid::new_v4();
    info!(conn_id = %conn_id, "New WebSocket connection");

    let (ws_sink, mut ws_stream) = socket.split();
    let (out_tx, out_rx) = mpsc::channel::<Outbound>(OUTBOUND_CAPACITY);
    let world_tx = state.world.input_tx.clone();

    if world_tx
        .send(WorldInput::Connect { conn_id, tx: out_tx })
        .await
        .is_err()
    {
        error!(conn_id = %conn_id, "World is not running");
        return;
    }

    // Writer task: world -> WebSocket
    let writer_handle = tokio::spawn(run_writer(conn_id, ws_sink, out_rx));

    // Reader loop: WebSocket -> world
    let ingress = Ingress::new();
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => match ingress.inspect(&text) {
                Verdict::Accept(msg) => {
                    if world_tx
                        .send(WorldInput::Message { conn_id, msg })
                        .await
                        .is_err()
                    {
                        debug!(conn_id = %conn_id, "World input channel closed");
                        break;
                    }
                }
                Verdict::Drop(reason) => {
                    trace!(conn_id = %conn_id, ?reason, "Dropped inbound frame");
                }
                Verdict::Close => {
                    warn!(conn_id = %conn_id, bytes = text.len(), "Oversized frame, closing");
                    break;
                }
            },
            Ok(Message::Binary(data)) => match ingress.inspect_binary(data.len()) {
                Verdict::Close => {
                    warn!(conn_id = %conn_id, bytes = data.len(), "Oversized frame, closing");
                    break;
                }
                verdict => {
                    trace!(conn_id = %conn_id, ?verdict, "Dropped binary frame");
                }
            },
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(conn_id = %conn_id, "Client initiated close");
                break;
            }
            Err(e) => {
                debug!(conn_id = %conn_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    let _ = world_tx.send(WorldInput::Disconnect { conn_id }).await;
    writer_handle.abort();

    info!(conn_id = %conn_id, "WebSocket connection closed");
}

async fn run_writer(
    conn_id: ConnId,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut out_rx: mpsc::Receiver<Outbound>,
) {
    while let Some(msg) = out_rx.recv().await {
        if let Err(e) = send_msg(&mut ws_sink, &msg).await {
            debug!(conn_id = %conn_id, error = %e, "WebSocket send failed");
            break;
        }
    }
    let _ = ws_sink.close().await;
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
