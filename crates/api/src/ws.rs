use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use runtime::{parse_control_message, Connection, ConnectionId, EngineHandle, ServerEvent};
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::state::AppState;

#[derive(Debug, Error)]
enum SendError {
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("socket closed: {0}")]
    Socket(#[from] axum::Error),
}

pub async fn events_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| serve_connection(socket, state))
}

/// Each socket is a potential session owner and a dashboard observer at
/// the same time; owned sessions are torn down when it goes away.
async fn serve_connection(mut socket: WebSocket, state: AppState) {
    let engine = state.engine().clone();
    let Connection {
        id,
        mut trades,
        mut dashboard,
    } = match engine.open_connection() {
        Ok(connection) => connection,
        Err(err) => {
            warn!(%err, "refusing websocket connection");
            return;
        }
    };
    info!(connection = id.0, "client connected");

    loop {
        tokio::select! {
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => handle_control(&engine, id, &text),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        debug!(connection = id.0, %err, "websocket receive failed");
                        break;
                    }
                }
            }
            trade = trades.recv() => {
                let Some(trade) = trade else { break };
                if let Err(err) = send_event(&mut socket, &ServerEvent::TradeUpdate(trade)).await {
                    debug!(connection = id.0, %err, "trade update not sent");
                    break;
                }
            }
            event = dashboard.recv() => {
                match event {
                    Ok(event) => {
                        if let Err(err) = send_event(&mut socket, &ServerEvent::DashboardUpdate(event)).await {
                            debug!(connection = id.0, %err, "dashboard update not sent");
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(connection = id.0, skipped, "dashboard observer lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    if engine.disconnect(id).is_err() {
        debug!(connection = id.0, "engine already stopped");
    }
    info!(connection = id.0, "client disconnected");
}

fn handle_control(engine: &EngineHandle, connection: ConnectionId, text: &str) {
    let message = match parse_control_message(text) {
        Ok(message) => message,
        Err(err) => {
            warn!(connection = connection.0, %err, "rejected control message");
            return;
        }
    };

    if let Err(err) = engine.apply(connection, message) {
        warn!(connection = connection.0, %err, "control message not applied");
    }
}

async fn send_event(socket: &mut WebSocket, event: &ServerEvent) -> Result<(), SendError> {
    let payload = serde_json::to_string(event)?;
    socket.send(Message::Text(payload)).await?;
    Ok(())
}
