// =============================================================================
// WebSocket Handler — push-based state updates
// =============================================================================
//
// Clients connect to `/api/v1/ws?token=<token>` and receive:
//   1. An immediate full `StateSnapshot` on connect.
//   2. A fresh snapshot whenever `state_version` has changed since the last
//      push, checked every 500 ms.
//   3. Typed broadcast frames (`WsFrame`) as scheduled jobs publish them —
//      agent cycle summaries, new fills, regime transitions, and alerts
//      pulled from the activity log.
//
// Ping frames get an immediate Pong; any inbound text message counts as a
// client heartbeat.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use crate::api::auth::validate_token;
use crate::app_state::AppState;

/// Typed broadcast frames the dashboard's WebSocket feed emits, distinct
/// from the periodic full-snapshot push.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsFrame {
    AgentUpdate {
        agent_id: String,
        status: String,
        open_positions: usize,
        watching: usize,
    },
    TradeUpdate {
        agent_id: String,
        symbol: String,
        side: String,
        quantity: f64,
        price: f64,
        status: String,
    },
    RegimeChange {
        regime: String,
        vix: f64,
        qqq_price: f64,
    },
    Alert {
        agent_id: String,
        activity_type: String,
        message: String,
    },
}

#[derive(Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// Axum handler for the WebSocket upgrade request. Validates the token from
/// the `?token=` query parameter before upgrading.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    let token = query.token.unwrap_or_default();
    if !validate_token(&token) {
        warn!("websocket connection rejected: invalid token");
        return (axum::http::StatusCode::FORBIDDEN, "invalid or missing token").into_response();
    }

    info!("websocket connection accepted, upgrading");
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
        .into_response()
}

async fn handle_ws_connection(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.events.subscribe();

    if let Err(e) = send_snapshot(&mut sender, &state).await {
        warn!(error = %e, "failed to send initial websocket snapshot");
        return;
    }
    let mut last_sent_version = state.current_state_version();

    let mut push_interval = interval(Duration::from_millis(500));

    loop {
        tokio::select! {
            _ = push_interval.tick() => {
                let current_version = state.current_state_version();
                if current_version != last_sent_version {
                    match send_snapshot(&mut sender, &state).await {
                        Ok(()) => last_sent_version = current_version,
                        Err(e) => {
                            debug!(error = %e, "websocket send failed, disconnecting");
                            break;
                        }
                    }
                }
            }

            frame = events.recv() => {
                match frame {
                    Ok(frame) => {
                        if send_frame(&mut sender, &frame).await.is_err() {
                            debug!("websocket send failed, disconnecting");
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "websocket subscriber lagged, dropping frames");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        debug!(msg = %text, "websocket text message received (heartbeat)");
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) => {
                        info!("websocket close frame received, disconnecting");
                        break;
                    }
                    Some(Ok(Message::Binary(_))) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "websocket receive error, disconnecting");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    info!("websocket connection closed");
}

async fn send_snapshot(
    sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    state: &Arc<AppState>,
) -> Result<(), axum::Error> {
    let snapshot = state.build_snapshot();
    match serde_json::to_string(&serde_json::json!({ "type": "snapshot", "data": snapshot })) {
        Ok(json) => sender.send(Message::Text(json.into())).await,
        Err(e) => {
            warn!(error = %e, "failed to serialise snapshot");
            Ok(())
        }
    }
}

async fn send_frame(
    sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    frame: &WsFrame,
) -> Result<(), axum::Error> {
    match serde_json::to_string(frame) {
        Ok(json) => sender.send(Message::Text(json.into())).await,
        Err(e) => {
            warn!(error = %e, "failed to serialise ws frame");
            Ok(())
        }
    }
}
