//! Presence channel WebSocket
//!
//! Subscribers connect to `/presence/{community_id}` and receive every
//! presence delta published for that community. Clients may also ask for the
//! current count on demand:
//!
//! Messages (server -> client):
//! - `visitor_joined` / `visitor_left` / `visitor_count_update` - presence deltas
//! - `visitor_count` - reply to a count request
//!
//! Messages (client -> server):
//! - `{"type": "request_count"}` - ask for the current count
//! - `{"type": "ping"}` - keep-alive

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::server::http::AppState;

/// WebSocket type after upgrade
type HyperWebSocket =
    hyper_tungstenite::WebSocketStream<hyper_util::rt::TokioIo<hyper::upgrade::Upgraded>>;

/// Message received from a presence channel client
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    /// Ask for the current visitor count
    RequestCount,
    /// Keep-alive ping
    Ping,
}

/// Reply to a count request
#[derive(Debug, Serialize)]
struct VisitorCountResponse {
    #[serde(rename = "type")]
    kind: &'static str,
    community_id: Uuid,
    count: u64,
    timestamp: DateTime<Utc>,
}

/// Handle WebSocket upgrade for a community's presence channel
pub async fn handle_presence_upgrade(
    state: Arc<AppState>,
    req: Request<Incoming>,
    community_id: Uuid,
) -> Response<Full<Bytes>> {
    if !hyper_tungstenite::is_upgrade_request(&req) {
        return Response::builder()
            .status(StatusCode::BAD_REQUEST)
            .header("Content-Type", "application/json")
            .body(Full::new(Bytes::from(
                r#"{"error": "WebSocket upgrade required"}"#,
            )))
            .unwrap();
    }

    let (response, websocket) = match hyper_tungstenite::upgrade(req, None) {
        Ok((resp, ws)) => (resp, ws),
        Err(e) => {
            error!("WebSocket upgrade failed: {}", e);
            return Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Full::new(Bytes::from("WebSocket upgrade failed")))
                .unwrap();
        }
    };

    tokio::spawn(async move {
        match websocket.await {
            Ok(ws) => {
                if let Err(e) = handle_presence_connection(state, community_id, ws).await {
                    warn!(%community_id, "Presence WebSocket error: {}", e);
                }
            }
            Err(e) => {
                error!("WebSocket connection failed: {}", e);
            }
        }
    });

    // Return the upgrade response with a converted body type
    let (parts, _body) = response.into_parts();
    Response::from_parts(parts, Full::new(Bytes::new()))
}

/// Handle an individual presence channel connection
async fn handle_presence_connection(
    state: Arc<AppState>,
    community_id: Uuid,
    ws: HyperWebSocket,
) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (mut sender, mut receiver) = ws.split();

    info!(%community_id, "Presence channel client connected");

    // Current count as the opening message
    let opening = count_response(&state, community_id).await;
    sender
        .send(WsMessage::Text(serde_json::to_string(&opening)?))
        .await?;

    let mut rx = state.gateway.subscribe(community_id);

    loop {
        tokio::select! {
            // Presence delta from the gateway
            update = rx.recv() => {
                match update {
                    Ok(update) => {
                        let json = serde_json::to_string(&update)?;
                        if sender.send(WsMessage::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(%community_id, skipped, "slow presence subscriber lagged");
                        continue;
                    }
                }
            }

            // Message from client
            msg = receiver.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::RequestCount) => {
                                let reply = count_response(&state, community_id).await;
                                let json = serde_json::to_string(&reply)?;
                                if sender.send(WsMessage::Text(json)).await.is_err() {
                                    break;
                                }
                            }
                            Ok(ClientMessage::Ping) => {
                                let pong = serde_json::json!({
                                    "type": "pong",
                                    "timestamp": state.clock.now(),
                                });
                                let _ = sender.send(WsMessage::Text(pong.to_string())).await;
                            }
                            Err(e) => {
                                debug!(%community_id, error = %e, "ignoring unknown client message");
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) => {
                        info!(%community_id, "Presence channel client disconnected");
                        break;
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = sender.send(WsMessage::Pong(data)).await;
                    }
                    Some(Err(e)) => {
                        warn!(%community_id, "WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                    _ => {}
                }
            }
        }
    }

    info!(%community_id, "Presence channel connection closed");
    Ok(())
}

/// Build a `visitor_count` reply; a store outage reads as zero
async fn count_response(state: &Arc<AppState>, community_id: Uuid) -> VisitorCountResponse {
    let count = state
        .tracker
        .visitor_count(community_id)
        .await
        .unwrap_or_else(|e| {
            warn!(%community_id, error = %e, "count request degraded to zero");
            0
        });

    VisitorCountResponse {
        kind: "visitor_count",
        community_id,
        count,
        timestamp: state.clock.now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_parse_from_wire_format() {
        assert!(matches!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"request_count"}"#).unwrap(),
            ClientMessage::RequestCount
        ));
        assert!(matches!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"ping"}"#).unwrap(),
            ClientMessage::Ping
        ));
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"nonsense"}"#).is_err());
    }

    #[test]
    fn count_reply_uses_wire_field_names() {
        let reply = VisitorCountResponse {
            kind: "visitor_count",
            community_id: Uuid::nil(),
            count: 4,
            timestamp: Utc::now(),
        };
        let json: serde_json::Value = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["type"], "visitor_count");
        assert_eq!(json["count"], 4);
        assert!(json.get("community_id").is_some());
        assert!(json.get("timestamp").is_some());
    }
}
