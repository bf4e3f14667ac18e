//! HTTP server implementation
//!
//! hyper http1 with TokioIo, hand-routed paths. Presence reads never return
//! 5xx: a store outage degrades counts to zero with a `degraded` flag so
//! consumers can tell "empty" from "unknown".

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::analytics::AnalyticsAggregator;
use crate::broadcast::BroadcastGateway;
use crate::clock::Clock;
use crate::config::Args;
use crate::presence::{CrossDivisionStats, PeakCounts, VisitorStats, VisitorTracker};
use crate::server::websocket;
use crate::types::Result;

/// Edges reported by the stats route
const STATS_TOP_EDGES: usize = 10;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub tracker: Arc<VisitorTracker>,
    pub gateway: Arc<BroadcastGateway>,
    /// Absent when MongoDB is not configured (dev mode)
    pub analytics: Option<Arc<AnalyticsAggregator>>,
    pub clock: Arc<dyn Clock>,
}

/// Run the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;
    info!("Listening on {}", state.args.listen);
    info!("Presence channel at /presence/{{community_id}} (WebSocket)");

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .with_upgrades()
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("[{}] {} {}", addr, method, path);

    // Presence channel WebSocket: /presence/{community_id}
    if method == Method::GET && path.starts_with("/presence/") {
        let raw_id = &path["/presence/".len()..];
        return Ok(match Uuid::parse_str(raw_id) {
            Ok(community_id) => {
                websocket::handle_presence_upgrade(state, req, community_id).await
            }
            Err(_) => bad_request_response("Invalid community id"),
        });
    }

    let response = match (method, path.as_str()) {
        // Liveness probe
        (Method::GET, "/health") | (Method::GET, "/healthz") => health_check(&state),

        // Version info for deployment verification
        (Method::GET, "/version") => version_info(),

        // CORS preflight
        (Method::OPTIONS, _) => preflight_response(),

        (Method::GET, p) if p.starts_with("/api/communities/") => {
            handle_community_route(&state, p).await
        }

        _ => not_found_response(&path),
    };

    Ok(response)
}

/// Routes under /api/communities/{id}/...
async fn handle_community_route(state: &Arc<AppState>, path: &str) -> Response<Full<Bytes>> {
    let rest = &path["/api/communities/".len()..];
    let Some((raw_id, tail)) = rest.split_once('/') else {
        return not_found_response(path);
    };
    let Ok(community_id) = Uuid::parse_str(raw_id) else {
        return bad_request_response("Invalid community id");
    };

    match tail {
        "presence" => presence_snapshot(state, community_id).await,
        "presence/stats" => presence_stats(state, community_id).await,
        _ => not_found_response(path),
    }
}

#[derive(Serialize)]
struct PresenceSnapshot {
    community_id: Uuid,
    count: u64,
    authenticated: u64,
    anonymous: u64,
    degraded: bool,
    timestamp: DateTime<Utc>,
}

/// GET /api/communities/{id}/presence
async fn presence_snapshot(state: &Arc<AppState>, community_id: Uuid) -> Response<Full<Bytes>> {
    let (authenticated, anonymous, degraded) = match (
        state.tracker.authenticated_count(community_id).await,
        state.tracker.anonymous_count(community_id).await,
    ) {
        (Ok(authenticated), Ok(anonymous)) => (authenticated, anonymous, false),
        _ => {
            warn!(%community_id, "presence snapshot degraded to zero");
            (0, 0, true)
        }
    };

    json_response(
        StatusCode::OK,
        &PresenceSnapshot {
            community_id,
            count: authenticated + anonymous,
            authenticated,
            anonymous,
            degraded,
            timestamp: state.clock.now(),
        },
    )
}

#[derive(Serialize)]
struct PresenceStatsResponse {
    community_id: Uuid,
    stats: VisitorStats,
    division_breakdown: BTreeMap<String, u64>,
    cross_division: CrossDivisionStats,
    peaks: PeakCounts,
    degraded: bool,
    timestamp: DateTime<Utc>,
}

/// GET /api/communities/{id}/presence/stats
async fn presence_stats(state: &Arc<AppState>, community_id: Uuid) -> Response<Full<Bytes>> {
    let gathered = async {
        let stats = state.tracker.visitor_stats(community_id).await?;
        let division_breakdown = state.tracker.division_breakdown(community_id).await?;
        let cross_division = state
            .tracker
            .cross_division_stats(community_id, STATS_TOP_EDGES)
            .await?;
        let peaks = state.tracker.peak_counts(community_id).await?;
        Ok::<_, crate::types::EngineError>((stats, division_breakdown, cross_division, peaks))
    }
    .await;

    let response = match gathered {
        Ok((stats, division_breakdown, cross_division, peaks)) => PresenceStatsResponse {
            community_id,
            stats,
            division_breakdown,
            cross_division,
            peaks,
            degraded: false,
            timestamp: state.clock.now(),
        },
        Err(e) => {
            warn!(%community_id, error = %e, "presence stats degraded to zero");
            PresenceStatsResponse {
                community_id,
                stats: VisitorStats::from_counts(0, 0),
                division_breakdown: BTreeMap::new(),
                cross_division: CrossDivisionStats {
                    edges: Vec::new(),
                    cross_division_visitors: 0,
                    total_visitors: 0,
                    cross_division_percentage: 0.0,
                },
                peaks: PeakCounts::default(),
                degraded: true,
                timestamp: state.clock.now(),
            }
        }
    };

    json_response(StatusCode::OK, &response)
}

/// GET /health
fn health_check(state: &Arc<AppState>) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "status": "ok",
        "node_id": state.args.node_id,
        "dev_mode": state.args.dev_mode,
        "analytics_enabled": state.analytics.is_some(),
    });
    json_response(StatusCode::OK, &body)
}

#[derive(Serialize)]
struct VersionResponse {
    version: &'static str,
    commit: &'static str,
    build_time: &'static str,
    service: &'static str,
}

/// GET /version
///
/// Returns build information for deployment verification.
fn version_info() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &VersionResponse {
            version: env!("CARGO_PKG_VERSION"),
            commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
            build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
            service: "agora",
        },
    )
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_string(body)
        .unwrap_or_else(|_| r#"{"error": "serialization failed"}"#.to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

fn preflight_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type")
        .body(Full::new(Bytes::new()))
        .unwrap()
}

fn bad_request_response(message: &str) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::BAD_REQUEST,
        &serde_json::json!({ "error": message }),
    )
}

fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::NOT_FOUND,
        &serde_json::json!({ "error": format!("Not found: {}", path) }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_reports_crate_version() {
        let response = version_info();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn unknown_path_is_404() {
        let response = not_found_response("/nope");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
