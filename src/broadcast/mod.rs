//! Presence broadcast gateway
//!
//! Fans presence deltas out to real-time subscribers: cross-instance via a
//! NATS subject per community, in-process via a broadcast channel the
//! WebSocket layer subscribes to. The gateway is a pure side-effecting
//! consumer of tracker results — the store stays the source of truth, so
//! publish failures are logged and swallowed, never surfaced to the
//! mutation path.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::nats::NatsClient;

/// Capacity of each community's in-process channel; slow subscribers drop
/// old deltas rather than backpressure the mutation path
const CHANNEL_CAPACITY: usize = 64;

/// NATS subject carrying a community's presence deltas
pub fn presence_subject(community_id: &Uuid) -> String {
    format!("presence.{}", community_id)
}

/// Kind of presence delta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceEventKind {
    VisitorJoined,
    VisitorLeft,
    VisitorCountUpdate,
}

/// Envelope published on a community's presence channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceUpdate {
    #[serde(rename = "type")]
    pub kind: PresenceEventKind,
    pub community_id: Uuid,
    /// Presence size after the mutation
    pub count: u64,
    /// Signed delta this event represents
    pub change: i64,
    pub timestamp: DateTime<Utc>,
}

/// Fans presence deltas out to subscribers
pub struct BroadcastGateway {
    nats: Option<NatsClient>,
    channels: DashMap<Uuid, broadcast::Sender<PresenceUpdate>>,
    clock: Arc<dyn Clock>,
}

impl BroadcastGateway {
    pub fn new(nats: Option<NatsClient>, clock: Arc<dyn Clock>) -> Self {
        Self {
            nats,
            channels: DashMap::new(),
            clock,
        }
    }

    /// Publish one presence delta. Fire-and-forget: failures are logged and
    /// swallowed.
    pub async fn publish(
        &self,
        community_id: Uuid,
        kind: PresenceEventKind,
        count: u64,
        change: i64,
    ) {
        let update = PresenceUpdate {
            kind,
            community_id,
            count,
            change,
            timestamp: self.clock.now(),
        };

        let payload = match serde_json::to_vec(&update) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(%community_id, error = %e, "presence update not serializable");
                return;
            }
        };

        if let Some(nats) = &self.nats {
            if let Err(e) = nats
                .publish(&presence_subject(&community_id), payload.into())
                .await
            {
                warn!(%community_id, error = %e, "presence publish dropped");
            }
        }

        if let Some(sender) = self.channels.get(&community_id) {
            // a send error just means every local subscriber is gone
            let delivered = sender.send(update).unwrap_or(0);
            debug!(%community_id, delivered, "presence update fanned out");
        }

        // drop channels nobody listens to anymore
        self.channels
            .remove_if(&community_id, |_, sender| sender.receiver_count() == 0);
    }

    /// Subscribe to a community's presence deltas on this instance
    pub fn subscribe(&self, community_id: Uuid) -> broadcast::Receiver<PresenceUpdate> {
        self.channels
            .entry(community_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }
}
