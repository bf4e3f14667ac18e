//! Stale-visitor reaper
//!
//! Client disconnects are often never observed; the reaper sweeps each
//! active community on an interval and evicts visitors whose last activity
//! fell behind the presence window, keeping derived counts honest. Removal
//! is idempotent, so overlapping sweeps from multiple replicas degrade to
//! no-ops rather than double-counting.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broadcast::{BroadcastGateway, PresenceEventKind};
use crate::clock::Clock;
use crate::types::Result;

use super::tracker::VisitorTracker;

/// Reaper configuration
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// Interval between sweeps; keep at or below half the presence timeout
    pub interval: Duration,
    /// Inactivity window after which a visitor is stale
    pub presence_timeout: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(150),
            presence_timeout: Duration::from_secs(300),
        }
    }
}

/// Periodic sweep that evicts inactive visitors
pub struct StaleVisitorReaper {
    config: ReaperConfig,
    tracker: Arc<VisitorTracker>,
    clock: Arc<dyn Clock>,
    /// When present, a sweep that evicted visitors pushes one count update
    /// per swept community
    gateway: Option<Arc<BroadcastGateway>>,
    shutdown_tx: mpsc::Sender<()>,
    shutdown_rx: std::sync::Mutex<Option<mpsc::Receiver<()>>>,
}

impl StaleVisitorReaper {
    pub fn new(
        config: ReaperConfig,
        tracker: Arc<VisitorTracker>,
        clock: Arc<dyn Clock>,
        gateway: Option<Arc<BroadcastGateway>>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        Self {
            config,
            tracker,
            clock,
            gateway,
            shutdown_tx,
            shutdown_rx: std::sync::Mutex::new(Some(shutdown_rx)),
        }
    }

    /// Spawn the sweep loop
    pub fn start(self: &Arc<Self>) {
        let Some(mut shutdown_rx) = self.shutdown_rx.lock().unwrap().take() else {
            warn!("reaper already started");
            return;
        };

        info!(
            interval_secs = self.config.interval.as_secs(),
            presence_timeout_secs = self.config.presence_timeout.as_secs(),
            "Starting stale-visitor reaper"
        );

        let reaper = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(reaper.config.interval);
            // the first tick fires immediately; skip it so startup is quiet
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = reaper.sweep_all().await;
                        if removed > 0 {
                            info!(removed, "reaper sweep evicted stale visitors");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Stopping stale-visitor reaper");
                        break;
                    }
                }
            }
        });
    }

    /// Stop the sweep loop
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }

    /// Sweep every community with recent traffic; returns total evictions
    pub async fn sweep_all(&self) -> u64 {
        let communities = match self.tracker.active_communities().await {
            Ok(communities) => communities,
            Err(e) => {
                warn!(error = %e, "reaper could not list active communities");
                return 0;
            }
        };

        let mut removed = 0;
        for community_id in communities {
            removed += self.sweep(community_id).await;
        }
        removed
    }

    /// Evict visitors in one community whose last activity predates the
    /// cutoff; returns the number evicted
    pub async fn sweep(&self, community_id: Uuid) -> u64 {
        match self.sweep_inner(community_id).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(%community_id, error = %e, "sweep skipped");
                0
            }
        }
    }

    async fn sweep_inner(&self, community_id: Uuid) -> Result<u64> {
        let cutoff = self.clock.now()
            - chrono::Duration::from_std(self.config.presence_timeout)
                .unwrap_or(chrono::Duration::zero());

        let entries = self.tracker.visitor_list(community_id).await?;
        let mut removed = 0u64;
        let mut count = 0u64;

        for entry in entries {
            if entry.last_activity < cutoff {
                count = self.tracker.remove_visitor(community_id, &entry.identity).await;
                removed += 1;
                debug!(%community_id, identity = %entry.identity, "evicted stale visitor");
            }
        }

        if removed > 0 {
            if let Some(gateway) = &self.gateway {
                gateway
                    .publish(
                        community_id,
                        PresenceEventKind::VisitorCountUpdate,
                        count,
                        -(removed as i64),
                    )
                    .await;
            }
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::presence::tracker::VisitorArrival;
    use crate::store::MemoryPresenceStore;
    use chrono::TimeZone;

    fn setup() -> (Arc<ManualClock>, Arc<VisitorTracker>, StaleVisitorReaper) {
        let clock = Arc::new(ManualClock::new(
            chrono::Utc.with_ymd_and_hms(2026, 3, 10, 14, 0, 0).unwrap(),
        ));
        let store = Arc::new(MemoryPresenceStore::new(clock.clone()));
        let tracker = Arc::new(VisitorTracker::new(
            store,
            clock.clone(),
            Duration::from_secs(300),
        ));
        let reaper = StaleVisitorReaper::new(
            ReaperConfig {
                interval: Duration::from_secs(150),
                presence_timeout: Duration::from_secs(300),
            },
            tracker.clone(),
            clock.clone(),
            None,
        );
        (clock, tracker, reaper)
    }

    fn visitor(user_id: &str) -> VisitorArrival {
        VisitorArrival {
            user_id: Some(user_id.to_string()),
            is_authenticated: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn sweep_evicts_only_stale_visitors() {
        let (clock, tracker, reaper) = setup();
        let community = Uuid::new_v4();

        tracker.add_visitor(community, visitor("stale")).await.unwrap();
        clock.advance_secs(200);
        tracker.add_visitor(community, visitor("fresh")).await.unwrap();

        // "stale" is now 320s old, "fresh" 120s
        clock.advance_secs(120);
        let removed = reaper.sweep(community).await;

        assert_eq!(removed, 1);
        assert_eq!(tracker.visitor_count(community).await.unwrap(), 1);
        let survivors = tracker.visitor_list(community).await.unwrap();
        assert_eq!(survivors[0].identity, "fresh");
    }

    #[tokio::test]
    async fn duplicate_sweeps_are_no_ops() {
        let (clock, tracker, reaper) = setup();
        let community = Uuid::new_v4();

        tracker.add_visitor(community, visitor("u1")).await.unwrap();
        clock.advance_secs(200);
        tracker.add_visitor(community, visitor("fresh")).await.unwrap();
        clock.advance_secs(150);

        assert_eq!(reaper.sweep(community).await, 1);
        assert_eq!(reaper.sweep(community).await, 0);
        assert_eq!(tracker.visitor_count(community).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn sweep_all_covers_every_active_community() {
        let (clock, tracker, reaper) = setup();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        tracker.add_visitor(first, visitor("u1")).await.unwrap();
        tracker.add_visitor(second, visitor("u2")).await.unwrap();
        clock.advance_secs(150);
        tracker.add_visitor(first, visitor("fresh1")).await.unwrap();
        tracker.add_visitor(second, visitor("fresh2")).await.unwrap();
        clock.advance_secs(170);

        // the original pair is now 320s stale, past the 300s window
        assert_eq!(reaper.sweep_all().await, 2);
    }

    #[tokio::test]
    async fn heartbeat_saves_a_visitor_from_the_reaper() {
        let (clock, tracker, reaper) = setup();
        let community = Uuid::new_v4();

        tracker.add_visitor(community, visitor("u1")).await.unwrap();
        clock.advance_secs(290);
        tracker.heartbeat(community, "u1", false).await.unwrap();
        clock.advance_secs(290);

        assert_eq!(reaper.sweep(community).await, 0);
        assert_eq!(tracker.visitor_count(community).await.unwrap(), 1);
    }
}
