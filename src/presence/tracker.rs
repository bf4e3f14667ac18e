//! Visitor tracker
//!
//! Owns join/leave/heartbeat semantics over the presence store. Every
//! mutation is a short sequence of atomic store primitives; the tracker holds
//! no in-process state, so any number of replicas can run against the same
//! store. Counts are advisory (presence, not billing): interleavings settle
//! to consistent values via idempotent re-entry and floor-guarded gauges.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::store::{keys, PresenceStore};
use crate::types::Result;

use super::entry::{
    CrossDivisionEdge, CrossDivisionStats, HeartbeatOutcome, InvalidVisitor, PeakCounts,
    PeakWindow, VisitorAdmission, VisitorEntry, VisitorStats,
};

/// The active-communities registry outlives the presence window so the
/// reaper can settle gauges after a community's traffic stops.
const ACTIVE_REGISTRY_WINDOWS: u32 = 2;

/// Retention for the cross-division ledger; it is historical, not live
const LEDGER_RETENTION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// An arriving visitor, as reported by the transport front end
#[derive(Debug, Clone, Default)]
pub struct VisitorArrival {
    /// Required for authenticated visitors
    pub user_id: Option<String>,
    pub is_authenticated: bool,
    /// Required for anonymous visitors
    pub device_fingerprint: Option<String>,
    /// Visitor's home division, if known
    pub home_division_id: Option<String>,
    /// Division the visited community belongs to, if known
    pub community_division_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Tracks who is currently viewing each community
pub struct VisitorTracker {
    store: Arc<dyn PresenceStore>,
    clock: Arc<dyn Clock>,
    /// Sliding TTL after which an inactive visitor is considered gone
    presence_timeout: Duration,
}

impl VisitorTracker {
    pub fn new(
        store: Arc<dyn PresenceStore>,
        clock: Arc<dyn Clock>,
        presence_timeout: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            presence_timeout,
        }
    }

    pub fn presence_timeout(&self) -> Duration {
        self.presence_timeout
    }

    /// Admit a visitor to a community's presence set.
    ///
    /// Idempotent per identity: a repeat call updates the existing entry
    /// instead of duplicating it. Returns the post-mutation presence size
    /// and whether the visit crossed divisions. A visitor without the
    /// required identity material is rejected inside the result, not as an
    /// error; only store unavailability errors.
    pub async fn add_visitor(
        &self,
        community_id: Uuid,
        arrival: VisitorArrival,
    ) -> Result<VisitorAdmission> {
        let identity = match Self::derive_identity(&arrival) {
            Ok(identity) => identity,
            Err(reason) => {
                debug!(%community_id, %reason, "visitor rejected");
                return Ok(VisitorAdmission::rejected(reason));
            }
        };

        let now = self.clock.now();
        let ttl = self.presence_timeout;
        let previous = self.read_entry(&community_id, &identity).await?;

        let cross_division = matches!(
            (&arrival.home_division_id, &arrival.community_division_id),
            (Some(home), Some(visited)) if home != visited
        );

        let entry = VisitorEntry {
            identity: identity.clone(),
            is_authenticated: arrival.is_authenticated,
            home_division_id: arrival.home_division_id.clone(),
            is_cross_division: cross_division,
            joined_at: previous.as_ref().map(|p| p.joined_at).unwrap_or(now),
            last_activity: now,
            // a join lands on a page; the counter is monotonic across re-joins
            pages_viewed: previous.as_ref().map(|p| p.pages_viewed + 1).unwrap_or(1),
            ip_address: arrival.ip_address,
            user_agent: arrival.user_agent,
        };

        let serialized = serde_json::to_string(&entry)?;
        self.store
            .set_field(&keys::entries(&community_id), &identity, &serialized, ttl)
            .await?;

        let subset = if entry.is_authenticated {
            keys::authenticated(&community_id)
        } else {
            keys::anonymous(&community_id)
        };
        self.store.add_to_set(&subset, &identity, ttl).await?;

        // live division gauge: only moves when the division actually changes
        match &previous {
            Some(prev) if prev.home_division_id != entry.home_division_id => {
                if let Some(old) = &prev.home_division_id {
                    self.decrement_division(&community_id, old).await?;
                }
                if let Some(new) = &entry.home_division_id {
                    self.store
                        .increment_field(&keys::divisions(&community_id), new, 1, ttl)
                        .await?;
                }
            }
            Some(_) => {}
            None => {
                if let Some(new) = &entry.home_division_id {
                    self.store
                        .increment_field(&keys::divisions(&community_id), new, 1, ttl)
                        .await?;
                }
            }
        }

        // cross-division ledger: every qualifying join is a counted event
        if cross_division {
            let home = arrival.home_division_id.as_deref().unwrap_or_default();
            let visited = arrival.community_division_id.as_deref().unwrap_or_default();
            self.store
                .sorted_set_increment(
                    &keys::cross_division(&community_id),
                    &keys::cross_division_member(home, visited),
                    1.0,
                    LEDGER_RETENTION,
                )
                .await?;
        }

        self.store
            .add_to_set(
                &keys::active_communities(),
                &community_id.to_string(),
                ttl * ACTIVE_REGISTRY_WINDOWS,
            )
            .await?;

        let count = self.visitor_count(community_id).await?;
        self.update_peaks(&community_id, count).await?;

        debug!(%community_id, identity = %identity, count, cross_division, "visitor joined");
        Ok(VisitorAdmission::admitted(count, cross_division))
    }

    /// Remove a visitor and return the resulting presence size.
    ///
    /// Never errors: removing an unknown identity is a no-op, and a store
    /// outage degrades to a zero count. Idempotent, so concurrent reaper
    /// sweeps and explicit leaves cannot double-count.
    pub async fn remove_visitor(&self, community_id: Uuid, identity: &str) -> u64 {
        match self.remove_visitor_inner(community_id, identity).await {
            Ok(count) => count,
            Err(e) => {
                warn!(%community_id, identity, error = %e, "remove degraded to zero count");
                0
            }
        }
    }

    async fn remove_visitor_inner(&self, community_id: Uuid, identity: &str) -> Result<u64> {
        if let Some(previous) = self.read_entry(&community_id, identity).await? {
            self.store
                .remove_field(&keys::entries(&community_id), identity)
                .await?;

            let subset = if previous.is_authenticated {
                keys::authenticated(&community_id)
            } else {
                keys::anonymous(&community_id)
            };
            self.store.remove_from_set(&subset, identity).await?;

            if let Some(division) = &previous.home_division_id {
                self.decrement_division(&community_id, division).await?;
            }

            debug!(%community_id, identity, "visitor left");
        }

        self.visitor_count(community_id).await
    }

    /// Refresh a visitor's activity timestamp and TTL.
    ///
    /// Returns [`HeartbeatOutcome::Expired`] when no live entry exists so the
    /// caller can decide whether to re-issue AddVisitor.
    pub async fn heartbeat(
        &self,
        community_id: Uuid,
        identity: &str,
        increment_page_view: bool,
    ) -> Result<HeartbeatOutcome> {
        let Some(mut entry) = self.read_entry(&community_id, identity).await? else {
            return Ok(HeartbeatOutcome::Expired);
        };

        entry.last_activity = self.clock.now();
        if increment_page_view {
            entry.pages_viewed += 1;
        }

        let ttl = self.presence_timeout;
        let serialized = serde_json::to_string(&entry)?;
        self.store
            .set_field(&keys::entries(&community_id), identity, &serialized, ttl)
            .await?;

        // keep the subset key alive alongside the entries hash
        let subset = if entry.is_authenticated {
            keys::authenticated(&community_id)
        } else {
            keys::anonymous(&community_id)
        };
        self.store.add_to_set(&subset, identity, ttl).await?;

        Ok(HeartbeatOutcome::Refreshed)
    }

    /// Current presence size: authenticated + anonymous
    pub async fn visitor_count(&self, community_id: Uuid) -> Result<u64> {
        Ok(self.authenticated_count(community_id).await?
            + self.anonymous_count(community_id).await?)
    }

    pub async fn authenticated_count(&self, community_id: Uuid) -> Result<u64> {
        Ok(self.store.set_len(&keys::authenticated(&community_id)).await?)
    }

    pub async fn anonymous_count(&self, community_id: Uuid) -> Result<u64> {
        Ok(self.store.set_len(&keys::anonymous(&community_id)).await?)
    }

    /// Authenticated/anonymous breakdown with percentages (0% when empty)
    pub async fn visitor_stats(&self, community_id: Uuid) -> Result<VisitorStats> {
        let authenticated = self.authenticated_count(community_id).await?;
        let anonymous = self.anonymous_count(community_id).await?;
        Ok(VisitorStats::from_counts(authenticated, anonymous))
    }

    /// Live home-division gauge; zero and negative residues are filtered out
    pub async fn division_breakdown(
        &self,
        community_id: Uuid,
    ) -> Result<std::collections::BTreeMap<String, u64>> {
        let raw = self
            .store
            .get_all_fields(&keys::divisions(&community_id))
            .await?;

        Ok(raw
            .into_iter()
            .filter_map(|(division, count)| {
                let count = count.parse::<i64>().ok()?;
                (count > 0).then(|| (division, count as u64))
            })
            .collect())
    }

    /// Top-N cross-division edges (ledger) plus the live cross-division share
    pub async fn cross_division_stats(
        &self,
        community_id: Uuid,
        top_n: usize,
    ) -> Result<CrossDivisionStats> {
        let edges = self
            .store
            .sorted_set_top_n(&keys::cross_division(&community_id), top_n)
            .await?
            .into_iter()
            .filter_map(|(member, score)| {
                let (home, visited) = member.split_once('|')?;
                Some(CrossDivisionEdge {
                    home_division_id: home.to_string(),
                    community_division_id: visited.to_string(),
                    visits: score.max(0.0) as u64,
                })
            })
            .collect();

        let entries = self.visitor_list(community_id).await?;
        let total_visitors = entries.len() as u64;
        let cross_division_visitors =
            entries.iter().filter(|e| e.is_cross_division).count() as u64;
        let cross_division_percentage = if total_visitors == 0 {
            0.0
        } else {
            cross_division_visitors as f64 / total_visitors as f64 * 100.0
        };

        Ok(CrossDivisionStats {
            edges,
            cross_division_visitors,
            total_visitors,
            cross_division_percentage,
        })
    }

    /// Peak presence for the current daily/weekly/monthly windows
    pub async fn peak_counts(&self, community_id: Uuid) -> Result<PeakCounts> {
        let now = self.clock.now();
        let mut peaks = PeakCounts::default();
        for window in PeakWindow::ALL {
            let key = keys::peak(&community_id, window.label(), &window.token(now));
            let value = self
                .store
                .get(&key)
                .await?
                .and_then(|raw| raw.parse::<u64>().ok())
                .unwrap_or(0);
            match window {
                PeakWindow::Daily => peaks.daily = value,
                PeakWindow::Weekly => peaks.weekly = value,
                PeakWindow::Monthly => peaks.monthly = value,
            }
        }
        Ok(peaks)
    }

    /// All live entries for a community
    pub async fn visitor_list(&self, community_id: Uuid) -> Result<Vec<VisitorEntry>> {
        let raw = self
            .store
            .get_all_fields(&keys::entries(&community_id))
            .await?;

        let mut entries = Vec::with_capacity(raw.len());
        for (identity, serialized) in raw {
            match serde_json::from_str::<VisitorEntry>(&serialized) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(%community_id, identity, error = %e, "skipping malformed entry"),
            }
        }
        entries.sort_by(|a, b| a.identity.cmp(&b.identity));
        Ok(entries)
    }

    /// Communities with recent presence traffic (reaper work list)
    pub async fn active_communities(&self) -> Result<Vec<Uuid>> {
        let members = self.store.set_members(&keys::active_communities()).await?;
        Ok(members
            .iter()
            .filter_map(|raw| Uuid::parse_str(raw).ok())
            .collect())
    }

    fn derive_identity(arrival: &VisitorArrival) -> std::result::Result<String, InvalidVisitor> {
        if arrival.is_authenticated {
            match arrival.user_id.as_deref() {
                Some(user_id) if !user_id.is_empty() => Ok(user_id.to_string()),
                _ => Err(InvalidVisitor::MissingUserId),
            }
        } else {
            match arrival.device_fingerprint.as_deref() {
                Some(fingerprint) if !fingerprint.is_empty() => {
                    Ok(keys::anonymous_identity(fingerprint))
                }
                _ => Err(InvalidVisitor::MissingFingerprint),
            }
        }
    }

    async fn read_entry(
        &self,
        community_id: &Uuid,
        identity: &str,
    ) -> Result<Option<VisitorEntry>> {
        let raw = self
            .store
            .get_field(&keys::entries(community_id), identity)
            .await?;

        Ok(raw.and_then(|serialized| {
            serde_json::from_str(&serialized)
                .map_err(|e| {
                    warn!(%community_id, identity, error = %e, "malformed entry dropped");
                    e
                })
                .ok()
        }))
    }

    /// Decrement the live gauge for a division, flooring at zero.
    ///
    /// The decrement itself is atomic; a concurrent sweep may already have
    /// settled the same leave, in which case the residue goes negative and
    /// the field is dropped.
    async fn decrement_division(&self, community_id: &Uuid, division: &str) -> Result<()> {
        let remaining = self
            .store
            .increment_field(
                &keys::divisions(community_id),
                division,
                -1,
                self.presence_timeout,
            )
            .await?;

        if remaining <= 0 {
            self.store
                .remove_field(&keys::divisions(community_id), division)
                .await?;
        }

        Ok(())
    }

    /// Raise peak counters on strict increase only.
    ///
    /// Read-compare-set: the store contract has no atomic max, and advisory
    /// counts tolerate a lost race.
    async fn update_peaks(&self, community_id: &Uuid, count: u64) -> Result<()> {
        let now = self.clock.now();
        for window in PeakWindow::ALL {
            let key = keys::peak(community_id, window.label(), &window.token(now));
            let current = self
                .store
                .get(&key)
                .await?
                .and_then(|raw| raw.parse::<u64>().ok())
                .unwrap_or(0);

            if count > current {
                self.store
                    .set(&key, &count.to_string(), window.retention())
                    .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryPresenceStore;
    use chrono::TimeZone;

    fn tracker() -> (Arc<ManualClock>, VisitorTracker) {
        let clock = Arc::new(ManualClock::new(
            chrono::Utc.with_ymd_and_hms(2026, 3, 10, 14, 0, 0).unwrap(),
        ));
        let store = Arc::new(MemoryPresenceStore::new(clock.clone()));
        let tracker = VisitorTracker::new(store, clock.clone(), Duration::from_secs(300));
        (clock, tracker)
    }

    fn authenticated(user_id: &str, home: Option<&str>, visited: Option<&str>) -> VisitorArrival {
        VisitorArrival {
            user_id: Some(user_id.to_string()),
            is_authenticated: true,
            home_division_id: home.map(String::from),
            community_division_id: visited.map(String::from),
            user_agent: Some("test-agent/1.0".to_string()),
            ..Default::default()
        }
    }

    fn anonymous(fingerprint: &str) -> VisitorArrival {
        VisitorArrival {
            device_fingerprint: Some(fingerprint.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn count_is_sum_of_subsets_at_every_step() {
        let (_, tracker) = tracker();
        let community = Uuid::new_v4();

        tracker.add_visitor(community, authenticated("u1", None, None)).await.unwrap();
        tracker.add_visitor(community, anonymous("fp1")).await.unwrap();
        tracker.add_visitor(community, authenticated("u2", None, None)).await.unwrap();

        let total = tracker.visitor_count(community).await.unwrap();
        let auth = tracker.authenticated_count(community).await.unwrap();
        let anon = tracker.anonymous_count(community).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!((auth, anon), (2, 1));
        assert_eq!(total, auth + anon);

        tracker.remove_visitor(community, "u1").await;
        let total = tracker.visitor_count(community).await.unwrap();
        let auth = tracker.authenticated_count(community).await.unwrap();
        let anon = tracker.anonymous_count(community).await.unwrap();
        assert_eq!(total, auth + anon);
        assert_eq!(total, 2);
    }

    #[tokio::test]
    async fn repeat_join_is_idempotent() {
        let (_, tracker) = tracker();
        let community = Uuid::new_v4();

        let first = tracker
            .add_visitor(community, authenticated("u1", Some("d1"), Some("d1")))
            .await
            .unwrap();
        let second = tracker
            .add_visitor(community, authenticated("u1", Some("d1"), Some("d1")))
            .await
            .unwrap();

        assert_eq!(first.current_count, 1);
        assert_eq!(second.current_count, 1);

        let breakdown = tracker.division_breakdown(community).await.unwrap();
        assert_eq!(breakdown.get("d1"), Some(&1));
    }

    #[tokio::test]
    async fn rejoining_with_new_division_supersedes_old() {
        let (_, tracker) = tracker();
        let community = Uuid::new_v4();

        tracker
            .add_visitor(community, authenticated("u1", Some("d1"), None))
            .await
            .unwrap();
        tracker
            .add_visitor(community, authenticated("u1", Some("d2"), None))
            .await
            .unwrap();

        let breakdown = tracker.division_breakdown(community).await.unwrap();
        assert_eq!(breakdown.get("d1"), None);
        assert_eq!(breakdown.get("d2"), Some(&1));
        assert_eq!(tracker.visitor_count(community).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn division_gauge_never_goes_negative() {
        let (_, tracker) = tracker();
        let community = Uuid::new_v4();

        tracker
            .add_visitor(community, authenticated("u1", Some("d1"), None))
            .await
            .unwrap();
        tracker.remove_visitor(community, "u1").await;
        // second leave for the same identity is a no-op
        tracker.remove_visitor(community, "u1").await;

        let breakdown = tracker.division_breakdown(community).await.unwrap();
        assert!(breakdown.values().all(|&count| count > 0));
        assert_eq!(breakdown.get("d1"), None);
    }

    #[tokio::test]
    async fn remove_unknown_identity_reports_current_size() {
        let (_, tracker) = tracker();
        let community = Uuid::new_v4();

        tracker.add_visitor(community, authenticated("u1", None, None)).await.unwrap();
        let count = tracker.remove_visitor(community, "ghost").await;
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn anonymous_visitor_without_fingerprint_is_rejected() {
        let (_, tracker) = tracker();
        let community = Uuid::new_v4();

        let admission = tracker
            .add_visitor(community, VisitorArrival::default())
            .await
            .unwrap();

        assert_eq!(admission.rejected, Some(InvalidVisitor::MissingFingerprint));
        assert_eq!(admission.current_count, 0);
        assert_eq!(tracker.visitor_count(community).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn peaks_are_monotonic_within_a_window() {
        let (_, tracker) = tracker();
        let community = Uuid::new_v4();

        for i in 0..3 {
            tracker
                .add_visitor(community, authenticated(&format!("u{}", i), None, None))
                .await
                .unwrap();
        }
        let high = tracker.peak_counts(community).await.unwrap();
        assert_eq!(high.daily, 3);
        assert_eq!(high.weekly, 3);
        assert_eq!(high.monthly, 3);

        tracker.remove_visitor(community, "u0").await;
        tracker.remove_visitor(community, "u1").await;
        tracker
            .add_visitor(community, authenticated("u9", None, None))
            .await
            .unwrap();

        let after = tracker.peak_counts(community).await.unwrap();
        assert_eq!(after.daily, 3);
    }

    #[tokio::test]
    async fn cross_division_scenario() {
        let (_, tracker) = tracker();
        let community = Uuid::new_v4();

        let same = tracker
            .add_visitor(community, authenticated("u1", Some("d1"), Some("d1")))
            .await
            .unwrap();
        assert!(!same.cross_division);

        let crossed = tracker
            .add_visitor(community, authenticated("u2", Some("d2"), Some("d1")))
            .await
            .unwrap();
        assert!(crossed.cross_division);

        let stats = tracker.cross_division_stats(community, 10).await.unwrap();
        assert_eq!(stats.total_visitors, 2);
        assert_eq!(stats.cross_division_visitors, 1);
        assert_eq!(stats.cross_division_percentage, 50.0);
        assert_eq!(
            stats.edges,
            vec![CrossDivisionEdge {
                home_division_id: "d2".to_string(),
                community_division_id: "d1".to_string(),
                visits: 1,
            }]
        );
    }

    #[tokio::test]
    async fn division_scenario_end_to_end() {
        let (_, tracker) = tracker();
        let community = Uuid::new_v4();

        tracker
            .add_visitor(community, authenticated("u1", Some("d1"), Some("d1")))
            .await
            .unwrap();
        let stats = tracker.cross_division_stats(community, 10).await.unwrap();
        assert_eq!(stats.cross_division_visitors, 0);
        assert_eq!(
            tracker.division_breakdown(community).await.unwrap().get("d1"),
            Some(&1)
        );

        tracker
            .add_visitor(community, authenticated("u2", Some("d2"), Some("d1")))
            .await
            .unwrap();
        let stats = tracker.cross_division_stats(community, 10).await.unwrap();
        assert_eq!(stats.cross_division_visitors, 1);

        let count = tracker.remove_visitor(community, "u1").await;
        assert_eq!(count, 1);
        let breakdown = tracker.division_breakdown(community).await.unwrap();
        assert_eq!(breakdown.get("d1"), None);
        assert_eq!(breakdown.get("d2"), Some(&1));
        let stats = tracker.cross_division_stats(community, 10).await.unwrap();
        assert_eq!(stats.cross_division_visitors, 1);
        assert_eq!(stats.total_visitors, 1);
        assert_eq!(stats.cross_division_percentage, 100.0);
    }

    #[tokio::test]
    async fn ledger_is_not_decremented_on_leave() {
        let (_, tracker) = tracker();
        let community = Uuid::new_v4();

        tracker
            .add_visitor(community, authenticated("u2", Some("d2"), Some("d1")))
            .await
            .unwrap();
        tracker.remove_visitor(community, "u2").await;

        let stats = tracker.cross_division_stats(community, 10).await.unwrap();
        assert_eq!(stats.edges.len(), 1);
        assert_eq!(stats.edges[0].visits, 1);
        assert_eq!(stats.cross_division_visitors, 0);
    }

    #[tokio::test]
    async fn heartbeat_round_trip() {
        let (clock, tracker) = tracker();
        let community = Uuid::new_v4();

        tracker.add_visitor(community, anonymous("fp1")).await.unwrap();
        let joined = tracker.visitor_list(community).await.unwrap();
        assert_eq!(joined[0].pages_viewed, 1);

        clock.advance_secs(30);
        let heartbeat_at = clock.now();
        let outcome = tracker
            .heartbeat(community, &keys::anonymous_identity("fp1"), true)
            .await
            .unwrap();
        assert_eq!(outcome, HeartbeatOutcome::Refreshed);

        let entries = tracker.visitor_list(community).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].pages_viewed, 2);
        assert!(entries[0].last_activity >= heartbeat_at);
    }

    #[tokio::test]
    async fn heartbeat_for_unknown_identity_signals_expired() {
        let (_, tracker) = tracker();
        let community = Uuid::new_v4();

        let outcome = tracker.heartbeat(community, "u1", false).await.unwrap();
        assert_eq!(outcome, HeartbeatOutcome::Expired);
    }

    #[tokio::test]
    async fn stats_split_authenticated_and_anonymous() {
        let (_, tracker) = tracker();
        let community = Uuid::new_v4();

        tracker.add_visitor(community, authenticated("u1", None, None)).await.unwrap();
        tracker.add_visitor(community, anonymous("fp1")).await.unwrap();
        tracker.add_visitor(community, anonymous("fp2")).await.unwrap();
        tracker.add_visitor(community, anonymous("fp3")).await.unwrap();

        let stats = tracker.visitor_stats(community).await.unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.authenticated, 1);
        assert_eq!(stats.anonymous, 3);
        assert_eq!(stats.authenticated_percentage, 25.0);
        assert_eq!(stats.anonymous_percentage, 75.0);
    }

    #[tokio::test]
    async fn active_registry_tracks_communities_with_traffic() {
        let (_, tracker) = tracker();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        tracker.add_visitor(first, anonymous("fp1")).await.unwrap();
        tracker.add_visitor(second, anonymous("fp2")).await.unwrap();

        let mut active = tracker.active_communities().await.unwrap();
        active.sort();
        let mut expected = vec![first, second];
        expected.sort();
        assert_eq!(active, expected);
    }
}
