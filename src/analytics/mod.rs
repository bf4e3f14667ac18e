//! Historical visitor analytics
//!
//! Read-only aggregation over the durable event/session stores, plus a
//! pass-through to live presence so consumers get one interface for both.
//! Historical queries are heavier than presence reads and belong off the hot
//! request path; results are exact but not on a real-time budget.
//!
//! Missing data yields zeroed structures. Infrastructure failures are
//! recovered here and logged, degrading to the same zeroed structures;
//! only domain conditions (an unknown community) surface as errors.

mod store;

pub use store::MongoAnalyticsStore;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::clock::Clock;
use crate::presence::VisitorTracker;
use crate::types::{EngineError, Result};

/// Hourly trends are capped at 7 days of buckets
const MAX_HOURLY_BUCKETS: u32 = 168;

/// How many landing pages the conversion funnel reports
const TOP_LANDING_PAGES: usize = 10;

// ============================================================================
// Durable records (as read from the external stores)
// ============================================================================

/// One authenticated visit
#[derive(Debug, Clone)]
pub struct VisitEvent {
    pub community_id: Uuid,
    pub user_id: String,
    pub visitor_division_id: Option<String>,
    pub community_division_id: Option<String>,
    pub is_cross_division: bool,
    pub visited_at: DateTime<Utc>,
}

/// One anonymous browsing session
#[derive(Debug, Clone, Default)]
pub struct AnonymousSession {
    pub fingerprint: String,
    pub device_type: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub landing_page: Option<String>,
    pub started_at: DateTime<Utc>,
    pub converted_to_user: Option<String>,
    pub converted_at: Option<DateTime<Utc>>,
}

/// One anonymous page view
#[derive(Debug, Clone)]
pub struct AnonymousPageView {
    pub fingerprint: String,
    pub url: String,
    pub viewed_at: DateTime<Utc>,
}

// ============================================================================
// Collaborator interfaces
// ============================================================================

/// Community lookups owned by the relational layer
#[async_trait]
pub trait CommunityDirectory: Send + Sync {
    async fn community_exists(&self, community_id: Uuid) -> Result<bool>;
    async fn community_division(&self, community_id: Uuid) -> Result<Option<String>>;
    /// Slug anchoring the community's URL namespace (`/c/<slug>/...`)
    async fn community_slug(&self, community_id: Uuid) -> Result<Option<String>>;
}

/// Durable authenticated-visit store owned by the content pipeline
#[async_trait]
pub trait VisitEventStore: Send + Sync {
    async fn record_authenticated_visit(&self, event: VisitEvent) -> Result<()>;
    async fn visits_in_range(
        &self,
        community_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<VisitEvent>>;
}

/// Durable anonymous session/page-view store owned by the content pipeline
#[async_trait]
pub trait AnonymousActivityStore: Send + Sync {
    /// Sessions started within the range
    async fn sessions_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AnonymousSession>>;

    /// Page views whose URL equals `path` or lives under it
    async fn page_views_for_path(
        &self,
        path: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AnonymousPageView>>;
}

// ============================================================================
// Read models
// ============================================================================

/// Distinct visitors in a range.
///
/// Authenticated and anonymous populations are counted independently and
/// summed without cross-population de-duplication: a visitor who browsed
/// anonymously and then authenticated inside the same window is counted in
/// both populations. Known limitation, kept deliberately.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UniqueVisitorCounts {
    pub authenticated: u64,
    pub anonymous: u64,
    pub total: u64,
}

/// Division breakdown of visits in a range
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DivisionVisitBreakdown {
    /// Authenticated visits where the visitor's division matched the
    /// community's
    pub same_division: u64,
    /// Authenticated visits flagged cross-division
    pub cross_division: u64,
    /// Authenticated visits with no division on record
    pub no_division: u64,
    /// Distinct anonymous visitors in the range
    pub anonymous: u64,
    pub total: u64,
}

/// Bucket granularity for visitor trends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendGranularity {
    Hourly,
    Daily,
    Weekly,
}

impl TrendGranularity {
    /// Case-insensitive parse; anything unrecognized is `None` and yields an
    /// empty trend list rather than an error
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "hourly" => Some(Self::Hourly),
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            _ => None,
        }
    }

    fn step(&self) -> ChronoDuration {
        match self {
            Self::Hourly => ChronoDuration::hours(1),
            Self::Daily => ChronoDuration::days(1),
            Self::Weekly => ChronoDuration::days(7),
        }
    }

    fn bucket_count(&self, days: u32) -> u32 {
        match self {
            Self::Hourly => (days * 24).min(MAX_HOURLY_BUCKETS),
            Self::Daily => days,
            Self::Weekly => days.div_ceil(7),
        }
    }
}

/// One time bucket of a visitor trend
#[derive(Debug, Clone, Serialize)]
pub struct TrendBucket {
    pub bucket_start: DateTime<Utc>,
    pub bucket_end: DateTime<Utc>,
    pub visitors: UniqueVisitorCounts,
}

/// Landing page ranked by conversions
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LandingPageConversions {
    pub page: String,
    pub conversions: u64,
}

/// Anonymous-to-authenticated conversion funnel over a range
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversionMetrics {
    pub total_conversions: u64,
    pub total_anonymous_sessions: u64,
    /// Conversions over sessions started in range, as a percentage; 0 when
    /// no sessions started
    pub overall_conversion_rate: f64,
    pub average_seconds_to_conversion: f64,
    pub top_landing_pages: Vec<LandingPageConversions>,
}

/// Device/browser/OS breakdown of anonymous sessions that touched a
/// community's pages
#[derive(Debug, Clone, Default, Serialize)]
pub struct VisitorDemographics {
    pub device_types: BTreeMap<String, u64>,
    pub browsers: BTreeMap<String, u64>,
    pub operating_systems: BTreeMap<String, u64>,
    pub total_sessions: u64,
}

/// Live presence snapshot for analytics consumers
#[derive(Debug, Clone, Serialize)]
pub struct RealtimeVisitors {
    pub community_id: Uuid,
    pub total: u64,
    pub authenticated: u64,
    pub anonymous: u64,
    /// Set when the presence store was unreachable and counts degraded to
    /// zero
    pub degraded: bool,
    pub timestamp: DateTime<Utc>,
}

/// Period-over-period growth of unique visitors
#[derive(Debug, Clone, Default, Serialize)]
pub struct VisitorGrowthRate {
    pub period_days: u32,
    pub current_period_total: u64,
    pub previous_period_total: u64,
    /// Growth from a zero baseline is 100% when the current period is
    /// non-zero, else 0%
    pub growth_rate_percent: f64,
}

// ============================================================================
// Aggregator
// ============================================================================

/// Computes date-ranged analytics from the durable stores and live presence
pub struct AnalyticsAggregator {
    directory: Arc<dyn CommunityDirectory>,
    visits: Arc<dyn VisitEventStore>,
    anonymous: Arc<dyn AnonymousActivityStore>,
    tracker: Arc<VisitorTracker>,
    clock: Arc<dyn Clock>,
}

impl AnalyticsAggregator {
    pub fn new(
        directory: Arc<dyn CommunityDirectory>,
        visits: Arc<dyn VisitEventStore>,
        anonymous: Arc<dyn AnonymousActivityStore>,
        tracker: Arc<VisitorTracker>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            directory,
            visits,
            anonymous,
            tracker,
            clock,
        }
    }

    /// Distinct visitors in `[start, end)`.
    ///
    /// See [`UniqueVisitorCounts`] for the cross-population double-count
    /// caveat.
    pub async fn unique_visitors(
        &self,
        community_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> UniqueVisitorCounts {
        let authenticated = match self.visits.visits_in_range(community_id, start, end).await {
            Ok(visits) => {
                visits
                    .iter()
                    .map(|v| v.user_id.as_str())
                    .collect::<HashSet<_>>()
                    .len() as u64
            }
            Err(e) => {
                warn!(%community_id, error = %e, "visit query degraded to zero");
                0
            }
        };

        let anonymous = self
            .distinct_anonymous_visitors(community_id, start, end)
            .await;

        UniqueVisitorCounts {
            authenticated,
            anonymous,
            total: authenticated + anonymous,
        }
    }

    /// Division breakdown of visits in `[start, end)`.
    ///
    /// Errors with [`EngineError::CommunityNotFound`] when the community no
    /// longer exists; that is distinct from a zero-count success.
    pub async fn division_breakdown(
        &self,
        community_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<DivisionVisitBreakdown> {
        match self.directory.community_exists(community_id).await {
            Ok(true) => {}
            Ok(false) => return Err(EngineError::CommunityNotFound(community_id)),
            Err(e) => {
                warn!(%community_id, error = %e, "existence check degraded");
                return Ok(DivisionVisitBreakdown::default());
            }
        }

        let visits = match self.visits.visits_in_range(community_id, start, end).await {
            Ok(visits) => visits,
            Err(e) => {
                warn!(%community_id, error = %e, "visit query degraded to zero");
                Vec::new()
            }
        };

        let mut breakdown = DivisionVisitBreakdown::default();
        for visit in &visits {
            if visit.is_cross_division {
                breakdown.cross_division += 1;
            } else {
                match (&visit.visitor_division_id, &visit.community_division_id) {
                    (Some(home), Some(community)) if home == community => {
                        breakdown.same_division += 1
                    }
                    (None, _) => breakdown.no_division += 1,
                    // division on record but the community side is unknown
                    _ => breakdown.no_division += 1,
                }
            }
        }

        breakdown.anonymous = self
            .distinct_anonymous_visitors(community_id, start, end)
            .await;
        breakdown.total = breakdown.same_division
            + breakdown.cross_division
            + breakdown.no_division
            + breakdown.anonymous;

        Ok(breakdown)
    }

    /// Time-bucketed unique-visitor snapshots over the trailing `days`.
    ///
    /// The sequence is produced eagerly and is finite: hourly is capped at
    /// 168 buckets. An unrecognized granularity yields an empty list.
    pub async fn visitor_trends(
        &self,
        community_id: Uuid,
        days: u32,
        granularity: &str,
    ) -> Vec<TrendBucket> {
        let Some(granularity) = TrendGranularity::parse(granularity) else {
            return Vec::new();
        };

        let end = self.clock.now();
        let buckets = granularity.bucket_count(days);
        let step = granularity.step();
        let start = end - step * buckets as i32;

        let mut trends = Vec::with_capacity(buckets as usize);
        let mut bucket_start = start;
        for _ in 0..buckets {
            let bucket_end = bucket_start + step;
            let visitors = self
                .unique_visitors(community_id, bucket_start, bucket_end.min(end))
                .await;
            trends.push(TrendBucket {
                bucket_start,
                bucket_end: bucket_end.min(end),
                visitors,
            });
            bucket_start = bucket_end;
        }
        trends
    }

    /// Conversion funnel over sessions started in `[start, end)`
    pub async fn conversion_metrics(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ConversionMetrics {
        let sessions = match self.anonymous.sessions_in_range(start, end).await {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!(error = %e, "session query degraded to zero");
                return ConversionMetrics::default();
            }
        };

        let total_anonymous_sessions = sessions.len() as u64;
        let converted: Vec<&AnonymousSession> = sessions
            .iter()
            .filter(|s| s.converted_to_user.is_some())
            .collect();
        let total_conversions = converted.len() as u64;

        let overall_conversion_rate = if total_anonymous_sessions == 0 {
            0.0
        } else {
            total_conversions as f64 / total_anonymous_sessions as f64 * 100.0
        };

        let conversion_seconds: Vec<i64> = converted
            .iter()
            .filter_map(|s| {
                s.converted_at
                    .map(|at| (at - s.started_at).num_seconds().max(0))
            })
            .collect();
        let average_seconds_to_conversion = if conversion_seconds.is_empty() {
            0.0
        } else {
            conversion_seconds.iter().sum::<i64>() as f64 / conversion_seconds.len() as f64
        };

        let mut by_landing_page: BTreeMap<&str, u64> = BTreeMap::new();
        for session in &converted {
            if let Some(page) = session.landing_page.as_deref() {
                *by_landing_page.entry(page).or_insert(0) += 1;
            }
        }
        let mut top_landing_pages: Vec<LandingPageConversions> = by_landing_page
            .into_iter()
            .map(|(page, conversions)| LandingPageConversions {
                page: page.to_string(),
                conversions,
            })
            .collect();
        top_landing_pages.sort_by(|a, b| {
            b.conversions
                .cmp(&a.conversions)
                .then_with(|| a.page.cmp(&b.page))
        });
        top_landing_pages.truncate(TOP_LANDING_PAGES);

        ConversionMetrics {
            total_conversions,
            total_anonymous_sessions,
            overall_conversion_rate,
            average_seconds_to_conversion,
            top_landing_pages,
        }
    }

    /// Device/browser/OS breakdown over anonymous sessions whose page views
    /// touched the community's URL namespace in `[start, end)`
    pub async fn visitor_demographics(
        &self,
        community_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> VisitorDemographics {
        let fingerprints = self
            .community_page_fingerprints(community_id, start, end)
            .await;
        if fingerprints.is_empty() {
            return VisitorDemographics::default();
        }

        let sessions = match self.anonymous.sessions_in_range(start, end).await {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!(%community_id, error = %e, "session query degraded to zero");
                return VisitorDemographics::default();
            }
        };

        let mut demographics = VisitorDemographics::default();
        for session in sessions {
            if !fingerprints.contains(&session.fingerprint) {
                continue;
            }
            demographics.total_sessions += 1;
            let bucket = |value: Option<String>| value.unwrap_or_else(|| "unknown".to_string());
            *demographics
                .device_types
                .entry(bucket(session.device_type))
                .or_insert(0) += 1;
            *demographics
                .browsers
                .entry(bucket(session.browser))
                .or_insert(0) += 1;
            *demographics
                .operating_systems
                .entry(bucket(session.os))
                .or_insert(0) += 1;
        }
        demographics
    }

    /// Live presence counts, degraded to zero when the store is unreachable
    pub async fn realtime_visitors(&self, community_id: Uuid) -> RealtimeVisitors {
        let (authenticated, anonymous, degraded) = match (
            self.tracker.authenticated_count(community_id).await,
            self.tracker.anonymous_count(community_id).await,
        ) {
            (Ok(authenticated), Ok(anonymous)) => (authenticated, anonymous, false),
            (first, second) => {
                let error = first.err().or(second.err()).map(|e| e.to_string());
                warn!(%community_id, error = ?error, "realtime counts degraded to zero");
                (0, 0, true)
            }
        };

        RealtimeVisitors {
            community_id,
            total: authenticated + anonymous,
            authenticated,
            anonymous,
            degraded,
            timestamp: self.clock.now(),
        }
    }

    /// Unique-visitor growth of `[now-N, now]` over the preceding
    /// non-overlapping period of equal length
    pub async fn visitor_growth_rate(
        &self,
        community_id: Uuid,
        current_period_days: u32,
    ) -> VisitorGrowthRate {
        let now = self.clock.now();
        let period = ChronoDuration::days(current_period_days as i64);
        let current_start = now - period;
        let previous_start = current_start - period;

        let current = self
            .unique_visitors(community_id, current_start, now)
            .await
            .total;
        let previous = self
            .unique_visitors(community_id, previous_start, current_start)
            .await
            .total;

        let growth_rate_percent = if previous == 0 {
            if current > 0 {
                100.0
            } else {
                0.0
            }
        } else {
            (current as f64 - previous as f64) / previous as f64 * 100.0
        };

        VisitorGrowthRate {
            period_days: current_period_days,
            current_period_total: current,
            previous_period_total: previous,
            growth_rate_percent,
        }
    }

    /// Distinct fingerprints with a page view in the community's namespace
    async fn distinct_anonymous_visitors(
        &self,
        community_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> u64 {
        self.community_page_fingerprints(community_id, start, end)
            .await
            .len() as u64
    }

    async fn community_page_fingerprints(
        &self,
        community_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> HashSet<String> {
        let slug = match self.directory.community_slug(community_id).await {
            Ok(Some(slug)) => slug,
            Ok(None) => return HashSet::new(),
            Err(e) => {
                warn!(%community_id, error = %e, "slug lookup degraded");
                return HashSet::new();
            }
        };

        let path = format!("/c/{}", slug);
        match self.anonymous.page_views_for_path(&path, start, end).await {
            Ok(views) => views.into_iter().map(|v| v.fingerprint).collect(),
            Err(e) => {
                warn!(%community_id, error = %e, "page-view query degraded to zero");
                HashSet::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::presence::{VisitorArrival, VisitorTracker};
    use crate::store::MemoryPresenceStore;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeDirectory {
        // community id -> (slug, division)
        communities: Mutex<HashMap<Uuid, (String, Option<String>)>>,
    }

    impl FakeDirectory {
        fn register(&self, community_id: Uuid, slug: &str, division: Option<&str>) {
            self.communities
                .lock()
                .unwrap()
                .insert(community_id, (slug.to_string(), division.map(String::from)));
        }
    }

    #[async_trait]
    impl CommunityDirectory for FakeDirectory {
        async fn community_exists(&self, community_id: Uuid) -> Result<bool> {
            Ok(self.communities.lock().unwrap().contains_key(&community_id))
        }

        async fn community_division(&self, community_id: Uuid) -> Result<Option<String>> {
            Ok(self
                .communities
                .lock()
                .unwrap()
                .get(&community_id)
                .and_then(|(_, division)| division.clone()))
        }

        async fn community_slug(&self, community_id: Uuid) -> Result<Option<String>> {
            Ok(self
                .communities
                .lock()
                .unwrap()
                .get(&community_id)
                .map(|(slug, _)| slug.clone()))
        }
    }

    #[derive(Default)]
    struct FakeVisits {
        events: Mutex<Vec<VisitEvent>>,
    }

    #[async_trait]
    impl VisitEventStore for FakeVisits {
        async fn record_authenticated_visit(&self, event: VisitEvent) -> Result<()> {
            self.events.lock().unwrap().push(event);
            Ok(())
        }

        async fn visits_in_range(
            &self,
            community_id: Uuid,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<VisitEvent>> {
            Ok(self
                .events
                .lock()
                .unwrap()
                .iter()
                .filter(|v| {
                    v.community_id == community_id && v.visited_at >= start && v.visited_at < end
                })
                .cloned()
                .collect())
        }
    }

    #[derive(Default)]
    struct FakeAnonymous {
        sessions: Mutex<Vec<AnonymousSession>>,
        views: Mutex<Vec<AnonymousPageView>>,
    }

    #[async_trait]
    impl AnonymousActivityStore for FakeAnonymous {
        async fn sessions_in_range(
            &self,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<AnonymousSession>> {
            Ok(self
                .sessions
                .lock()
                .unwrap()
                .iter()
                .filter(|s| s.started_at >= start && s.started_at < end)
                .cloned()
                .collect())
        }

        async fn page_views_for_path(
            &self,
            path: &str,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<AnonymousPageView>> {
            let under = format!("{}/", path);
            Ok(self
                .views
                .lock()
                .unwrap()
                .iter()
                .filter(|v| {
                    (v.url == path || v.url.starts_with(&under))
                        && v.viewed_at >= start
                        && v.viewed_at < end
                })
                .cloned()
                .collect())
        }
    }

    struct Setup {
        clock: Arc<ManualClock>,
        directory: Arc<FakeDirectory>,
        visits: Arc<FakeVisits>,
        anonymous: Arc<FakeAnonymous>,
        tracker: Arc<VisitorTracker>,
        aggregator: AnalyticsAggregator,
    }

    fn setup() -> Setup {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap(),
        ));
        let store = Arc::new(MemoryPresenceStore::new(clock.clone()));
        let tracker = Arc::new(VisitorTracker::new(
            store,
            clock.clone(),
            Duration::from_secs(300),
        ));
        let directory = Arc::new(FakeDirectory::default());
        let visits = Arc::new(FakeVisits::default());
        let anonymous = Arc::new(FakeAnonymous::default());
        let aggregator = AnalyticsAggregator::new(
            directory.clone(),
            visits.clone(),
            anonymous.clone(),
            tracker.clone(),
            clock.clone(),
        );
        Setup {
            clock,
            directory,
            visits,
            anonymous,
            tracker,
            aggregator,
        }
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, h, m, 0).unwrap()
    }

    fn visit(community_id: Uuid, user_id: &str, at: DateTime<Utc>) -> VisitEvent {
        VisitEvent {
            community_id,
            user_id: user_id.to_string(),
            visitor_division_id: None,
            community_division_id: None,
            is_cross_division: false,
            visited_at: at,
        }
    }

    #[tokio::test]
    async fn unique_visitors_dedup_within_populations_only() {
        let s = setup();
        let community = Uuid::new_v4();
        s.directory.register(community, "rust-lovers", None);

        {
            let mut events = s.visits.events.lock().unwrap();
            events.push(visit(community, "u1", at(1, 0)));
            events.push(visit(community, "u1", at(2, 0)));
            events.push(visit(community, "u2", at(3, 0)));
        }
        {
            let mut views = s.anonymous.views.lock().unwrap();
            views.push(AnonymousPageView {
                fingerprint: "fp1".into(),
                url: "/c/rust-lovers/threads/42".into(),
                viewed_at: at(1, 30),
            });
            views.push(AnonymousPageView {
                fingerprint: "fp1".into(),
                url: "/c/rust-lovers".into(),
                viewed_at: at(2, 30),
            });
            views.push(AnonymousPageView {
                fingerprint: "fp2".into(),
                url: "/c/other-place/threads/1".into(),
                viewed_at: at(2, 45),
            });
        }

        let counts = s.aggregator.unique_visitors(community, at(0, 0), at(6, 0)).await;
        assert_eq!(counts.authenticated, 2);
        assert_eq!(counts.anonymous, 1);
        // populations are summed without cross-population dedup
        assert_eq!(counts.total, 3);
    }

    #[tokio::test]
    async fn division_breakdown_scenario() {
        let s = setup();
        let community = Uuid::new_v4();
        s.directory.register(community, "gardeners", Some("d1"));

        {
            let mut events = s.visits.events.lock().unwrap();
            events.push(VisitEvent {
                visitor_division_id: Some("d1".into()),
                community_division_id: Some("d1".into()),
                ..visit(community, "u1", at(1, 0))
            });
            events.push(VisitEvent {
                visitor_division_id: Some("d2".into()),
                community_division_id: Some("d1".into()),
                is_cross_division: true,
                ..visit(community, "u2", at(2, 0))
            });
            events.push(visit(community, "u3", at(3, 0)));
        }

        let breakdown = s
            .aggregator
            .division_breakdown(community, at(0, 0), at(6, 0))
            .await
            .unwrap();
        assert_eq!(breakdown.same_division, 1);
        assert_eq!(breakdown.cross_division, 1);
        assert_eq!(breakdown.no_division, 1);
        assert_eq!(breakdown.anonymous, 0);
        assert_eq!(breakdown.total, 3);
    }

    #[tokio::test]
    async fn division_breakdown_for_missing_community_errors() {
        let s = setup();
        let ghost = Uuid::new_v4();

        let err = s
            .aggregator
            .division_breakdown(ghost, at(0, 0), at(6, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::CommunityNotFound(id) if id == ghost));
    }

    #[tokio::test]
    async fn conversion_rate_with_no_sessions_is_zero() {
        let s = setup();
        let metrics = s.aggregator.conversion_metrics(at(0, 0), at(6, 0)).await;
        assert_eq!(metrics.total_anonymous_sessions, 0);
        assert_eq!(metrics.overall_conversion_rate, 0.0);
    }

    #[tokio::test]
    async fn conversion_funnel_over_one_day() {
        let s = setup();
        {
            let mut sessions = s.anonymous.sessions.lock().unwrap();
            sessions.push(AnonymousSession {
                fingerprint: "fp1".into(),
                landing_page: Some("/c/rust-lovers".into()),
                started_at: at(1, 0),
                converted_to_user: Some("u9".into()),
                converted_at: Some(at(1, 30)),
                ..Default::default()
            });
            sessions.push(AnonymousSession {
                fingerprint: "fp2".into(),
                started_at: at(2, 0),
                ..Default::default()
            });
            sessions.push(AnonymousSession {
                fingerprint: "fp3".into(),
                started_at: at(3, 0),
                ..Default::default()
            });
        }

        let metrics = s.aggregator.conversion_metrics(at(0, 0), at(23, 59)).await;
        assert_eq!(metrics.total_conversions, 1);
        assert_eq!(metrics.total_anonymous_sessions, 3);
        assert!((metrics.overall_conversion_rate - 33.33).abs() < 0.01);
        assert_eq!(metrics.average_seconds_to_conversion, 1800.0);
        assert_eq!(
            metrics.top_landing_pages,
            vec![LandingPageConversions {
                page: "/c/rust-lovers".into(),
                conversions: 1,
            }]
        );
    }

    #[tokio::test]
    async fn unrecognized_granularity_yields_empty_trends() {
        let s = setup();
        let trends = s
            .aggregator
            .visitor_trends(Uuid::new_v4(), 7, "invalid")
            .await;
        assert!(trends.is_empty());
    }

    #[tokio::test]
    async fn hourly_trends_are_capped_at_a_week() {
        let s = setup();
        let community = Uuid::new_v4();
        s.directory.register(community, "quiet-place", None);

        let trends = s.aggregator.visitor_trends(community, 30, "hourly").await;
        assert_eq!(trends.len(), 168);

        let daily = s.aggregator.visitor_trends(community, 7, "DAILY").await;
        assert_eq!(daily.len(), 7);
    }

    #[tokio::test]
    async fn trend_buckets_carry_their_visitors() {
        let s = setup();
        let community = Uuid::new_v4();
        s.directory.register(community, "bakers", None);
        s.visits
            .events
            .lock()
            .unwrap()
            .push(visit(community, "u1", at(11, 30)));

        let trends = s.aggregator.visitor_trends(community, 1, "daily").await;
        assert_eq!(trends.len(), 1);
        assert_eq!(trends[0].visitors.authenticated, 1);
    }

    #[tokio::test]
    async fn growth_rate_policies() {
        let s = setup();
        let community = Uuid::new_v4();
        s.directory.register(community, "climbers", None);

        // both periods empty
        let flat = s.aggregator.visitor_growth_rate(community, 7).await;
        assert_eq!(flat.growth_rate_percent, 0.0);

        // zero baseline, non-zero current
        s.visits
            .events
            .lock()
            .unwrap()
            .push(visit(community, "u1", at(11, 0)));
        let from_zero = s.aggregator.visitor_growth_rate(community, 7).await;
        assert_eq!(from_zero.current_period_total, 1);
        assert_eq!(from_zero.previous_period_total, 0);
        assert_eq!(from_zero.growth_rate_percent, 100.0);

        // ordinary growth: 2 previous, 3 current
        {
            let mut events = s.visits.events.lock().unwrap();
            events.clear();
            let previous_day = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
            events.push(visit(community, "p1", previous_day));
            events.push(visit(community, "p2", previous_day));
            events.push(visit(community, "c1", at(9, 0)));
            events.push(visit(community, "c2", at(10, 0)));
            events.push(visit(community, "c3", at(11, 0)));
        }
        let grew = s.aggregator.visitor_growth_rate(community, 7).await;
        assert_eq!(grew.current_period_total, 3);
        assert_eq!(grew.previous_period_total, 2);
        assert_eq!(grew.growth_rate_percent, 50.0);
    }

    #[tokio::test]
    async fn realtime_visitors_pass_through_live_counts() {
        let s = setup();
        let community = Uuid::new_v4();

        s.tracker
            .add_visitor(
                community,
                VisitorArrival {
                    user_id: Some("u1".into()),
                    is_authenticated: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        s.tracker
            .add_visitor(
                community,
                VisitorArrival {
                    device_fingerprint: Some("fp1".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let realtime = s.aggregator.realtime_visitors(community).await;
        assert_eq!(realtime.total, 2);
        assert_eq!(realtime.authenticated, 1);
        assert_eq!(realtime.anonymous, 1);
        assert!(!realtime.degraded);
        assert_eq!(realtime.timestamp, s.clock.now());
    }

    #[tokio::test]
    async fn demographics_cover_only_sessions_that_touched_the_community() {
        let s = setup();
        let community = Uuid::new_v4();
        s.directory.register(community, "stargazers", None);

        {
            let mut sessions = s.anonymous.sessions.lock().unwrap();
            sessions.push(AnonymousSession {
                fingerprint: "fp1".into(),
                device_type: Some("mobile".into()),
                browser: Some("firefox".into()),
                os: Some("android".into()),
                started_at: at(1, 0),
                ..Default::default()
            });
            sessions.push(AnonymousSession {
                fingerprint: "fp2".into(),
                started_at: at(2, 0),
                ..Default::default()
            });
            // never touched the community's pages
            sessions.push(AnonymousSession {
                fingerprint: "fp3".into(),
                device_type: Some("desktop".into()),
                started_at: at(3, 0),
                ..Default::default()
            });
        }
        {
            let mut views = s.anonymous.views.lock().unwrap();
            for fingerprint in ["fp1", "fp2"] {
                views.push(AnonymousPageView {
                    fingerprint: fingerprint.into(),
                    url: "/c/stargazers/threads/7".into(),
                    viewed_at: at(2, 30),
                });
            }
        }

        let demographics = s
            .aggregator
            .visitor_demographics(community, at(0, 0), at(6, 0))
            .await;
        assert_eq!(demographics.total_sessions, 2);
        assert_eq!(demographics.device_types.get("mobile"), Some(&1));
        assert_eq!(demographics.device_types.get("unknown"), Some(&1));
        assert_eq!(demographics.device_types.get("desktop"), None);
        assert_eq!(demographics.browsers.get("firefox"), Some(&1));
        assert_eq!(demographics.operating_systems.get("android"), Some(&1));
    }
}
