//! Visitor presence model
//!
//! `VisitorEntry` is the unit of ephemeral state: one per active visitor per
//! community, serialized to JSON only at the store boundary. Everything else
//! here is a read-model struct returned by the tracker.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One active visitor in one community
///
/// Owned exclusively by the tracker; created on first join, rewritten on
/// every heartbeat/page view, destroyed on leave or reaper eviction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VisitorEntry {
    /// Canonical identity: `user_id` or `anon_<fingerprint>`
    pub identity: String,
    pub is_authenticated: bool,
    /// Visitor's home division, if known
    pub home_division_id: Option<String>,
    /// Whether the home division differed from the community's division at
    /// join time
    #[serde(default)]
    pub is_cross_division: bool,
    pub joined_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Monotonic page-view counter; survives re-joins
    pub pages_viewed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// Why an AddVisitor call was not admitted
///
/// A structured condition, not an error: the caller gets it back inside the
/// admission result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidVisitor {
    /// Anonymous visitor without a device fingerprint
    MissingFingerprint,
    /// Authenticated visitor without a user id
    MissingUserId,
}

impl std::fmt::Display for InvalidVisitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingFingerprint => write!(f, "missing device fingerprint"),
            Self::MissingUserId => write!(f, "missing user id"),
        }
    }
}

/// Result of an AddVisitor call
#[derive(Debug, Clone, Serialize)]
pub struct VisitorAdmission {
    /// Community presence size after the mutation (0 when rejected)
    pub current_count: u64,
    /// Whether this visit crossed divisions
    pub cross_division: bool,
    /// Set when the visitor was rejected instead of admitted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected: Option<InvalidVisitor>,
}

impl VisitorAdmission {
    pub fn admitted(current_count: u64, cross_division: bool) -> Self {
        Self {
            current_count,
            cross_division,
            rejected: None,
        }
    }

    pub fn rejected(reason: InvalidVisitor) -> Self {
        Self {
            current_count: 0,
            cross_division: false,
            rejected: Some(reason),
        }
    }
}

/// Result of a heartbeat call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// Entry found, activity and TTL refreshed
    Refreshed,
    /// No live entry; the caller may re-issue AddVisitor
    Expired,
}

/// Live authenticated/anonymous breakdown with percentages
#[derive(Debug, Clone, Serialize)]
pub struct VisitorStats {
    pub total: u64,
    pub authenticated: u64,
    pub anonymous: u64,
    pub authenticated_percentage: f64,
    pub anonymous_percentage: f64,
}

impl VisitorStats {
    pub fn from_counts(authenticated: u64, anonymous: u64) -> Self {
        let total = authenticated + anonymous;
        let percentage = |part: u64| {
            if total == 0 {
                0.0
            } else {
                part as f64 / total as f64 * 100.0
            }
        };
        Self {
            total,
            authenticated,
            anonymous,
            authenticated_percentage: percentage(authenticated),
            anonymous_percentage: percentage(anonymous),
        }
    }
}

/// One accumulated (home -> visited) division pair
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CrossDivisionEdge {
    pub home_division_id: String,
    pub community_division_id: String,
    /// Ledger counter: accumulates on every cross-division join, never
    /// decremented on leave
    pub visits: u64,
}

/// Top cross-division edges plus the live cross-division share
#[derive(Debug, Clone, Serialize)]
pub struct CrossDivisionStats {
    pub edges: Vec<CrossDivisionEdge>,
    /// Live visitors whose entry is flagged cross-division
    pub cross_division_visitors: u64,
    pub total_visitors: u64,
    pub cross_division_percentage: f64,
}

/// Peak presence windows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeakWindow {
    Daily,
    Weekly,
    Monthly,
}

impl PeakWindow {
    pub const ALL: [PeakWindow; 3] = [PeakWindow::Daily, PeakWindow::Weekly, PeakWindow::Monthly];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    /// Window token the peak key is aligned to; a new token is a fresh
    /// window and the peak restarts from zero
    pub fn token(&self, now: DateTime<Utc>) -> String {
        match self {
            Self::Daily => now.format("%Y-%m-%d").to_string(),
            Self::Weekly => {
                let week = now.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
            Self::Monthly => now.format("%Y-%m").to_string(),
        }
    }

    /// Retention for the window's key
    pub fn retention(&self) -> Duration {
        match self {
            Self::Daily => Duration::from_secs(24 * 60 * 60),
            Self::Weekly => Duration::from_secs(7 * 24 * 60 * 60),
            Self::Monthly => Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}

/// Peak observed presence per window
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PeakCounts {
    pub daily: u64,
    pub weekly: u64,
    pub monthly: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn stats_guard_divide_by_zero() {
        let stats = VisitorStats::from_counts(0, 0);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.authenticated_percentage, 0.0);
        assert_eq!(stats.anonymous_percentage, 0.0);
    }

    #[test]
    fn stats_percentages_sum_to_hundred() {
        let stats = VisitorStats::from_counts(3, 1);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.authenticated_percentage, 75.0);
        assert_eq!(stats.anonymous_percentage, 25.0);
    }

    #[test]
    fn window_tokens_align_to_calendar() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 9, 30, 0).unwrap();
        assert_eq!(PeakWindow::Daily.token(at), "2026-01-02");
        // Jan 2 2026 falls in ISO week 2026-W01
        assert_eq!(PeakWindow::Weekly.token(at), "2026-W01");
        assert_eq!(PeakWindow::Monthly.token(at), "2026-01");
    }

    #[test]
    fn entry_serializes_without_empty_options() {
        let entry = VisitorEntry {
            identity: "u1".into(),
            is_authenticated: true,
            home_division_id: None,
            is_cross_division: false,
            joined_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            last_activity: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            pages_viewed: 1,
            ip_address: None,
            user_agent: None,
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("ip_address"));
        let back: VisitorEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }
}
