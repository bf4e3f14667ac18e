//! Visitor presence
//!
//! Join/leave/heartbeat tracking over the presence store, plus the reaper
//! that evicts visitors whose disconnects were never observed.

mod entry;
mod reaper;
mod tracker;

pub use entry::{
    CrossDivisionEdge, CrossDivisionStats, HeartbeatOutcome, InvalidVisitor, PeakCounts,
    PeakWindow, VisitorAdmission, VisitorEntry, VisitorStats,
};
pub use reaper::{ReaperConfig, StaleVisitorReaper};
pub use tracker::{VisitorArrival, VisitorTracker};
