//! Agora - real-time visitor presence and analytics engine
//!
//! Tracks who is currently viewing each community, aggregates live counts
//! and cross-division breakdowns, persists presence into historical
//! analytics, and pushes deltas to subscribed real-time clients.
//!
//! ## Services
//!
//! - **Presence**: visitor join/leave/heartbeat tracking over a shared
//!   Redis-protocol store, with TTL-based eviction of silent visitors
//! - **Broadcast**: presence delta fan-out over NATS and per-community
//!   WebSocket channels
//! - **Analytics**: date-ranged historical metrics (unique visitors,
//!   division breakdowns, trends, conversion funnel, demographics) from
//!   MongoDB, plus live pass-through reads
//! - **Server**: hyper HTTP/WebSocket surface exposing presence snapshots
//!   and the presence channel subscription endpoint

pub mod analytics;
pub mod broadcast;
pub mod clock;
pub mod config;
pub mod db;
pub mod nats;
pub mod presence;
pub mod server;
pub mod store;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{EngineError, Result};
