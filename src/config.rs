//! Configuration for Agora
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use uuid::Uuid;

/// Agora - real-time visitor presence and analytics engine
#[derive(Parser, Debug, Clone)]
#[command(name = "agora")]
#[command(about = "Real-time visitor presence and analytics engine for community spaces")]
pub struct Args {
    /// Unique node identifier for this engine instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Redis-protocol presence store URL
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    /// Seconds of inactivity after which a visitor is considered gone
    #[arg(long, env = "PRESENCE_TIMEOUT_SECS", default_value = "300")]
    pub presence_timeout_secs: u64,

    /// Per-command timeout for presence store calls, in milliseconds
    ///
    /// Store calls sit on the request path; a hung store must surface as
    /// StoreUnavailable quickly rather than stall the caller.
    #[arg(long, env = "STORE_OP_TIMEOUT_MS", default_value = "250")]
    pub store_op_timeout_ms: u64,

    /// Interval between stale-visitor sweeps, in seconds
    ///
    /// Should stay at or below half the presence timeout so staleness is
    /// bounded by one presence window.
    #[arg(long, env = "REAPER_INTERVAL_SECS", default_value = "150")]
    pub reaper_interval_secs: u64,

    /// Enable development mode (in-memory presence store, optional backends)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// NATS configuration
    #[command(flatten)]
    pub nats: NatsArgs,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "agora")]
    pub mongodb_db: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// NATS connection configuration
#[derive(Parser, Debug, Clone)]
pub struct NatsArgs {
    /// NATS server URL
    #[arg(long, env = "NATS_URL", default_value = "nats://127.0.0.1:4222")]
    pub nats_url: String,

    /// NATS username (optional)
    #[arg(long, env = "NATS_USER")]
    pub nats_user: Option<String>,

    /// NATS password (optional)
    #[arg(long, env = "NATS_PASSWORD")]
    pub nats_password: Option<String>,
}

impl Args {
    /// Presence window as a duration
    pub fn presence_timeout(&self) -> Duration {
        Duration::from_secs(self.presence_timeout_secs)
    }

    /// Store command timeout as a duration
    pub fn store_op_timeout(&self) -> Duration {
        Duration::from_millis(self.store_op_timeout_ms)
    }

    /// Reaper sweep interval as a duration
    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.presence_timeout_secs == 0 {
            return Err("PRESENCE_TIMEOUT_SECS must be greater than zero".to_string());
        }

        if self.reaper_interval_secs > self.presence_timeout_secs {
            return Err(
                "REAPER_INTERVAL_SECS must not exceed PRESENCE_TIMEOUT_SECS".to_string()
            );
        }

        if self.store_op_timeout_ms == 0 {
            return Err("STORE_OP_TIMEOUT_MS must be greater than zero".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args::parse_from(["agora"])
    }

    #[test]
    fn defaults_validate() {
        assert!(base_args().validate().is_ok());
    }

    #[test]
    fn zero_presence_timeout_rejected() {
        let mut args = base_args();
        args.presence_timeout_secs = 0;
        assert!(args.validate().is_err());
    }

    #[test]
    fn reaper_interval_above_timeout_rejected() {
        let mut args = base_args();
        args.presence_timeout_secs = 60;
        args.reaper_interval_secs = 120;
        assert!(args.validate().is_err());
    }
}
