//! Agora - real-time visitor presence and analytics engine

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agora::{
    analytics::{AnalyticsAggregator, MongoAnalyticsStore},
    broadcast::BroadcastGateway,
    clock::{Clock, SystemClock},
    config::Args,
    db::MongoClient,
    nats::NatsClient,
    presence::{ReaperConfig, StaleVisitorReaper, VisitorTracker},
    server::{self, AppState},
    store::{MemoryPresenceStore, PresenceStore, RedisPresenceStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("agora={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Validate configuration
    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Print startup banner
    info!("======================================");
    info!("  Agora - visitor presence engine");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("Presence store: {}", args.redis_url);
    info!("Presence timeout: {}s", args.presence_timeout_secs);
    info!("Reaper interval: {}s", args.reaper_interval_secs);
    info!("NATS: {}", args.nats.nats_url);
    info!("MongoDB: {}", args.mongodb_uri);
    info!("======================================");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Connect to the presence store (in-memory fallback in dev mode)
    let store: Arc<dyn PresenceStore> =
        match RedisPresenceStore::connect(&args.redis_url, args.store_op_timeout()).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                if args.dev_mode {
                    warn!("Presence store unreachable (dev mode, using in-memory store): {}", e);
                    Arc::new(MemoryPresenceStore::new(clock.clone()))
                } else {
                    error!("Presence store connection failed: {}", e);
                    std::process::exit(1);
                }
            }
        };

    // Connect to NATS (optional in dev mode)
    let nats = match NatsClient::new(&args.nats, &format!("agora-{}", args.node_id)).await {
        Ok(client) => {
            info!("NATS connected successfully");
            Some(client)
        }
        Err(e) => {
            if args.dev_mode {
                warn!("NATS connection failed (dev mode, local fan-out only): {}", e);
                None
            } else {
                error!("NATS connection failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    // Connect to MongoDB (optional in dev mode; analytics disabled without it)
    let mongo = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(client) => {
            info!("MongoDB connected successfully");
            Some(client)
        }
        Err(e) => {
            if args.dev_mode {
                warn!("MongoDB connection failed (dev mode, analytics disabled): {}", e);
                None
            } else {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    let tracker = Arc::new(VisitorTracker::new(
        store,
        clock.clone(),
        args.presence_timeout(),
    ));

    let gateway = Arc::new(BroadcastGateway::new(nats, clock.clone()));

    // Historical analytics need the durable stores
    let analytics = match &mongo {
        Some(client) => {
            let stores = Arc::new(MongoAnalyticsStore::new(client).await?);
            Some(Arc::new(AnalyticsAggregator::new(
                stores.clone(),
                stores.clone(),
                stores,
                tracker.clone(),
                clock.clone(),
            )))
        }
        None => None,
    };

    // Start the stale-visitor reaper
    let reaper = Arc::new(StaleVisitorReaper::new(
        ReaperConfig {
            interval: args.reaper_interval(),
            presence_timeout: args.presence_timeout(),
        },
        tracker.clone(),
        clock.clone(),
        Some(gateway.clone()),
    ));
    reaper.start();

    let state = Arc::new(AppState {
        args,
        tracker,
        gateway,
        analytics,
        clock,
    });

    server::run(state).await?;

    Ok(())
}
