//! wardend: the Warden recovery daemon.
//!
//! Single OS process running a Tokio async runtime. Clients drive guardian
//! recovery and emergency access via JSON-RPC over a Unix socket; a
//! background task sweeps expired requests and due countdowns. Committed
//! state changes are published on the event bus.

mod commands;
mod config;
mod events;
mod rpc;
mod sweeper;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{error, info};
use warden_ledger::sqlite::SqliteLedger;
use warden_program::Program;
use warden_types::Timestamp;

use crate::config::DaemonConfig;
use crate::events::EventBus;
use crate::rpc::RpcServer;

/// Daemon-wide shared state.
pub struct DaemonState {
    pub program: Arc<Program<SqliteLedger>>,
    pub config: DaemonConfig,
    /// Event bus for pushing events to subscribers.
    pub events: EventBus,
    pub shutdown_tx: broadcast::Sender<()>,
}

/// Seconds since the Unix epoch.
pub fn unix_now() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let config = DaemonConfig::load()?;

    // 2. Initialize tracing; RUST_LOG overrides the configured level
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().or_else(|_| {
        tracing_subscriber::EnvFilter::try_new(format!("warden={}", config.logging.log_level))
    })?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Warden daemon starting");

    // 3. Verify field arithmetic before touching any secret
    warden_crypto::gf256::self_test()?;

    // 4. Open ledger
    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let ledger = SqliteLedger::open(&config.db_path())?;
    let events = EventBus::new(config.rpc.event_buffer);
    let program = Arc::new(Program::with_events(ledger, Arc::new(events.clone())));

    // 5. Shutdown channel
    let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);

    // 6. Sweeper
    let sweep_interval = config.ledger.sweep_interval_secs;
    if sweep_interval > 0 {
        tokio::spawn(sweeper::run(
            Arc::clone(&program),
            Duration::from_secs(sweep_interval),
            unix_now,
            shutdown_tx.subscribe(),
        ));
    }

    // 7. Build daemon state
    let socket_path = config.socket_path();
    let state = Arc::new(DaemonState {
        program,
        config,
        events,
        shutdown_tx: shutdown_tx.clone(),
    });

    // 8. Run the RPC server until shutdown
    let rpc_server = RpcServer::new(state.clone(), socket_path.clone());
    info!("Starting JSON-RPC server on {:?}", socket_path);

    let mut shutdown_rx = shutdown_tx.subscribe();
    tokio::select! {
        result = rpc_server.run() => {
            if let Err(e) = result {
                error!("RPC server error: {}", e);
            }
        }
        _ = shutdown_rx.recv() => {
            info!("Shutdown signal received");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
        }
    }

    let _ = state.shutdown_tx.send(());
    let _ = std::fs::remove_file(&socket_path);

    info!("Daemon stopped");
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn state() -> DaemonState {
        let (shutdown_tx, _) = broadcast::channel(1);
        let config = DaemonConfig::default();
        let events = EventBus::new(config.rpc.event_buffer);
        DaemonState {
            program: Arc::new(Program::with_events(
                SqliteLedger::open_memory().expect("in-memory ledger"),
                Arc::new(events.clone()),
            )),
            config,
            events,
            shutdown_tx,
        }
    }

    pub fn hex_key(n: u8) -> String {
        hex::encode([n; 32])
    }
}
