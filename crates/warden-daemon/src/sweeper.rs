//! Background sweep task.
//!
//! Runs [`Program::sweep`] on a fixed interval until shutdown. Recovery
//! expiry is recomputed from timestamps on every read, so the sweep only
//! persists it. Countdowns advance one step per sweep: the first due sweep
//! starts the grace period, a later one grants access.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, error, warn};
use warden_ledger::LedgerStore;
use warden_program::Program;
use warden_types::Timestamp;

/// Sweep every `interval` until a shutdown message arrives.
pub async fn run<S, C>(
    program: Arc<Program<S>>,
    interval: Duration,
    clock: C,
    mut shutdown: broadcast::Receiver<()>,
) where
    S: LedgerStore + 'static,
    C: Fn() -> Timestamp + Send + 'static,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match program.sweep(clock()) {
                    Ok(report) if report.failed > 0 => {
                        warn!(failed = report.failed, ?report, "sweep skipped records")
                    }
                    Ok(report) => debug!(?report, "sweep finished"),
                    Err(e) => error!(error = %e, "sweep failed"),
                }
            }
            _ = shutdown.recv() => {
                debug!("sweeper stopping");
                break;
            }
        }
    }
}
