//! Periodic health sweep.
//!
//! One background task per registry. Each tick awaits a full sweep, so
//! sweeps never overlap. Shutdown is signalled over a `watch` channel and
//! takes effect before the next tick; a sweep already running finishes.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::registry::Registry;

/// A running sweep loop.
pub(crate) struct SchedulerSlot {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl SchedulerSlot {
    fn spawn(registry: Registry, interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_sweep_loop(registry, interval, shutdown_rx));
        Self {
            handle,
            shutdown_tx,
        }
    }

    fn signal(&self) {
        // The loop may already have exited; nothing to do then.
        let _ = self.shutdown_tx.send(true);
    }
}

async fn run_sweep_loop(
    registry: Registry,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(interval_ms = interval.as_millis() as u64, "sweep loop starting");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                let report = registry.check_all_workers().await;
                if !report.evicted.is_empty() {
                    info!(evicted = ?report.evicted, "health sweep evicted workers");
                }
            }
            _ = shutdown.changed() => {
                debug!("sweep loop shutting down");
                break;
            }
        }
    }
}

impl Registry {
    /// Start sweeping every `interval`, replacing any loop already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_scheduler(&self, interval: Duration) {
        let slot = SchedulerSlot::spawn(self.clone(), interval);
        let previous = {
            let mut scheduler = self.scheduler.lock().expect("scheduler lock");
            scheduler.replace(slot)
        };
        if let Some(old) = previous {
            old.signal();
            debug!("previous sweep loop replaced");
        }
        info!(interval_ms = interval.as_millis() as u64, "health sweep scheduler started");
    }

    /// Signal the sweep loop to stop. Safe to call any number of times.
    pub fn stop_scheduler(&self) {
        let slot = self.scheduler.lock().expect("scheduler lock").take();
        if let Some(slot) = slot {
            slot.signal();
            info!("health sweep scheduler stopped");
        }
    }

    /// Stop the sweep loop and wait for it to exit, including any sweep
    /// that was in flight.
    pub async fn stop_scheduler_and_wait(&self) {
        let slot = self.scheduler.lock().expect("scheduler lock").take();
        let Some(slot) = slot else {
            return;
        };
        slot.signal();
        if let Err(e) = slot.handle.await {
            warn!(error = %e, "sweep loop ended abnormally");
        }
        info!("health sweep scheduler stopped");
    }

    pub fn scheduler_running(&self) -> bool {
        let scheduler = self.scheduler.lock().expect("scheduler lock");
        scheduler
            .as_ref()
            .is_some_and(|slot| !slot.handle.is_finished())
    }
}
