//! Health sweep — probe every cached worker once and evict the dead.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use warpreg_health::probe_with_retry;

use crate::registry::Registry;

/// What a single sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Workers whose probe sequence ran to completion.
    pub probed: usize,
    /// Ids confirmed healthy, sorted.
    pub healthy: Vec<String>,
    /// Ids evicted after exhausting their attempts, sorted.
    pub evicted: Vec<String>,
}

impl Registry {
    /// Probe every registered worker concurrently.
    ///
    /// Workers are snapshotted up front, so registrations that arrive
    /// mid-sweep wait for the next one. A worker that never answers healthy
    /// within the retry budget is removed from the cache and the store,
    /// unless it re-registered at another address in the meantime.
    pub async fn check_all_workers(&self) -> SweepReport {
        let started = Instant::now();

        let targets: Vec<(String, String)> = {
            let workers = self.workers.lock().expect("workers lock");
            workers
                .values()
                .map(|w| (w.id.clone(), w.address()))
                .collect()
        };
        debug!(workers = targets.len(), "health sweep starting");

        let mut probes = JoinSet::new();
        for (id, address) in targets {
            let prober = Arc::clone(&self.prober);
            let policy = self.retry;
            probes.spawn(async move {
                let outcome = probe_with_retry(prober.as_ref(), &address, &policy).await;
                (id, address, outcome)
            });
        }

        let mut report = SweepReport::default();
        while let Some(joined) = probes.join_next().await {
            let (id, address, outcome) = match joined {
                Ok(done) => done,
                Err(e) => {
                    error!(error = %e, "health probe task failed");
                    continue;
                }
            };
            report.probed += 1;

            if outcome.healthy {
                self.update_health(&id, true);
                report.healthy.push(id);
            } else if self.evict_if_unchanged(&id, &address) {
                info!(
                    worker_id = %id,
                    %address,
                    attempts = outcome.attempts,
                    "worker failed every health probe, evicted"
                );
                report.evicted.push(id);
            }
        }

        report.healthy.sort();
        report.evicted.sort();

        let elapsed = started.elapsed();
        self.metrics
            .record_sweep(report.probed, report.evicted.len(), elapsed);
        debug!(
            probed = report.probed,
            evicted = report.evicted.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "health sweep finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use warpreg_health::{ProbeResult, RetryPolicy, ScriptedProber};
    use warpreg_state::{StateStore, WorkerStore};

    fn setup(prober: ScriptedProber) -> (Registry, Arc<StateStore>, Arc<ScriptedProber>) {
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        let prober = Arc::new(prober);
        let registry = Registry::open(
            store.clone(),
            prober.clone(),
            RetryPolicy::new(4, Duration::from_millis(1)),
        )
        .unwrap();
        (registry, store, prober)
    }

    #[tokio::test]
    async fn empty_registry_sweeps_nothing() {
        let (registry, _store, _prober) = setup(ScriptedProber::new(ProbeResult::Healthy));
        let report = registry.check_all_workers().await;
        assert_eq!(report, SweepReport::default());
        assert_eq!(registry.metrics().sweep_totals().sweeps, 1);
    }

    #[tokio::test]
    async fn healthy_worker_kept_and_marked() {
        let (registry, store, prober) = setup(ScriptedProber::new(ProbeResult::Healthy));
        registry.register("w1", "10.0.0.5", 8080, None).unwrap();
        registry.update_health("w1", false);

        let report = registry.check_all_workers().await;

        assert_eq!(report.healthy, vec!["w1"]);
        assert!(report.evicted.is_empty());
        assert!(registry.get_worker("w1").unwrap().is_healthy);
        assert!(store.get_worker("w1").unwrap().unwrap().is_healthy);
        assert_eq!(prober.calls("10.0.0.5:8080"), 1);
    }

    #[tokio::test]
    async fn exhausted_worker_evicted_everywhere() {
        let (registry, store, prober) = setup(ScriptedProber::new(ProbeResult::Healthy));
        prober.pin("10.0.0.5:8080", ProbeResult::Failed);
        registry.register("w1", "10.0.0.5", 8080, None).unwrap();

        let report = registry.check_all_workers().await;

        assert_eq!(report.evicted, vec!["w1"]);
        assert_eq!(report.probed, 1);
        assert_eq!(prober.calls("10.0.0.5:8080"), 4);
        assert!(registry.get_worker("w1").is_none());
        assert!(store.get_worker("w1").unwrap().is_none());
        assert_eq!(registry.metrics().sweep_totals().evicted, 1);
        assert_eq!(registry.metrics().worker_health("w1"), None);
    }

    #[tokio::test]
    async fn worker_that_moved_mid_sweep_is_kept() {
        let prober = ScriptedProber::new(ProbeResult::Healthy).with_delay(Duration::from_millis(30));
        let (registry, store, prober) = setup(prober);
        prober.pin("10.0.0.5:8080", ProbeResult::Failed);
        registry.register("w1", "10.0.0.5", 8080, None).unwrap();

        let sweeper = registry.clone();
        let sweep = tokio::spawn(async move { sweeper.check_all_workers().await });
        while prober.calls("10.0.0.5:8080") == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        registry.register("w1", "10.0.0.5", 9000, None).unwrap();

        let report = sweep.await.unwrap();

        assert_eq!(report.probed, 1);
        assert!(report.evicted.is_empty());
        assert!(report.healthy.is_empty());
        assert_eq!(registry.get_worker("w1").unwrap().http_port, 9000);
        assert_eq!(store.get_worker("w1").unwrap().unwrap().http_port, 9000);
        assert_eq!(registry.metrics().worker_health("w1"), Some(true));
        assert_eq!(registry.metrics().sweep_totals().evicted, 0);
    }
}
