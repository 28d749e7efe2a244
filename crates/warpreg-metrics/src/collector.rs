//! Metrics collector — in-process counters and gauges.
//!
//! All methods take `&self` and are cheap; the registry calls them while
//! serving requests, so they only touch small maps behind short locks.

use std::collections::BTreeMap;
use std::sync::RwLock;
use std::time::Duration;

use tracing::debug;

/// Last observed health of one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerHealthSample {
    /// Id the worker registered with.
    pub worker_id: String,
    /// Base URL the worker is probed at, e.g. `http://10.0.0.5:8080`.
    pub url: String,
    /// Result of the most recent health transition.
    pub healthy: bool,
}

/// Aggregated counters for one (method, endpoint, status) triple.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RequestStats {
    /// Requests served.
    pub count: u64,
    /// Summed latency of those requests, in seconds.
    pub total_seconds: f64,
}

/// Lifetime totals for the health sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SweepTotals {
    /// Completed sweeps.
    pub sweeps: u64,
    /// Workers probed across all sweeps, counting each worker once per sweep.
    pub probed: u64,
    /// Workers removed after exhausting their attempts.
    pub evicted: u64,
    /// Wall time of the most recent sweep.
    pub last_duration_seconds: f64,
}

type RequestKey = (String, String, u16);

/// Collects registry metrics.
#[derive(Debug, Default)]
pub struct RegistryMetrics {
    /// worker_id → last health observation.
    workers: RwLock<BTreeMap<String, WorkerHealthSample>>,
    requests: RwLock<BTreeMap<RequestKey, RequestStats>>,
    sweeps: RwLock<SweepTotals>,
}

impl RegistryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a health observation (1 healthy, 0 unhealthy) for a worker.
    pub fn record_worker_health(&self, worker_id: &str, url: &str, healthy: bool) {
        debug!(%worker_id, %url, healthy, "recording worker health");
        let mut workers = self.workers.write().expect("metrics lock");
        workers.insert(
            worker_id.to_string(),
            WorkerHealthSample {
                worker_id: worker_id.to_string(),
                url: url.to_string(),
                healthy,
            },
        );
    }

    /// Drop the health gauge of a worker that left the registry.
    pub fn forget_worker(&self, worker_id: &str) {
        let mut workers = self.workers.write().expect("metrics lock");
        workers.remove(worker_id);
    }

    pub fn worker_health(&self, worker_id: &str) -> Option<bool> {
        let workers = self.workers.read().expect("metrics lock");
        workers.get(worker_id).map(|s| s.healthy)
    }

    pub fn worker_samples(&self) -> Vec<WorkerHealthSample> {
        let workers = self.workers.read().expect("metrics lock");
        workers.values().cloned().collect()
    }

    /// Record the result of one full health sweep.
    pub fn record_sweep(&self, probed: usize, evicted: usize, duration: Duration) {
        let mut totals = self.sweeps.write().expect("metrics lock");
        totals.sweeps += 1;
        totals.probed += probed as u64;
        totals.evicted += evicted as u64;
        totals.last_duration_seconds = duration.as_secs_f64();
    }

    pub fn sweep_totals(&self) -> SweepTotals {
        *self.sweeps.read().expect("metrics lock")
    }

    /// Record one served HTTP request.
    pub fn record_request(&self, method: &str, endpoint: &str, status: u16, latency: Duration) {
        let mut requests = self.requests.write().expect("metrics lock");
        let stats = requests
            .entry((method.to_string(), endpoint.to_string(), status))
            .or_default();
        stats.count += 1;
        stats.total_seconds += latency.as_secs_f64();
    }

    pub fn request_stats(&self, method: &str, endpoint: &str, status: u16) -> Option<RequestStats> {
        let requests = self.requests.read().expect("metrics lock");
        requests
            .get(&(method.to_string(), endpoint.to_string(), status))
            .copied()
    }

    /// All request counters, ordered by (method, endpoint, status).
    pub fn request_samples(&self) -> Vec<(String, String, u16, RequestStats)> {
        let requests = self.requests.read().expect("metrics lock");
        requests
            .iter()
            .map(|((m, e, s), stats)| (m.clone(), e.clone(), *s, *stats))
            .collect()
    }
}
