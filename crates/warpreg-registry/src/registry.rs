//! The worker registry.
//!
//! The in-memory map is authoritative for every read. Mutations are
//! applied to the map under a short lock and then written through to the
//! store with a copied record, so the lock is never held across I/O.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use warpreg_core::split_host_port;
use warpreg_health::{Prober, RetryPolicy};
use warpreg_metrics::RegistryMetrics;
use warpreg_state::{WorkerRecord, WorkerStore, epoch_secs};

use crate::error::{RegistryError, RegistryResult};
use crate::scheduler::SchedulerSlot;

/// Shared handle to the worker registry.
///
/// Cloning is cheap; all clones see the same workers, store and scheduler.
#[derive(Clone)]
pub struct Registry {
    pub(crate) workers: Arc<Mutex<HashMap<String, WorkerRecord>>>,
    pub(crate) store: Arc<dyn WorkerStore>,
    pub(crate) prober: Arc<dyn Prober>,
    pub(crate) retry: RetryPolicy,
    pub(crate) metrics: Arc<RegistryMetrics>,
    pub(crate) scheduler: Arc<Mutex<Option<SchedulerSlot>>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("workers", &self.len())
            .field("retry", &self.retry)
            .field("scheduler_running", &self.scheduler_running())
            .finish()
    }
}

impl Registry {
    /// Prepare the store and hydrate the cache from it.
    ///
    /// Hydrated records keep their stored health and are not probed; the
    /// first sweep decides whether they stay.
    pub fn open(
        store: Arc<dyn WorkerStore>,
        prober: Arc<dyn Prober>,
        retry: RetryPolicy,
    ) -> RegistryResult<Self> {
        store.ensure_unique_index()?;
        let records = store.list_workers()?;

        let workers: HashMap<String, WorkerRecord> = records
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();
        info!(workers = workers.len(), "registry hydrated from store");

        Ok(Self {
            workers: Arc::new(Mutex::new(workers)),
            store,
            prober,
            retry,
            metrics: Arc::new(RegistryMetrics::new()),
            scheduler: Arc::new(Mutex::new(None)),
        })
    }

    /// Report into a shared metrics collector, seeded with the hydrated workers.
    pub fn with_metrics(mut self, metrics: Arc<RegistryMetrics>) -> Self {
        for worker in self.list_workers() {
            metrics.record_worker_health(&worker.id, &worker.url(), worker.is_healthy);
        }
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<RegistryMetrics> {
        &self.metrics
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Register a worker, or refresh the location of an existing one.
    ///
    /// Either way the worker ends up healthy with a fresh timestamp. Store
    /// failures are logged and do not fail the call.
    pub fn register(
        &self,
        id: &str,
        host: &str,
        http_port: u16,
        secondary_port: Option<u16>,
    ) -> RegistryResult<()> {
        validate_identity(id)?;
        validate_address(host, http_port)?;

        let now = epoch_secs();
        let (record, existed) = {
            let mut workers = self.workers.lock().expect("workers lock");
            let (record, existed) = match workers.get_mut(id) {
                Some(worker) => {
                    worker.host = host.to_string();
                    worker.http_port = http_port;
                    worker.secondary_port = secondary_port;
                    worker.is_healthy = true;
                    worker.last_health_check = now;
                    (worker.clone(), true)
                }
                None => {
                    let record = WorkerRecord::new(id, host, http_port, secondary_port, now);
                    workers.insert(id.to_string(), record.clone());
                    (record, false)
                }
            };
            // Gauges change under the cache lock so they never outlive the entry.
            self.metrics
                .record_worker_health(&record.id, &record.url(), true);
            (record, existed)
        };

        if existed {
            self.persist_update(&record);
        } else {
            self.persist_insert(&record);
        }

        info!(
            worker_id = %record.id,
            address = %record.address(),
            secondary_port = ?record.secondary_port,
            reregistered = existed,
            "worker registered"
        );
        Ok(())
    }

    fn persist_insert(&self, record: &WorkerRecord) {
        match self.store.insert_worker(record) {
            Ok(()) => {}
            Err(e) if e.is_duplicate_key() => {
                // A concurrent registration of the same id won the insert.
                debug!(worker_id = %record.id, "worker already stored, updating instead");
                if let Err(e) = self.store.update_worker(record) {
                    warn!(worker_id = %record.id, error = %e, "failed to update stored worker");
                }
            }
            Err(e) => {
                warn!(worker_id = %record.id, error = %e, "failed to persist worker");
            }
        }
    }

    fn persist_update(&self, record: &WorkerRecord) {
        match self.store.update_worker(record) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!(worker_id = %record.id, "worker missing from store, inserting");
                match self.store.insert_worker(record) {
                    Ok(()) => {}
                    Err(e) if e.is_duplicate_key() => {}
                    Err(e) => {
                        warn!(worker_id = %record.id, error = %e, "failed to persist worker");
                    }
                }
            }
            Err(e) => {
                warn!(worker_id = %record.id, error = %e, "failed to update stored worker");
            }
        }
    }

    /// Record a health observation. Unknown ids are ignored, and nothing
    /// is written unless the value actually changes.
    pub fn update_health(&self, id: &str, is_healthy: bool) {
        {
            let mut workers = self.workers.lock().expect("workers lock");
            let Some(worker) = workers.get_mut(id) else {
                debug!(worker_id = %id, "health update for unknown worker ignored");
                return;
            };
            if worker.is_healthy == is_healthy {
                return;
            }
            worker.is_healthy = is_healthy;
            worker.last_health_check = epoch_secs();
            self.metrics
                .record_worker_health(id, &worker.url(), is_healthy);
        }

        if let Err(e) = self.store.update_worker_health(id, is_healthy) {
            warn!(worker_id = %id, error = %e, "failed to persist worker health");
        }
        info!(worker_id = %id, is_healthy, "worker health changed");
    }

    pub fn get_worker(&self, id: &str) -> Option<WorkerRecord> {
        let workers = self.workers.lock().expect("workers lock");
        workers.get(id).cloned()
    }

    /// Health of the worker listening at `address` (`host:port` or a URL).
    pub fn get_worker_health_by_address(&self, address: &str) -> Option<bool> {
        let (host, port) = split_host_port(address).ok()?;
        let workers = self.workers.lock().expect("workers lock");
        workers
            .values()
            .find(|w| w.host == host && w.http_port == port)
            .map(|w| w.is_healthy)
    }

    /// `host:port` of every registered worker, sorted.
    ///
    /// Workers that fail their probes are evicted by the sweep, so every
    /// cached worker is routable.
    pub fn list_healthy(&self) -> Vec<String> {
        let mut addresses: Vec<String> = {
            let workers = self.workers.lock().expect("workers lock");
            workers.values().map(WorkerRecord::address).collect()
        };
        addresses.sort();
        addresses
    }

    /// Snapshot of every cached record, sorted by id.
    pub fn list_workers(&self) -> Vec<WorkerRecord> {
        let mut records: Vec<WorkerRecord> = {
            let workers = self.workers.lock().expect("workers lock");
            workers.values().cloned().collect()
        };
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// Drop a worker from the cache and the store.
    ///
    /// The store delete is attempted even when the cache had no entry, so a
    /// diverged store converges. Returns whether the cache held the worker.
    pub fn remove_worker(&self, id: &str) -> bool {
        let removed = {
            let mut workers = self.workers.lock().expect("workers lock");
            let removed = workers.remove(id).is_some();
            self.metrics.forget_worker(id);
            removed
        };

        if let Err(e) = self.store.delete_worker(id) {
            warn!(worker_id = %id, error = %e, "failed to delete worker from store");
        }

        if removed {
            info!(worker_id = %id, "worker removed");
        }
        removed
    }

    /// Remove `id` only if it is still registered at `address`.
    ///
    /// Used after a failed probe sequence: a worker that re-registered
    /// elsewhere while it was being probed keeps its new entry, and the
    /// store is left alone. Returns whether the worker was evicted.
    pub fn evict_if_unchanged(&self, id: &str, address: &str) -> bool {
        {
            let mut workers = self.workers.lock().expect("workers lock");
            match workers.get(id) {
                Some(worker) if worker.address() == address => {
                    workers.remove(id);
                    self.metrics.forget_worker(id);
                }
                Some(worker) => {
                    debug!(
                        worker_id = %id,
                        probed = %address,
                        current = %worker.address(),
                        "worker moved while being probed, keeping it"
                    );
                    return false;
                }
                None => {
                    debug!(worker_id = %id, "worker already gone before eviction");
                    return false;
                }
            }
        }

        if let Err(e) = self.store.delete_worker(id) {
            warn!(worker_id = %id, error = %e, "failed to delete evicted worker from store");
        }
        true
    }

    pub fn len(&self) -> usize {
        self.workers.lock().expect("workers lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn validate_identity(id: &str) -> RegistryResult<()> {
    if id.is_empty() || id.trim() != id || id.chars().any(char::is_control) {
        return Err(RegistryError::InvalidIdentity(id.to_string()));
    }
    Ok(())
}

fn validate_address(host: &str, http_port: u16) -> RegistryResult<()> {
    if host.trim().is_empty() {
        return Err(RegistryError::InvalidAddress("host is empty".to_string()));
    }
    if http_port == 0 {
        return Err(RegistryError::InvalidAddress(format!(
            "port 0 is not routable for host {host}"
        )));
    }
    Ok(())
}
