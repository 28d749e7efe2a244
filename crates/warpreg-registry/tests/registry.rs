//! End-to-end registry behaviour against real stores and scripted probers.

use std::sync::Arc;
use std::time::Duration;

use warpreg_health::{ProbeResult, RetryPolicy, ScriptedProber};
use warpreg_registry::{Registry, RegistryError};
use warpreg_state::{
    FileStore, StateError, StateResult, StateStore, WorkerRecord, WorkerStore,
};

fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(4, Duration::from_millis(1))
}

fn open(store: Arc<dyn WorkerStore>, prober: Arc<ScriptedProber>) -> Registry {
    Registry::open(store, prober, fast_retry()).unwrap()
}

#[test]
fn duplicate_registration_keeps_one_entry() {
    let store = Arc::new(StateStore::open_in_memory().unwrap());
    let registry = open(store.clone(), Arc::new(ScriptedProber::new(ProbeResult::Healthy)));

    registry.register("w1", "10.0.0.5", 8080, None).unwrap();
    registry.register("w1", "10.0.0.5", 8080, None).unwrap();
    registry.register("w1", "10.0.0.5", 9000, None).unwrap();

    assert_eq!(registry.len(), 1);
    assert_eq!(registry.list_healthy(), vec!["10.0.0.5:9000"]);
    let stored = store.list_workers().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].http_port, 9000);
}

#[test]
fn list_healthy_matches_cache() {
    let registry = open(
        Arc::new(StateStore::open_in_memory().unwrap()),
        Arc::new(ScriptedProber::new(ProbeResult::Healthy)),
    );
    registry.register("w2", "10.0.0.6", 8080, None).unwrap();
    registry.register("w1", "10.0.0.5", 8080, None).unwrap();

    let mut expected: Vec<String> = registry
        .list_workers()
        .iter()
        .map(WorkerRecord::address)
        .collect();
    expected.sort();
    assert_eq!(registry.list_healthy(), expected);
    assert_eq!(registry.list_healthy(), vec!["10.0.0.5:8080", "10.0.0.6:8080"]);
}

#[tokio::test]
async fn success_on_any_attempt_keeps_worker() {
    for k in 1..=4usize {
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        let prober = Arc::new(ScriptedProber::new(ProbeResult::Healthy));
        prober.script("10.0.0.5:8080", &vec![ProbeResult::Failed; k - 1]);
        let registry = open(store.clone(), prober.clone());
        registry.register("w1", "10.0.0.5", 8080, None).unwrap();

        let report = registry.check_all_workers().await;

        assert_eq!(report.healthy, vec!["w1"], "success on attempt {k}");
        assert!(registry.get_worker("w1").is_some());
        assert!(store.get_worker("w1").unwrap().is_some());
        assert_eq!(prober.calls("10.0.0.5:8080"), k as u32);
    }
}

#[tokio::test]
async fn four_failures_evict_from_cache_and_store() {
    let store = Arc::new(StateStore::open_in_memory().unwrap());
    let prober = Arc::new(ScriptedProber::new(ProbeResult::Unhealthy));
    let registry = open(store.clone(), prober.clone());
    registry.register("w1", "10.0.0.5", 8080, None).unwrap();

    let report = registry.check_all_workers().await;

    assert_eq!(report.evicted, vec!["w1"]);
    assert_eq!(prober.calls("10.0.0.5:8080"), 4);
    assert!(registry.is_empty());
    assert!(store.list_workers().unwrap().is_empty());
    assert!(registry.list_healthy().is_empty());
}

#[tokio::test]
async fn concurrent_registrations_all_land() {
    let store = Arc::new(StateStore::open_in_memory().unwrap());
    let registry = open(store.clone(), Arc::new(ScriptedProber::new(ProbeResult::Healthy)));

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..32u16 {
        let registry = registry.clone();
        tasks.spawn(async move {
            registry
                .register(&format!("w{i}"), "10.0.1.1", 8000 + i, None)
                .unwrap();
        });
    }
    while let Some(done) = tasks.join_next().await {
        done.unwrap();
    }

    assert_eq!(registry.len(), 32);
    assert_eq!(store.list_workers().unwrap().len(), 32);
}

#[test]
fn concurrent_reregistration_of_one_id() {
    let store = Arc::new(StateStore::open_in_memory().unwrap());
    let registry = open(store.clone(), Arc::new(ScriptedProber::new(ProbeResult::Healthy)));

    std::thread::scope(|scope| {
        for i in 0..8u16 {
            let registry = &registry;
            scope.spawn(move || {
                registry.register("w1", "10.0.0.5", 8000 + i, None).unwrap();
            });
        }
    });

    assert_eq!(registry.len(), 1);
    assert_eq!(store.list_workers().unwrap().len(), 1);
}

#[test]
fn stored_workers_present_after_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("workers.redb");

    {
        let store = StateStore::open(&path).unwrap();
        store
            .insert_worker(&WorkerRecord::new("w1", "10.0.0.5", 8080, Some(9090), 100))
            .unwrap();
    }

    let registry = open(
        Arc::new(StateStore::open(&path).unwrap()),
        Arc::new(ScriptedProber::new(ProbeResult::Healthy)),
    );
    let worker = registry.get_worker("w1").unwrap();
    assert_eq!(worker.secondary_port, Some(9090));
    assert_eq!(worker.last_health_check, 100);
    assert_eq!(registry.list_healthy(), vec!["10.0.0.5:8080"]);
}

#[test]
fn registrations_survive_restart_with_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("workers.json");
    let prober = Arc::new(ScriptedProber::new(ProbeResult::Healthy));

    {
        let registry = open(Arc::new(FileStore::open(&path).unwrap()), prober.clone());
        registry.register("w1", "10.0.0.5", 8080, None).unwrap();
        registry.register("w2", "10.0.0.6", 8080, None).unwrap();
        registry.remove_worker("w2");
    }

    let registry = open(Arc::new(FileStore::open(&path).unwrap()), prober);
    assert_eq!(registry.list_healthy(), vec!["10.0.0.5:8080"]);
}

/// Store whose startup calls fail.
struct BrokenStore;

impl WorkerStore for BrokenStore {
    fn ensure_unique_index(&self) -> StateResult<()> {
        Ok(())
    }
    fn insert_worker(&self, _record: &WorkerRecord) -> StateResult<()> {
        Err(StateError::Write("disk gone".into()))
    }
    fn update_worker_health(&self, _id: &str, _is_healthy: bool) -> StateResult<()> {
        Err(StateError::Write("disk gone".into()))
    }
    fn update_worker(&self, _record: &WorkerRecord) -> StateResult<()> {
        Err(StateError::Write("disk gone".into()))
    }
    fn delete_worker(&self, _id: &str) -> StateResult<bool> {
        Err(StateError::Write("disk gone".into()))
    }
    fn get_worker(&self, _id: &str) -> StateResult<Option<WorkerRecord>> {
        Err(StateError::Read("disk gone".into()))
    }
    fn list_workers(&self) -> StateResult<Vec<WorkerRecord>> {
        Err(StateError::Read("disk gone".into()))
    }
}

#[test]
fn hydration_failure_is_fatal() {
    let err = Registry::open(
        Arc::new(BrokenStore),
        Arc::new(ScriptedProber::new(ProbeResult::Healthy)),
        fast_retry(),
    )
    .unwrap_err();
    assert!(matches!(err, RegistryError::Store(StateError::Read(_))));
}

/// Hydrates fine, then fails every write.
struct ReadOnlyStore(StateStore);

impl WorkerStore for ReadOnlyStore {
    fn ensure_unique_index(&self) -> StateResult<()> {
        self.0.ensure_unique_index()
    }
    fn insert_worker(&self, record: &WorkerRecord) -> StateResult<()> {
        BrokenStore.insert_worker(record)
    }
    fn update_worker_health(&self, id: &str, is_healthy: bool) -> StateResult<()> {
        BrokenStore.update_worker_health(id, is_healthy)
    }
    fn update_worker(&self, record: &WorkerRecord) -> StateResult<()> {
        BrokenStore.update_worker(record)
    }
    fn delete_worker(&self, id: &str) -> StateResult<bool> {
        BrokenStore.delete_worker(id)
    }
    fn get_worker(&self, id: &str) -> StateResult<Option<WorkerRecord>> {
        self.0.get_worker(id)
    }
    fn list_workers(&self) -> StateResult<Vec<WorkerRecord>> {
        self.0.list_workers()
    }
}

#[tokio::test]
async fn store_write_failures_do_not_surface() {
    let prober = Arc::new(ScriptedProber::new(ProbeResult::Failed));
    let registry = open(
        Arc::new(ReadOnlyStore(StateStore::open_in_memory().unwrap())),
        prober,
    );

    registry.register("w1", "10.0.0.5", 8080, None).unwrap();
    registry.register("w1", "10.0.0.5", 8081, None).unwrap();
    registry.update_health("w1", false);
    assert_eq!(registry.get_worker_health_by_address("10.0.0.5:8081"), Some(false));

    let report = registry.check_all_workers().await;
    assert_eq!(report.evicted, vec!["w1"]);
    assert!(registry.is_empty());
}

#[tokio::test]
async fn scenario_single_dead_worker_is_evicted() {
    let store = Arc::new(StateStore::open_in_memory().unwrap());
    let prober = Arc::new(ScriptedProber::new(ProbeResult::Healthy));
    let registry = open(store.clone(), prober.clone());

    registry.register("W1", "10.0.0.5", 8080, None).unwrap();
    assert_eq!(registry.list_healthy(), vec!["10.0.0.5:8080"]);

    prober.pin("10.0.0.5:8080", ProbeResult::Failed);
    let report = registry.check_all_workers().await;

    assert_eq!(report.evicted, vec!["W1"]);
    assert!(registry.list_healthy().is_empty());
    assert_eq!(registry.get_worker_health_by_address("10.0.0.5:8080"), None);
    assert!(store.get_worker("W1").unwrap().is_none());
}

#[tokio::test]
async fn scenario_recovering_worker_kept_dead_worker_evicted() {
    let store = Arc::new(StateStore::open_in_memory().unwrap());
    let prober = Arc::new(ScriptedProber::new(ProbeResult::Healthy));
    let registry = open(store.clone(), prober.clone());

    registry.register("W1", "10.0.0.5", 8080, None).unwrap();
    registry.register("W2", "10.0.0.6", 8080, None).unwrap();

    // W1 fails twice then answers; W2 never answers.
    prober.script("10.0.0.5:8080", &[ProbeResult::Failed, ProbeResult::Unhealthy]);
    prober.pin("10.0.0.6:8080", ProbeResult::Failed);

    let report = registry.check_all_workers().await;

    assert_eq!(report.probed, 2);
    assert_eq!(report.healthy, vec!["W1"]);
    assert_eq!(report.evicted, vec!["W2"]);
    assert_eq!(registry.list_healthy(), vec!["10.0.0.5:8080"]);
    assert_eq!(prober.calls("10.0.0.5:8080"), 3);
    assert_eq!(prober.calls("10.0.0.6:8080"), 4);

    let stored: Vec<String> = store
        .list_workers()
        .unwrap()
        .into_iter()
        .map(|w| w.id)
        .collect();
    assert_eq!(stored, vec!["W1"]);
}

#[tokio::test]
async fn scheduler_evicts_in_background() {
    let store = Arc::new(StateStore::open_in_memory().unwrap());
    let prober = Arc::new(ScriptedProber::new(ProbeResult::Healthy));
    prober.pin("10.0.0.6:8080", ProbeResult::Failed);
    let registry = open(store.clone(), prober);

    registry.register("W1", "10.0.0.5", 8080, None).unwrap();
    registry.register("W2", "10.0.0.6", 8080, None).unwrap();

    registry.start_scheduler(Duration::from_millis(10));
    for _ in 0..200 {
        if registry.len() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    registry.stop_scheduler();
    registry.stop_scheduler();

    assert_eq!(registry.list_healthy(), vec!["10.0.0.5:8080"]);
    assert!(store.get_worker("W2").unwrap().is_none());
}
