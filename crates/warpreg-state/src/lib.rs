//! warpreg-state — durable mirror of the worker registry.
//!
//! The registry keeps its authoritative worker set in memory and writes
//! every mutation through to a [`WorkerStore`]. The store exists so a
//! restarted registry can hydrate its cache; it is never consulted to
//! serve reads.
//!
//! # Backends
//!
//! ```text
//! WorkerStore (trait)
//!   ├── StateStore  — redb database, `workers` table keyed by worker id
//!   │                 (on-disk or in-memory)
//!   └── FileStore   — single JSON document, rewritten atomically
//! ```
//!
//! Both backends enforce the uniqueness of worker ids: inserting an id
//! that already exists fails with [`StateError::DuplicateKey`].

pub mod error;
pub mod file;
pub mod store;
pub mod tables;
pub mod types;

use std::path::Path;
use std::sync::Arc;

pub use error::{StateError, StateResult};
pub use file::FileStore;
pub use store::StateStore;
pub use types::*;

use warpreg_core::{StoreBackend, StoreConfig};

/// Persistence contract consumed by the registry.
///
/// Implementations must be safe to call from many threads at once.
pub trait WorkerStore: Send + Sync {
    /// Idempotent setup of whatever enforces id uniqueness.
    fn ensure_unique_index(&self) -> StateResult<()>;

    /// Insert a new record. Fails with `DuplicateKey` if the id exists.
    fn insert_worker(&self, record: &WorkerRecord) -> StateResult<()>;

    /// Set the health flag and stamp `last_health_check` with the current time.
    fn update_worker_health(&self, id: &str, is_healthy: bool) -> StateResult<()>;

    /// Replace an existing record. Fails with `NotFound` if the id is absent.
    fn update_worker(&self, record: &WorkerRecord) -> StateResult<()>;

    /// Delete a record. Returns true if it existed.
    fn delete_worker(&self, id: &str) -> StateResult<bool>;

    fn get_worker(&self, id: &str) -> StateResult<Option<WorkerRecord>>;

    fn list_workers(&self) -> StateResult<Vec<WorkerRecord>>;
}

/// Open the backend selected in configuration.
pub fn open_store(config: &StoreConfig) -> StateResult<Arc<dyn WorkerStore>> {
    let path: &Path = &config.path;
    match config.backend {
        StoreBackend::Redb => Ok(Arc::new(StateStore::open(path)?)),
        StoreBackend::File => Ok(Arc::new(FileStore::open(path)?)),
    }
}

/// Current Unix time in seconds.
pub fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
