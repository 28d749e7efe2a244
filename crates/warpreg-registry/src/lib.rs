//! warpreg-registry — the worker registry core.
//!
//! Workers announce themselves with [`Registry::register`]. The registry
//! keeps them in memory, mirrors every change to a
//! [`WorkerStore`](warpreg_state::WorkerStore), and periodically probes
//! each one. Workers that fail every attempt of a probe sequence are
//! evicted.
//!
//! ```text
//! register ──► cache (Mutex<HashMap>) ──► store (write-through)
//!                 ▲
//! scheduler ──► check_all_workers ──► probe_with_retry × N (JoinSet)
//!                                     ├── healthy  → update_health
//!                                     └── exhausted → remove_worker
//! ```

pub mod error;
pub mod registry;
mod scheduler;
pub mod sweep;

pub use error::{RegistryError, RegistryResult};
pub use registry::Registry;
pub use sweep::SweepReport;
