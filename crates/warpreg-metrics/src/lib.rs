//! warpreg-metrics — observability for the worker registry.
//!
//! Tracks per-worker health observations, health sweep totals and
//! per-endpoint HTTP request counts, and renders them in Prometheus text
//! format.
//!
//! # Architecture
//!
//! ```text
//! RegistryMetrics
//!   ├── record_worker_health() ← Registry on register / health change
//!   ├── forget_worker()        ← Registry on eviction / removal
//!   ├── record_sweep()         ← health sweep
//!   └── record_request()       ← API middleware
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```

pub mod collector;
pub mod prometheus;

pub use collector::{RegistryMetrics, RequestStats, SweepTotals, WorkerHealthSample};
pub use prometheus::render_prometheus;
