//! warpreg-health — worker liveness probing for WarpReg.
//!
//! Provides an authenticated HTTP probe and the fixed-delay retry
//! protocol the registry's health sweep runs for every cached worker.
//!
//! # Architecture
//!
//! ```text
//! probe_with_retry(prober, address, RetryPolicy)
//!   ├── Prober::probe()  (HttpProber → GET /healthcheck + X-API-Key)
//!   │     └── ProbeResult: Healthy (200) | Unhealthy | Failed
//!   ├── stop on first Healthy
//!   └── sleep(backoff) between failures, up to `attempts` tries
//! ```

pub mod checker;
pub mod retry;
pub mod scripted;

pub use checker::{API_KEY_HEADER, BoxFuture, HttpProber, ProbeResult, Prober, http_probe};
pub use retry::{ProbeOutcome, RetryPolicy, probe_with_retry};
pub use scripted::ScriptedProber;
