//! Probe-with-retry protocol.
//!
//! A worker is classified unhealthy only after every attempt in the
//! budget has failed. The first success short-circuits the remaining
//! attempts. Failed attempts are separated by a fixed delay: no
//! exponential growth, no jitter.

use std::time::Duration;

use tracing::debug;

use crate::checker::Prober;

/// Attempt budget and delay between failed attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Probes allowed per worker per sweep, including the first. Zero is
    /// treated as one.
    pub attempts: u32,
    /// Sleep between a failed probe and the next attempt.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 4,
            backoff: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        // A zero budget would classify every worker without probing it.
        Self {
            attempts: attempts.max(1),
            backoff,
        }
    }

    pub fn from_config(config: &warpreg_core::RegistryConfig) -> Self {
        Self::new(config.health.attempts, config.health.backoff())
    }
}

/// Outcome of a full retry sequence for one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    /// Whether any attempt answered healthy.
    pub healthy: bool,
    /// Attempts actually made (1..=policy.attempts).
    pub attempts: u32,
}

/// Probe `address` until it answers healthy or the budget is exhausted.
pub async fn probe_with_retry(
    prober: &dyn Prober,
    address: &str,
    policy: &RetryPolicy,
) -> ProbeOutcome {
    let budget = policy.attempts.max(1);

    for attempt in 1..=budget {
        let result = prober.probe(address).await;
        if result.is_healthy() {
            debug!(%address, attempt, "worker healthy");
            return ProbeOutcome {
                healthy: true,
                attempts: attempt,
            };
        }

        debug!(%address, attempt, budget, ?result, "health probe attempt failed");
        if attempt < budget {
            tokio::time::sleep(policy.backoff).await;
        }
    }

    ProbeOutcome {
        healthy: false,
        attempts: budget,
    }
}
