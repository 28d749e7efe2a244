//! Deterministic prober for tests and local dry runs.
//!
//! Each address can be given a queue of results that is replayed in
//! order; once the queue is empty the address falls back to its pinned
//! result, or to the prober-wide default.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::checker::{BoxFuture, ProbeResult, Prober};

#[derive(Debug)]
pub struct ScriptedProber {
    default: ProbeResult,
    queued: Mutex<HashMap<String, VecDeque<ProbeResult>>>,
    pinned: Mutex<HashMap<String, ProbeResult>>,
    calls: Mutex<HashMap<String, u32>>,
    delay: Duration,
}

impl ScriptedProber {
    /// Every unscripted address answers `default`.
    pub fn new(default: ProbeResult) -> Self {
        Self {
            default,
            queued: Mutex::new(HashMap::new()),
            pinned: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            delay: Duration::ZERO,
        }
    }

    /// Hold every answer back for `delay`, like a slow network would.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue results for `address`, replayed one per probe.
    pub fn script(&self, address: &str, results: &[ProbeResult]) {
        let mut queued = self.queued.lock().expect("scripted prober lock");
        queued
            .entry(address.to_string())
            .or_default()
            .extend(results.iter().copied());
    }

    /// Answer `result` for `address` whenever its queue is empty.
    pub fn pin(&self, address: &str, result: ProbeResult) {
        let mut pinned = self.pinned.lock().expect("scripted prober lock");
        pinned.insert(address.to_string(), result);
    }

    /// Probes issued against `address` so far.
    pub fn calls(&self, address: &str) -> u32 {
        let calls = self.calls.lock().expect("scripted prober lock");
        calls.get(address).copied().unwrap_or(0)
    }

    fn next_result(&self, address: &str) -> ProbeResult {
        *self
            .calls
            .lock()
            .expect("scripted prober lock")
            .entry(address.to_string())
            .or_default() += 1;

        let queued = self
            .queued
            .lock()
            .expect("scripted prober lock")
            .get_mut(address)
            .and_then(VecDeque::pop_front);
        if let Some(result) = queued {
            return result;
        }
        let pinned = self.pinned.lock().expect("scripted prober lock");
        pinned.get(address).copied().unwrap_or(self.default)
    }
}

impl Prober for ScriptedProber {
    fn probe<'a>(&'a self, address: &'a str) -> BoxFuture<'a, ProbeResult> {
        let result = self.next_result(address);
        let delay = self.delay;
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            result
        })
    }
}
