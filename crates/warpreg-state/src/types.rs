//! Persisted worker record.

use serde::{Deserialize, Serialize};

use warpreg_core::{join_host_port, url_from_host_port};

/// Unique identifier chosen by the registering worker.
pub type WorkerId = String;

/// A registered worker, as cached by the registry and mirrored to the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkerRecord {
    pub id: WorkerId,
    pub host: String,
    pub http_port: u16,
    /// Alternate-protocol port (e.g. gRPC), if the worker exposes one.
    #[serde(default)]
    pub secondary_port: Option<u16>,
    pub is_healthy: bool,
    /// Unix timestamp (seconds) of the last health transition or probe success.
    pub last_health_check: u64,
}

impl WorkerRecord {
    /// Build a freshly registered, healthy record stamped with `now`.
    pub fn new(
        id: &str,
        host: &str,
        http_port: u16,
        secondary_port: Option<u16>,
        now: u64,
    ) -> Self {
        Self {
            id: id.to_string(),
            host: host.to_string(),
            http_port,
            secondary_port,
            is_healthy: true,
            last_health_check: now,
        }
    }

    /// `host:port` of the HTTP endpoint.
    pub fn address(&self) -> String {
        join_host_port(&self.host, self.http_port)
    }

    /// Base URL of the HTTP endpoint.
    pub fn url(&self) -> String {
        url_from_host_port(&self.host, self.http_port)
    }
}
