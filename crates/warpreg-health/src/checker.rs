//! Worker liveness probe.
//!
//! Issues an authenticated `GET` against a worker's health endpoint over
//! a fresh HTTP/1 connection and reduces the outcome to a [`ProbeResult`].

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::debug;

/// Header carrying the shared secret on every probe.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Result of a single health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// The health endpoint answered exactly 200.
    Healthy,
    /// The health endpoint answered with any other status.
    Unhealthy,
    /// The probe could not be executed (connection error or timeout).
    Failed,
}

impl ProbeResult {
    pub fn is_healthy(self) -> bool {
        self == ProbeResult::Healthy
    }
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Something that can check whether a worker at `host:port` is alive.
///
/// The registry holds probers as `Arc<dyn Prober>`, which lets tests swap
/// the HTTP implementation for a scripted one.
pub trait Prober: Send + Sync {
    fn probe<'a>(&'a self, address: &'a str) -> BoxFuture<'a, ProbeResult>;
}

/// Probes `GET http://{address}{path}` with the `X-API-Key` header.
#[derive(Debug, Clone)]
pub struct HttpProber {
    path: String,
    api_key: String,
    timeout: Duration,
}

impl HttpProber {
    pub fn new(path: &str, api_key: &str, timeout: Duration) -> Self {
        Self {
            path: path.to_string(),
            api_key: api_key.to_string(),
            timeout,
        }
    }

    /// Build a prober from the registry config (endpoint, key, timeout).
    pub fn from_config(config: &warpreg_core::RegistryConfig) -> Self {
        Self::new(
            &config.health.endpoint,
            &config.server.api_key,
            config.health.timeout(),
        )
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Prober for HttpProber {
    fn probe<'a>(&'a self, address: &'a str) -> BoxFuture<'a, ProbeResult> {
        Box::pin(http_probe(address, &self.path, &self.api_key, self.timeout))
    }
}

/// Perform one authenticated HTTP health probe against `address`.
///
/// Returns `Healthy` only for status 200, `Unhealthy` for any other
/// status, and `Failed` if the connection fails or the timeout elapses.
pub async fn http_probe(
    address: &str,
    path: &str,
    api_key: &str,
    timeout: Duration,
) -> ProbeResult {
    let uri = format!("http://{address}{path}");

    let result = tokio::time::timeout(timeout, async {
        let stream = match tokio::net::TcpStream::connect(address).await {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, %uri, "health probe connection failed");
                return ProbeResult::Failed;
            }
        };

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = match hyper::client::conn::http1::handshake(io).await {
            Ok(pair) => pair,
            Err(e) => {
                debug!(error = %e, %uri, "health probe handshake failed");
                return ProbeResult::Failed;
            }
        };

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = match http::Request::builder()
            .method("GET")
            .uri(path)
            .header("host", address)
            .header("user-agent", "warpreg-health/0.1")
            .header(API_KEY_HEADER, api_key)
            .body(http_body_util::Empty::<bytes::Bytes>::new())
        {
            Ok(req) => req,
            Err(e) => {
                debug!(error = %e, %uri, "health probe request invalid");
                return ProbeResult::Failed;
            }
        };

        match sender.send_request(req).await {
            Ok(resp) if resp.status() == http::StatusCode::OK => ProbeResult::Healthy,
            Ok(resp) => {
                debug!(status = %resp.status(), %uri, "health probe non-200");
                ProbeResult::Unhealthy
            }
            Err(e) => {
                debug!(error = %e, %uri, "health probe request failed");
                ProbeResult::Failed
            }
        }
    })
    .await;

    match result {
        Ok(probe) => probe,
        Err(_) => {
            debug!(%uri, "health probe timed out");
            ProbeResult::Failed
        }
    }
}
