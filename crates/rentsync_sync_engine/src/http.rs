//! HTTP gateway.
//!
//! The HTTP library is abstracted behind [`HttpClient`] so the engine can
//! run over reqwest, ureq, a platform bridge, or an in-process server.
//! Bodies are JSON, as the server speaks them.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::gateway::RemoteGateway;
use parking_lot::RwLock;
use rentsync_protocol::{from_json, to_json, PullRequest, PullResponse, PushAck, PushRequest};
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Status and body of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// An `Err` means no response arrived (connection refused, DNS failure,
/// timeout); error statuses are returned as responses.
pub trait HttpClient: Send + Sync {
    /// Sends a GET request.
    fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, String>;

    /// Sends a POST request with a JSON body.
    fn post(&self, url: &str, body: Vec<u8>, timeout: Duration) -> Result<HttpResponse, String>;

    /// Checks if the client is connected/healthy.
    fn is_healthy(&self) -> bool;
}

/// HTTP-based remote gateway.
///
/// Pulls with `GET {base}{pull_path}?lastPulledVersion=N` and pushes with
/// `POST {base}{push_path}`.
///
/// Requests are refused only while the device reports itself offline
/// ([`RemoteGateway::disconnect`]). A failed request is recorded in
/// [`is_reachable`](Self::is_reachable) and [`last_error`](Self::last_error)
/// but does not stop the next request from trying the network.
pub struct HttpGateway<C: HttpClient> {
    config: SyncConfig,
    client: C,
    online: AtomicBool,
    reachable: AtomicBool,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpGateway<C> {
    /// Creates a new HTTP gateway.
    pub fn new(config: SyncConfig, client: C) -> Self {
        Self {
            config,
            client,
            online: AtomicBool::new(true),
            reachable: AtomicBool::new(true),
            last_error: RwLock::new(None),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the HTTP client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns the last transport error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Returns false if the last request got no response.
    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        result: Result<HttpResponse, String>,
    ) -> SyncResult<T> {
        let response = result.map_err(|e| {
            tracing::warn!(error = %e, "request failed");
            *self.last_error.write() = Some(e.clone());
            self.reachable.store(false, Ordering::SeqCst);
            SyncError::transport_retryable(e)
        })?;
        *self.last_error.write() = None;
        self.reachable.store(true, Ordering::SeqCst);

        if !response.is_success() {
            return Err(SyncError::Server {
                status: response.status,
                message: String::from_utf8_lossy(&response.body).into_owned(),
            });
        }

        from_json(&response.body)
            .map_err(|e| SyncError::Protocol(format!("failed to decode response: {e}")))
    }
}

impl<C: HttpClient> RemoteGateway for HttpGateway<C> {
    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        let url = self.config.pull_url(&request.to_query());
        tracing::debug!(%url, "pulling");
        self.decode(self.client.get(&url, self.config.timeout))
    }

    fn push(&self, request: &PushRequest) -> SyncResult<PushAck> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        let body = to_json(request)
            .map_err(|e| SyncError::Protocol(format!("failed to encode request: {e}")))?;
        let url = self.config.push_url();
        tracing::debug!(%url, changes = request.len(), "pushing");
        self.decode(self.client.post(&url, body, self.config.timeout))
    }

    fn is_connected(&self) -> bool {
        self.online.load(Ordering::SeqCst) && self.client.is_healthy()
    }

    fn disconnect(&self) {
        self.online.store(false, Ordering::SeqCst);
    }

    fn reconnect(&self) {
        self.online.store(true, Ordering::SeqCst);
    }
}

/// Servers that can answer requests in-process.
pub trait LoopbackServer {
    /// Handles a request. `path_and_query` excludes scheme and host.
    fn handle(&self, method: &str, path_and_query: &str, body: &[u8]) -> HttpResponse;
}

/// An HTTP client that hands requests straight to a [`LoopbackServer`].
///
/// Useful for testing without actual network overhead.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
    healthy: AtomicBool,
}

impl<S: LoopbackServer + Send + Sync> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self {
            server,
            healthy: AtomicBool::new(true),
        }
    }

    /// Simulates losing or regaining the network.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    fn route(&self, method: &str, url: &str, body: &[u8]) -> Result<HttpResponse, String> {
        if !self.healthy.load(Ordering::SeqCst) {
            return Err("network unreachable".into());
        }
        Ok(self.server.handle(method, path_of(url), body))
    }
}

/// Strips scheme and authority from a URL.
fn path_of(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    rest.find('/').map_or("/", |i| &rest[i..])
}

impl<S: LoopbackServer + Send + Sync> HttpClient for LoopbackClient<S> {
    fn get(&self, url: &str, _timeout: Duration) -> Result<HttpResponse, String> {
        self.route("GET", url, &[])
    }

    fn post(&self, url: &str, body: Vec<u8>, _timeout: Duration) -> Result<HttpResponse, String> {
        self.route("POST", url, &body)
    }

    fn is_healthy(&self) -> bool {
        true
    }
}
