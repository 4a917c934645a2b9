//! Main sync server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::store::ServerStore;
use rentsync_protocol::{
    from_json, to_json, PullRequest, PullResponse, PushAck, PushRequest, Record, RecordId,
    Revision,
};
use std::sync::Arc;

/// The sync server.
///
/// Answers pulls with every change after the client's version and applies
/// pushed changes, stamping each with a new version. Transport is left to
/// the caller: [`handle_http`](Self::handle_http) takes a method, a path and
/// a body, and can sit behind any HTTP stack or be called in-process.
///
/// # Example
///
/// ```
/// use rentsync_sync_server::{ServerConfig, SyncServer};
///
/// let server = SyncServer::new(ServerConfig::default());
/// let (status, body) = server.handle_http("GET", "/cars/sync/pull?lastPulledVersion=0", b"");
/// assert_eq!(status, 200);
/// assert_eq!(body, br#"{"changes":{},"latestVersion":0}"#.to_vec());
/// ```
pub struct SyncServer {
    config: ServerConfig,
    store: Arc<ServerStore>,
}

impl SyncServer {
    /// Creates a new sync server with an empty store.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_store(config, Arc::new(ServerStore::new()))
    }

    /// Creates a sync server over an existing store.
    pub fn with_store(config: ServerConfig, store: Arc<ServerStore>) -> Self {
        Self { config, store }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Handles a pull request.
    pub fn handle_pull(&self, request: PullRequest) -> ServerResult<PullResponse> {
        let response = self
            .store
            .changes_since(request.last_pulled_version, self.config.max_pull_batch);
        tracing::debug!(
            since = request.last_pulled_version,
            changes = response.len(),
            latest_version = response.latest_version,
            "pull"
        );
        Ok(response)
    }

    /// Handles a push request.
    pub fn handle_push(&self, request: PushRequest) -> ServerResult<PushAck> {
        if request.len() > self.config.max_push_batch {
            return Err(ServerError::PayloadTooLarge {
                len: request.len(),
                max: self.config.max_push_batch,
            });
        }
        Ok(self.store.apply(request.changes))
    }

    /// Handles a raw HTTP request and returns the status and JSON body.
    ///
    /// `path_and_query` excludes scheme and host. Errors are answered with
    /// `{"error": "..."}`.
    pub fn handle_http(&self, method: &str, path_and_query: &str, body: &[u8]) -> (u16, Vec<u8>) {
        match self.route(method, path_and_query, body) {
            Ok(body) => (200, body),
            Err(e) => {
                tracing::info!(method, path = path_and_query, error = %e, "request rejected");
                let body = serde_json::json!({ "error": e.to_string() });
                (e.status(), body.to_string().into_bytes())
            }
        }
    }

    fn route(&self, method: &str, path_and_query: &str, body: &[u8]) -> ServerResult<Vec<u8>> {
        let (path, query) = path_and_query
            .split_once('?')
            .unwrap_or((path_and_query, ""));

        let allowed = if path == self.config.pull_path {
            "GET"
        } else if path == self.config.push_path {
            "POST"
        } else {
            return Err(ServerError::NotFound(path.to_string()));
        };
        if method != allowed {
            return Err(ServerError::MethodNotAllowed {
                method: method.to_string(),
                path: path.to_string(),
            });
        }

        if path == self.config.pull_path {
            let request = PullRequest::from_query(query)
                .map_err(|e| ServerError::InvalidRequest(e.to_string()))?;
            Ok(to_json(&self.handle_pull(request)?)?)
        } else {
            let request: PushRequest = from_json(body)?;
            Ok(to_json(&self.handle_push(request)?)?)
        }
    }

    /// Inserts records as if written on the server. Returns the new version.
    pub fn seed(&self, records: impl IntoIterator<Item = Record>) -> Revision {
        self.store.seed(records)
    }

    /// Returns the current version.
    pub fn version(&self) -> Revision {
        self.store.version()
    }

    /// Returns the number of live records.
    pub fn record_count(&self) -> usize {
        self.store.len()
    }

    /// Returns a record, tombstones included.
    pub fn record(&self, id: &RecordId) -> Option<Record> {
        self.store.get(id)
    }
}
