//! Remote gateway abstraction.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use rentsync_protocol::{PullRequest, PullResponse, PushAck, PushRequest};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

/// The server's pull and push endpoints.
///
/// Calls block until the server answers or the transport gives up. A gateway
/// never retries on its own; retrying is up to whoever calls the engine.
pub trait RemoteGateway: Send + Sync {
    /// Fetches all changes after `request.last_pulled_version`.
    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse>;

    /// Sends pending local changes. The batch is acknowledged as a whole.
    fn push(&self, request: &PushRequest) -> SyncResult<PushAck>;

    /// Returns false when the device reports no network.
    fn is_connected(&self) -> bool;

    /// Called when the device reports losing connectivity.
    fn disconnect(&self) {}

    /// Called when the device reports connectivity again.
    fn reconnect(&self) {}
}

/// A scripted gateway for tests.
///
/// Pull responses are served from a queue; once one response is left it is
/// served for every further pull. Failures can be injected for the next
/// pull or push. Every request is recorded.
#[derive(Debug)]
pub struct MockGateway {
    connected: AtomicBool,
    pull_responses: Mutex<VecDeque<PullResponse>>,
    push_ack: Mutex<PushAck>,
    pull_failure: Mutex<Option<SyncError>>,
    push_failure: Mutex<Option<SyncError>>,
    pull_requests: Mutex<Vec<PullRequest>>,
    pushed: Mutex<Vec<PushRequest>>,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGateway {
    /// Creates a connected gateway that answers every pull with no changes.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            pull_responses: Mutex::new(VecDeque::new()),
            push_ack: Mutex::new(PushAck::default()),
            pull_failure: Mutex::new(None),
            push_failure: Mutex::new(None),
            pull_requests: Mutex::new(Vec::new()),
            pushed: Mutex::new(Vec::new()),
        }
    }

    /// Queues a pull response.
    pub fn push_pull_response(&self, response: PullResponse) {
        self.pull_responses.lock().push_back(response);
    }

    /// Sets the acknowledgement returned by pushes.
    pub fn set_push_ack(&self, ack: PushAck) {
        *self.push_ack.lock() = ack;
    }

    /// Makes the next pull fail.
    pub fn fail_next_pull(&self, error: SyncError) {
        *self.pull_failure.lock() = Some(error);
    }

    /// Makes the next push fail.
    pub fn fail_next_push(&self, error: SyncError) {
        *self.push_failure.lock() = Some(error);
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Returns every pull request received.
    pub fn pull_requests(&self) -> Vec<PullRequest> {
        self.pull_requests.lock().clone()
    }

    /// Returns every push request received, failed ones included.
    pub fn pushed(&self) -> Vec<PushRequest> {
        self.pushed.lock().clone()
    }
}

impl RemoteGateway for MockGateway {
    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        self.pull_requests.lock().push(*request);
        if let Some(error) = self.pull_failure.lock().take() {
            return Err(error);
        }

        let mut responses = self.pull_responses.lock();
        let response = if responses.len() > 1 {
            responses.pop_front()
        } else {
            responses.front().cloned()
        };
        Ok(response.unwrap_or_else(|| PullResponse::new(request.last_pulled_version)))
    }

    fn push(&self, request: &PushRequest) -> SyncResult<PushAck> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        self.pushed.lock().push(request.clone());
        if let Some(error) = self.push_failure.lock().take() {
            return Err(error);
        }

        let mut ack = *self.push_ack.lock();
        if ack == PushAck::default() {
            ack.accepted = request.len();
        }
        Ok(ack)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
