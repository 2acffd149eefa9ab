//! Single-flight session renewal
//!
//! When a request fails because the session expired, the first failure starts
//! a renewal exchange and every failure that arrives while it runs is queued
//! behind it. Once the exchange settles the queue is drained: on success each
//! request is replayed once by its own caller, on failure each one gets the
//! renewal error and the host is told the session is gone.
//!
//! ```text
//!   Idle --first auth failure--> Refreshing --renewal settles--> Idle
//! ```

use super::error::{ClientError, RenewalError};
use super::renewal::TokenRenewer;
use super::session::{NoopSessionListener, SessionListener};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;

/// Default upper bound for one renewal exchange
pub const DEFAULT_RENEWAL_TIMEOUT: Duration = Duration::from_secs(30);

/// A deferred request that may be replayed once after renewal
///
/// Replaying consumes the request, so it can never run a third time. A
/// request built with [`RetryableRequest::already_retried`] is not replayed at
/// all.
pub struct RetryableRequest<F> {
    send: F,
    retried: bool,
}

impl<F> RetryableRequest<F> {
    /// Wrap a request that has not been retried yet
    pub fn new(send: F) -> Self {
        Self {
            send,
            retried: false,
        }
    }

    /// Wrap a request that is itself a replay
    pub fn already_retried(send: F) -> Self {
        Self {
            send,
            retried: true,
        }
    }

    /// Whether this request has already been replayed once
    pub fn is_retried(&self) -> bool {
        self.retried
    }
}

impl<F, Fut, T> RetryableRequest<F>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    async fn replay(self) -> Result<T, ClientError> {
        (self.send)().await
    }
}

/// A request parked behind the in-flight renewal
struct PendingRequest {
    id: u64,
    resolve: oneshot::Sender<Result<(), RenewalError>>,
}

#[derive(Default)]
struct RefreshState {
    refreshing: bool,
    queue: VecDeque<PendingRequest>,
    next_id: u64,
}

enum Role<'a> {
    Leader(WaveGuard<'a>),
    Follower(u64, oneshot::Receiver<Result<(), RenewalError>>),
}

/// Settles the wave if the leader is dropped mid-renewal
struct WaveGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl WaveGuard<'_> {
    fn settle(mut self, outcome: &Result<(), RenewalError>) -> usize {
        self.settled = true;
        self.coordinator.settle(outcome)
    }
}

impl Drop for WaveGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("Session renewal dropped before completion; failing queued requests");
            self.coordinator.settle(&Err(RenewalError::Abandoned));
        }
    }
}

/// Coordinates session renewal across concurrent requests
///
/// One coordinator guards one session. Share it through an `Arc` between
/// every client that uses the same credentials.
pub struct RefreshCoordinator {
    renewer: Arc<dyn TokenRenewer>,
    listener: Arc<dyn SessionListener>,
    renewal_timeout: Duration,
    state: Mutex<RefreshState>,
    renewals: AtomicU64,
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("RefreshCoordinator")
            .field("refreshing", &state.refreshing)
            .field("queued", &state.queue.len())
            .field("renewal_timeout", &self.renewal_timeout)
            .field("renewals", &self.renewal_count())
            .finish_non_exhaustive()
    }
}

impl RefreshCoordinator {
    /// Create a coordinator that renews through `renewer`
    pub fn new(renewer: Arc<dyn TokenRenewer>) -> Self {
        Self {
            renewer,
            listener: Arc::new(NoopSessionListener),
            renewal_timeout: DEFAULT_RENEWAL_TIMEOUT,
            state: Mutex::new(RefreshState::default()),
            renewals: AtomicU64::new(0),
        }
    }

    /// Notify `listener` whenever a renewal wave fails
    #[must_use]
    pub fn with_session_listener(mut self, listener: Arc<dyn SessionListener>) -> Self {
        self.listener = listener;
        self
    }

    /// Bound every renewal exchange by `timeout`
    #[must_use]
    pub fn with_renewal_timeout(mut self, timeout: Duration) -> Self {
        self.renewal_timeout = timeout;
        self
    }

    /// Whether a renewal exchange is in flight
    pub fn is_refreshing(&self) -> bool {
        self.state().refreshing
    }

    /// Number of requests waiting on the in-flight renewal
    pub fn queued(&self) -> usize {
        self.state().queue.len()
    }

    /// Renewal exchanges started since creation
    pub fn renewal_count(&self) -> u64 {
        self.renewals.load(Ordering::Relaxed)
    }

    /// Run `send`, renewing the session and replaying once on auth failure
    ///
    /// # Errors
    ///
    /// Returns the request's own error, or `ClientError::RenewalFailed` when
    /// the session could not be renewed
    pub async fn execute<F, Fut, T>(&self, mut send: F) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        match send().await {
            Ok(value) => Ok(value),
            Err(error) => {
                self.on_request_failure(RetryableRequest::new(send), error)
                    .await
            }
        }
    }

    /// Handle a failed request
    ///
    /// Errors other than an expired session, and requests that were already
    /// replayed, are returned unchanged. Otherwise the request joins the
    /// current renewal wave (starting one if none is running) and is replayed
    /// once if the renewal succeeds.
    ///
    /// # Errors
    ///
    /// Returns the original error when it is passed through, the replay's own
    /// error, or `ClientError::RenewalFailed` when renewal fails
    pub async fn on_request_failure<F, Fut, T>(
        &self,
        request: RetryableRequest<F>,
        error: ClientError,
    ) -> Result<T, ClientError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        if !error.is_auth_expired() {
            return Err(error);
        }
        if request.is_retried() {
            debug!("Replayed request failed authentication again; not retrying");
            return Err(error);
        }

        self.renew_session().await?;
        request.replay().await
    }

    /// Join the current renewal wave, or start one
    ///
    /// Resolves when the wave settles. The session listener is notified once
    /// per failed wave, by the caller that ran the exchange.
    ///
    /// # Errors
    ///
    /// Returns the wave's renewal error
    pub async fn renew_session(&self) -> Result<(), RenewalError> {
        match self.join_wave() {
            Role::Leader(wave) => {
                let outcome = self.renew().await;
                let drained = wave.settle(&outcome);
                match &outcome {
                    Ok(()) => info!(queued = drained, "Session renewed"),
                    Err(err) => {
                        warn!(queued = drained, "Session renewal failed: {err}");
                        self.listener.on_session_expired(err);
                    }
                }
                outcome
            }
            Role::Follower(id, waiter) => {
                trace!(request = id, "Waiting for in-flight session renewal");
                waiter.await.unwrap_or(Err(RenewalError::Abandoned))
            }
        }
    }

    fn join_wave(&self) -> Role<'_> {
        let mut state = self.state();
        if state.refreshing {
            let (resolve, waiter) = oneshot::channel();
            let id = state.next_id;
            state.next_id += 1;
            state.queue.push_back(PendingRequest { id, resolve });
            debug!(request = id, queued = state.queue.len(), "Queued behind session renewal");
            Role::Follower(id, waiter)
        } else {
            state.refreshing = true;
            debug!("Starting session renewal");
            Role::Leader(WaveGuard {
                coordinator: self,
                settled: false,
            })
        }
    }

    async fn renew(&self) -> Result<(), RenewalError> {
        self.renewals.fetch_add(1, Ordering::Relaxed);
        match tokio::time::timeout(self.renewal_timeout, self.renewer.renew()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(RenewalError::Timeout(self.renewal_timeout)),
        }
    }

    /// Return to idle and resolve everything queued in this wave
    fn settle(&self, outcome: &Result<(), RenewalError>) -> usize {
        let queue = {
            let mut state = self.state();
            state.refreshing = false;
            std::mem::take(&mut state.queue)
        };

        let drained = queue.len();
        for pending in queue {
            if pending.resolve.send(outcome.clone()).is_err() {
                trace!(request = pending.id, "Queued request went away before renewal settled");
            }
        }
        drained
    }

    fn state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
