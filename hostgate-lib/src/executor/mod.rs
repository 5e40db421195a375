//! Runs requests through the [`ConcurrencyLimiter`].
//!
//! [`RequestExecutor::execute`] obtains an admission ticket, waits until it is
//! ready, performs the transport call outside of any lock and then releases
//! the ticket exactly once, however the call ends.

use dashmap::DashMap;
use futures::FutureExt;
use log::{debug, warn};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use crate::limiter::{
    AdmissionTicket, ConcurrencyLimiter, HostKey, HostKeyPolicy, HostStats, HostStatsMap,
};
use crate::transport::{Transport, TransportError};
use crate::{RequestSpec, Response, Result};

pub use tokio_util::sync::CancellationToken;

/// How an executed request ended
#[derive(Debug)]
pub enum Outcome {
    /// The transport returned a response, whatever its status
    Success(Response),
    /// The transport failed; the error is passed through unchanged
    TransportError(TransportError),
    /// The request was cancelled while queued or in flight
    Cancelled,
}

impl Outcome {
    /// The response, if there is one
    #[must_use]
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::Success(response) => Some(response),
            _ => None,
        }
    }

    /// Whether the request was cancelled
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// How waiting for admission ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Admitted,
    /// The caller's token was cancelled; the ticket was cancelled here
    Cancelled,
    /// The ticket was cancelled through the limiter by someone else
    Withdrawn,
}

/// Executes requests under the limits of a shared [`ConcurrencyLimiter`].
///
/// Statistics are kept for every host contacted since creation or the last
/// [`RequestExecutor::reset_host_stats`]. A long-lived executor talking to an
/// open-ended set of hosts should reset them now and then.
#[derive(Debug, Clone)]
pub struct RequestExecutor {
    limiter: ConcurrencyLimiter,
    transport: Arc<dyn Transport>,
    host_key_policy: HostKeyPolicy,
    stats: Arc<DashMap<HostKey, HostStats>>,
}

impl RequestExecutor {
    /// Create an executor sending requests through `transport`
    #[must_use]
    pub fn new(
        limiter: ConcurrencyLimiter,
        transport: Arc<dyn Transport>,
        host_key_policy: HostKeyPolicy,
    ) -> Self {
        Self {
            limiter,
            transport,
            host_key_policy,
            stats: Arc::new(DashMap::new()),
        }
    }

    /// The limiter deciding admission
    #[must_use]
    pub const fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    /// Send a request once the limiter admits it.
    ///
    /// Dropping the returned future at any point gives the request's slot or
    /// queue position back.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidUrlHost`] if no host can be derived from
    /// the URL; the request is never submitted in that case. Failures of the
    /// request itself are reported through [`Outcome`].
    ///
    /// [`ErrorKind::InvalidUrlHost`]: crate::ErrorKind::InvalidUrlHost
    pub async fn execute(&self, spec: &RequestSpec) -> Result<Outcome> {
        self.execute_cancellable(spec, &CancellationToken::new()).await
    }

    /// Like [`RequestExecutor::execute`], but gives up as soon as `cancel` is
    /// cancelled, while queued or in flight.
    ///
    /// # Errors
    ///
    /// See [`RequestExecutor::execute`].
    pub async fn execute_cancellable(
        &self,
        spec: &RequestSpec,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        let host = HostKey::from_url(&spec.url, self.host_key_policy)?;
        if cancel.is_cancelled() {
            self.record(&host, HostStats::record_cancelled);
            return Ok(Outcome::Cancelled);
        }

        let mut ticket = self.limiter.submit(host.clone());
        if self.admit(&mut ticket, cancel).await != Admission::Admitted {
            debug!("Request to {} cancelled while queued", spec.url);
            self.record(&host, HostStats::record_cancelled);
            return Ok(Outcome::Cancelled);
        }

        let waited = ticket.submitted_at().elapsed();
        self.record(&host, |stats| stats.record_admission_wait(waited));

        let started = Instant::now();
        let call = AssertUnwindSafe(self.transport.call(spec)).catch_unwind();
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            result = call => Some(result),
        };
        let elapsed = started.elapsed();

        let outcome = match result {
            None => {
                debug!("Request to {} cancelled in flight", spec.url);
                self.cancel(&ticket);
                self.record(&host, HostStats::record_cancelled);
                return Ok(Outcome::Cancelled);
            }
            Some(Ok(Ok(response))) => {
                let status = response.status.as_u16();
                self.record(&host, |stats| stats.record_response(status, elapsed));
                Outcome::Success(response)
            }
            Some(Ok(Err(error))) => {
                debug!("Request to {} failed: {error}", spec.url);
                self.record(&host, |stats| stats.record_transport_error(elapsed));
                Outcome::TransportError(error)
            }
            Some(Err(panic)) => {
                let message = panic_message(panic.as_ref());
                warn!("Transport panicked on {}: {message}", spec.url);
                self.record(&host, |stats| stats.record_transport_error(elapsed));
                Outcome::TransportError(TransportError::Panicked(message))
            }
        };

        self.complete(&ticket);
        Ok(outcome)
    }

    /// Statistics of every host contacted so far
    #[must_use]
    pub fn host_stats(&self) -> HostStatsMap {
        self.stats
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect::<std::collections::HashMap<_, _>>()
            .into()
    }

    /// Forget the statistics of all hosts
    pub fn reset_host_stats(&self) {
        self.stats.clear();
    }

    async fn admit(&self, ticket: &mut AdmissionTicket, cancel: &CancellationToken) -> Admission {
        let ready = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            ready = ticket.ready() => Some(ready),
        };
        match ready {
            Some(Ok(())) => Admission::Admitted,
            Some(Err(withdrawn)) => {
                debug!("{} was withdrawn from the queue", withdrawn.0);
                Admission::Withdrawn
            }
            None => {
                self.cancel(ticket);
                Admission::Cancelled
            }
        }
    }

    fn record(&self, host: &HostKey, update: impl FnOnce(&mut HostStats)) {
        let mut stats = self.stats.entry(host.clone()).or_default();
        update(stats.value_mut());
    }

    fn complete(&self, ticket: &AdmissionTicket) {
        if let Err(e) = self.limiter.complete(ticket) {
            warn!("Failed to release {}: {e}", ticket.id());
        }
    }

    fn cancel(&self, ticket: &AdmissionTicket) {
        if let Err(e) = self.limiter.cancel(ticket) {
            warn!("Failed to cancel {}: {e}", ticket.id());
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
