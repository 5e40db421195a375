use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::oneshot;

use super::limiter::Shared;
use crate::limiter::HostKey;

/// Opaque identifier of an [`AdmissionTicket`], unique per limiter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TicketId(pub(crate) u64);

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a ticket is in its admission lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketStatus {
    /// Waiting in the admission queue
    Pending,
    /// Admitted and holding a slot
    Ready,
    /// Completed or cancelled
    Finished,
}

/// The waiter of a ticket was told that it will never be admitted
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Ticket {0} was cancelled before it was admitted")]
pub struct Withdrawn(pub TicketId);

#[derive(Debug)]
enum Readiness {
    Ready,
    Waiting(oneshot::Receiver<()>),
    Withdrawn,
}

/// Handle to one request's position in the admission lifecycle.
///
/// A ticket is returned by [`ConcurrencyLimiter::submit`] and is either
/// ready right away or becomes ready once the limiter admits it; use
/// [`AdmissionTicket::ready`] to wait for that. Every ticket must be
/// finished exactly once with [`ConcurrencyLimiter::complete`] or
/// [`ConcurrencyLimiter::cancel`].
///
/// Dropping an unfinished ticket gives its slot (or its place in the queue)
/// back, so a ticket can never leak capacity, even when the task holding it
/// panics or is aborted.
///
/// [`ConcurrencyLimiter::submit`]: crate::limiter::ConcurrencyLimiter::submit
/// [`ConcurrencyLimiter::complete`]: crate::limiter::ConcurrencyLimiter::complete
/// [`ConcurrencyLimiter::cancel`]: crate::limiter::ConcurrencyLimiter::cancel
pub struct AdmissionTicket {
    id: TicketId,
    host: HostKey,
    submitted_at: Instant,
    admitted_immediately: bool,
    readiness: Readiness,
    pub(super) shared: Arc<Shared>,
}

impl AdmissionTicket {
    pub(super) fn new(
        id: TicketId,
        host: HostKey,
        waiter: Option<oneshot::Receiver<()>>,
        shared: Arc<Shared>,
    ) -> Self {
        let admitted_immediately = waiter.is_none();
        Self {
            id,
            host,
            submitted_at: Instant::now(),
            admitted_immediately,
            readiness: waiter.map_or(Readiness::Ready, Readiness::Waiting),
            shared,
        }
    }

    /// The ticket's id
    #[must_use]
    pub const fn id(&self) -> TicketId {
        self.id
    }

    /// The host this ticket counts against
    #[must_use]
    pub const fn host(&self) -> &HostKey {
        &self.host
    }

    /// When the ticket was submitted
    #[must_use]
    pub const fn submitted_at(&self) -> Instant {
        self.submitted_at
    }

    /// Whether `submit` admitted the ticket synchronously
    #[must_use]
    pub const fn admitted_immediately(&self) -> bool {
        self.admitted_immediately
    }

    /// Wait until the limiter admits this ticket.
    ///
    /// Returns immediately for tickets which were admitted on submission or
    /// which have already been woken. This future is cancel safe: dropping it
    /// keeps the ticket's place in the queue.
    ///
    /// # Errors
    ///
    /// Returns [`Withdrawn`] if the ticket was cancelled while it was still
    /// waiting.
    pub async fn ready(&mut self) -> Result<(), Withdrawn> {
        let woken = match &mut self.readiness {
            Readiness::Ready => return Ok(()),
            Readiness::Withdrawn => return Err(Withdrawn(self.id)),
            Readiness::Waiting(waiter) => waiter.await,
        };

        if woken.is_ok() {
            self.readiness = Readiness::Ready;
            Ok(())
        } else {
            self.readiness = Readiness::Withdrawn;
            Err(Withdrawn(self.id))
        }
    }
}

impl fmt::Debug for AdmissionTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionTicket")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("admitted_immediately", &self.admitted_immediately)
            .finish_non_exhaustive()
    }
}

impl Drop for AdmissionTicket {
    fn drop(&mut self) {
        self.shared.lock().abandon(self.id);
    }
}
