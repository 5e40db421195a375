use thiserror::Error;

use crate::limiter::TicketId;

/// Errors that can occur when configuring the limiter or releasing tickets.
///
/// Apart from [`LimiterError::InvalidConfig`], all of these indicate a
/// programming error in the caller. They are never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LimiterError {
    /// A limit was zero
    #[error(
        "Invalid concurrency limits (global: {global_max}, per host: {per_host_max}); both must be at least 1"
    )]
    InvalidConfig {
        /// The rejected global limit
        global_max: usize,
        /// The rejected per-host limit
        per_host_max: usize,
    },

    /// The ticket was issued by a different limiter
    #[error("Ticket {0} was not issued by this limiter")]
    UnknownTicket(TicketId),

    /// `complete` was called on a ticket that was already released
    #[error("Ticket {0} was already released")]
    DoubleRelease(TicketId),

    /// `cancel` was called on a ticket that was already completed or cancelled
    #[error("Ticket {0} has already finished")]
    AlreadyFinished(TicketId),

    /// `complete` was called on a ticket that is still waiting in the queue
    #[error("Ticket {0} has not been admitted yet; cancel it instead")]
    NotAdmitted(TicketId),
}
