//! Global and per-host concurrency limiting for outgoing requests.
//!
//! Requests are admitted when both the global cap and the cap of their host
//! leave room. Everything else waits in a single FIFO queue. Whenever a slot
//! frees up, the queue is scanned from the head and every entry that fits is
//! admitted; an entry for a saturated host is skipped without losing its
//! position.
//!
//! # Architecture
//!
//! - [`HostKey`]: Identifies a host, see [`HostKeyPolicy`]
//! - [`Limits`]: The validated global and per-host caps
//! - [`ConcurrencyLimiter`]: Admission decisions, `submit`/`complete`/`cancel`
//! - [`AdmissionTicket`]: One request's place in the admission lifecycle
//! - [`HostStats`]: Outcome statistics for each host

#![allow(clippy::module_inception)]

mod config;
mod error;
mod host;
mod limiter;
mod queue;
mod ticket;

pub use config::{DEFAULT_HOST_CONCURRENCY, DEFAULT_MAX_CONCURRENCY, LimiterConfig, Limits};
pub use error::LimiterError;
pub use host::{HostKey, HostKeyPolicy, HostLoad, HostStats, HostStatsMap};
pub use limiter::{Cancellation, ConcurrencyLimiter, LimiterSnapshot};
pub use ticket::{AdmissionTicket, TicketId, TicketStatus, Withdrawn};
