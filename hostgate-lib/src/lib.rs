//! `hostgate` is an async HTTP request library which caps how many requests
//! are in flight, both in total and per host.
//!
//! "Hello world" example:
//! ```no_run
//! use hostgate_lib::Result;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!   let response = hostgate_lib::request("https://example.com").await?;
//!   println!("{response}");
//!   Ok(())
//! }
//! ```
//!
//! For more specific use-cases you can build a client yourself, using the
//! `ClientBuilder`, which can be used to configure the limits, the user agent
//! and the cookie jar:
//!
//! ```no_run
//! use hostgate_lib::{ClientBuilder, ResponseEncoding, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!   let client = ClientBuilder::builder()
//!       .max_concurrency(20_usize)
//!       .host_concurrency(2_usize)
//!       .build()
//!       .client()?;
//!   client.set_user_agent("my-app/1.0")?;
//!   let text = client.get_string("https://example.com", ResponseEncoding::Utf8).await?;
//!   println!("{text}");
//!   Ok(())
//! }
//! ```
#![warn(clippy::all, clippy::pedantic)]
#![warn(missing_docs, missing_debug_implementations)]

mod client;
mod types;
mod utils;

pub mod executor;
pub mod limiter;
pub mod transport;

pub use crate::{
    client::{Client, ClientBuilder, DEFAULT_USER_AGENT, request},
    executor::{CancellationToken, Outcome, RequestExecutor},
    limiter::{ConcurrencyLimiter, HostKey, HostKeyPolicy, Limits},
    transport::{ReqwestTransport, Transport, TransportError},
    types::*,
};
