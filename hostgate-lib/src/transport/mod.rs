//! The seam between the request executor and the network.
//!
//! [`Transport`] performs a single HTTP exchange and knows nothing about
//! concurrency limits. [`ReqwestTransport`] is the default implementation;
//! tests and embedders can inject their own.

use async_trait::async_trait;
use std::fmt::Debug;
use thiserror::Error;
use url::Url;

use crate::{RequestSpec, Response};

mod native;

pub use native::{DEFAULT_MAX_REDIRECTS, ReqwestTransport, TransportOptions};

/// A failed exchange, i.e. one that produced no response
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    /// Connection, TLS, timeout, redirect or body errors reported by reqwest
    #[error("{0}")]
    Network(#[from] reqwest::Error),

    /// The URL can not be sent by the HTTP client
    #[error("URL cannot be requested: {0}")]
    InvalidUrl(Url),

    /// The transport panicked while handling the request
    #[error("Transport panicked: {0}")]
    Panicked(String),

    /// Errors of custom transports
    #[error("{0}")]
    Custom(String),
}

impl TransportError {
    /// Whether the request ran into a timeout
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Network(e) if e.is_timeout())
    }
}

/// Performs one HTTP exchange.
///
/// Implementations must be safe to call from many tasks at once. Timeouts
/// are the transport's responsibility; the caller never imposes one.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Send `spec` and read the whole response body
    async fn call(&self, spec: &RequestSpec) -> Result<Response, TransportError>;
}
