//! Handler of HTTP requests.
//!
//! This module defines two structs, [`Client`] and [`ClientBuilder`].
//! `Client` sends requests through the concurrency limiter and decodes their
//! responses. `ClientBuilder` exposes a finer level of granularity for
//! building a `Client`.
//!
//! For convenience, a free function [`request`] is provided for ad-hoc
//! requests.
#![allow(clippy::module_name_repetitions)]

use http::header::{self, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use typed_builder::TypedBuilder;

use crate::executor::{CancellationToken, Outcome, RequestExecutor};
use crate::limiter::{
    ConcurrencyLimiter, DEFAULT_HOST_CONCURRENCY, DEFAULT_MAX_CONCURRENCY, HostKeyPolicy,
    HostStatsMap, Limits,
};
use crate::transport::{DEFAULT_MAX_REDIRECTS, ReqwestTransport, Transport, TransportOptions};
use crate::types::{Image, ResponseEncoding};
use crate::{CookieJar, ErrorKind, RequestSpec, Response, Result};

/// Default user agent, `hostgate/<PKG_VERSION>`.
pub const DEFAULT_USER_AGENT: &str = concat!("hostgate/", env!("CARGO_PKG_VERSION"));

/// Builder for [`Client`].
///
/// See crate-level documentation for usage example.
#[derive(TypedBuilder, Debug, Clone)]
#[builder(field_defaults(default, setter(into)))]
#[builder(builder_method(doc = "
Create a builder for building `ClientBuilder`.

On the builder call, call methods with same name as its fields to set their values.

Finally, call `.build()` to create the instance of `ClientBuilder`.
"))]
pub struct ClientBuilder {
    /// Maximum number of requests in flight across all hosts
    #[builder(default = DEFAULT_MAX_CONCURRENCY)]
    max_concurrency: usize,

    /// Maximum number of requests in flight to a single host
    #[builder(default = DEFAULT_HOST_CONCURRENCY)]
    host_concurrency: usize,

    /// How requests are grouped into hosts for the per-host limit
    host_key_policy: HostKeyPolicy,

    /// User agent sent with every request that does not set its own.
    /// Can be changed later with [`Client::set_user_agent`].
    #[builder(default_code = "String::from(DEFAULT_USER_AGENT)")]
    user_agent: String,

    /// Headers added to every request which does not set them itself
    custom_headers: HeaderMap,

    /// Default timeout per request
    timeout: Option<Duration>,

    /// Maximum number of redirects per request before returning an error
    #[builder(default = DEFAULT_MAX_REDIRECTS)]
    max_redirects: usize,

    /// When `true`, accept invalid TLS certificates.
    ///
    /// ## Warning
    ///
    /// If invalid certificates are trusted, any certificate for any site
    /// will be trusted for use, including expired certificates.
    allow_insecure: bool,

    /// Cookie jar shared by all requests. An empty in-memory jar is used if
    /// none is given.
    cookie_jar: Option<CookieJar>,

    /// Transport replacing the default reqwest-based one.
    /// `timeout`, `max_redirects`, `allow_insecure` and `cookie_jar` only
    /// configure the default transport.
    transport: Option<Arc<dyn Transport>>,
}

impl Default for ClientBuilder {
    #[must_use]
    #[inline]
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ClientBuilder {
    /// Instantiates a [`Client`].
    ///
    /// # Errors
    ///
    /// Returns an `Err` if:
    /// - Either concurrency limit is zero.
    /// - The user agent is not a valid header value.
    /// - The request client cannot be created.
    ///   See [here](https://docs.rs/reqwest/latest/reqwest/struct.ClientBuilder.html#errors).
    pub fn client(self) -> Result<Client> {
        let Self {
            max_concurrency,
            host_concurrency,
            host_key_policy,
            user_agent,
            custom_headers,
            timeout,
            max_redirects,
            allow_insecure,
            cookie_jar,
            transport,
        } = self;

        let limits = Limits::new(max_concurrency, host_concurrency)?;
        let user_agent = HeaderValue::from_str(&user_agent)?;
        let cookie_jar = cookie_jar.unwrap_or_default();

        let transport: Arc<dyn Transport> = match transport {
            Some(transport) => transport,
            None => {
                let options = TransportOptions {
                    timeout,
                    max_redirects,
                    allow_insecure,
                    default_headers: HeaderMap::new(),
                };
                Arc::new(ReqwestTransport::new(&options, &cookie_jar)?)
            }
        };

        let executor =
            RequestExecutor::new(ConcurrencyLimiter::new(limits), transport, host_key_policy);

        Ok(Client {
            executor,
            user_agent: Arc::new(RwLock::new(user_agent)),
            custom_headers: Arc::new(custom_headers),
            cookie_jar,
        })
    }
}

/// Sends requests under global and per-host concurrency limits.
///
/// Cheap to clone; clones share the limiter, the cookie jar, the user agent
/// and the host statistics.
///
/// See [`ClientBuilder`] which contains sane defaults for all configuration options.
#[derive(Debug, Clone)]
pub struct Client {
    executor: RequestExecutor,
    user_agent: Arc<RwLock<HeaderValue>>,
    custom_headers: Arc<HeaderMap>,
    cookie_jar: CookieJar,
}

impl Client {
    /// Send a request and wait for its response.
    ///
    /// Any HTTP status counts as a response; only failures without a
    /// response are errors.
    ///
    /// # Errors
    ///
    /// Returns an `Err` if:
    /// - The request cannot be parsed (e.g. an empty URL), see [`RequestSpec::parse`].
    /// - The URL has no host.
    /// - The transport fails ([`ErrorKind::Transport`]).
    pub async fn request<T, E>(&self, spec: T) -> Result<Response>
    where
        RequestSpec: TryFrom<T, Error = E>,
        ErrorKind: From<E>,
    {
        self.request_cancellable(spec, &CancellationToken::new()).await
    }

    /// Like [`Client::request`], but gives up once `cancel` is cancelled
    ///
    /// # Errors
    ///
    /// See [`Client::request`]. Cancelled requests fail with [`ErrorKind::Cancelled`].
    pub async fn request_cancellable<T, E>(
        &self,
        spec: T,
        cancel: &CancellationToken,
    ) -> Result<Response>
    where
        RequestSpec: TryFrom<T, Error = E>,
        ErrorKind: From<E>,
    {
        let spec = self.prepare(spec.try_into()?);
        match self.executor.execute_cancellable(&spec, cancel).await? {
            Outcome::Success(response) => Ok(response),
            Outcome::TransportError(error) => Err(ErrorKind::Transport(error)),
            Outcome::Cancelled => Err(ErrorKind::Cancelled),
        }
    }

    /// Fetch the response body as text
    ///
    /// # Errors
    ///
    /// See [`Client::request`].
    pub async fn get_string<T, E>(&self, spec: T, encoding: ResponseEncoding) -> Result<String>
    where
        RequestSpec: TryFrom<T, Error = E>,
        ErrorKind: From<E>,
    {
        let response = self.request(spec).await?;
        Ok(response.content.to_string(encoding))
    }

    /// Fetch the response body and parse it as JSON (or JSONP)
    ///
    /// # Errors
    ///
    /// See [`Client::request`]; additionally fails with [`ErrorKind::Json`].
    pub async fn get_json<D, T, E>(&self, spec: T, encoding: ResponseEncoding) -> Result<D>
    where
        D: DeserializeOwned,
        RequestSpec: TryFrom<T, Error = E>,
        ErrorKind: From<E>,
    {
        let response = self.request(spec).await?;
        response.content.to_json(encoding)
    }

    /// Fetch the raw response body
    ///
    /// # Errors
    ///
    /// See [`Client::request`].
    pub async fn get_binary<T, E>(&self, spec: T) -> Result<bytes::Bytes>
    where
        RequestSpec: TryFrom<T, Error = E>,
        ErrorKind: From<E>,
    {
        let response = self.request(spec).await?;
        Ok(response.content.to_bytes())
    }

    /// Fetch an image
    ///
    /// # Errors
    ///
    /// See [`Client::request`]; additionally fails with [`ErrorKind::NotAnImage`].
    pub async fn get_image<T, E>(&self, spec: T) -> Result<Image>
    where
        RequestSpec: TryFrom<T, Error = E>,
        ErrorKind: From<E>,
    {
        let response = self.request(spec).await?;
        response.content.to_image()
    }

    /// Download the response body into a file and return its path.
    ///
    /// Without `destination`, the file is named after the last URL path
    /// segment and stored in the current directory.
    ///
    /// # Errors
    ///
    /// See [`Client::request`]; additionally fails with [`ErrorKind::IoError`].
    pub async fn get_file<T, E>(&self, spec: T, destination: Option<&Path>) -> Result<PathBuf>
    where
        RequestSpec: TryFrom<T, Error = E>,
        ErrorKind: From<E>,
    {
        let response = self.request(spec).await?;
        response.content.to_file(destination).await
    }

    /// Change the user agent of all subsequent requests, including those
    /// made through clones of this client
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidHeader`] if `user_agent` is not a valid
    /// header value; the previous user agent stays in place.
    pub fn set_user_agent(&self, user_agent: &str) -> Result<()> {
        let value = HeaderValue::from_str(user_agent)?;
        *self.user_agent.write().unwrap_or_else(PoisonError::into_inner) = value;
        Ok(())
    }

    /// Remove all cookies from the shared jar
    pub fn clear_cookies(&self) {
        self.cookie_jar.clear();
    }

    /// Change the concurrency limits, see [`ConcurrencyLimiter::configure`]
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Limiter`] if either limit is zero.
    pub fn set_concurrency_limits(&self, global_max: usize, per_host_max: usize) -> Result<()> {
        Ok(self.limiter().configure(global_max, per_host_max)?)
    }

    /// The limiter shared by all requests of this client
    #[must_use]
    pub const fn limiter(&self) -> &ConcurrencyLimiter {
        self.executor.limiter()
    }

    /// The cookie jar shared by all requests of this client
    #[must_use]
    pub const fn cookie_jar(&self) -> &CookieJar {
        &self.cookie_jar
    }

    /// Per-host statistics of the requests made so far
    #[must_use]
    pub fn host_stats(&self) -> HostStatsMap {
        self.executor.host_stats()
    }

    /// Forget the per-host statistics collected so far.
    ///
    /// Statistics are kept for every host ever contacted, so clients that run
    /// for a long time against many hosts should call this periodically.
    pub fn reset_host_stats(&self) {
        self.executor.reset_host_stats();
    }

    /// Fill in the client-wide headers the request does not set itself
    fn prepare(&self, mut spec: RequestSpec) -> RequestSpec {
        for (name, value) in self.custom_headers.iter() {
            if !spec.headers.contains_key(name) {
                spec.headers.insert(name.clone(), value.clone());
            }
        }
        if !spec.headers.contains_key(header::USER_AGENT) {
            let user_agent = self
                .user_agent
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            spec.headers.insert(header::USER_AGENT, user_agent);
        }
        spec
    }
}

/// A convenience function to send a single request.
///
/// This provides the simplest request utility without having to create a
/// [`Client`]. For more complex scenarios, see documentation of
/// [`ClientBuilder`] instead.
///
/// # Errors
///
/// Returns an `Err` if:
/// - The request client cannot be built (see [`ClientBuilder::client`] for failure cases).
/// - The request fails (see [`Client::request`] for failure cases).
pub async fn request<T, E>(spec: T) -> Result<Response>
where
    RequestSpec: TryFrom<T, Error = E>,
    ErrorKind: From<E>,
{
    let client = ClientBuilder::builder().build().client()?;
    client.request(spec).await
}
