use async_trait::async_trait;
use http::HeaderMap;
use std::time::Duration;

use super::{Transport, TransportError};
use crate::types::Content;
use crate::{CookieJar, ErrorKind, RequestSpec, Response, Result};

/// Default number of redirects before a request is deemed as failed, 5.
pub const DEFAULT_MAX_REDIRECTS: usize = 5;

// Not configurable by the user
/// A timeout for only the connect phase of a request
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// TCP keepalive
const TCP_KEEPALIVE: Duration = Duration::from_secs(60);

/// Settings shared by both underlying HTTP clients
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Default timeout per request, overridden by [`RequestSpec::timeout`]
    pub timeout: Option<Duration>,
    /// Redirects followed before a request fails
    pub max_redirects: usize,
    /// Accept invalid TLS certificates
    pub allow_insecure: bool,
    /// Headers sent with every request
    pub default_headers: HeaderMap,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            allow_insecure: false,
            default_headers: HeaderMap::new(),
        }
    }
}

/// [`Transport`] backed by `reqwest`.
///
/// Keeps two clients that share one cookie jar: one follows redirects, the
/// other hands 3xx responses back as they are. [`RequestSpec::follow_redirects`]
/// picks between them.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    following: reqwest::Client,
    direct: reqwest::Client,
}

impl ReqwestTransport {
    /// Create both clients
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::BuildClient`] if reqwest cannot create a client,
    /// e.g. because the TLS backend fails to initialize.
    pub fn new(options: &TransportOptions, cookie_jar: &CookieJar) -> Result<Self> {
        let builder = || {
            let builder = reqwest::ClientBuilder::new()
                .gzip(true)
                .default_headers(options.default_headers.clone())
                .danger_accept_invalid_certs(options.allow_insecure)
                .connect_timeout(CONNECT_TIMEOUT)
                .tcp_keepalive(TCP_KEEPALIVE)
                .cookie_provider(cookie_jar.provider());
            match options.timeout {
                Some(timeout) => builder.timeout(timeout),
                None => builder,
            }
        };

        let following = builder()
            .redirect(reqwest::redirect::Policy::limited(options.max_redirects))
            .build()
            .map_err(ErrorKind::BuildClient)?;
        let direct = builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(ErrorKind::BuildClient)?;

        Ok(Self { following, direct })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn call(&self, spec: &RequestSpec) -> std::result::Result<Response, TransportError> {
        // reqwest panics on URLs which `http` cannot represent
        if spec.url.as_str().parse::<http::Uri>().is_err() {
            return Err(TransportError::InvalidUrl(spec.url.clone()));
        }

        let client = if spec.follow_redirects {
            &self.following
        } else {
            &self.direct
        };

        let mut request = client
            .request(spec.method.clone(), spec.url.clone())
            .headers(spec.headers.clone());
        if let Some(body) = &spec.body {
            request = request.body(body.clone());
        }
        if let Some(timeout) = spec.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let data = response.bytes().await?;

        Ok(Response {
            content: Content::new(data, url.clone()),
            url,
            status,
            headers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use pretty_assertions::assert_eq;
    use test_utils::{mock_server, redirecting_mock_server, slow_mock_server};
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport() -> ReqwestTransport {
        ReqwestTransport::new(&TransportOptions::default(), &CookieJar::in_memory()).unwrap()
    }

    fn spec(url: &str) -> RequestSpec {
        RequestSpec::try_from(url).unwrap()
    }

    #[tokio::test]
    async fn test_status_and_body() {
        let server = mock_server!(StatusCode::NOT_FOUND, set_body_string("gone"));

        let response = transport().call(&spec(&server.uri())).await.unwrap();

        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.content.to_bytes().as_ref(), b"gone");
    }

    #[tokio::test]
    async fn test_follows_redirects_by_default() {
        let (_server, redirect_url, ok_url) = redirecting_mock_server!();

        let response = transport().call(&spec(redirect_url.as_str())).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.url, ok_url);
        assert_eq!(response.content.source(), &ok_url);
    }

    #[tokio::test]
    async fn test_redirects_can_be_disabled() {
        let (_server, redirect_url, ok_url) = redirecting_mock_server!();

        let request = spec(redirect_url.as_str()).follow_redirects(false);
        let response = transport().call(&request).await.unwrap();

        assert_eq!(response.status, StatusCode::FOUND);
        assert_eq!(response.url, redirect_url);
        assert_eq!(response.headers["location"], ok_url.as_str());
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let server = slow_mock_server!(Duration::from_millis(500));

        let request = spec(&server.uri()).timeout(Duration::from_millis(50));
        let error = transport().call(&request).await.unwrap_err();

        assert!(error.is_timeout());
    }

    #[tokio::test]
    async fn test_sends_method_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/submit"))
            .and(header("x-token", "secret"))
            .and(body_string("hello"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let request = spec(&format!("{}/submit", server.uri()))
            .method(http::Method::POST)
            .header("X-Token", "secret")
            .unwrap()
            .body("hello");
        let response = transport().call(&request).await.unwrap();

        assert_eq!(response.status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_default_headers_are_sent() {
        let server = MockServer::start().await;
        Mock::given(header("accept-language", "de"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut options = TransportOptions::default();
        options
            .default_headers
            .insert(http::header::ACCEPT_LANGUAGE, "de".parse().unwrap());
        let transport = ReqwestTransport::new(&options, &CookieJar::in_memory()).unwrap();

        let response = transport.call(&spec(&server.uri())).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cookies_are_stored_in_jar() {
        let server = mock_server!(
            StatusCode::OK,
            insert_header("Set-Cookie", "session=abc; Max-Age=3600")
        );
        let jar = CookieJar::in_memory();
        let transport = ReqwestTransport::new(&TransportOptions::default(), &jar).unwrap();

        transport.call(&spec(&server.uri())).await.unwrap();
        assert_eq!(jar.len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_a_network_error() {
        let error = transport()
            .call(&spec("http://127.0.0.1:9/"))
            .await
            .unwrap_err();
        assert!(matches!(error, TransportError::Network(_)));
    }
}
