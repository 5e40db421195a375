use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use std::time::Duration;
use url::Url;

use crate::{ErrorKind, Result};

/// Payload of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// UTF-8 text, sent as is
    Text(String),
    /// Arbitrary bytes
    Bytes(Bytes),
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes.into())
    }
}

impl From<Body> for reqwest::Body {
    fn from(body: Body) -> Self {
        match body {
            Body::Text(text) => text.into(),
            Body::Bytes(bytes) => bytes.into(),
        }
    }
}

/// Everything needed to send one HTTP request
#[derive(Debug, Clone)]
pub struct RequestSpec {
    /// Where the request goes
    pub url: Url,

    /// HTTP method, `GET` by default
    pub method: Method,

    /// Headers sent in addition to the client's defaults.
    /// A `User-Agent` set here wins over the client's user agent.
    pub headers: HeaderMap,

    /// Optional request body
    pub body: Option<Body>,

    /// Timeout of the whole request, from admission to the last body byte.
    /// Falls back to the client's timeout if unset.
    pub timeout: Option<Duration>,

    /// Whether redirects are followed by the transport
    pub follow_redirects: bool,
}

impl RequestSpec {
    /// A `GET` request to `url` with no extra headers
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
            follow_redirects: true,
        }
    }

    /// Parse `url` and create a `GET` request for it
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::EmptyUrl`] for an empty or blank string and
    /// [`ErrorKind::ParseUrl`] if the string is not a valid URL.
    pub fn parse(url: &str) -> Result<Self> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ErrorKind::EmptyUrl);
        }
        let url = Url::parse(url).map_err(|e| ErrorKind::ParseUrl(url.to_string(), e))?;
        Ok(Self::new(url))
    }

    /// Use a different HTTP method
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Add a header, replacing earlier values with the same name
    ///
    /// # Errors
    ///
    /// Returns an error if the name or the value is not a valid header.
    pub fn header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())?;
        let value = HeaderValue::from_str(value)?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Attach a body
    #[must_use]
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set a timeout for this request only
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Turn redirect following on or off
    #[must_use]
    pub const fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }
}

impl From<Url> for RequestSpec {
    fn from(url: Url) -> Self {
        Self::new(url)
    }
}

impl TryFrom<&str> for RequestSpec {
    type Error = ErrorKind;

    fn try_from(url: &str) -> Result<Self> {
        Self::parse(url)
    }
}

impl TryFrom<String> for RequestSpec {
    type Error = ErrorKind;

    fn try_from(url: String) -> Result<Self> {
        Self::parse(&url)
    }
}

impl TryFrom<&String> for RequestSpec {
    type Error = ErrorKind;

    fn try_from(url: &String) -> Result<Self> {
        Self::parse(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("")]
    #[case("   ")]
    fn test_empty_url_is_rejected(#[case] input: &str) {
        assert_eq!(RequestSpec::parse(input).unwrap_err(), ErrorKind::EmptyUrl);
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let error = RequestSpec::try_from("not a url").unwrap_err();
        assert!(matches!(error, ErrorKind::ParseUrl(input, _) if input == "not a url"));
    }

    #[test]
    fn test_defaults() {
        let spec = RequestSpec::try_from("https://example.com/a").unwrap();
        assert_eq!(spec.method, Method::GET);
        assert!(spec.headers.is_empty());
        assert!(spec.body.is_none());
        assert!(spec.timeout.is_none());
        assert!(spec.follow_redirects);
    }

    #[test]
    fn test_chained_options() {
        let spec = RequestSpec::try_from("https://example.com/upload")
            .unwrap()
            .method(Method::POST)
            .header("X-Token", "abc")
            .unwrap()
            .body("payload")
            .timeout(Duration::from_secs(3))
            .follow_redirects(false);

        assert_eq!(spec.method, Method::POST);
        assert_eq!(spec.headers["x-token"], "abc");
        assert_eq!(spec.body, Some(Body::Text("payload".into())));
        assert_eq!(spec.timeout, Some(Duration::from_secs(3)));
        assert!(!spec.follow_redirects);
    }

    #[test]
    fn test_invalid_header_name() {
        let result = RequestSpec::try_from("https://example.com")
            .unwrap()
            .header("bad header", "x");
        assert!(matches!(result, Err(ErrorKind::InvalidHeaderName(_))));
    }
}
