use http::{HeaderMap, StatusCode};
use std::fmt::Display;
use url::Url;

use super::content::Content;

/// A completed HTTP exchange with its fully read body
#[derive(Debug, Clone)]
pub struct Response {
    /// The URL of the final response, after redirects
    pub url: Url,
    /// HTTP status of the final response
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// The response body
    pub content: Content,
}

impl Response {
    /// Whether the status is in the 2xx range
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Value of the `Content-Type` header, if present and readable
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }
}

impl Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {} ({} bytes)",
            self.status.as_u16(),
            self.url,
            self.content.len()
        )
    }
}
