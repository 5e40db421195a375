use serde::{Serialize, Serializer};
use std::path::PathBuf;
use std::{convert::Infallible, hash::Hash};
use thiserror::Error;

use crate::limiter::LimiterError;
use crate::transport::TransportError;

/// Possible errors when interacting with `hostgate_lib`
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Any form of I/O error, along with the path it happened on, if any
    #[error("I/O error on `{}`: {}", match .0 {
        Some(p) => p.to_str().unwrap_or("<MALFORMED PATH>"),
        None => "<unknown path>",
    }, .1)]
    IoError(Option<PathBuf>, std::io::Error),

    /// The request was sent, but failed without a response
    #[error("Request failed: {0}")]
    Transport(#[from] TransportError),

    /// The limiter rejected a configuration or a ticket
    #[error(transparent)]
    Limiter(#[from] LimiterError),

    /// The request was cancelled before it finished
    #[error("Request was cancelled")]
    Cancelled,

    /// A request was made with an empty URL
    #[error("URL must not be empty")]
    EmptyUrl,

    /// The given string can not be parsed into a valid URL
    #[error("Cannot parse `{0}` as URL: {1}")]
    ParseUrl(String, url::ParseError),

    /// An URL with an invalid host was found
    #[error("URL is missing a host")]
    InvalidUrlHost,

    /// The given header value could not be parsed
    #[error("Header value could not be parsed")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),

    /// The given header name could not be parsed
    #[error("Header name could not be parsed")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// The given HTTP method is not valid
    #[error("Invalid HTTP method")]
    InvalidMethod(#[from] http::method::InvalidMethod),

    /// The response body is not valid JSON
    #[error("Response body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The response body is not a supported image format
    #[error("Response body is not a supported image")]
    NotAnImage,

    /// Loading or saving the cookie jar failed
    #[error("Cookie jar error: {0}")]
    Cookies(String),

    /// The underlying HTTP client could not be created
    #[error("Failed to create HTTP client: {0}")]
    BuildClient(#[source] reqwest::Error),
}

impl PartialEq for ErrorKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::IoError(p1, e1), Self::IoError(p2, e2)) => p1 == p2 && e1.kind() == e2.kind(),
            (Self::Transport(e1), Self::Transport(e2)) => e1.to_string() == e2.to_string(),
            (Self::Limiter(e1), Self::Limiter(e2)) => e1 == e2,
            (Self::ParseUrl(s1, e1), Self::ParseUrl(s2, e2)) => s1 == s2 && e1 == e2,
            (Self::Cookies(s1), Self::Cookies(s2)) => s1 == s2,
            (Self::Json(e1), Self::Json(e2)) => e1.to_string() == e2.to_string(),
            (Self::BuildClient(e1), Self::BuildClient(e2)) => e1.to_string() == e2.to_string(),
            (Self::Cancelled, Self::Cancelled)
            | (Self::EmptyUrl, Self::EmptyUrl)
            | (Self::InvalidUrlHost, Self::InvalidUrlHost)
            | (Self::InvalidHeader(_), Self::InvalidHeader(_))
            | (Self::InvalidHeaderName(_), Self::InvalidHeaderName(_))
            | (Self::InvalidMethod(_), Self::InvalidMethod(_))
            | (Self::NotAnImage, Self::NotAnImage) => true,
            _ => false,
        }
    }
}

impl Eq for ErrorKind {}

impl Hash for ErrorKind {
    fn hash<H>(&self, state: &mut H)
    where
        H: std::hash::Hasher,
    {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::IoError(p, e) => (p, e.kind()).hash(state),
            Self::ParseUrl(s, e) => (s, e.to_string()).hash(state),
            Self::Cookies(s) => s.hash(state),
            Self::Limiter(e) => e.to_string().hash(state),
            Self::Transport(e) => e.to_string().hash(state),
            Self::Json(e) => e.to_string().hash(state),
            Self::BuildClient(e) => e.to_string().hash(state),
            Self::Cancelled
            | Self::EmptyUrl
            | Self::InvalidUrlHost
            | Self::InvalidHeader(_)
            | Self::InvalidHeaderName(_)
            | Self::InvalidMethod(_)
            | Self::NotAnImage => {}
        }
    }
}

impl Serialize for ErrorKind {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl From<(PathBuf, std::io::Error)> for ErrorKind {
    fn from(value: (PathBuf, std::io::Error)) -> Self {
        Self::IoError(Some(value.0), value.1)
    }
}

impl From<std::io::Error> for ErrorKind {
    fn from(e: std::io::Error) -> Self {
        Self::IoError(None, e)
    }
}

impl From<(String, url::ParseError)> for ErrorKind {
    fn from(value: (String, url::ParseError)) -> Self {
        Self::ParseUrl(value.0, value.1)
    }
}

impl From<Infallible> for ErrorKind {
    fn from(_: Infallible) -> Self {
        // tautological
        unreachable!()
    }
}
