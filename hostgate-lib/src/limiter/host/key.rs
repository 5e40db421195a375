use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumString, VariantNames};
use url::Url;

use crate::ErrorKind;
use crate::types::Result;

/// Decides which parts of a URL identify a "host" for per-host limits.
///
/// The two policies differ only when the same hostname is reached via
/// different schemes or ports, e.g. `http://example.com` and
/// `https://example.com:8443`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, VariantNames,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum HostKeyPolicy {
    /// Only the hostname counts; scheme and port are ignored
    #[default]
    Hostname,
    /// Scheme, hostname and port (with the scheme's default port filled in)
    Origin,
}

/// A type-safe representation of a host for concurrency limiting purposes.
///
/// This extracts and normalizes hosts from URLs to ensure consistent
/// accounting across requests to the same host (domain or IP address).
///
/// # Examples
///
/// ```
/// use hostgate_lib::limiter::{HostKey, HostKeyPolicy};
/// use url::Url;
///
/// let url = Url::parse("https://API.github.com:443/repos/user/repo").unwrap();
///
/// let key = HostKey::from_url(&url, HostKeyPolicy::Hostname).unwrap();
/// assert_eq!(key.as_str(), "api.github.com");
///
/// let key = HostKey::from_url(&url, HostKeyPolicy::Origin).unwrap();
/// assert_eq!(key.as_str(), "https://api.github.com:443");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HostKey(String);

impl HostKey {
    /// Extract the key for `url` under the given policy
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidUrlHost`] if the URL has no host
    /// (e.g. `file:///etc/hosts` or `data:` URLs).
    pub fn from_url(url: &Url, policy: HostKeyPolicy) -> Result<Self> {
        let host = url.host_str().ok_or(ErrorKind::InvalidUrlHost)?;
        let host = host.to_lowercase();

        Ok(match policy {
            HostKeyPolicy::Hostname => HostKey(host),
            HostKeyPolicy::Origin => match url.port_or_known_default() {
                Some(port) => HostKey(format!("{}://{host}:{port}", url.scheme())),
                None => HostKey(format!("{}://{host}", url.scheme())),
            },
        })
    }

    /// Get the key as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the key as an owned String
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<&Url> for HostKey {
    type Error = ErrorKind;

    fn try_from(url: &Url) -> Result<Self> {
        Self::from_url(url, HostKeyPolicy::default())
    }
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HostKey {
    fn from(host: &str) -> Self {
        HostKey(host.to_lowercase())
    }
}

impl From<String> for HostKey {
    fn from(host: String) -> Self {
        HostKey(host.to_lowercase())
    }
}
