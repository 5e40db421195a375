use crate::options::{Config, HeaderMapExt};
use anyhow::{Context, Result};
use hostgate_lib::{Client, ClientBuilder, CookieJar};
use http::HeaderMap;

/// Creates a client according to the command-line config
pub(crate) fn create(cfg: &Config, cookie_jar: CookieJar) -> Result<Client> {
    let headers = HeaderMap::from_header_pairs(&cfg.header)?;

    ClientBuilder::builder()
        .max_concurrency(cfg.max_concurrency)
        .host_concurrency(cfg.host_concurrency)
        .host_key_policy(cfg.host_key)
        .user_agent(cfg.user_agent.clone())
        .custom_headers(headers)
        .timeout(cfg.timeout)
        .max_redirects(cfg.max_redirects)
        .allow_insecure(cfg.insecure)
        .cookie_jar(cookie_jar)
        .build()
        .client()
        .context("Failed to create request client")
}
