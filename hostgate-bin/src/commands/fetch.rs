use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use futures::future::join_all;
use hostgate_lib::{CancellationToken, Client, ImageFormat, RequestSpec, Response, Result};
use log::{debug, info};
use serde::Serialize;

use crate::options::{Config, ContentFormat};

/// What was made of a successful response body
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub(crate) enum Decoded {
    Text { chars: usize },
    Json { value: serde_json::Value },
    Binary { bytes: usize },
    Image { image: ImageFormat, bytes: usize },
    File { path: PathBuf },
}

impl fmt::Display for Decoded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decoded::Text { chars } => write!(f, "{chars} chars"),
            Decoded::Json { value } => write!(f, "json {}", json_kind(value)),
            Decoded::Binary { bytes } => write!(f, "{bytes} bytes"),
            Decoded::Image { image, bytes } => write!(f, "{image} image, {bytes} bytes"),
            Decoded::File { path } => write!(f, "saved to {}", path.display()),
        }
    }
}

const fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Outcome of fetching a single URL
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct FetchResult {
    pub(crate) url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) final_url: Option<String>,
    pub(crate) status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) content: Option<Decoded>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<String>,
}

impl FetchResult {
    /// A 2xx response whose body could be decoded
    pub(crate) fn is_success(&self) -> bool {
        self.error.is_none() && self.status.is_some_and(|status| (200..300).contains(&status))
    }

    fn failed(url: String, error: impl ToString) -> Self {
        Self {
            url,
            final_url: None,
            status: None,
            content: None,
            error: Some(error.to_string()),
        }
    }
}

/// Files handed out to `--format file` results of one run
#[derive(Debug)]
struct Destinations {
    dir: PathBuf,
    taken: Mutex<HashSet<PathBuf>>,
}

impl Destinations {
    fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            taken: Mutex::new(HashSet::new()),
        }
    }

    /// Reserve a path for `file_name`, numbering it (`index-1.html`,
    /// `index-2.html`, ...) if an earlier result of this run already has it
    fn claim(&self, file_name: &str) -> PathBuf {
        let mut taken = self.taken.lock().unwrap_or_else(PoisonError::into_inner);
        let name = Path::new(file_name);
        let stem = name
            .file_stem()
            .map_or_else(|| file_name.to_string(), |s| s.to_string_lossy().into_owned());
        let extension = name.extension().map(|e| e.to_string_lossy().into_owned());

        let mut candidate = self.dir.join(file_name);
        let mut index = 1;
        while !taken.insert(candidate.clone()) {
            let numbered = match &extension {
                Some(extension) => format!("{stem}-{index}.{extension}"),
                None => format!("{stem}-{index}"),
            };
            candidate = self.dir.join(numbered);
            index += 1;
        }
        candidate
    }
}

/// Fetch all requests at once and return their results in the order of
/// `requests`.
///
/// Every request is handed to the client's limiter immediately, so the
/// limits of `client` alone decide how many run in parallel.
pub(crate) async fn fetch(
    client: &Client,
    requests: Vec<RequestSpec>,
    cfg: &Config,
    cancel: &CancellationToken,
) -> Vec<FetchResult> {
    info!(
        "Fetching {} URLs ({} at once, {} per host)",
        requests.len(),
        cfg.max_concurrency,
        cfg.host_concurrency
    );
    let destinations = Destinations::new(cfg.output_dir.as_deref().unwrap_or(Path::new(".")));

    join_all(
        requests
            .into_iter()
            .map(|spec| fetch_one(client, spec, cfg, &destinations, cancel)),
    )
    .await
}

async fn fetch_one(
    client: &Client,
    spec: RequestSpec,
    cfg: &Config,
    destinations: &Destinations,
    cancel: &CancellationToken,
) -> FetchResult {
    let url = spec.url.to_string();
    let response = match client.request_cancellable(spec, cancel).await {
        Ok(response) => response,
        Err(e) => {
            debug!("{url}: {e}");
            return FetchResult::failed(url, e);
        }
    };
    debug!("{response}");

    let final_url = (response.url.as_str() != url).then(|| response.url.to_string());
    let status = Some(response.status.as_u16());

    // The body of an error page is not worth decoding
    if !response.is_success() {
        return FetchResult {
            url,
            final_url,
            status,
            content: None,
            error: None,
        };
    }

    match decode(&response, cfg, destinations).await {
        Ok(content) => FetchResult {
            url,
            final_url,
            status,
            content: Some(content),
            error: None,
        },
        Err(e) => FetchResult {
            url,
            final_url,
            status,
            content: None,
            error: Some(e.to_string()),
        },
    }
}

async fn decode(
    response: &Response,
    cfg: &Config,
    destinations: &Destinations,
) -> Result<Decoded> {
    let content = &response.content;
    Ok(match cfg.format {
        ContentFormat::Text => Decoded::Text {
            chars: content.to_string(cfg.encoding).chars().count(),
        },
        ContentFormat::Json => Decoded::Json {
            value: content.to_json(cfg.encoding)?,
        },
        ContentFormat::Binary => Decoded::Binary {
            bytes: content.len(),
        },
        ContentFormat::Image => {
            let image = content.to_image()?;
            Decoded::Image {
                image: image.format,
                bytes: image.data.len(),
            }
        }
        ContentFormat::File => {
            let destination = destinations.claim(&content.file_name());
            Decoded::File {
                path: content.to_file(Some(&destination)).await?,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use hostgate_lib::{ClientBuilder, CookieJar};
    use http::StatusCode;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use test_utils::{mock_body, mock_server};

    use crate::options::HostgateOptions;

    fn config(args: &[&str]) -> Config {
        let args = ["hostgate"]
            .into_iter()
            .chain(args.iter().copied())
            .chain(["https://example.com"]);
        HostgateOptions::parse_from(args).config
    }

    fn client() -> Client {
        crate::client::create(&config(&[]), CookieJar::in_memory()).unwrap()
    }

    fn request(url: &str) -> RequestSpec {
        RequestSpec::parse(url).unwrap()
    }

    #[tokio::test]
    async fn test_results_keep_request_order() {
        let ok = mock_server!(StatusCode::OK, set_body_string("hello"));
        let missing = mock_server!(StatusCode::NOT_FOUND);

        let results = fetch(
            &client(),
            vec![request(&ok.uri()), request(&missing.uri())],
            &config(&[]),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(results.len(), 2);
        assert!(results[0].is_success());
        assert_eq!(results[0].content, Some(Decoded::Text { chars: 5 }));
        assert!(!results[1].is_success());
        assert_eq!(results[1].status, Some(404));
        assert_eq!(results[1].content, None);
    }

    #[tokio::test]
    async fn test_json_format() {
        let server = mock_body!(r#"cb({"ok": true})"#);

        let results = fetch(
            &client(),
            vec![request(&server.uri())],
            &config(&["--format", "json"]),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(
            results[0].content,
            Some(Decoded::Json {
                value: json!({"ok": true})
            })
        );
    }

    #[tokio::test]
    async fn test_decoding_failure_is_a_failed_result() {
        let server = mock_body!("plain text");

        let results = fetch(
            &client(),
            vec![request(&server.uri())],
            &config(&["--format", "image"]),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(results[0].status, Some(200));
        assert!(results[0].error.is_some());
        assert!(!results[0].is_success());
    }

    #[tokio::test]
    async fn test_file_format_writes_into_output_dir() {
        let server = mock_body!("payload");
        let dir = tempfile::tempdir().unwrap();
        let output_dir = dir.path().to_str().unwrap();

        let results = fetch(
            &client(),
            vec![request(&format!("{}/data.bin", server.uri()))],
            &config(&["--format", "file", "--output-dir", output_dir]),
            &CancellationToken::new(),
        )
        .await;

        let expected = dir.path().join("data.bin");
        assert_eq!(
            results[0].content,
            Some(Decoded::File {
                path: expected.clone()
            })
        );
        assert_eq!(std::fs::read_to_string(expected).unwrap(), "payload");
    }

    #[test]
    fn test_colliding_file_names_are_numbered() {
        let destinations = Destinations::new(Path::new("out"));

        assert_eq!(destinations.claim("index.html"), Path::new("out/index.html"));
        assert_eq!(destinations.claim("index.html"), Path::new("out/index-1.html"));
        assert_eq!(destinations.claim("index.html"), Path::new("out/index-2.html"));
        assert_eq!(destinations.claim("README"), Path::new("out/README"));
        assert_eq!(destinations.claim("README"), Path::new("out/README-1"));
        assert_eq!(destinations.claim("index-1.html"), Path::new("out/index-1-1.html"));
    }

    #[tokio::test]
    async fn test_same_file_name_from_different_hosts() {
        let first = mock_body!("first");
        let second = mock_body!("second");
        let dir = tempfile::tempdir().unwrap();
        let output_dir = dir.path().to_str().unwrap();

        let results = fetch(
            &client(),
            vec![request(&first.uri()), request(&second.uri())],
            &config(&["--format", "file", "--output-dir", output_dir]),
            &CancellationToken::new(),
        )
        .await;

        let mut saved: Vec<String> = results
            .iter()
            .map(|result| match &result.content {
                Some(Decoded::File { path }) => std::fs::read_to_string(path).unwrap(),
                other => panic!("expected a saved file, got {other:?}"),
            })
            .collect();
        saved.sort();
        assert_eq!(saved, ["first", "second"]);
        assert!(dir.path().join("index.html").is_file());
        assert!(dir.path().join("index-1.html").is_file());
    }

    #[tokio::test]
    async fn test_cancelled_run() {
        let server = mock_server!(StatusCode::OK);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let client = ClientBuilder::default().client().unwrap();
        let results = fetch(&client, vec![request(&server.uri())], &config(&[]), &cancel).await;

        assert_eq!(results[0].status, None);
        assert!(results[0].error.is_some());
    }
}
