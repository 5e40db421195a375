use crate::verbosity::Verbosity;
use anyhow::{Context, Error, Result, anyhow};
use clap::builder::PossibleValuesParser;
use clap::{Parser, builder::TypedValueParser};
use const_format::{concatcp, formatcp};
use hostgate_lib::limiter::{DEFAULT_HOST_CONCURRENCY, DEFAULT_MAX_CONCURRENCY};
use hostgate_lib::transport::DEFAULT_MAX_REDIRECTS;
use hostgate_lib::{DEFAULT_USER_AGENT, HostKeyPolicy, RequestSpec, ResponseEncoding};
use http::{
    HeaderMap,
    header::{HeaderName, HeaderValue},
};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::{fs, str::FromStr, time::Duration};
use strum::{Display, EnumString, VariantNames};

pub(crate) const HOSTGATE_CONFIG_FILE: &str = "hostgate.toml";

// clap wants `&str` defaults, serde wants functions returning owned values
const MAX_CONCURRENCY_STR: &str = concatcp!(DEFAULT_MAX_CONCURRENCY);
const HOST_CONCURRENCY_STR: &str = concatcp!(DEFAULT_HOST_CONCURRENCY);
const MAX_REDIRECTS_STR: &str = concatcp!(DEFAULT_MAX_REDIRECTS);
// Shows the default file without making clap fill it in, so that a missing
// default file is not an error
const HELP_MSG_CONFIG_FILE: &str = formatcp!(
    "Configuration file to use\n\n[default: {}]",
    HOSTGATE_CONFIG_FILE,
);

/// How each response body is decoded
#[derive(
    Debug, Deserialize, Default, Clone, Copy, Display, EnumString, VariantNames, PartialEq, Eq,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub(crate) enum ContentFormat {
    /// Decode as text in the configured encoding
    #[default]
    Text,
    /// Decode as JSON, unwrapping JSONP callbacks
    Json,
    /// Keep the raw bytes
    Binary,
    /// Require an image
    Image,
    /// Save the body to a file
    File,
}

/// Layout of the report written to stdout
#[derive(
    Debug, Deserialize, Default, Clone, Copy, Display, EnumString, VariantNames, PartialEq, Eq,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub(crate) enum ReportFormat {
    /// One line per URL
    #[default]
    Compact,
    /// A single JSON document
    Json,
}

macro_rules! default_function {
    ( $( $name:ident : $T:ty = $e:expr; )* ) => {
        $(
            #[allow(clippy::missing_const_for_fn)]
            fn $name() -> $T {
                $e
            }
        )*
    };
}

// Defaults used by serde when a key is missing from the config file
default_function! {
    max_concurrency: usize = DEFAULT_MAX_CONCURRENCY;
    host_concurrency: usize = DEFAULT_HOST_CONCURRENCY;
    max_redirects: usize = DEFAULT_MAX_REDIRECTS;
    user_agent: String = DEFAULT_USER_AGENT.to_string();
    verbosity: Verbosity = Verbosity::default();
}

// Fill every key still at its CLI default with the value from the config file.
// The struct literal in the dead branch fails to compile when a field of the
// config is neither merged nor explicitly ignored.
macro_rules! fold_in {
    ($cli:ident , $toml:ident ; $ty:ident { $(..$ignore:ident,)* $( $key:ident : $default:expr, )* } ) => {
        if (false) {
            #[allow(dead_code, unused, clippy::diverging_sub_expression)]
            let _check_fold_in_exhaustivity = $ty {
                $($key: unreachable!(), )*
                $($ignore: unreachable!(), )*
            };
        };
        $(
            if $cli.$key == $default && $toml.$key != $default {
                $cli.$key = $toml.$key;
            }
        )*
    };
}

/// Split `Name: Value` into a header name and value.
///
/// Everything after the first colon is the value, surrounding whitespace is
/// trimmed from both parts.
fn parse_single_header(header: &str) -> Result<(HeaderName, HeaderValue)> {
    let Some((name, value)) = header.split_once(':') else {
        return Err(anyhow!(
            "Invalid header format. Expected colon-separated string in the format 'HeaderName: HeaderValue'"
        ));
    };
    let name = name.trim();
    let name = HeaderName::from_str(name)
        .map_err(|e| anyhow!("Unable to convert header name '{name}': {e}"))?;
    let value = HeaderValue::from_str(value.trim())
        .map_err(|e| anyhow!("Unable to read value of header with name '{name}': {e}"))?;
    Ok((name, value))
}

/// Parses a `-H` argument into a `(name, value)` pair
#[derive(Clone, Debug)]
struct HeaderParser;

impl TypedValueParser for HeaderParser {
    type Value = (String, String);

    fn parse_ref(
        &self,
        _cmd: &clap::Command,
        _arg: Option<&clap::Arg>,
        value: &std::ffi::OsStr,
    ) -> Result<Self::Value, clap::Error> {
        let invalid = |message: String| clap::Error::raw(clap::error::ErrorKind::InvalidValue, message);

        let header = value
            .to_str()
            .ok_or_else(|| invalid("Header contains invalid UTF-8".to_string()))?;
        let (name, value) = parse_single_header(header).map_err(|e| invalid(e.to_string()))?;
        let value = value
            .to_str()
            .map_err(|_| invalid("Header value contains invalid UTF-8".to_string()))?;
        Ok((name.to_string(), value.to_string()))
    }
}

impl clap::builder::ValueParserFactory for HeaderParser {
    type Parser = HeaderParser;
    fn value_parser() -> Self::Parser {
        HeaderParser
    }
}

/// Conversion of the configured header pairs into a `HeaderMap`
pub(crate) trait HeaderMapExt {
    /// Later pairs replace earlier ones with the same name
    fn from_header_pairs(headers: &[(String, String)]) -> Result<HeaderMap, Error>;
}

impl HeaderMapExt for HeaderMap {
    fn from_header_pairs(headers: &[(String, String)]) -> Result<HeaderMap, Error> {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| anyhow!("Invalid header name '{name}': {e}"))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| anyhow!("Invalid header value '{value}': {e}"))?;
            header_map.insert(header_name, header_value);
        }
        Ok(header_map)
    }
}

/// hostgate fetches many URLs at once while keeping the number of requests
/// in flight below a global limit and a per-host limit.
#[derive(Parser, Debug)]
#[command(version, about, next_display_order = None)]
pub(crate) struct HostgateOptions {
    /// URLs to fetch
    #[arg(name = "urls", required = true)]
    raw_urls: Vec<String>,

    /// Configuration file to use
    #[arg(short, long = "config")]
    #[arg(help = HELP_MSG_CONFIG_FILE)]
    pub(crate) config_file: Option<PathBuf>,

    #[command(flatten)]
    pub(crate) config: Config,
}

impl HostgateOptions {
    /// One request per URL argument, in the order given
    pub(crate) fn requests(&self) -> Result<Vec<RequestSpec>> {
        self.raw_urls
            .iter()
            .map(|url| {
                RequestSpec::parse(url)
                    .map(|spec| spec.follow_redirects(!self.config.no_follow_redirects))
                    .with_context(|| format!("Cannot parse URL `{url}`"))
            })
            .collect()
    }
}

// Config files list headers as a table instead of `Name: Value` strings
fn deserialize_headers<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    let map = HashMap::<String, String>::deserialize(deserializer)?;
    Ok(map.into_iter().collect())
}

/// Options which can be given on the command line or in `hostgate.toml`
#[allow(clippy::struct_excessive_bools)]
#[derive(Parser, Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub(crate) struct Config {
    /// Verbose program output
    #[command(flatten)]
    #[serde(default = "verbosity")]
    pub(crate) verbose: Verbosity,

    /// Maximum number of requests in flight across all hosts
    #[arg(long, default_value = &MAX_CONCURRENCY_STR)]
    #[serde(default = "max_concurrency")]
    pub(crate) max_concurrency: usize,

    /// Maximum number of requests in flight to a single host
    ///
    /// Requests to a host at its limit wait in line while requests to
    /// other hosts proceed.
    #[arg(long, default_value = &HOST_CONCURRENCY_STR)]
    #[serde(default = "host_concurrency")]
    pub(crate) host_concurrency: usize,

    /// What counts as one host for `--host-concurrency`
    #[arg(
        long,
        default_value = "hostname",
        value_parser = PossibleValuesParser::new(HostKeyPolicy::VARIANTS).map(|s| s.parse::<HostKeyPolicy>().unwrap()),
        long_help = "What counts as one host for `--host-concurrency`.

hostname: only the host name, so `http://example.com` and
          `https://example.com:8443` share one limit
origin:   scheme, host name and port"
    )]
    #[serde(default)]
    pub(crate) host_key: HostKeyPolicy,

    /// How response bodies are decoded
    #[arg(
        short,
        long,
        default_value = "text",
        value_parser = PossibleValuesParser::new(ContentFormat::VARIANTS).map(|s| s.parse::<ContentFormat>().unwrap())
    )]
    #[serde(default)]
    pub(crate) format: ContentFormat,

    /// Layout of the report
    #[arg(
        long,
        default_value = "compact",
        value_parser = PossibleValuesParser::new(ReportFormat::VARIANTS).map(|s| s.parse::<ReportFormat>().unwrap())
    )]
    #[serde(default)]
    pub(crate) report: ReportFormat,

    /// Directory for files saved with `--format file`.
    /// Defaults to the current directory.
    #[arg(short, long, value_name = "DIR", verbatim_doc_comment)]
    #[serde(default)]
    pub(crate) output_dir: Option<PathBuf>,

    /// Text encoding of response bodies
    #[arg(
        short,
        long,
        default_value = "utf8",
        value_parser = PossibleValuesParser::new(ResponseEncoding::VARIANTS).map(|s| s.parse::<ResponseEncoding>().unwrap())
    )]
    #[serde(default)]
    pub(crate) encoding: ResponseEncoding,

    /// User agent
    #[arg(short, long, default_value = DEFAULT_USER_AGENT)]
    #[serde(default = "user_agent")]
    pub(crate) user_agent: String,

    /// Set custom header for requests
    #[arg(
        short = 'H',
        long = "header",
        action = clap::ArgAction::Append,
        value_parser = HeaderParser,
        value_name = "HEADER:VALUE",
        long_help = "Set custom header for requests

Headers are given as 'Name: Value', e.g. 'Accept: application/json'.
Repeat the flag to send several headers. They are sent with every request."
    )]
    #[serde(default)]
    #[serde(deserialize_with = "deserialize_headers")]
    pub(crate) header: Vec<(String, String)>,

    /// Timeout per request, e.g. `500ms` or `30s`. No timeout by default.
    #[arg(short, long, value_parser = humantime::parse_duration)]
    #[serde(default, with = "humantime_serde")]
    pub(crate) timeout: Option<Duration>,

    /// Maximum number of redirects followed per request
    #[arg(short, long, default_value = &MAX_REDIRECTS_STR)]
    #[serde(default = "max_redirects")]
    pub(crate) max_redirects: usize,

    /// Report redirect responses instead of following them
    #[arg(long)]
    #[serde(default)]
    pub(crate) no_follow_redirects: bool,

    /// Proceed for server connections considered insecure (invalid TLS)
    #[arg(short, long)]
    #[serde(default)]
    pub(crate) insecure: bool,

    /// Read and write cookies using the given file
    #[arg(
        long,
        value_name = "PATH",
        long_help = "Read cookies from the given file and send them with matching requests.
Cookies set by responses are added, and the file is written back when
hostgate exits. A missing file is created."
    )]
    #[serde(default)]
    pub(crate) cookie_jar: Option<PathBuf>,

    /// Remove all cookies from the cookie jar before fetching
    #[arg(long)]
    #[serde(default)]
    pub(crate) clear_cookies: bool,

    /// Show per-host statistics at the end of the run
    #[arg(long)]
    #[serde(default)]
    pub(crate) host_stats: bool,
}

impl Config {
    /// Headers of `other` replace headers of `self` with the same name
    fn merge_headers(&mut self, other: &[(String, String)]) {
        let self_map = self.header.iter().cloned().collect::<HashMap<_, _>>();
        let other_map = other.iter().cloned().collect::<HashMap<_, _>>();
        let merged_map: HashMap<_, _> = self_map.into_iter().chain(other_map).collect();
        self.header = merged_map.into_iter().collect();
    }

    /// Load configuration from a file
    pub(crate) fn load_from_file(path: &Path) -> Result<Config> {
        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents).with_context(|| "Failed to parse configuration file")
    }

    /// Merge the configuration from TOML into the CLI configuration
    pub(crate) fn merge(&mut self, toml: Config) {
        self.merge_headers(&toml.header);

        // NOTE: an error inside this macro call usually means a field of
        // `Config` is missing from the list below
        fold_in! {
            self, toml;

            Config {
                ..header,

                clear_cookies: false,
                cookie_jar: None,
                encoding: ResponseEncoding::default(),
                format: ContentFormat::default(),
                host_concurrency: DEFAULT_HOST_CONCURRENCY,
                host_key: HostKeyPolicy::default(),
                host_stats: false,
                insecure: false,
                max_concurrency: DEFAULT_MAX_CONCURRENCY,
                max_redirects: DEFAULT_MAX_REDIRECTS,
                no_follow_redirects: false,
                output_dir: None,
                report: ReportFormat::default(),
                timeout: None,
                user_agent: DEFAULT_USER_AGENT,
                verbose: Verbosity::default(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(args: &[&str]) -> HostgateOptions {
        HostgateOptions::parse_from(std::iter::once("hostgate").chain(args.iter().copied()))
    }

    #[test]
    fn verify_app() {
        use clap::CommandFactory;
        HostgateOptions::command().debug_assert();
    }

    #[test]
    fn test_parse_custom_headers() {
        assert_eq!(
            parse_single_header("accept:text/html").unwrap(),
            (
                HeaderName::from_static("accept"),
                HeaderValue::from_static("text/html")
            )
        );
    }

    #[test]
    fn test_parse_custom_header_multiple_colons() {
        assert_eq!(
            parse_single_header("x-range: 10:20").unwrap(),
            (
                HeaderName::from_static("x-range"),
                HeaderValue::from_static("10:20")
            )
        );
    }

    #[test]
    fn test_parse_custom_header_without_colon() {
        assert!(parse_single_header("accept text/html").is_err());
    }

    #[test]
    fn test_cli_defaults() {
        let opts = parse(&["https://example.com"]);
        let config = opts.config;
        assert_eq!(config.max_concurrency, DEFAULT_MAX_CONCURRENCY);
        assert_eq!(config.host_concurrency, DEFAULT_HOST_CONCURRENCY);
        assert_eq!(config.host_key, HostKeyPolicy::Hostname);
        assert_eq!(config.format, ContentFormat::Text);
        assert_eq!(config.encoding, ResponseEncoding::Utf8);
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(config.timeout, None);
    }

    #[test]
    fn test_cli_values() {
        let opts = parse(&[
            "--max-concurrency",
            "8",
            "--host-key",
            "origin",
            "--format",
            "json",
            "--encoding",
            "gbk",
            "--timeout",
            "1500ms",
            "-H",
            "Accept: application/json",
            "https://example.com",
        ]);
        assert_eq!(opts.config.max_concurrency, 8);
        assert_eq!(opts.config.host_key, HostKeyPolicy::Origin);
        assert_eq!(opts.config.format, ContentFormat::Json);
        assert_eq!(opts.config.encoding, ResponseEncoding::Gbk);
        assert_eq!(opts.config.timeout, Some(Duration::from_millis(1500)));
        assert_eq!(
            opts.config.header,
            vec![("accept".to_string(), "application/json".to_string())]
        );
    }

    #[test]
    fn test_requests_follow_redirect_flag() {
        let opts = parse(&["--no-follow-redirects", "https://a.example", "https://b.example"]);
        let requests = opts.requests().unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| !r.follow_redirects));
        assert_eq!(requests[1].url.as_str(), "https://b.example/");
    }

    #[test]
    fn test_requests_reject_invalid_url() {
        let opts = parse(&["not a url"]);
        assert!(opts.requests().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let toml = r#"
            max_concurrency = 4
            host_key = "origin"
            format = "binary"
            timeout = "2s"
            verbose = "info"

            [header]
            X-Token = "secret"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.host_concurrency, DEFAULT_HOST_CONCURRENCY);
        assert_eq!(config.host_key, HostKeyPolicy::Origin);
        assert_eq!(config.format, ContentFormat::Binary);
        assert_eq!(config.timeout, Some(Duration::from_secs(2)));
        assert_eq!(
            config.header,
            vec![("X-Token".to_string(), "secret".to_string())]
        );
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(toml::from_str::<Config>("max_concurency = 4").is_err());
    }

    #[test]
    fn test_merge_prefers_cli_values() {
        let mut cli = parse(&["--max-concurrency", "3", "https://example.com"]).config;
        let toml: Config = toml::from_str(
            r#"
            max_concurrency = 10
            host_concurrency = 5
            user_agent = "from-file"
            "#,
        )
        .unwrap();

        cli.merge(toml);

        assert_eq!(cli.max_concurrency, 3);
        assert_eq!(cli.host_concurrency, 5);
        assert_eq!(cli.user_agent, "from-file");
    }

    #[test]
    fn test_merge_headers() {
        let mut cli = parse(&["-H", "a: cli", "-H", "b: cli", "https://example.com"]).config;
        let toml: Config = toml::from_str("[header]\nb = \"file\"\nc = \"file\"").unwrap();

        cli.merge(toml);

        let mut headers = cli.header.clone();
        headers.sort();
        assert_eq!(
            headers,
            vec![
                ("a".to_string(), "cli".to_string()),
                ("b".to_string(), "file".to_string()),
                ("c".to_string(), "file".to_string()),
            ]
        );
    }

    #[test]
    fn test_header_map_from_pairs() {
        let map = HeaderMap::from_header_pairs(&[
            ("Accept".to_string(), "text/plain".to_string()),
            ("X-Id".to_string(), "1".to_string()),
        ])
        .unwrap();
        assert_eq!(map["accept"], "text/plain");
        assert_eq!(map["x-id"], "1");

        assert!(HeaderMap::from_header_pairs(&[("bad name".to_string(), "x".to_string())]).is_err());
    }
}
