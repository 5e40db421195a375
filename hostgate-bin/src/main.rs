//! `hostgate` fetches many URLs concurrently without overwhelming any single
//! host.
//!
//! All requests go through one limiter with a global cap on requests in
//! flight and a cap per host. Requests above either cap wait in line and are
//! started in the order they were given as soon as capacity frees up.
//!
//! Fetch a few pages, at most two at a time per host:
//! ```sh
//! hostgate --host-concurrency 2 https://example.com/a https://example.com/b https://example.org/
//! ```
//!
//! Decode JSON (and JSONP) responses:
//! ```sh
//! hostgate --format json "https://api.example.com/items?callback=cb"
//! ```
//!
//! Save the bodies into a directory and show per-host statistics:
//! ```sh
//! hostgate --format file --output-dir downloads --host-stats https://example.com/logo.png
//! ```
#![warn(clippy::all, clippy::pedantic)]
#![warn(
    absolute_paths_not_starting_with_crate,
    rustdoc::invalid_html_tags,
    missing_copy_implementations,
    missing_debug_implementations,
    semicolon_in_expressions_from_macros,
    unreachable_pub,
    unused_extern_crates,
    variant_size_differences,
    clippy::missing_const_for_fn
)]
#![deny(anonymous_parameters, macro_use_extern_crate)]

use std::io::{self, ErrorKind, Write};
use std::path::PathBuf;

use anyhow::{Context, Error, Result, bail};
use clap::Parser;
use formatters::log::init_logging;
use hostgate_lib::{CancellationToken, CookieJar};
use log::{error, info, warn};

#[cfg(feature = "native-tls")]
use openssl_sys as _; // required for vendored-openssl feature

mod client;
mod commands;
mod formatters;
mod options;
mod verbosity;

use crate::options::{Config, HOSTGATE_CONFIG_FILE, HostgateOptions};

/// A C-like enum that can be cast to `i32` and used as process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitCode {
    Success = 0,
    // Any `Err` bubbling up to `main()` exits with 1
    #[allow(unused)]
    UnexpectedFailure = 1,
    RequestFailure = 2,
    ConfigFile = 3,
}

fn main() -> Result<()> {
    // `std::process::exit` skips destructors, so all work happens in
    // `run_main` and only its exit code makes it out here
    let exit_code = run_main()?;
    std::process::exit(exit_code);
}

/// Merge all provided config options into one.
/// This includes a potential config file, command-line- and environment variables
fn load_config() -> Result<HostgateOptions> {
    let mut opts = HostgateOptions::parse();

    init_logging(&opts.config.verbose);

    if let Some(config_file) = &opts.config_file {
        match Config::load_from_file(config_file) {
            Ok(c) => opts.config.merge(c),
            Err(e) => {
                bail!(
                    "Cannot load configuration file `{}`: {e:?}",
                    config_file.display()
                );
            }
        }
    } else {
        // The default file is optional, but must be valid if it exists
        let default_config = PathBuf::from(HOSTGATE_CONFIG_FILE);
        if default_config.is_file() {
            match Config::load_from_file(&default_config) {
                Ok(c) => opts.config.merge(c),
                Err(e) => {
                    bail!(
                        "Cannot load default configuration file `{}`: {e:?}",
                        default_config.display()
                    );
                }
            }
        }
    }

    Ok(opts)
}

/// Load the cookie jar from its file, or start with an empty one in memory
fn load_cookie_jar(cfg: &Config) -> Result<CookieJar> {
    match &cfg.cookie_jar {
        Some(path) => CookieJar::load(path.clone())
            .with_context(|| format!("Cannot load cookie jar from `{}`", path.display())),
        None => Ok(CookieJar::in_memory()),
    }
}

/// Set up runtime and call hostgate entrypoint
fn run_main() -> Result<i32> {
    use std::process::exit;

    let opts = match load_config() {
        Ok(opts) => opts,
        Err(e) => {
            error!("Error while loading config: {e}");
            exit(ExitCode::ConfigFile as i32);
        }
    };

    let runtime = tokio::runtime::Runtime::new()?;

    match runtime.block_on(run(&opts)) {
        Err(e) if Some(ErrorKind::BrokenPipe) == underlying_io_error_kind(&e) => {
            exit(ExitCode::Success as i32);
        }
        res => res,
    }
}

/// Check if the given error can be traced back to an `io::ErrorKind`
fn underlying_io_error_kind(error: &Error) -> Option<io::ErrorKind> {
    for cause in error.chain() {
        if let Some(io_error) = cause.downcast_ref::<io::Error>() {
            return Some(io_error.kind());
        }
    }
    None
}

/// Fetch all URLs given on the command line
async fn run(opts: &HostgateOptions) -> Result<i32> {
    let cfg = &opts.config;
    let requests = opts.requests()?;

    let cookie_jar = load_cookie_jar(cfg)?;
    let client = client::create(cfg, cookie_jar)?;
    if cfg.clear_cookies {
        info!("Clearing cookies");
        client.clear_cookies();
    }

    // Ctrl-C withdraws waiting requests and aborts running ones
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let interrupt_handle = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling outstanding requests");
            on_interrupt.cancel();
        }
    });

    let results = commands::fetch(&client, requests, cfg, &cancel).await;
    interrupt_handle.abort();

    let host_stats = cfg.host_stats.then(|| client.host_stats());
    let report = formatters::get_report_formatter(cfg.report).format(&results, host_stats.as_ref())?;
    let mut stdout = io::stdout().lock();
    stdout.write_all(report.as_bytes())?;
    stdout.flush()?;

    // A failed save does not change the exit code
    if let Err(e) = client.cookie_jar().save() {
        warn!("Cannot save cookie jar: {e}");
    }

    let exit_code = if results.iter().all(commands::FetchResult::is_success) {
        ExitCode::Success
    } else {
        ExitCode::RequestFailure
    };
    Ok(exit_code as i32)
}
