use anyhow::{Context, Result};
use hostgate_lib::limiter::HostStatsMap;
use serde_json::json;
use std::fmt::Write;

use super::host_stats;
use crate::commands::FetchResult;

/// Turns the results of a run into the text printed on stdout
pub(crate) trait ReportFormatter {
    /// Host stats are only passed in when they were requested
    fn format(&self, results: &[FetchResult], host_stats: Option<&HostStatsMap>) -> Result<String>;
}

/// One line per URL, e.g. `[200] https://example.com/ | 1256 chars`
pub(crate) struct Compact;

impl ReportFormatter for Compact {
    fn format(&self, results: &[FetchResult], host_stats: Option<&HostStatsMap>) -> Result<String> {
        let mut out = String::new();
        for result in results {
            writeln!(out, "{}", compact_line(result))?;
        }

        let failed = results.iter().filter(|r| !r.is_success()).count();
        writeln!(out)?;
        writeln!(
            out,
            "{} URLs, {} succeeded, {failed} failed",
            results.len(),
            results.len() - failed
        )?;

        if let Some(host_stats) = host_stats {
            out.push_str(&host_stats::compact(host_stats));
        }
        Ok(out)
    }
}

fn compact_line(result: &FetchResult) -> String {
    let status = result
        .status
        .map_or_else(|| "ERR".to_string(), |status| status.to_string());
    let mut line = format!("[{status}] {}", result.url);
    if let Some(final_url) = &result.final_url {
        let _ = write!(line, " -> {final_url}");
    }
    match (&result.content, &result.error) {
        (_, Some(error)) => {
            let _ = write!(line, " | {error}");
        }
        (Some(content), None) => {
            let _ = write!(line, " | {content}");
        }
        (None, None) => {}
    }
    line
}

/// A single JSON document with all results
pub(crate) struct Json;

impl ReportFormatter for Json {
    fn format(&self, results: &[FetchResult], host_stats: Option<&HostStatsMap>) -> Result<String> {
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        let mut output = json!({
            "total": results.len(),
            "succeeded": succeeded,
            "failed": results.len() - succeeded,
            "results": results,
        });
        if let Some(host_stats) = host_stats {
            output["host_stats"] = serde_json::to_value(host_stats)?;
        }
        serde_json::to_string_pretty(&output).context("Cannot format report as JSON")
    }
}
