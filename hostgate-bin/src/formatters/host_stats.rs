use hostgate_lib::limiter::HostStatsMap;
use std::fmt::Write;

/// Per-host table, busiest host first
pub(crate) fn compact(host_stats: &HostStatsMap) -> String {
    if host_stats.is_empty() {
        return String::new();
    }

    let sorted = host_stats.sorted();
    let width = sorted
        .iter()
        .map(|(host, _)| host.as_str().len())
        .max()
        .unwrap_or(0)
        .max(10);

    let mut out = String::from("\nPer-host statistics\n");
    out.push_str(&"-".repeat(60));
    out.push('\n');
    for (host, stats) in sorted {
        let _ = writeln!(out, "{:<width$} | {}", host.as_str(), stats.summary());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostgate_lib::limiter::{HostKey, HostKeyPolicy, HostStats};
    use std::collections::HashMap;
    use std::time::Duration;
    use url::Url;

    fn key(url: &str) -> HostKey {
        HostKey::from_url(&Url::parse(url).unwrap(), HostKeyPolicy::Hostname).unwrap()
    }

    #[test]
    fn test_empty() {
        assert_eq!(compact(&HostStatsMap::default()), "");
    }

    #[test]
    fn test_busiest_host_first() {
        let mut quiet = HostStats::default();
        quiet.record_response(200, Duration::from_millis(10));
        let mut busy = HostStats::default();
        busy.record_response(200, Duration::from_millis(10));
        busy.record_response(500, Duration::from_millis(30));

        let map = HostStatsMap::from(HashMap::from([
            (key("https://quiet.example"), quiet),
            (key("https://busy.example"), busy),
        ]));
        let table = compact(&map);

        let busy_at = table.find("busy.example").unwrap();
        let quiet_at = table.find("quiet.example").unwrap();
        assert!(busy_at < quiet_at);
        assert!(table.contains("2 requests (50% success)"));
    }
}
