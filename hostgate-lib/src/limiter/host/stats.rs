use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use serde::Serialize;
use serde::ser::SerializeStruct;

use super::key::HostKey;

/// Number of timing samples kept per host. Older samples are discarded.
const MAX_SAMPLES: usize = 1024;

/// Per-host [`HostStats`], as collected by the request executor
#[derive(Debug, Default, Clone, Serialize)]
pub struct HostStatsMap(HashMap<HostKey, HostStats>);

impl HostStatsMap {
    /// Hosts ordered by request count (busiest first), ties broken by name
    #[must_use]
    pub fn sorted(&self) -> Vec<(HostKey, HostStats)> {
        let mut hosts: Vec<_> = self.0.clone().into_iter().collect();
        hosts.sort_by(|(a_host, a), (b_host, b)| {
            b.total_requests
                .cmp(&a.total_requests)
                .then_with(|| a_host.cmp(b_host))
        });
        hosts
    }

    /// Stats of a single host, if any request was made to it
    #[must_use]
    pub fn get(&self, host: &HostKey) -> Option<&HostStats> {
        self.0.get(host)
    }

    /// Whether no host has been contacted yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of hosts with stats
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<HashMap<HostKey, HostStats>> for HostStatsMap {
    fn from(value: HashMap<HostKey, HostStats>) -> Self {
        Self(value)
    }
}

/// Durations with a bounded history
#[derive(Debug, Clone, Default)]
struct Samples(VecDeque<Duration>);

impl Samples {
    fn push(&mut self, sample: Duration) {
        if self.0.len() == MAX_SAMPLES {
            self.0.pop_front();
        }
        self.0.push_back(sample);
    }

    fn median(&self) -> Option<Duration> {
        if self.0.is_empty() {
            return None;
        }
        let mut sorted: Vec<_> = self.0.iter().copied().collect();
        sorted.sort_unstable();
        let mid = sorted.len() / 2;
        if sorted.len().is_multiple_of(2) {
            Some((sorted[mid - 1] + sorted[mid]) / 2)
        } else {
            Some(sorted[mid])
        }
    }

    fn average(&self) -> Option<Duration> {
        if self.0.is_empty() {
            return None;
        }
        let total: Duration = self.0.iter().sum();
        #[allow(clippy::cast_possible_truncation)]
        Some(total / (self.0.len() as u32))
    }
}

/// Outcome counters and timings of the requests sent to one host
#[derive(Debug, Clone, Default)]
pub struct HostStats {
    /// Requests which were admitted and reached the transport
    pub total_requests: u64,
    /// Responses with a 2xx status
    pub successful_requests: u64,
    /// Responses with a 4xx status
    pub client_errors: u64,
    /// Responses with a 5xx status
    pub server_errors: u64,
    /// Requests which failed without a response
    pub transport_errors: u64,
    /// Requests which were cancelled before they finished
    pub cancelled: u64,
    /// Number of responses per status code
    pub status_codes: BTreeMap<u16, u64>,
    request_times: Samples,
    admission_waits: Samples,
}

impl HostStats {
    /// Record a response, along with the time it took
    pub fn record_response(&mut self, status_code: u16, request_time: Duration) {
        self.total_requests += 1;
        *self.status_codes.entry(status_code).or_insert(0) += 1;

        match status_code {
            200..=299 => self.successful_requests += 1,
            400..=499 => self.client_errors += 1,
            500..=599 => self.server_errors += 1,
            _ => {}
        }
        self.request_times.push(request_time);
    }

    /// Record a request which failed without a response
    pub fn record_transport_error(&mut self, request_time: Duration) {
        self.total_requests += 1;
        self.transport_errors += 1;
        self.request_times.push(request_time);
    }

    /// Record a request which was cancelled, queued or in flight
    pub const fn record_cancelled(&mut self) {
        self.cancelled += 1;
    }

    /// Record how long a request waited for admission
    pub fn record_admission_wait(&mut self, wait: Duration) {
        self.admission_waits.push(wait);
    }

    /// Median time from admission to response
    #[must_use]
    pub fn median_request_time(&self) -> Option<Duration> {
        self.request_times.median()
    }

    /// Average time from admission to response
    #[must_use]
    pub fn average_request_time(&self) -> Option<Duration> {
        self.request_times.average()
    }

    /// Median time requests spent waiting for admission
    #[must_use]
    pub fn median_admission_wait(&self) -> Option<Duration> {
        self.admission_waits.median()
    }

    /// Share of requests answered with a 2xx status (0.0 to 1.0)
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 1.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let rate = self.successful_requests as f64 / self.total_requests as f64;
        rate
    }

    /// Human-readable one-line summary
    #[must_use]
    pub fn summary(&self) -> String {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let success_pct = (self.success_rate() * 100.0).round() as u64;
        let millis = |d: Option<Duration>| {
            d.map_or_else(|| "N/A".to_string(), |d| format!("{}ms", d.as_millis()))
        };

        let mut summary = format!(
            "{} requests ({success_pct}% success), avg: {}, waited: {}",
            self.total_requests,
            millis(self.average_request_time()),
            millis(self.median_admission_wait()),
        );
        if self.transport_errors > 0 {
            summary.push_str(&format!(", {} failed", self.transport_errors));
        }
        if self.cancelled > 0 {
            summary.push_str(&format!(", {} cancelled", self.cancelled));
        }
        summary
    }
}

impl Serialize for HostStats {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let as_millis = |d: Option<Duration>| d.map(|d| d.as_millis());

        let mut s = serializer.serialize_struct("HostStats", 10)?;
        s.serialize_field("total_requests", &self.total_requests)?;
        s.serialize_field("successful_requests", &self.successful_requests)?;
        s.serialize_field("success_rate", &self.success_rate())?;
        s.serialize_field("client_errors", &self.client_errors)?;
        s.serialize_field("server_errors", &self.server_errors)?;
        s.serialize_field("transport_errors", &self.transport_errors)?;
        s.serialize_field("cancelled", &self.cancelled)?;
        s.serialize_field(
            "median_request_time_ms",
            &as_millis(self.median_request_time()),
        )?;
        s.serialize_field(
            "median_admission_wait_ms",
            &as_millis(self.median_admission_wait()),
        )?;
        s.serialize_field("status_codes", &self.status_codes)?;
        s.end()
    }
}
