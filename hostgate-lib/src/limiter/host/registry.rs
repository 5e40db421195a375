use std::collections::{HashMap, VecDeque};

use super::key::HostKey;
use crate::limiter::TicketId;

/// In-flight count and wait list of a single host
#[derive(Debug, Default)]
struct HostSlot {
    in_flight: usize,
    waiting: VecDeque<TicketId>,
}

impl HostSlot {
    fn is_idle(&self) -> bool {
        self.in_flight == 0 && self.waiting.is_empty()
    }
}

/// Load of a single host as seen by the limiter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostLoad {
    /// Admitted requests which have not been released yet
    pub in_flight: usize,
    /// Requests waiting for admission
    pub queued: usize,
}

/// Per-host bookkeeping behind the limiter.
///
/// Hosts are added on first use and pruned again as soon as they have
/// neither in-flight nor waiting requests, so the registry only ever holds
/// hosts that currently matter.
#[derive(Debug, Default)]
pub(crate) struct HostRegistry {
    hosts: HashMap<HostKey, HostSlot>,
}

impl HostRegistry {
    /// Number of admitted requests for `host`
    pub(crate) fn in_flight(&self, host: &HostKey) -> usize {
        self.hosts.get(host).map_or(0, |slot| slot.in_flight)
    }

    /// Count one more admitted request for `host`
    pub(crate) fn acquire(&mut self, host: &HostKey) {
        self.hosts.entry(host.clone()).or_default().in_flight += 1;
    }

    /// Count one admitted request less for `host`
    pub(crate) fn release(&mut self, host: &HostKey) {
        if let Some(slot) = self.hosts.get_mut(host) {
            debug_assert!(slot.in_flight > 0, "released idle host {host}");
            slot.in_flight = slot.in_flight.saturating_sub(1);
        }
        self.prune(host);
    }

    /// Append `id` to the tail of the wait list of `host`
    pub(crate) fn enqueue(&mut self, host: &HostKey, id: TicketId) {
        self.hosts.entry(host.clone()).or_default().waiting.push_back(id);
    }

    /// Remove `id` from the wait list of `host`, wherever it is.
    /// Returns whether the entry was found.
    pub(crate) fn withdraw(&mut self, host: &HostKey, id: TicketId) -> bool {
        let found = match self.hosts.get_mut(host) {
            // Admission always takes the head, so look there first
            Some(slot) if slot.waiting.front() == Some(&id) => {
                slot.waiting.pop_front();
                true
            }
            Some(slot) => match slot.waiting.iter().position(|waiting| *waiting == id) {
                Some(position) => slot.waiting.remove(position).is_some(),
                None => false,
            },
            None => false,
        };
        self.prune(host);
        found
    }

    /// Sum of all per-host in-flight counts
    pub(crate) fn total_in_flight(&self) -> usize {
        self.hosts.values().map(|slot| slot.in_flight).sum()
    }

    /// Current load of every known host
    pub(crate) fn load(&self) -> HashMap<HostKey, HostLoad> {
        self.hosts
            .iter()
            .map(|(host, slot)| {
                let load = HostLoad {
                    in_flight: slot.in_flight,
                    queued: slot.waiting.len(),
                };
                (host.clone(), load)
            })
            .collect()
    }

    fn prune(&mut self, host: &HostKey) {
        if self.hosts.get(host).is_some_and(HostSlot::is_idle) {
            self.hosts.remove(host);
        }
    }
}
