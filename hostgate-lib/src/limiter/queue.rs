use std::collections::VecDeque;
use std::time::Instant;
use tokio::sync::oneshot;

use crate::limiter::{HostKey, TicketId};

/// A request waiting for admission.
///
/// The entry owns the sending half of the ticket's readiness channel.
/// Admitting the entry fires it; dropping the entry without admitting it
/// closes the channel, which the waiter observes as a cancellation.
#[derive(Debug)]
pub(crate) struct QueueEntry {
    pub(crate) id: TicketId,
    pub(crate) host: HostKey,
    pub(crate) enqueued_at: Instant,
    notify: oneshot::Sender<()>,
}

impl QueueEntry {
    pub(crate) fn new(id: TicketId, host: HostKey, notify: oneshot::Sender<()>) -> Self {
        Self {
            id,
            host,
            enqueued_at: Instant::now(),
            notify,
        }
    }

    /// Wake the waiter. Consumes the entry, so each waiter is woken at most once.
    pub(crate) fn admit(self) {
        // The receiver lives in the ticket, whose `Drop` withdraws the entry
        // under the same lock, so it cannot be gone here.
        let _ = self.notify.send(());
    }
}

/// Global FIFO of waiting requests, across all hosts.
#[derive(Debug, Default)]
pub(crate) struct AdmissionQueue {
    entries: VecDeque<QueueEntry>,
}

impl AdmissionQueue {
    pub(crate) fn push_back(&mut self, entry: QueueEntry) {
        self.entries.push_back(entry);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Host of the entry at `index`, counted from the head
    pub(crate) fn host_at(&self, index: usize) -> Option<&HostKey> {
        self.entries.get(index).map(|entry| &entry.host)
    }

    /// Take the entry at `index` out of the queue, keeping the order of the rest
    pub(crate) fn remove_at(&mut self, index: usize) -> Option<QueueEntry> {
        self.entries.remove(index)
    }

    /// Take the entry with the given id out of the queue
    pub(crate) fn withdraw(&mut self, id: TicketId) -> Option<QueueEntry> {
        let index = self.entries.iter().position(|entry| entry.id == id)?;
        self.entries.remove(index)
    }

    /// Ids in queue order
    pub(crate) fn ids(&self) -> impl Iterator<Item = TicketId> + '_ {
        self.entries.iter().map(|entry| entry.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u64, host: &str) -> (QueueEntry, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (QueueEntry::new(TicketId(id), HostKey::from(host), tx), rx)
    }

    #[test]
    fn test_fifo_order_survives_removal() {
        let mut queue = AdmissionQueue::default();
        let mut receivers = Vec::new();
        for (id, host) in [(1, "a"), (2, "b"), (3, "a")] {
            let (entry, rx) = entry(id, host);
            queue.push_back(entry);
            receivers.push(rx);
        }

        let removed = queue.remove_at(1).unwrap();
        assert_eq!(removed.id, TicketId(2));
        assert_eq!(queue.ids().collect::<Vec<_>>(), vec![TicketId(1), TicketId(3)]);
        assert_eq!(queue.host_at(1), Some(&HostKey::from("a")));
    }

    #[test]
    fn test_admit_notifies_and_withdraw_closes() {
        let mut queue = AdmissionQueue::default();
        let (first, mut first_rx) = entry(1, "a");
        let (second, mut second_rx) = entry(2, "a");
        queue.push_back(first);
        queue.push_back(second);

        queue.remove_at(0).unwrap().admit();
        assert!(first_rx.try_recv().is_ok());

        drop(queue.withdraw(TicketId(2)).unwrap());
        assert!(matches!(
            second_rx.try_recv(),
            Err(oneshot::error::TryRecvError::Closed)
        ));
        assert!(queue.is_empty());
    }
}
