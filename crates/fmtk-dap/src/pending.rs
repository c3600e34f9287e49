//! Requests waiting for a reply from the target.
//!
//! Each table maps an integer key to a one-shot completion handle. Keys are
//! request sequence numbers for the correlated tables, or a logical id
//! (thread, source reference) for single-slot tables where a newer request
//! replaces the one in flight. Every insert bumps a generation so a timed-out
//! waiter can only remove its own entry, never a newer one under the same key.

use std::collections::HashMap;

use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub key: i64,
    generation: u64,
}

#[derive(Debug)]
pub struct PendingTable<T> {
    entries: HashMap<i64, (u64, oneshot::Sender<T>)>,
    generation: u64,
}

impl<T> Default for PendingTable<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            generation: 0,
        }
    }
}

impl<T> PendingTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `key`. An entry already waiting under the same key is dropped
    /// and its receiver sees a closed channel.
    pub fn insert(&mut self, key: i64) -> (Ticket, oneshot::Receiver<T>) {
        self.generation += 1;
        let (tx, rx) = oneshot::channel();
        self.entries.insert(key, (self.generation, tx));
        (
            Ticket {
                key,
                generation: self.generation,
            },
            rx,
        )
    }

    /// Complete and remove `key`. `false` when nothing was waiting.
    pub fn resolve(&mut self, key: i64, value: T) -> bool {
        match self.entries.remove(&key) {
            Some((_, tx)) => tx.send(value).is_ok(),
            None => false,
        }
    }

    /// Remove the entry created for `ticket`, if it is still the current one.
    pub fn abandon(&mut self, ticket: Ticket) -> bool {
        match self.entries.get(&ticket.key) {
            Some((generation, _)) if *generation == ticket.generation => {
                self.entries.remove(&ticket.key);
                true
            }
            _ => false,
        }
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every waiter; their receivers see a closed channel.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_exactly_once() {
        let mut table = PendingTable::new();
        let (_, rx) = table.insert(4);
        assert!(table.resolve(4, "done"));
        assert!(!table.resolve(4, "again"));
        assert_eq!(rx.await.unwrap(), "done");
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn abandon_only_removes_its_own_generation() {
        let mut table: PendingTable<u8> = PendingTable::new();
        let (old, old_rx) = table.insert(1);
        let (new, new_rx) = table.insert(1);

        assert!(old_rx.await.is_err());
        assert!(!table.abandon(old));
        assert!(!table.is_empty());

        assert!(table.abandon(new));
        assert!(table.is_empty());
        assert!(new_rx.await.is_err());
    }

    #[test]
    fn clear_closes_receivers() {
        let mut table: PendingTable<u8> = PendingTable::new();
        let (_, mut rx) = table.insert(1);
        table.clear();
        assert!(rx.try_recv().is_err());
        assert!(table.is_empty());
    }
}
