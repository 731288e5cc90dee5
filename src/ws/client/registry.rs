use std::collections::HashMap;

use tokio::sync::mpsc;

use super::subscription::Delivery;
use crate::ws::message::SubscribePayload;

pub(crate) type DeliverySink = mpsc::UnboundedSender<Delivery>;

#[derive(Debug)]
struct Entry {
    seq: u64,
    payload: SubscribePayload,
    sink: DeliverySink,
}

/// Result of routing a server message to a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dispatch {
    /// value handed to the consumer
    Sent,
    /// terminal item handed over, entry removed
    Finished,
    /// no such subscription
    Unknown,
    /// consumer dropped, entry removed
    Gone,
}

/// Active subscriptions, keyed by id, remembering the order they were created in
#[derive(Debug, Default)]
pub(crate) struct Registry {
    entries: HashMap<String, Entry>,
    next_seq: u64,
}

impl Registry {
    pub fn insert(&mut self, id: String, payload: SubscribePayload, sink: DeliverySink) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(id, Entry { seq, payload, sink });
    }

    pub fn remove(&mut self, id: &str) -> Option<DeliverySink> {
        self.entries.remove(id).map(|entry| entry.sink)
    }

    pub fn payload(&self, id: &str) -> Option<&SubscribePayload> {
        self.entries.get(id).map(|entry| &entry.payload)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn deliver(&mut self, id: &str, delivery: Delivery) -> Dispatch {
        let terminal = delivery.is_terminal();

        let sent = match self.entries.get(id) {
            Some(entry) => entry.sink.send(delivery).is_ok(),
            None => return Dispatch::Unknown,
        };

        if terminal {
            self.entries.remove(id);
            Dispatch::Finished
        } else if sent {
            Dispatch::Sent
        } else {
            self.entries.remove(id);
            Dispatch::Gone
        }
    }

    /// ids in creation order
    pub fn ids(&self) -> Vec<String> {
        let mut entries: Vec<_> = self.entries.iter().collect();
        entries.sort_by_key(|(_, entry)| entry.seq);
        entries.into_iter().map(|(id, _)| id.clone()).collect()
    }

    /// Remove entries whose consumer was dropped, returns their ids in creation order
    pub fn remove_abandoned(&mut self) -> Vec<String> {
        let mut abandoned: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.sink.is_closed())
            .map(|(id, entry)| (entry.seq, id.clone()))
            .collect();
        abandoned.sort();

        abandoned
            .into_iter()
            .map(|(_, id)| {
                self.entries.remove(&id);
                id
            })
            .collect()
    }

    /// Remove all entries, in creation order
    pub fn drain(&mut self) -> Vec<(String, DeliverySink)> {
        let mut entries: Vec<_> = self.entries.drain().collect();
        entries.sort_by_key(|(_, entry)| entry.seq);
        entries
            .into_iter()
            .map(|(id, entry)| (id, entry.sink))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ws::message::ExecutionResult;

    fn payload() -> SubscribePayload {
        SubscribePayload::new("subscription { count }")
    }

    #[test]
    fn test_registry_keeps_creation_order() {
        let mut registry = Registry::default();
        let mut receivers = Vec::new();

        for id in ["c", "a", "b"] {
            let (tx, rx) = mpsc::unbounded_channel();
            registry.insert(id.to_string(), payload(), tx);
            receivers.push(rx);
        }

        assert_eq!(registry.ids(), vec!["c", "a", "b"]);

        registry.remove("a");
        let drained: Vec<_> = registry.drain().into_iter().map(|(id, _)| id).collect();
        assert_eq!(drained, vec!["c", "b"]);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_registry_deliver() {
        let mut registry = Registry::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.insert("1".to_string(), payload(), tx);

        assert_eq!(
            registry.deliver("1", Delivery::Next(ExecutionResult::default())),
            Dispatch::Sent
        );
        assert_eq!(
            registry.deliver("2", Delivery::Next(ExecutionResult::default())),
            Dispatch::Unknown
        );
        assert_eq!(registry.deliver("1", Delivery::Complete), Dispatch::Finished);
        assert_eq!(registry.deliver("1", Delivery::Complete), Dispatch::Unknown);

        assert!(matches!(rx.try_recv(), Ok(Delivery::Next(_))));
        assert!(matches!(rx.try_recv(), Ok(Delivery::Complete)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_registry_drops_entry_of_gone_consumer() {
        let mut registry = Registry::default();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.insert("1".to_string(), payload(), tx);
        drop(rx);

        assert_eq!(
            registry.deliver("1", Delivery::Next(ExecutionResult::default())),
            Dispatch::Gone
        );
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_registry_remove_abandoned() {
        let mut registry = Registry::default();
        let mut receivers = Vec::new();

        for id in ["a", "b", "c", "d"] {
            let (tx, rx) = mpsc::unbounded_channel();
            registry.insert(id.to_string(), payload(), tx);
            receivers.push(Some(rx));
        }

        receivers[2].take();
        receivers[0].take();

        assert_eq!(registry.remove_abandoned(), vec!["a", "c"]);
        assert_eq!(registry.ids(), vec!["b", "d"]);
        assert!(registry.remove_abandoned().is_empty());
    }
}
