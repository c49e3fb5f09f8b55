//! Subscriber registry.
//!
//! Identity-keyed, unordered set of live downstream sockets. Every real
//! membership transition records a [`DemandChange`] that the owner forwards
//! to the lifecycle controller.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

/// Unique identity of one downstream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Handle to one downstream connection: its identity and outbound queue.
///
/// Frames are pre-serialized JSON text shared between all recipients.
#[derive(Debug, Clone)]
pub struct Subscriber {
    id: SubscriberId,
    sender: mpsc::Sender<Arc<str>>,
}

impl Subscriber {
    pub fn new(id: SubscriberId, sender: mpsc::Sender<Arc<str>>) -> Self {
        Self { id, sender }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Whether the connection's writer is still draining the queue.
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Queue a frame without waiting.
    pub fn try_send(&self, frame: Arc<str>) -> Result<(), TrySendError<Arc<str>>> {
        self.sender.try_send(frame)
    }
}

/// Demand-change signal: the subscriber count after a membership transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemandChange {
    pub count: usize,
}

/// The set of currently connected subscribers.
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    subscribers: HashMap<SubscriberId, Subscriber>,
    pending: Option<DemandChange>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. Adding an id that is already present is a no-op.
    pub fn add(&mut self, subscriber: Subscriber) -> usize {
        let id = subscriber.id();
        if !self.subscribers.contains_key(&id) {
            self.subscribers.insert(id, subscriber);
            self.record_change();
        }
        self.count()
    }

    /// Remove a subscriber. Removing an unknown id is a no-op.
    pub fn remove(&mut self, id: &SubscriberId) -> usize {
        if self.subscribers.remove(id).is_some() {
            self.record_change();
        }
        self.count()
    }

    pub fn count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn get(&self, id: &SubscriberId) -> Option<&Subscriber> {
        self.subscribers.get(id)
    }

    /// Visit every registered subscriber.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&Subscriber),
    {
        self.subscribers.values().for_each(|s| f(s));
    }

    /// Drop every subscriber, closing their outbound queues.
    pub fn clear(&mut self) {
        if !self.subscribers.is_empty() {
            self.subscribers.clear();
            self.record_change();
        }
    }

    /// Take the demand-change signal accumulated since the last call.
    ///
    /// Several transitions in a row collapse into one signal carrying the
    /// final count.
    pub fn take_demand_change(&mut self) -> Option<DemandChange> {
        self.pending.take()
    }

    fn record_change(&mut self) {
        self.pending = Some(DemandChange {
            count: self.subscribers.len(),
        });
        crate::metrics::set_subscribers(self.subscribers.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscriber() -> (Subscriber, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(4);
        (Subscriber::new(SubscriberId::new(), tx), rx)
    }

    #[test]
    fn add_and_remove_report_counts() {
        let mut registry = SubscriberRegistry::new();
        let (a, _rx_a) = subscriber();
        let (b, _rx_b) = subscriber();
        let a_id = a.id();

        assert_eq!(registry.add(a), 1);
        assert_eq!(registry.add(b), 2);
        assert_eq!(registry.remove(&a_id), 1);
        assert!(registry.get(&a_id).is_none());
    }

    #[test]
    fn double_add_is_idempotent() {
        let mut registry = SubscriberRegistry::new();
        let (a, _rx) = subscriber();

        assert_eq!(registry.add(a.clone()), 1);
        assert_eq!(
            registry.take_demand_change(),
            Some(DemandChange { count: 1 })
        );
        assert_eq!(registry.add(a), 1);
        assert_eq!(registry.take_demand_change(), None);
    }

    #[test]
    fn double_remove_is_idempotent() {
        let mut registry = SubscriberRegistry::new();
        let (a, _rx) = subscriber();
        let id = a.id();
        registry.add(a);
        let _ = registry.take_demand_change();

        assert_eq!(registry.remove(&id), 0);
        assert_eq!(
            registry.take_demand_change(),
            Some(DemandChange { count: 0 })
        );
        assert_eq!(registry.remove(&id), 0);
        assert_eq!(registry.take_demand_change(), None);
    }

    #[test]
    fn consecutive_changes_collapse_to_final_count() {
        let mut registry = SubscriberRegistry::new();
        let (a, _rx_a) = subscriber();
        let (b, _rx_b) = subscriber();
        let (a_id, b_id) = (a.id(), b.id());
        registry.add(a);
        registry.add(b);
        registry.remove(&a_id);
        registry.remove(&b_id);
        assert_eq!(
            registry.take_demand_change(),
            Some(DemandChange { count: 0 })
        );
    }

    #[test]
    fn for_each_visits_everyone() {
        let mut registry = SubscriberRegistry::new();
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (s, rx) = subscriber();
            receivers.push(rx);
            registry.add(s);
        }
        let mut seen = 0;
        registry.for_each(|_| seen += 1);
        assert_eq!(seen, 3);
    }

    #[test]
    fn closed_receiver_marks_subscriber_closed() {
        let (a, rx) = subscriber();
        assert!(a.is_open());
        drop(rx);
        assert!(!a.is_open());
    }

    #[test]
    fn clear_signals_zero_demand() {
        let mut registry = SubscriberRegistry::new();
        let (a, _rx) = subscriber();
        registry.add(a);
        let _ = registry.take_demand_change();
        registry.clear();
        assert_eq!(registry.count(), 0);
        assert_eq!(
            registry.take_demand_change(),
            Some(DemandChange { count: 0 })
        );
    }
}
