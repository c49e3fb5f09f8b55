//! Broadcast fan-out.
//!
//! An event is serialized once and the same `Arc<str>` frame is queued to
//! every subscriber. A subscriber whose queue is closed or full is removed
//! from the registry; delivery to everyone else continues.

use relay_proto::{DomainEvent, ServerMessage};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use super::registry::{Subscriber, SubscriberId, SubscriberRegistry};

/// Outcome of one broadcast.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FanoutReport {
    pub delivered: usize,
    pub pruned: Vec<SubscriberId>,
}

/// Serialize an event into a shared wire frame.
pub fn encode(event: &DomainEvent) -> Option<Arc<str>> {
    match ServerMessage::from(event).to_json() {
        Ok(json) => Some(Arc::from(json)),
        Err(e) => {
            warn!(kind = event.kind(), error = %e, "Failed to serialize event");
            None
        }
    }
}

/// Queue `frame` on one subscriber, reporting whether it was accepted.
fn offer(subscriber: &Subscriber, frame: &Arc<str>) -> bool {
    match subscriber.try_send(Arc::clone(frame)) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!(subscriber = %subscriber.id(), "Send queue full, dropping subscriber");
            false
        }
        Err(TrySendError::Closed(_)) => {
            debug!(subscriber = %subscriber.id(), "Subscriber queue closed");
            false
        }
    }
}

/// Broadcast an event to every registered subscriber.
pub fn broadcast(registry: &mut SubscriberRegistry, event: &DomainEvent) -> FanoutReport {
    let Some(frame) = encode(event) else {
        return FanoutReport::default();
    };

    let mut report = FanoutReport::default();
    registry.for_each(|subscriber| {
        if offer(subscriber, &frame) {
            report.delivered += 1;
        } else {
            report.pruned.push(subscriber.id());
        }
    });

    for id in &report.pruned {
        registry.remove(id);
    }

    debug!(
        kind = event.kind(),
        delivered = report.delivered,
        pruned = report.pruned.len(),
        "Broadcast event"
    );
    crate::metrics::record_broadcast(report.delivered, report.pruned.len());
    report
}

/// Send an event to a single subscriber, removing it on failure.
///
/// Returns `true` when the frame was queued.
pub fn send_to(registry: &mut SubscriberRegistry, id: &SubscriberId, event: &DomainEvent) -> bool {
    let Some(frame) = encode(event) else {
        return false;
    };
    let Some(subscriber) = registry.get(id) else {
        return false;
    };
    if offer(subscriber, &frame) {
        return true;
    }
    registry.remove(id);
    crate::metrics::record_broadcast(0, 1);
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn add(registry: &mut SubscriberRegistry, depth: usize) -> (SubscriberId, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(depth);
        let id = SubscriberId::new();
        registry.add(Subscriber::new(id, tx));
        (id, rx)
    }

    #[test]
    fn delivers_same_frame_to_everyone() {
        let mut registry = SubscriberRegistry::new();
        let (_, mut rx_a) = add(&mut registry, 4);
        let (_, mut rx_b) = add(&mut registry, 4);

        let report = broadcast(&mut registry, &DomainEvent::info("hello"));
        assert_eq!(report.delivered, 2);
        assert!(report.pruned.is_empty());

        let a = rx_a.try_recv().unwrap();
        let b = rx_b.try_recv().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(&*a, r#"{"type":"info","message":"hello"}"#);
    }

    #[test]
    fn closed_subscriber_is_pruned_and_others_still_receive() {
        let mut registry = SubscriberRegistry::new();
        let (_, mut rx_a) = add(&mut registry, 4);
        let (dead, rx_dead) = add(&mut registry, 4);
        let (_, mut rx_c) = add(&mut registry, 4);
        drop(rx_dead);
        let _ = registry.take_demand_change();

        let report = broadcast(&mut registry, &DomainEvent::info("x"));

        assert_eq!(report.delivered, 2);
        assert_eq!(report.pruned, vec![dead]);
        assert_eq!(registry.count(), 2);
        assert!(registry.get(&dead).is_none());
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_c.try_recv().is_ok());
        assert_eq!(
            registry.take_demand_change().map(|c| c.count),
            Some(2)
        );
    }

    #[test]
    fn full_queue_counts_as_send_failure() {
        let mut registry = SubscriberRegistry::new();
        let (slow, _rx_slow) = add(&mut registry, 1);
        let (_, mut rx_fast) = add(&mut registry, 8);

        broadcast(&mut registry, &DomainEvent::info("one"));
        let report = broadcast(&mut registry, &DomainEvent::info("two"));

        assert_eq!(report.pruned, vec![slow]);
        assert_eq!(rx_fast.try_recv().unwrap().as_ref(), r#"{"type":"info","message":"one"}"#);
        assert_eq!(rx_fast.try_recv().unwrap().as_ref(), r#"{"type":"info","message":"two"}"#);
    }

    #[test]
    fn empty_registry_is_a_no_op() {
        let mut registry = SubscriberRegistry::new();
        let report = broadcast(&mut registry, &DomainEvent::info("nobody"));
        assert_eq!(report, FanoutReport::default());
        assert_eq!(registry.take_demand_change(), None);
    }

    #[test]
    fn send_to_removes_failed_target_only() {
        let mut registry = SubscriberRegistry::new();
        let (target, rx_target) = add(&mut registry, 4);
        let (other, _rx_other) = add(&mut registry, 4);
        drop(rx_target);

        assert!(!send_to(&mut registry, &target, &DomainEvent::info("welcome")));
        assert!(registry.get(&target).is_none());
        assert!(registry.get(&other).is_some());
    }
}
