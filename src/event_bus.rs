//! Bounded broadcast event bus (§2, §9).
//!
//! Fans out `RoutingEvent` and `VerificationEvent` values to subscribers
//! through opaque subscription handles, modeled on the teacher's use of
//! `tokio::sync::broadcast` for streaming trade decisions to listeners.

use tokio::sync::broadcast;

pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum RoutingEvent {
    Started { tx_id: String },
    Succeeded { tx_id: String, selected_gateway: String },
    Failed { tx_id: String, error: String },
}

#[derive(Debug, Clone)]
pub enum VerificationEvent {
    Started { tx_id: String },
    Progress { tx_id: String, checked: usize, total: usize },
    Verified { tx_id: String },
    Failed { tx_id: String, error: String },
    NotVerified { tx_id: String },
}

/// An opaque handle to a live subscription. Dropping it unsubscribes.
pub struct RoutingSubscription(broadcast::Receiver<RoutingEvent>);

impl RoutingSubscription {
    pub async fn recv(&mut self) -> Option<RoutingEvent> {
        self.0.recv().await.ok()
    }
}

pub struct VerificationSubscription(broadcast::Receiver<VerificationEvent>);

impl VerificationSubscription {
    pub async fn recv(&mut self) -> Option<VerificationEvent> {
        self.0.recv().await.ok()
    }
}

/// Process-wide event bus. Cloning is cheap; all clones share the same
/// underlying channels.
#[derive(Clone)]
pub struct EventBus {
    routing_tx: broadcast::Sender<RoutingEvent>,
    verification_tx: broadcast::Sender<VerificationEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (routing_tx, _) = broadcast::channel(capacity);
        let (verification_tx, _) = broadcast::channel(capacity);
        Self {
            routing_tx,
            verification_tx,
        }
    }

    pub fn publish_routing(&self, event: RoutingEvent) {
        let _ = self.routing_tx.send(event);
    }

    pub fn publish_verification(&self, event: VerificationEvent) {
        let _ = self.verification_tx.send(event);
    }

    pub fn subscribe_routing(&self) -> RoutingSubscription {
        RoutingSubscription(self.routing_tx.subscribe())
    }

    pub fn subscribe_verification(&self) -> VerificationSubscription {
        VerificationSubscription(self.verification_tx.subscribe())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_routing_events() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe_routing();
        bus.publish_routing(RoutingEvent::Started {
            tx_id: "tx1".to_string(),
        });
        match sub.recv().await {
            Some(RoutingEvent::Started { tx_id }) => assert_eq!(tx_id, "tx1"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn multiple_subscribers_each_receive_the_event() {
        let bus = EventBus::new();
        let mut a = bus.subscribe_verification();
        let mut b = bus.subscribe_verification();
        bus.publish_verification(VerificationEvent::Verified {
            tx_id: "tx2".to_string(),
        });
        assert!(matches!(
            a.recv().await,
            Some(VerificationEvent::Verified { .. })
        ));
        assert!(matches!(
            b.recv().await,
            Some(VerificationEvent::Verified { .. })
        ));
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish_routing(RoutingEvent::Failed {
            tx_id: "tx3".to_string(),
            error: "boom".to_string(),
        });
    }
}
