use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::auction::Event;
use crate::time_service::TimeService;

/// Bound on a subscriber's outbound queue; beyond this, the subscriber is
/// considered unresponsive and dropped rather than let it lag the hub.
pub const QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    AuctionUpdate { data: Event, send_time: i64 },
    Ping { send_time: i64 },
}

pub struct Subscriber {
    pub id: Uuid,
    pub tx: mpsc::Sender<Envelope>,
}

/// Owns the subscriber set; writers are accept/close, readers are the
/// broadcaster. Guarded by a `parking_lot::RwLock` per the concurrency
/// model — the lock is held only long enough to clone the sender list or
/// insert/remove an entry, never across an actual send.
pub struct SubscriptionHub {
    subscribers: RwLock<HashMap<Uuid, Subscriber>>,
    time: Arc<TimeService>,
}

impl SubscriptionHub {
    pub fn new(time: Arc<TimeService>) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            time,
        }
    }

    pub fn register(&self) -> (Uuid, mpsc::Receiver<Envelope>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        self.subscribers.write().insert(id, Subscriber { id, tx });
        (id, rx)
    }

    pub fn remove(&self, id: Uuid) {
        self.subscribers.write().remove(&id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Broadcasts an auction event to every registered subscriber.
    /// Non-blocking per subscriber: a full queue means the subscriber is
    /// dropped immediately rather than the broadcaster waiting on it.
    pub async fn broadcast(&self, event: Event) {
        let envelope = Envelope::AuctionUpdate {
            data: event,
            send_time: self.time.trusted_now_ns(),
        };
        self.fan_out(envelope).await;
    }

    async fn fan_out(&self, envelope: Envelope) {
        let senders: Vec<(Uuid, mpsc::Sender<Envelope>)> = self
            .subscribers
            .read()
            .values()
            .map(|s| (s.id, s.tx.clone()))
            .collect();

        let mut dead = Vec::new();
        for (id, tx) in senders {
            if tx.try_send(envelope.clone()).is_err() {
                dead.push(id);
            }
        }
        if !dead.is_empty() {
            let mut subscribers = self.subscribers.write();
            for id in dead {
                subscribers.remove(&id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_service::TimeService;

    fn new_hub() -> SubscriptionHub {
        SubscriptionHub::new(TimeService::for_test())
    }

    #[tokio::test]
    async fn broadcast_delivers_to_registered_subscriber() {
        let hub = new_hub();
        let (_id, mut rx) = hub.register();
        hub.broadcast(Event::AuctionCreated { auction_id: 1, send_time: 0 }).await;
        let received = rx.recv().await.unwrap();
        assert!(matches!(received, Envelope::AuctionUpdate { .. }));
    }

    #[tokio::test]
    async fn full_queue_drops_the_subscriber_not_the_broadcast() {
        let hub = new_hub();
        let (id, _rx) = hub.register();
        // Fill the queue without draining it.
        for i in 0..(QUEUE_CAPACITY + 1) {
            hub.broadcast(Event::AuctionCreated { auction_id: i as i64, send_time: 0 }).await;
        }
        assert_eq!(hub.subscriber_count(), 0, "overflowed subscriber should be dropped");
        let _ = id;
    }

    #[tokio::test]
    async fn delivered_events_preserve_broadcast_order() {
        let hub = new_hub();
        let (_id, mut rx) = hub.register();
        for i in 0..10 {
            hub.broadcast(Event::AuctionCreated { auction_id: i, send_time: 0 }).await;
        }
        for expected in 0..10 {
            let received = rx.recv().await.unwrap();
            match received {
                Envelope::AuctionUpdate { data: Event::AuctionCreated { auction_id, .. }, .. } => {
                    assert_eq!(auction_id, expected);
                }
                other => panic!("unexpected envelope: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn remove_drops_subscriber() {
        let hub = new_hub();
        let (id, _rx) = hub.register();
        assert_eq!(hub.subscriber_count(), 1);
        hub.remove(id);
        assert_eq!(hub.subscriber_count(), 0);
    }
}
