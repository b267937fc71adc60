use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use log::debug;
use tokio::sync::mpsc;

use crate::common::errors::EngineResult;

const SUBSCRIBER_CHANNEL_CAPACITY: usize = 64;

/// The seam between the engine and whatever broker carries its traffic.
/// `send` must resolve only once the broker has accepted the message; a
/// Kafka or NATS client slots in behind this same trait.
#[async_trait]
pub trait BrokerTransport: Send + Sync {
    async fn send(&self, topic: &str, key: &str, payload: Vec<u8>) -> EngineResult<()>;

    async fn subscribe(&self, topic: &str) -> EngineResult<mpsc::Receiver<Vec<u8>>>;
}

/// In-process topic bus: one mpsc channel per subscriber, fan-out per topic.
/// Per-key ordering holds trivially because each subscriber sees the publish
/// order. Publishing to a topic nobody subscribes to succeeds, as it would
/// against a real broker.
#[derive(Default)]
pub struct InProcessBroker {
    topics: DashMap<String, Vec<mpsc::Sender<Vec<u8>>>>,
}

impl InProcessBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl BrokerTransport for InProcessBroker {
    async fn send(&self, topic: &str, _key: &str, payload: Vec<u8>) -> EngineResult<()> {
        // Clone the sender list so the map shard is not held across awaits.
        let senders = match self.topics.get(topic) {
            Some(entry) => entry.value().clone(),
            None => {
                debug!("No subscribers on topic '{}'", topic);
                return Ok(());
            }
        };
        for sender in senders {
            // A closed subscriber is not a delivery failure; it simply left.
            let _ = sender.send(payload.clone()).await;
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> EngineResult<mpsc::Receiver<Vec<u8>>> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        let mut entry = self.topics.entry(topic.to_string()).or_default();
        entry.retain(|sender| !sender.is_closed());
        entry.push(tx);
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fan_out_reaches_every_subscriber_in_order() {
        let broker = InProcessBroker::new();
        let mut first = broker.subscribe("t1").await.unwrap();
        let mut second = broker.subscribe("t1").await.unwrap();

        broker.send("t1", "k", b"a".to_vec()).await.unwrap();
        broker.send("t1", "k", b"b".to_vec()).await.unwrap();

        assert_eq!(first.recv().await.unwrap(), b"a");
        assert_eq!(first.recv().await.unwrap(), b"b");
        assert_eq!(second.recv().await.unwrap(), b"a");
        assert_eq!(second.recv().await.unwrap(), b"b");
    }

    #[tokio::test]
    async fn publish_without_subscribers_succeeds() {
        let broker = InProcessBroker::new();
        broker.send("nobody", "k", b"x".to_vec()).await.unwrap();
    }
}
