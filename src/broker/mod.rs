pub mod message;
pub mod transport;

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use log::{error, info, warn};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;

use crate::broker::message::BrokerMessage;
use crate::broker::transport::BrokerTransport;
use crate::common::errors::{EngineError, EngineResult};

/// Receives decoded messages from a topic's consumer loop. Handlers must be
/// idempotent: the broker model is at-least-once and duplicates are expected
/// traffic.
#[async_trait]
pub trait TopicHandler: Send + Sync {
    async fn on_message(&self, topic: &str, message: BrokerMessage) -> anyhow::Result<()>;
}

/// The engine's single doorway to the broker: keyed publishing plus one
/// long-lived consumer loop per registered topic.
pub struct Gateway {
    transport: Arc<dyn BrokerTransport>,
    handlers: DashMap<String, Arc<dyn TopicHandler>>,
    running: DashSet<String>,
    loops: Mutex<Vec<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Gateway {
    pub fn new(transport: Arc<dyn BrokerTransport>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            transport,
            handlers: DashMap::new(),
            running: DashSet::new(),
            loops: Mutex::new(Vec::new()),
            shutdown_tx,
        }
    }

    /// Serialize and send one message, keyed so the broker preserves per-job
    /// order. Resolves only after the transport acknowledges; the engine
    /// never retries on its own.
    pub async fn publish(
        &self,
        topic: &str,
        key: &str,
        message: &BrokerMessage,
    ) -> EngineResult<()> {
        let bytes = message
            .to_bytes()
            .map_err(|err| EngineError::Delivery(format!("failed to encode message: {}", err)))?;
        self.transport.send(topic, key, bytes).await
    }

    /// Associate a handler with a topic. Re-registration for a topic whose
    /// loop is already running is a no-op with a warning, not an error.
    pub fn register_consumer(&self, topic: &str, handler: Arc<dyn TopicHandler>) {
        if self.running.contains(topic) {
            warn!("Consumer for topic '{}' already exists", topic);
            return;
        }
        self.handlers.insert(topic.to_string(), handler);
    }

    /// Begin the dedicated polling loop for a topic. Requires a registered
    /// handler; starting an already-running topic is a warn + no-op.
    pub async fn start_consumer(&self, topic: &str) -> EngineResult<()> {
        let handler = self
            .handlers
            .get(topic)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EngineError::NotFound(format!("handler for topic '{}'", topic)))?;

        if !self.running.insert(topic.to_string()) {
            warn!("Consumer for topic '{}' already exists", topic);
            return Ok(());
        }

        let receiver = match self.transport.subscribe(topic).await {
            Ok(receiver) => receiver,
            Err(err) => {
                self.running.remove(topic);
                return Err(err);
            }
        };
        let shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(run_consumer_loop(
            topic.to_string(),
            receiver,
            handler,
            shutdown_rx,
        ));
        self.loops.lock().await.push(handle);
        info!("Started consumer for topic '{}'", topic);
        Ok(())
    }

    /// Signal every loop to exit after its current message and return once
    /// all of them have. No dangling consumers survive this call.
    pub async fn stop_all(&self) {
        let _ = self.shutdown_tx.send(true);
        let handles: Vec<JoinHandle<()>> = self.loops.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        self.running.clear();
        info!("All consumer loops stopped.");
    }
}

/// One poisoned message must never halt the subscription: decode failures
/// are logged and dropped, handler errors are logged and the loop moves on.
async fn run_consumer_loop(
    topic: String,
    mut receiver: mpsc::Receiver<Vec<u8>>,
    handler: Arc<dyn TopicHandler>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            maybe = receiver.recv() => {
                match maybe {
                    Some(bytes) => match BrokerMessage::from_bytes(&bytes) {
                        Ok(message) => {
                            if let Err(err) = handler.on_message(&topic, message).await {
                                error!("Handler failed on topic '{}': {:?}", topic, err);
                            }
                        }
                        Err(err) => {
                            warn!("Dropping undecodable message on topic '{}': {}", topic, err);
                        }
                    },
                    None => {
                        warn!("Subscription stream for topic '{}' ended", topic);
                        break;
                    }
                }
            }
            _ = shutdown_rx.changed() => {
                info!("Shutdown signal, stopping consumer for topic '{}'", topic);
                break;
            }
        }
    }
}
