mod support;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use scribeflow::broker::message::BrokerMessage;
use scribeflow::broker::transport::{BrokerTransport, InProcessBroker};
use scribeflow::broker::{Gateway, TopicHandler};
use scribeflow::common::errors::EngineError;

use support::wait_until;

struct CountingHandler {
    calls: AtomicUsize,
    fail_first: bool,
}

impl CountingHandler {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail_first: false,
        })
    }

    fn failing_first() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail_first: true,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TopicHandler for CountingHandler {
    async fn on_message(&self, _topic: &str, _message: BrokerMessage) -> anyhow::Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_first && call == 0 {
            anyhow::bail!("simulated handler failure");
        }
        Ok(())
    }
}

struct SlowHandler {
    started: AtomicBool,
    finished: AtomicBool,
}

#[async_trait]
impl TopicHandler for SlowHandler {
    async fn on_message(&self, _topic: &str, _message: BrokerMessage) -> anyhow::Result<()> {
        self.started.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;
        self.finished.store(true, Ordering::SeqCst);
        Ok(())
    }
}

async fn publish(broker: &InProcessBroker, topic: &str, message: &BrokerMessage) {
    broker
        .send(topic, "key", message.to_bytes().unwrap())
        .await
        .unwrap();
}

#[tokio::test]
async fn poisoned_messages_never_halt_the_loop() {
    let broker = InProcessBroker::new();
    let gateway = Gateway::new(broker.clone());
    let handler = CountingHandler::new();

    gateway.register_consumer("r1", handler.clone());
    gateway.start_consumer("r1").await.unwrap();

    // Undecodable bytes are logged and dropped.
    broker.send("r1", "key", b"not json".to_vec()).await.unwrap();
    publish(&broker, "r1", &BrokerMessage::job_ref(Uuid::new_v4())).await;

    wait_until(|| handler.calls() == 1).await;
    gateway.stop_all().await;
}

#[tokio::test]
async fn handler_errors_do_not_stop_consumption() {
    let broker = InProcessBroker::new();
    let gateway = Gateway::new(broker.clone());
    let handler = CountingHandler::failing_first();

    gateway.register_consumer("r1", handler.clone());
    gateway.start_consumer("r1").await.unwrap();

    publish(&broker, "r1", &BrokerMessage::job_ref(Uuid::new_v4())).await;
    publish(&broker, "r1", &BrokerMessage::job_ref(Uuid::new_v4())).await;

    wait_until(|| handler.calls() == 2).await;
    gateway.stop_all().await;
}

#[tokio::test]
async fn re_registration_of_an_active_topic_is_a_no_op() {
    let broker = InProcessBroker::new();
    let gateway = Gateway::new(broker.clone());
    let original = CountingHandler::new();
    let usurper = CountingHandler::new();

    gateway.register_consumer("r1", original.clone());
    gateway.start_consumer("r1").await.unwrap();

    // Both the handler swap and the second start are warn + no-op.
    gateway.register_consumer("r1", usurper.clone());
    gateway.start_consumer("r1").await.unwrap();

    publish(&broker, "r1", &BrokerMessage::job_ref(Uuid::new_v4())).await;

    wait_until(|| original.calls() == 1).await;
    assert_eq!(usurper.calls(), 0);
    gateway.stop_all().await;
    // Exactly one loop consumed the message.
    assert_eq!(original.calls(), 1);
}

#[tokio::test]
async fn starting_without_a_handler_is_an_error() {
    let broker = InProcessBroker::new();
    let gateway = Gateway::new(broker.clone());

    let result = gateway.start_consumer("unregistered").await;
    assert!(matches!(result, Err(EngineError::NotFound(_))));
}

#[tokio::test]
async fn stop_all_waits_for_the_in_flight_handler() {
    let broker = InProcessBroker::new();
    let gateway = Gateway::new(broker.clone());
    let handler = Arc::new(SlowHandler {
        started: AtomicBool::new(false),
        finished: AtomicBool::new(false),
    });

    gateway.register_consumer("r1", handler.clone());
    gateway.start_consumer("r1").await.unwrap();

    publish(&broker, "r1", &BrokerMessage::job_ref(Uuid::new_v4())).await;
    wait_until(|| handler.started.load(Ordering::SeqCst)).await;

    // The loop must finish its current message before stop_all returns.
    gateway.stop_all().await;
    assert!(handler.finished.load(Ordering::SeqCst));
}
