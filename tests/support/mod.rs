// Shared across the integration test crates; not every crate uses every helper.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::mpsc;

use scribeflow::broker::message::BrokerMessage;
use scribeflow::broker::transport::{BrokerTransport, InProcessBroker};
use scribeflow::broker::{Gateway, TopicHandler};
use scribeflow::config::DispatchMode;
use scribeflow::database::ops::JobStore;
use scribeflow::database::schema::job::JobId;
use scribeflow::database::schema::workflow::{WorkflowDefinition, WorkflowStep};
use scribeflow::engine::Engine;
use scribeflow::engine::correlator::ResponseCorrelator;
use scribeflow::engine::registry::WorkflowRegistry;

pub struct Harness {
    pub store: Arc<JobStore>,
    pub broker: Arc<InProcessBroker>,
    pub gateway: Arc<Gateway>,
    pub engine: Arc<Engine>,
}

pub async fn harness() -> Harness {
    harness_with_mode(DispatchMode::Thin).await
}

pub async fn harness_with_mode(mode: DispatchMode) -> Harness {
    let store = Arc::new(JobStore::in_memory().unwrap());
    let registry = Arc::new(WorkflowRegistry::new(store.clone()));
    let correlator = Arc::new(ResponseCorrelator::new());
    let broker = InProcessBroker::new();
    let gateway = Arc::new(Gateway::new(broker.clone()));
    let engine = Arc::new(Engine::new(
        store.clone(),
        registry,
        gateway.clone(),
        correlator,
        mode,
    ));
    Harness {
        store,
        broker,
        gateway,
        engine,
    }
}

impl Harness {
    pub fn register_workflow(&self, name: &str, steps: &[(&str, &str)]) {
        let steps = steps
            .iter()
            .map(|(dispatch, response)| WorkflowStep::new(*dispatch, *response))
            .collect();
        self.store
            .put_workflow(&WorkflowDefinition::new(name, steps).unwrap())
            .unwrap();
    }

    /// Register the engine as handler and start one consumer loop per topic.
    pub async fn consume(&self, topics: &[&str]) {
        for topic in topics {
            let handler: Arc<dyn TopicHandler> = self.engine.clone();
            self.gateway.register_consumer(topic, handler);
            self.gateway.start_consumer(topic).await.unwrap();
        }
    }

    /// Observe a dispatch topic the way an external worker would.
    pub async fn watch(&self, topic: &str) -> mpsc::Receiver<Vec<u8>> {
        self.broker.subscribe(topic).await.unwrap()
    }

    /// Inject a worker response onto a response topic.
    pub async fn respond(&self, topic: &str, job_id: JobId, fields: Value) {
        let mut message = BrokerMessage::job_ref(job_id);
        if let Value::Object(map) = fields {
            for (key, value) in map {
                message.insert(key, value);
            }
        }
        self.broker
            .send(topic, &job_id.to_string(), message.to_bytes().unwrap())
            .await
            .unwrap();
    }
}

pub fn obj(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected object"),
    }
}

pub async fn recv_message(rx: &mut mpsc::Receiver<Vec<u8>>) -> BrokerMessage {
    let bytes = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for a broker message")
        .expect("subscription closed");
    BrokerMessage::from_bytes(&bytes).unwrap()
}

pub async fn assert_no_message(rx: &mut mpsc::Receiver<Vec<u8>>) {
    let outcome = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
    assert!(outcome.is_err(), "expected no message, but one arrived");
}

/// Poll a condition until it holds or two seconds pass.
pub async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("condition not reached within deadline");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
