use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::info;

use crate::broker::transport::BrokerTransport;
use crate::broker::{Gateway, TopicHandler};
use crate::config::Settings;
use crate::database::ops::JobStore;
use crate::engine::Engine;
use crate::engine::correlator::ResponseCorrelator;
use crate::engine::registry::WorkflowRegistry;

/// Everything the API layer and the shutdown path need a handle on.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub gateway: Arc<Gateway>,
    pub settings: Settings,
}

/// Wire the engine together and bring up one consumer loop per response
/// topic currently known to the store. Registration happens before any loop
/// starts, mirroring the startup order the gateway contract expects.
pub async fn initialize(
    settings: Settings,
    transport: Arc<dyn BrokerTransport>,
) -> Result<AppState> {
    let store = Arc::new(
        JobStore::open(&settings.store_path).with_context(|| {
            format!("Failed to open job store at {:?}", settings.store_path)
        })?,
    );

    let registry = Arc::new(WorkflowRegistry::new(store.clone()));
    let correlator = Arc::new(ResponseCorrelator::new());
    let gateway = Arc::new(Gateway::new(transport));
    let engine = Arc::new(Engine::new(
        store,
        registry.clone(),
        gateway.clone(),
        correlator.clone(),
        settings.dispatch_mode,
    ));

    let topics = registry
        .all_response_topics()
        .context("Failed to enumerate response topics")?;
    info!("Found {} response topics to consume", topics.len());

    for topic in &topics {
        let handler: Arc<dyn TopicHandler> = engine.clone();
        gateway.register_consumer(topic, handler);
    }
    for topic in &topics {
        gateway
            .start_consumer(topic)
            .await
            .with_context(|| format!("Failed to start consumer for topic '{}'", topic))?;
    }

    correlator.spawn_sweeper(Duration::from_secs(settings.waiter_sweep_interval_secs));

    Ok(AppState {
        engine,
        gateway,
        settings,
    })
}
