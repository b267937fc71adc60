use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use log::info;

use crate::common::errors::{EngineError, EngineResult};
use crate::database::ops::JobStore;
use crate::database::schema::route::RouteSchema;
use crate::database::schema::workflow::WorkflowDefinition;

/// Cache-first resolution of workflow definitions and route schemas. The two
/// caches are independent namespaces; entries never expire on their own and
/// are cleared only by `invalidate`, when the authoring store changes.
pub struct WorkflowRegistry {
    store: Arc<JobStore>,
    workflows: DashMap<String, Arc<WorkflowDefinition>>,
    routes: DashMap<String, Arc<RouteSchema>>,
}

impl WorkflowRegistry {
    pub fn new(store: Arc<JobStore>) -> Self {
        Self {
            store,
            workflows: DashMap::new(),
            routes: DashMap::new(),
        }
    }

    pub fn resolve_workflow(&self, name: &str) -> EngineResult<Arc<WorkflowDefinition>> {
        if let Some(cached) = self.workflows.get(name) {
            return Ok(cached.value().clone());
        }
        let workflow = self
            .store
            .get_workflow(name)?
            .ok_or_else(|| EngineError::NotFound(format!("workflow '{}'", name)))?;
        let workflow = Arc::new(workflow);
        info!(
            "Loaded workflow '{}' with {} steps.",
            name,
            workflow.steps.len()
        );
        self.workflows.insert(name.to_string(), workflow.clone());
        Ok(workflow)
    }

    pub fn resolve_route(&self, route_id: &str) -> EngineResult<Arc<RouteSchema>> {
        if let Some(cached) = self.routes.get(route_id) {
            return Ok(cached.value().clone());
        }
        let route = self
            .store
            .get_route(route_id)?
            .ok_or_else(|| EngineError::NotFound(format!("route '{}'", route_id)))?;
        let route = Arc::new(route);
        self.routes.insert(route_id.to_string(), route.clone());
        Ok(route)
    }

    /// Clear both caches. Each namespace clears atomically; subsequent
    /// lookups go back to the store.
    pub fn invalidate(&self) {
        self.workflows.clear();
        self.routes.clear();
        info!("Workflow and route cache cleared.");
    }

    /// Always computed fresh from the store, never from the cache, since it
    /// gates which consumers exist.
    pub fn all_response_topics(&self) -> EngineResult<BTreeSet<String>> {
        self.store.all_response_topics()
    }
}
