use std::collections::BTreeSet;
use std::path::Path;

use log::info;
use redb::{Database, ReadableTable, TableDefinition};

use crate::common::errors::{EngineError, EngineResult};
use crate::database::schema::job::{Job, JobId};
use crate::database::schema::route::RouteSchema;
use crate::database::schema::workflow::WorkflowDefinition;

// Rows are serde_json-encoded: the job payload is free-form JSON, so every
// table shares the &str -> &[u8] shape.
pub const JOB_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("jobs");
pub const WORKFLOW_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("workflows");
pub const ROUTE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("routes");

/// Transactional store for jobs, workflow definitions, and route schemas.
/// redb runs a single writer at a time, which is what serializes concurrent
/// merge-then-advance updates for the same job.
pub struct JobStore {
    db: Database,
}

impl JobStore {
    pub fn open(path: impl AsRef<Path>) -> EngineResult<Self> {
        let db = Database::create(path)?;
        let store = Self { db };
        store.provision()?;
        Ok(store)
    }

    /// Backed by memory only; used by tests.
    pub fn in_memory() -> EngineResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        let store = Self { db };
        store.provision()?;
        Ok(store)
    }

    fn provision(&self) -> EngineResult<()> {
        let txn = self.db.begin_write()?;
        let _ = txn.open_table(JOB_TABLE)?;
        let _ = txn.open_table(WORKFLOW_TABLE)?;
        let _ = txn.open_table(ROUTE_TABLE)?;
        txn.commit()?;
        info!("Store tables provisioned.");
        Ok(())
    }

    pub fn put_job(&self, job: &Job) -> EngineResult<()> {
        let key = job.id.to_string();
        let bytes = serde_json::to_vec(job)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(JOB_TABLE)?;
            table.insert(key.as_str(), bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_job(&self, id: &JobId) -> EngineResult<Option<Job>> {
        let key = id.to_string();
        let txn = self.db.begin_read()?;
        let table = txn.open_table(JOB_TABLE)?;
        match table.get(key.as_str())? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Read-modify-write a job inside one write transaction. Returns the
    /// updated row, or None when no job exists for the id. Two concurrent
    /// updates for the same job cannot interleave: the second waits for the
    /// first to commit.
    pub fn update_job<F>(&self, id: &JobId, mutate: F) -> EngineResult<Option<Job>>
    where
        F: FnOnce(&mut Job),
    {
        let key = id.to_string();
        let txn = self.db.begin_write()?;
        let mut updated = None;
        {
            let mut table = txn.open_table(JOB_TABLE)?;
            let existing = match table.get(key.as_str())? {
                Some(guard) => Some(serde_json::from_slice::<Job>(guard.value())?),
                None => None,
            };
            if let Some(mut job) = existing {
                mutate(&mut job);
                job.updated_at = chrono::Utc::now();
                let bytes = serde_json::to_vec(&job)?;
                table.insert(key.as_str(), bytes.as_slice())?;
                updated = Some(job);
            }
        }
        txn.commit()?;
        Ok(updated)
    }

    /// Register a workflow definition. Empty step lists are rejected here so
    /// a bad definition can never reach dispatch.
    pub fn put_workflow(&self, workflow: &WorkflowDefinition) -> EngineResult<()> {
        if workflow.steps.is_empty() {
            return Err(EngineError::InvalidWorkflow(workflow.name.clone()));
        }
        let bytes = serde_json::to_vec(workflow)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(WORKFLOW_TABLE)?;
            table.insert(workflow.name.as_str(), bytes.as_slice())?;
        }
        txn.commit()?;
        info!(
            "Registered workflow '{}' with {} steps.",
            workflow.name,
            workflow.steps.len()
        );
        Ok(())
    }

    pub fn get_workflow(&self, name: &str) -> EngineResult<Option<WorkflowDefinition>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(WORKFLOW_TABLE)?;
        match table.get(name)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    pub fn put_route(&self, route: &RouteSchema) -> EngineResult<()> {
        let bytes = serde_json::to_vec(route)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(ROUTE_TABLE)?;
            table.insert(route.route_id.as_str(), bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_route(&self, route_id: &str) -> EngineResult<Option<RouteSchema>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ROUTE_TABLE)?;
        match table.get(route_id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Union of every response topic across every registered workflow, read
    /// fresh from disk. This gates which consumers exist, so it must never
    /// come from a cache.
    pub fn all_response_topics(&self) -> EngineResult<BTreeSet<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(WORKFLOW_TABLE)?;
        let mut topics = BTreeSet::new();
        for item in table.iter()? {
            let (_, value) = item?;
            let workflow: WorkflowDefinition = serde_json::from_slice(value.value())?;
            for step in &workflow.steps {
                topics.insert(step.response_topic.clone());
            }
        }
        Ok(topics)
    }
}
