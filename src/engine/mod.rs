pub mod correlator;
pub mod registry;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{error, info, warn};
use serde_json::{Map, Value};

use crate::broker::message::BrokerMessage;
use crate::broker::{Gateway, TopicHandler};
use crate::common::errors::{EngineError, EngineResult};
use crate::config::DispatchMode;
use crate::database::ops::JobStore;
use crate::database::schema::job::{Job, JobId, JobStatus};
use crate::database::schema::workflow::WorkflowStep;
use crate::engine::correlator::ResponseCorrelator;
use crate::engine::registry::WorkflowRegistry;

/// What a single response did to its job, decided inside the store's write
/// transaction so concurrent duplicates cannot both advance the cursor.
enum ResponseOutcome {
    /// Merged fields only: the job was terminal or the response topic does
    /// not match the current step (stale or duplicate delivery).
    MergedOnly,
    /// Cursor moved to this step index; a dispatch follows.
    Advanced(usize),
    /// Last step answered; the job is done.
    Completed,
}

/// The orchestration driver: owns the per-job step state machine and ties
/// the registry, store, gateway, and correlator together.
pub struct Engine {
    store: Arc<JobStore>,
    registry: Arc<WorkflowRegistry>,
    gateway: Arc<Gateway>,
    correlator: Arc<ResponseCorrelator>,
    dispatch_mode: DispatchMode,
}

impl Engine {
    pub fn new(
        store: Arc<JobStore>,
        registry: Arc<WorkflowRegistry>,
        gateway: Arc<Gateway>,
        correlator: Arc<ResponseCorrelator>,
        dispatch_mode: DispatchMode,
    ) -> Self {
        Self {
            store,
            registry,
            gateway,
            correlator,
            dispatch_mode,
        }
    }

    pub fn registry(&self) -> &Arc<WorkflowRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn correlator(&self) -> &Arc<ResponseCorrelator> {
        &self.correlator
    }

    /// Persist a fresh job and send it to step 0 of its workflow.
    pub async fn create_and_start_job(
        &self,
        workflow_name: &str,
        initial_payload: Map<String, Value>,
    ) -> EngineResult<JobId> {
        let job = Job::new(workflow_name, initial_payload);
        let job_id = job.id;
        self.store.put_job(&job)?;
        self.start_job(job).await?;
        Ok(job_id)
    }

    /// Like `create_and_start_job`, but registers a waiter before dispatch
    /// and blocks for the terminal payload. Registration-before-dispatch
    /// closes the race where the response beats the registration.
    pub async fn create_job_and_wait(
        &self,
        workflow_name: &str,
        initial_payload: Map<String, Value>,
        timeout: Duration,
    ) -> EngineResult<Map<String, Value>> {
        let job = Job::new(workflow_name, initial_payload);
        let job_id = job.id;
        self.store.put_job(&job)?;
        let handle = self.correlator.register_waiter(job_id);
        self.start_job(job).await?;

        // An unresolvable workflow parks the job in Error without dispatch;
        // fail fast instead of letting the caller wait out the deadline.
        if let Some(current) = self.store.get_job(&job_id)? {
            if current.status == JobStatus::Error {
                self.correlator.forget(job_id);
                return Err(EngineError::NotFound(format!(
                    "workflow '{}'",
                    workflow_name
                )));
            }
        }

        self.correlator.wait(handle, timeout).await
    }

    /// Dispatch a job to step 0. A workflow that does not resolve parks the
    /// job in Error and publishes nothing.
    pub async fn start_job(&self, job: Job) -> EngineResult<()> {
        let workflow = match self.registry.resolve_workflow(&job.workflow_name) {
            Ok(workflow) => workflow,
            Err(EngineError::NotFound(_)) => {
                error!(
                    "No workflow found for '{}'; job {} marked as error",
                    job.workflow_name, job.id
                );
                self.store.update_job(&job.id, |job| {
                    job.status = JobStatus::Error;
                })?;
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        let step = workflow
            .step(0)
            .ok_or_else(|| EngineError::InvalidWorkflow(job.workflow_name.clone()))?;
        self.dispatch(&job, step, 0).await?;
        info!(
            "Started job {} with workflow '{}'",
            job.id, job.workflow_name
        );
        Ok(())
    }

    /// Handle a response from any subscribed topic: correlate it to its job,
    /// merge recognized fields, then advance or finalize. Malformed or
    /// uncorrelated responses are logged and dropped, never raised -- the
    /// broker is at-least-once and strays are expected traffic.
    pub async fn on_response(&self, topic: &str, message: BrokerMessage) -> EngineResult<()> {
        let Some(job_id) = message.job_id() else {
            warn!("Received response on topic '{}' without job id", topic);
            return Ok(());
        };

        // Workflow lookup needs the job's name; responses for jobs this
        // engine no longer knows about are dropped without store mutation.
        let Some(job) = self.store.get_job(&job_id)? else {
            warn!("Job not found for id {} (topic '{}')", job_id, topic);
            return Ok(());
        };

        let workflow = match self.registry.resolve_workflow(&job.workflow_name) {
            Ok(workflow) => workflow,
            Err(EngineError::NotFound(_)) => {
                // A terminal job stays terminal; a late duplicate arriving
                // after its workflow was unregistered must not corrupt it.
                if job.status.is_terminal() {
                    warn!(
                        "Dropping response for terminal job {} whose workflow '{}' is gone",
                        job_id, job.workflow_name
                    );
                    return Ok(());
                }
                error!(
                    "Workflow '{}' vanished; job {} marked as error",
                    job.workflow_name, job_id
                );
                self.store.update_job(&job_id, |job| {
                    if !job.status.is_terminal() {
                        job.status = JobStatus::Error;
                    }
                })?;
                self.correlator.fail(
                    job_id,
                    EngineError::NotFound(format!("workflow '{}'", job.workflow_name)),
                );
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        // Merge and decide inside one write transaction; redb's single
        // writer serializes concurrent responses for the same job.
        let mut outcome = ResponseOutcome::MergedOnly;
        let updated = self.store.update_job(&job_id, |job| {
            job.merge_response(message.fields());
            if job.status.is_terminal() {
                return;
            }
            let at_current_step = workflow
                .step(job.step_index)
                .is_some_and(|step| step.response_topic == topic);
            if !at_current_step {
                return;
            }
            if workflow.is_last_step(job.step_index) {
                job.status = JobStatus::Done;
                outcome = ResponseOutcome::Completed;
            } else {
                job.step_index += 1;
                outcome = ResponseOutcome::Advanced(job.step_index);
            }
        })?;

        let Some(job) = updated else {
            // Deleted between the load and the update; same stray-response rule.
            warn!("Job {} disappeared while processing response", job_id);
            return Ok(());
        };

        match outcome {
            ResponseOutcome::MergedOnly => {
                info!(
                    topic = topic;
                    "Merged response into job {} without advancing (step {}, status {})",
                    job.id, job.step_index, job.status
                );
                Ok(())
            }
            ResponseOutcome::Completed => {
                info!("Workflow complete for job {}", job.id);
                self.correlator.resolve(job.id, job.payload);
                Ok(())
            }
            ResponseOutcome::Advanced(next_step) => {
                let step = workflow
                    .step(next_step)
                    .ok_or_else(|| EngineError::InvalidWorkflow(job.workflow_name.clone()))?;
                self.dispatch(&job, step, next_step).await?;
                info!("Advanced job {} to step {}", job.id, next_step);
                Ok(())
            }
        }
    }

    pub fn job_status(&self, job_id: JobId) -> EngineResult<(JobStatus, Map<String, Value>)> {
        let job = self
            .store
            .get_job(&job_id)?
            .ok_or_else(|| EngineError::NotFound(format!("job '{}'", job_id)))?;
        Ok((job.status, job.payload))
    }

    /// Block for the terminal payload of an already-created job. Returns
    /// immediately when the job is already terminal.
    pub async fn request_synchronous_result(
        &self,
        job_id: JobId,
        timeout: Duration,
    ) -> EngineResult<Map<String, Value>> {
        // Register first, then check: a response landing between the check
        // and the registration would otherwise be missed.
        let handle = self.correlator.register_waiter(job_id);
        let (status, payload) = match self.job_status(job_id) {
            Ok(current) => current,
            Err(err) => {
                self.correlator.forget(job_id);
                return Err(err);
            }
        };
        if status.is_terminal() {
            self.correlator.forget(job_id);
            return Ok(payload);
        }
        self.correlator.wait(handle, timeout).await
    }

    async fn dispatch(&self, job: &Job, step: &WorkflowStep, step_index: usize) -> EngineResult<()> {
        let message = match self.dispatch_mode {
            DispatchMode::Thin => BrokerMessage::job_ref(job.id),
            DispatchMode::Fat => BrokerMessage::with_payload(job.id, &job.payload),
        };
        let key = job.id.to_string();
        self.gateway
            .publish(&step.dispatch_topic, &key, &message)
            .await?;
        info!(
            topic = step.dispatch_topic.as_str();
            "Sent job {} to step {}", job.id, step_index
        );
        Ok(())
    }
}

/// Every subscribed response topic funnels into `on_response`.
#[async_trait]
impl TopicHandler for Engine {
    async fn on_message(&self, topic: &str, message: BrokerMessage) -> anyhow::Result<()> {
        self.on_response(topic, message).await?;
        Ok(())
    }
}
