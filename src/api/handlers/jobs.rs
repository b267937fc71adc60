use std::time::Duration;

use rocket::serde::json::Json;
use rocket::{State, get, post};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::api::{AppResult, map_engine};
use crate::bootstrap::setup::AppState;
use crate::common::errors::EngineError;
use crate::database::schema::job::JobStatus;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobResponse {
    pub job_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub status: JobStatus,
    pub payload: Map<String, Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResultResponse {
    pub job_id: Uuid,
    pub payload: Map<String, Value>,
}

/// Create a job for the workflow behind a route and dispatch it to step 0.
/// Parameters are validated against the route's schema before any job
/// exists; a validation failure creates nothing.
#[post("/jobs/<route_id>", format = "json", data = "<params>")]
pub async fn create_job(
    state: &State<AppState>,
    route_id: &str,
    params: Json<Map<String, Value>>,
) -> AppResult<Json<CreateJobResponse>> {
    let route = state
        .engine
        .registry()
        .resolve_route(route_id)
        .map_err(map_engine)?;
    route.validate(&params).map_err(map_engine)?;

    let job_id = state
        .engine
        .create_and_start_job(&route.workflow_name, params.into_inner())
        .await
        .map_err(map_engine)?;

    Ok(Json(CreateJobResponse { job_id }))
}

/// Same as `create_job`, but blocks for the terminal payload. A timeout is
/// a documented normal outcome: the caller falls back to the status route.
#[post("/jobs/<route_id>/sync?<timeout_secs>", format = "json", data = "<params>")]
pub async fn create_job_sync(
    state: &State<AppState>,
    route_id: &str,
    timeout_secs: Option<u64>,
    params: Json<Map<String, Value>>,
) -> AppResult<Json<Map<String, Value>>> {
    let route = state
        .engine
        .registry()
        .resolve_route(route_id)
        .map_err(map_engine)?;
    route.validate(&params).map_err(map_engine)?;

    let timeout = Duration::from_secs(timeout_secs.unwrap_or(state.settings.sync_timeout_secs));
    let payload = state
        .engine
        .create_job_and_wait(&route.workflow_name, params.into_inner(), timeout)
        .await
        .map_err(map_engine)?;

    Ok(Json(payload))
}

#[get("/jobs/<id>/status")]
pub async fn get_job_status(
    state: &State<AppState>,
    id: &str,
) -> AppResult<Json<JobStatusResponse>> {
    let job_id = parse_job_id(id)?;
    let (status, payload) = state.engine.job_status(job_id).map_err(map_engine)?;
    Ok(Json(JobStatusResponse { status, payload }))
}

/// Synchronous wait on an already-created job.
#[get("/jobs/<id>/result?<timeout_secs>")]
pub async fn get_job_result(
    state: &State<AppState>,
    id: &str,
    timeout_secs: Option<u64>,
) -> AppResult<Json<SyncResultResponse>> {
    let job_id = parse_job_id(id)?;
    let timeout = Duration::from_secs(timeout_secs.unwrap_or(state.settings.sync_timeout_secs));
    let payload = state
        .engine
        .request_synchronous_result(job_id, timeout)
        .await
        .map_err(map_engine)?;
    Ok(Json(SyncResultResponse { job_id, payload }))
}

fn parse_job_id(raw: &str) -> Result<Uuid, crate::api::AppError> {
    raw.parse()
        .map_err(|_| map_engine(EngineError::Validation(format!("invalid job id '{}'", raw))))
}

pub fn generate_job_routes() -> Vec<rocket::Route> {
    rocket::routes![create_job, create_job_sync, get_job_status, get_job_result]
}
