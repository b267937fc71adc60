use std::sync::Arc;

use log::info;
use rocket::serde::json::Json;
use rocket::{State, post, put};
use serde::Serialize;

use crate::api::{AppResult, map_engine};
use crate::bootstrap::setup::AppState;
use crate::database::schema::route::RouteSchema;
use crate::database::schema::workflow::WorkflowDefinition;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredResponse {
    pub name: String,
}

/// The configuration-authority edge: register or replace a workflow
/// definition. Empty step lists are rejected before anything is stored.
/// Consumers for any new response topics start immediately; the loop for an
/// already-consumed topic is left untouched.
#[put("/system/workflows", format = "json", data = "<workflow>")]
pub async fn put_workflow(
    state: &State<AppState>,
    workflow: Json<WorkflowDefinition>,
) -> AppResult<Json<RegisteredResponse>> {
    let workflow = workflow.into_inner();
    state.engine.store().put_workflow(&workflow).map_err(map_engine)?;
    state.engine.registry().invalidate();

    for step in &workflow.steps {
        let handler: Arc<dyn crate::broker::TopicHandler> = state.engine.clone();
        state.gateway.register_consumer(&step.response_topic, handler);
        state
            .gateway
            .start_consumer(&step.response_topic)
            .await
            .map_err(map_engine)?;
    }

    Ok(Json(RegisteredResponse {
        name: workflow.name,
    }))
}

#[put("/system/routes", format = "json", data = "<route>")]
pub async fn put_route(
    state: &State<AppState>,
    route: Json<RouteSchema>,
) -> AppResult<Json<RegisteredResponse>> {
    let route = route.into_inner();
    state.engine.store().put_route(&route).map_err(map_engine)?;
    state.engine.registry().invalidate();
    Ok(Json(RegisteredResponse {
        name: route.route_id,
    }))
}

/// Explicit cache invalidation, for when the authoring store was changed
/// out of band.
#[post("/system/invalidate-cache")]
pub async fn invalidate_cache(state: &State<AppState>) -> AppResult<()> {
    state.engine.registry().invalidate();
    info!("Cache invalidation requested via API");
    Ok(())
}

pub fn generate_system_routes() -> Vec<rocket::Route> {
    rocket::routes![put_workflow, put_route, invalidate_cache]
}
