//! Operator projection of workflow state.

use axum::Json;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};

use swarm_core::WorkflowId;

use crate::error::{ApiError, ApiResult};
use crate::server::AppState;

/// GET `/workflows/{workflow_id}`: the read-only Describe projection.
#[tracing::instrument(skip(state))]
pub async fn describe_workflow(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
) -> ApiResult<Response> {
    let workflow_id: WorkflowId = workflow_id
        .parse()
        .map_err(|e: swarm_core::Error| ApiError::bad_request(e.to_string()))?;

    let description = state
        .engine
        .describe(&workflow_id)
        .await
        .map_err(|error| {
            tracing::error!(%error, "describe failed");
            ApiError::internal("failed to read workflow state")
        })?
        .ok_or_else(|| ApiError::not_found(format!("no workflow {workflow_id}")))?;

    Ok(Json(description).into_response())
}
