//! Chat interaction callbacks: decode the correlation identifier and
//! signal the target workflow.
//!
//! The in-band response is always a benign acknowledgement; internal
//! failures never leak detail to the chat user, and a decision for an
//! already-finished workflow gets a friendly "no longer needed" note.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;

use swarm_core::parse_correlation;
use swarm_flow::{SignalDelivery, SignalEnvelope};

use crate::error::{ApiError, ApiResult};
use crate::server::AppState;
use crate::verify::WebhookSource;

// Discord interaction types.
const INTERACTION_PING: u8 = 1;
// Response types.
const RESPONSE_PONG: u8 = 1;
const RESPONSE_MESSAGE: u8 = 4;

#[derive(Debug, Deserialize)]
struct InteractionRequest {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    data: Option<InteractionData>,
    #[serde(default)]
    user: Option<InteractionUser>,
    #[serde(default)]
    member: Option<InteractionMember>,
}

#[derive(Debug, Deserialize)]
struct InteractionData {
    #[serde(default)]
    custom_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InteractionUser {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InteractionMember {
    #[serde(default)]
    user: Option<InteractionUser>,
}

fn ack(content: &str) -> Response {
    Json(json!({
        "type": RESPONSE_MESSAGE,
        "data": { "content": content }
    }))
    .into_response()
}

/// POST `/webhooks/interaction`.
#[tracing::instrument(skip_all)]
pub async fn handle_interaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    // Interactions are signed by the same source-A key as its webhooks.
    state.verify_webhook(WebhookSource::Discord, &headers, &body)?;

    let request: InteractionRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("invalid interaction payload: {e}")))?;

    // Liveness probe: respond in kind, no side effects.
    if request.kind == INTERACTION_PING {
        return Ok(Json(json!({ "type": RESPONSE_PONG })).into_response());
    }

    let custom_id = request
        .data
        .as_ref()
        .and_then(|data| data.custom_id.as_deref())
        .ok_or_else(|| ApiError::bad_request("interaction carries no custom_id"))?;

    let (decision, workflow_id) = parse_correlation(custom_id)
        .map_err(|e| ApiError::bad_request(format!("invalid correlation payload: {e}")))?;

    let actor_id = request
        .user
        .as_ref()
        .and_then(|user| user.id.clone())
        .or_else(|| {
            request
                .member
                .as_ref()
                .and_then(|member| member.user.as_ref())
                .and_then(|user| user.id.clone())
        })
        .unwrap_or_else(|| "unknown".to_string());

    let envelope = SignalEnvelope {
        workflow_id,
        decision,
        actor_id,
        interaction_id: request.id,
    };

    let response = match state.engine.signal(envelope).await {
        Ok(SignalDelivery::Accepted | SignalDelivery::Buffered) => {
            ack("Decision recorded. Thank you!")
        }
        Ok(SignalDelivery::Superseded) => {
            ack("A decision was already recorded for this item.")
        }
        Ok(SignalDelivery::NotFound | SignalDelivery::AlreadyCompleted) => {
            ack("This decision is no longer needed.")
        }
        Err(error) => {
            tracing::error!(%error, "signal delivery failed");
            ack("Sorry, something went wrong handling your decision. Please try again.")
        }
    };
    Ok(response)
}
