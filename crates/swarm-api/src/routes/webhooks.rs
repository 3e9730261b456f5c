//! Webhook ingestion: authenticate, normalize, enqueue, acknowledge.
//!
//! The accept path does the minimum synchronous work: verify the
//! signature over the raw body, extract the text, assign a fresh feedback
//! ID, and append to the broker. Everything else happens downstream of the
//! topic. A broker write failure is the only way this path returns 5xx,
//! and in that case nothing was enqueued.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use swarm_core::{FeedbackEvent, FeedbackId, FeedbackOrigin, FeedbackSource};

use crate::error::{ApiError, ApiResult};
use crate::server::AppState;
use crate::verify::WebhookSource;

/// Accepted-for-processing response.
#[derive(Debug, Serialize, Deserialize)]
pub struct AcceptedResponse {
    /// Gateway-assigned feedback identifier.
    pub feedback_id: FeedbackId,
    /// Always `"accepted"`.
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct DiscordWebhookPayload {
    #[serde(default)]
    content: String,
    #[serde(default)]
    author: Option<DiscordAuthor>,
    #[serde(default)]
    channel_id: Option<String>,
    /// Message identifier.
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DiscordAuthor {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlackWebhookPayload {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    challenge: Option<String>,
    #[serde(default)]
    event: Option<SlackEvent>,
}

#[derive(Debug, Deserialize)]
struct SlackEvent {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    ts: Option<String>,
}

/// POST `/webhooks/discord`.
#[tracing::instrument(skip_all)]
pub async fn discord_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    state.verify_webhook(WebhookSource::Discord, &headers, &body)?;

    let payload: DiscordWebhookPayload = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("invalid request body: {e}")))?;

    let author = payload.author.unwrap_or(DiscordAuthor {
        id: None,
        username: None,
    });
    let origin = FeedbackOrigin {
        channel_id: payload.channel_id,
        user_id: author.id.or(author.username),
        message_id: payload.id,
    };
    accept(&state, &payload.content, FeedbackSource::Discord, origin).await
}

/// POST `/webhooks/slack`.
///
/// Handles the URL-verification challenge by echoing it verbatim; event
/// callbacks are normalized and enqueued like any other source.
#[tracing::instrument(skip_all)]
pub async fn slack_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    state.verify_webhook(WebhookSource::Slack, &headers, &body)?;

    let payload: SlackWebhookPayload = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("invalid request body: {e}")))?;

    if payload.kind.as_deref() == Some("url_verification") {
        let challenge = payload
            .challenge
            .ok_or_else(|| ApiError::bad_request("url_verification without a challenge"))?;
        return Ok(Json(serde_json::json!({ "challenge": challenge })).into_response());
    }

    let event = payload.event.unwrap_or(SlackEvent {
        text: None,
        channel: None,
        user: None,
        ts: None,
    });
    let origin = FeedbackOrigin {
        channel_id: event.channel,
        user_id: event.user,
        message_id: event.ts,
    };
    let text = event.text.unwrap_or_default();
    accept(&state, &text, FeedbackSource::Slack, origin).await
}

/// Debug-only test publish endpoint (mounted when `SWARM_DEBUG=true`).
#[derive(Debug, Deserialize)]
pub struct DebugFeedbackRequest {
    /// Feedback text.
    pub text: String,
    /// Optional target channel for the approval prompt.
    #[serde(default)]
    pub channel_id: Option<String>,
    /// Optional author identifier.
    #[serde(default)]
    pub user_id: Option<String>,
}

/// POST `/debug/feedback`.
#[tracing::instrument(skip_all)]
pub async fn debug_feedback(
    State(state): State<AppState>,
    Json(request): Json<DebugFeedbackRequest>,
) -> ApiResult<Response> {
    let origin = FeedbackOrigin {
        channel_id: request.channel_id,
        user_id: request.user_id,
        message_id: None,
    };
    accept(&state, &request.text, FeedbackSource::Direct, origin).await
}

async fn accept(
    state: &AppState,
    text: &str,
    source: FeedbackSource,
    origin: FeedbackOrigin,
) -> ApiResult<Response> {
    if text.trim().is_empty() {
        return Err(ApiError::bad_request("no extractable content in payload"));
    }
    let event = FeedbackEvent::new(text, source, origin)
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let payload = serde_json::to_vec(&event)
        .map_err(|e| ApiError::internal(format!("failed to encode event: {e}")))?;
    state
        .producer
        .publish(&event.feedback_id.to_string(), payload.into())
        .await
        .map_err(|error| {
            tracing::error!(%error, "broker publish failed");
            ApiError::internal("failed to enqueue feedback")
        })?;

    tracing::info!(
        feedback_id = %event.feedback_id,
        source = %event.source,
        "feedback accepted"
    );
    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            feedback_id: event.feedback_id,
            status: "accepted".to_string(),
        }),
    )
        .into_response())
}
