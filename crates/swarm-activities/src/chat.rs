//! The chat notify activity (Discord REST).
//!
//! Posts the approval prompt as an embed with approve/reject buttons. The
//! buttons carry `"{decision}:{workflow_id}"` as their `custom_id`; the
//! interaction handler decodes that to signal the right workflow.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};

use swarm_core::{IssueSpec, WorkflowId, encode_correlation, Decision};
use swarm_flow::{ActivityError, NotifyActivity, NotifyInput, NotifyOutcome};

use crate::rate_limit::DestinationLimiter;

/// Maximum rendered body length; longer bodies are truncated with a
/// trailing ellipsis marker.
pub const MAX_BODY_LEN: usize = 4000;

const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";
const ELLIPSIS: &str = "...";

// Discord component constants.
const COMPONENT_ACTION_ROW: u8 = 1;
const COMPONENT_BUTTON: u8 = 2;
const BUTTON_STYLE_SUCCESS: u8 = 3;
const BUTTON_STYLE_DANGER: u8 = 4;

/// Discord-backed notify activity.
pub struct DiscordNotifier {
    http: reqwest::Client,
    token: Option<String>,
    api_base: String,
    limiter: Option<Arc<DestinationLimiter>>,
}

impl DiscordNotifier {
    /// Creates a notifier. A `None` token puts the activity in soft-skip
    /// mode: it succeeds without posting.
    #[must_use]
    pub fn new(token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            token,
            api_base: DEFAULT_API_BASE.to_string(),
            limiter: None,
        }
    }

    /// Overrides the API base URL (tests).
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Attaches a per-destination rate limiter applied before each call.
    #[must_use]
    pub fn with_limiter(mut self, limiter: Arc<DestinationLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }
}

#[async_trait]
impl NotifyActivity for DiscordNotifier {
    #[tracing::instrument(skip(self, input), fields(workflow_id = %input.workflow_id, channel_id = %input.channel_id))]
    async fn notify(&self, input: NotifyInput) -> Result<NotifyOutcome, ActivityError> {
        let Some(token) = self.token.as_deref() else {
            tracing::info!("chat credential absent, soft-skipping notify");
            return Ok(NotifyOutcome::SoftSkipped);
        };
        if input.channel_id.is_empty() {
            tracing::warn!("feedback has no origin channel, soft-skipping notify");
            return Ok(NotifyOutcome::SoftSkipped);
        }

        if let Some(limiter) = &self.limiter {
            limiter.acquire().await;
        }

        let body = json!({
            "embeds": [render_embed(&input.spec, &input.workflow_id)],
            "components": [render_components(&input.workflow_id)],
        });
        let url = format!("{}/channels/{}/messages", self.api_base, input.channel_id);

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bot {token}"))
            .json(&body)
            .send()
            .await
            .map_err(|e| ActivityError::retryable(format!("chat transport error: {e}")))?;

        let status = response.status();
        if status.is_success() {
            let posted: Value = response
                .json()
                .await
                .map_err(|e| ActivityError::retryable(format!("chat response unreadable: {e}")))?;
            let message_id = posted
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            tracing::info!(message_id, "approval prompt posted");
            return Ok(NotifyOutcome::Posted { message_id });
        }

        match status.as_u16() {
            401 | 403 => Err(ActivityError::fatal(format!(
                "chat auth rejected with status {status}"
            ))),
            429 => Err(ActivityError::retryable("chat rate limited".to_string())),
            s if status.is_server_error() => Err(ActivityError::retryable(format!(
                "chat server error {s}"
            ))),
            _ => Err(ActivityError::fatal(format!(
                "chat request rejected with status {status}"
            ))),
        }
    }
}

/// Renders the approval prompt embed.
///
/// Observable contract: emoji-prefixed title, severity color, body
/// truncated to [`MAX_BODY_LEN`], uppercased severity/type fields,
/// comma-joined labels, and the workflow correlation identifier.
#[must_use]
pub fn render_embed(spec: &IssueSpec, workflow_id: &WorkflowId) -> Value {
    let labels: Vec<&str> = spec.labels.iter().map(String::as_str).collect();
    json!({
        "title": format!("{} New Issue Proposed: {}", spec.issue_type.emoji(), spec.title),
        "description": truncate_body(&spec.body),
        "color": spec.severity.color(),
        "fields": [
            { "name": "Severity", "value": spec.severity.as_str().to_uppercase(), "inline": true },
            { "name": "Type", "value": spec.issue_type.as_str().to_uppercase(), "inline": true },
            { "name": "Labels", "value": labels.join(", "), "inline": true },
            { "name": "Workflow ID", "value": workflow_id.as_str(), "inline": false },
        ],
        "footer": { "text": "IterateSwarm AI ChatOps" },
        "timestamp": Utc::now().to_rfc3339(),
    })
}

/// Renders the approve/reject button row.
#[must_use]
pub fn render_components(workflow_id: &WorkflowId) -> Value {
    json!({
        "type": COMPONENT_ACTION_ROW,
        "components": [
            {
                "type": COMPONENT_BUTTON,
                "style": BUTTON_STYLE_SUCCESS,
                "label": "\u{2705} Approve",
                "custom_id": encode_correlation(Decision::Approve, workflow_id),
            },
            {
                "type": COMPONENT_BUTTON,
                "style": BUTTON_STYLE_DANGER,
                "label": "\u{274c} Reject",
                "custom_id": encode_correlation(Decision::Reject, workflow_id),
            },
        ],
    })
}

/// Truncates a body to [`MAX_BODY_LEN`] characters, marking the cut with a
/// trailing ellipsis.
#[must_use]
pub fn truncate_body(body: &str) -> String {
    if body.chars().count() <= MAX_BODY_LEN {
        return body.to_string();
    }
    let mut truncated: String = body.chars().take(MAX_BODY_LEN - ELLIPSIS.len()).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}
