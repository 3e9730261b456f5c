//! The activity boundary between the orchestrator and side-effectful work.
//!
//! Activities receive flat value structs and return flat results; they never
//! hold references into workflow state and re-acquire any external handles
//! per invocation. Errors are classified at this boundary; the workflow
//! decides retry versus terminate.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use swarm_core::{AnalysisResult, FeedbackSource, IssueSpec, RetryPolicy, WorkflowId};

/// A classified activity failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ActivityError {
    /// Transient dependency failure: transport error, 5xx, quota, timeout.
    /// The workflow retries with backoff.
    #[error("retryable: {message}")]
    Retryable {
        /// Description of the failure.
        message: String,
    },

    /// Permanent failure: invalid input, auth denied. No retry.
    #[error("fatal: {message}")]
    Fatal {
        /// Description of the failure.
        message: String,
    },
}

impl ActivityError {
    /// Creates a retryable error.
    #[must_use]
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::Retryable {
            message: message.into(),
        }
    }

    /// Creates a fatal error.
    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    /// Returns true if the workflow should retry.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }
}

/// Input to the analyze activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeInput {
    /// Raw feedback text.
    pub text: String,
    /// Which platform the feedback came from.
    pub source: FeedbackSource,
    /// Platform identifier of the author, when known.
    pub user_id: Option<String>,
}

/// Input to the chat notify activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyInput {
    /// Channel to post the approval prompt in.
    pub channel_id: String,
    /// The proposed issue spec.
    pub spec: IssueSpec,
    /// Workflow the approve/reject controls must target.
    pub workflow_id: WorkflowId,
}

/// Outcome of the chat notify activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// A prompt was posted.
    Posted {
        /// Chat message identifier.
        message_id: String,
    },
    /// Credentials are absent; the activity succeeded without posting.
    SoftSkipped,
}

/// Input to the tracker publish activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishInput {
    /// The approved issue spec.
    pub spec: IssueSpec,
    /// Deterministic idempotency token derived from the feedback ID.
    pub idempotency_token: String,
}

impl PublishInput {
    /// Derives the idempotency token for a feedback item.
    ///
    /// The token is the stable marker external systems use to collapse
    /// duplicate writes; it must never change format once issues carrying
    /// it exist.
    #[must_use]
    pub fn token_for(feedback_id: swarm_core::FeedbackId) -> String {
        format!("swarm-feedback:{feedback_id}")
    }
}

/// Outcome of the tracker publish activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// An issue exists for this feedback (created now or recovered).
    Published {
        /// Tracker URL of the issue.
        url: String,
    },
    /// Credentials are absent; the activity succeeded without publishing.
    SoftSkipped,
}

/// The analyze activity: consult the external analyzer.
#[async_trait]
pub trait AnalyzeActivity: Send + Sync {
    /// Analyzes one feedback item.
    async fn analyze(&self, input: AnalyzeInput) -> Result<AnalysisResult, ActivityError>;
}

/// The notify activity: post an approval prompt to chat.
#[async_trait]
pub trait NotifyActivity: Send + Sync {
    /// Posts the approval prompt.
    async fn notify(&self, input: NotifyInput) -> Result<NotifyOutcome, ActivityError>;
}

/// The publish activity: create a tracker issue.
#[async_trait]
pub trait PublishActivity: Send + Sync {
    /// Publishes the approved issue.
    async fn publish(&self, input: PublishInput) -> Result<PublishOutcome, ActivityError>;
}

/// The set of activity implementations the engine drives.
#[derive(Clone)]
pub struct ActivitySet {
    /// Analyzer RPC activity.
    pub analyze: Arc<dyn AnalyzeActivity>,
    /// Chat notify activity.
    pub notify: Arc<dyn NotifyActivity>,
    /// Tracker publish activity.
    pub publish: Arc<dyn PublishActivity>,
}

impl fmt::Debug for ActivitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivitySet").finish_non_exhaustive()
    }
}

/// Runs an activity attempt function under the retry policy.
///
/// Each attempt is bounded by `start_to_close`; a timed-out attempt counts
/// as retryable. Returns the first success, the first fatal error, or the
/// last retryable error once attempts are exhausted.
#[tracing::instrument(skip(policy, start_to_close, attempt_fn), fields(activity = name))]
pub async fn run_with_retry<T, F, Fut>(
    name: &str,
    policy: RetryPolicy,
    start_to_close: Duration,
    attempt_fn: F,
) -> Result<T, ActivityError>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<T, ActivityError>>,
{
    let mut attempt: u32 = 1;
    loop {
        let outcome = match tokio::time::timeout(start_to_close, attempt_fn(attempt)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ActivityError::retryable(format!(
                "attempt {attempt} exceeded start-to-close timeout of {start_to_close:?}"
            ))),
        };

        match outcome {
            Ok(value) => {
                metrics::counter!("swarm_activity_attempts_total", "activity" => name.to_string(), "outcome" => "ok")
                    .increment(1);
                return Ok(value);
            }
            Err(err @ ActivityError::Fatal { .. }) => {
                metrics::counter!("swarm_activity_attempts_total", "activity" => name.to_string(), "outcome" => "fatal")
                    .increment(1);
                return Err(err);
            }
            Err(err @ ActivityError::Retryable { .. }) => {
                metrics::counter!("swarm_activity_attempts_total", "activity" => name.to_string(), "outcome" => "retryable")
                    .increment(1);
                match policy.delay_after(attempt) {
                    Some(delay) => {
                        tracing::warn!(attempt, ?delay, error = %err, "activity attempt failed, retrying");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => {
                        tracing::warn!(attempt, error = %err, "activity attempts exhausted");
                        return Err(err);
                    }
                }
            }
        }
    }
}
