//! Journal events for the workflow state machine.
//!
//! Every state-affecting fact in a workflow's life is exactly one journal
//! event. The journal is the source of truth: the in-memory instance is a
//! fold over these events and is never persisted directly.
//!
//! ## Idempotency
//!
//! Events are addressed by `(workflow_id, seq)`. Appends use a
//! does-not-exist precondition, so two drivers racing to record the same
//! step produce one winner; the loser reads the winning record and folds it
//! instead of its own. This is what makes activity side effects
//! at-most-once-recorded across crashes and redundant workers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use swarm_core::{AnalysisResult, Decision, FeedbackEvent, RunId, WorkflowId};

/// Envelope for one journal record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEvent {
    /// Unique event identifier (ULID, sorts by creation time).
    pub event_id: String,
    /// Workflow this event belongs to.
    pub workflow_id: WorkflowId,
    /// Position in the workflow's journal, starting at 0.
    pub seq: u64,
    /// When the event was recorded.
    pub recorded_at: DateTime<Utc>,
    /// The event payload.
    pub data: WorkflowEventData,
}

impl WorkflowEvent {
    /// Creates a new event with a fresh ID and the current time.
    #[must_use]
    pub fn new(workflow_id: WorkflowId, seq: u64, data: WorkflowEventData) -> Self {
        Self {
            event_id: Ulid::new().to_string(),
            workflow_id,
            seq,
            recorded_at: Utc::now(),
            data,
        }
    }
}

/// Event payloads, one per suspension point or terminal fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum WorkflowEventData {
    /// The workflow was started for a feedback event. Always seq 0; the
    /// preconditioned write of this record is the instance-uniqueness point.
    WorkflowStarted {
        /// Engine-assigned run identifier.
        run_id: RunId,
        /// The feedback event being processed.
        event: FeedbackEvent,
    },

    /// The analyze activity completed.
    AnalysisCompleted {
        /// The analyzer's verdict.
        analysis: AnalysisResult,
    },

    /// The notify activity completed (posted a prompt, or soft-skipped).
    NotifyCompleted {
        /// Chat message identifier, when a message was posted.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        /// True when missing credentials caused a soft-skip.
        soft_skipped: bool,
    },

    /// The workflow entered the approval wait with a fixed deadline.
    ///
    /// The deadline is journaled so the timer survives restarts: replay
    /// re-arms with whatever remains, and an already-passed deadline fires
    /// immediately.
    ApprovalWaitStarted {
        /// When the approval wait times out.
        deadline: DateTime<Utc>,
    },

    /// An approval decision was consumed from the signal inbox.
    SignalReceived {
        /// Identifier of the durable signal record that was consumed.
        signal_id: String,
        /// The decision.
        decision: Decision,
        /// Who made the decision.
        actor_id: String,
        /// Chat-side interaction identifier, when present.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interaction_id: Option<String>,
    },

    /// The approval timer fired before any signal arrived.
    ApprovalTimedOut,

    /// The publish activity completed (created an issue, or soft-skipped).
    PublishCompleted {
        /// Tracker URL of the created issue, when one was created.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        external_ref: Option<String>,
        /// True when missing credentials caused a soft-skip.
        soft_skipped: bool,
    },

    /// The workflow failed terminally.
    WorkflowFailed {
        /// Human-readable failure reason.
        reason: String,
    },
}

impl WorkflowEventData {
    /// Returns the snake_case name of the event type.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::WorkflowStarted { .. } => "workflow_started",
            Self::AnalysisCompleted { .. } => "analysis_completed",
            Self::NotifyCompleted { .. } => "notify_completed",
            Self::ApprovalWaitStarted { .. } => "approval_wait_started",
            Self::SignalReceived { .. } => "signal_received",
            Self::ApprovalTimedOut => "approval_timed_out",
            Self::PublishCompleted { .. } => "publish_completed",
            Self::WorkflowFailed { .. } => "workflow_failed",
        }
    }
}
