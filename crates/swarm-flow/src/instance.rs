//! Workflow instance state, rebuilt by folding the journal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use swarm_core::{AnalysisResult, Decision, FeedbackEvent, RunId, WorkflowId};

use crate::error::{Error, Result};
use crate::events::{WorkflowEvent, WorkflowEventData};

/// The state of a workflow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    /// Instance exists but the start record has not been folded yet.
    Created,
    /// Analyze (and, when not a duplicate, notify) is in progress.
    Analyzing,
    /// Feedback was a duplicate; nothing was notified or published.
    DuplicateTerminal,
    /// Waiting for an approval decision or the approval timer.
    AwaitingApproval,
    /// Approved; publish is in progress.
    ApprovedPublishing,
    /// An issue was published (or publish soft-skipped).
    PublishedTerminal,
    /// The decision was to reject; nothing was published.
    RejectedTerminal,
    /// The approval timer fired before any decision arrived.
    TimedOutTerminal,
    /// An unrecoverable error terminated the workflow.
    Failed,
}

impl WorkflowState {
    /// Returns true if the state is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::DuplicateTerminal
                | Self::PublishedTerminal
                | Self::RejectedTerminal
                | Self::TimedOutTerminal
                | Self::Failed
        )
    }

    /// Returns the snake_case name of the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Analyzing => "analyzing",
            Self::DuplicateTerminal => "duplicate_terminal",
            Self::AwaitingApproval => "awaiting_approval",
            Self::ApprovedPublishing => "approved_publishing",
            Self::PublishedTerminal => "published_terminal",
            Self::RejectedTerminal => "rejected_terminal",
            Self::TimedOutTerminal => "timed_out_terminal",
            Self::Failed => "failed",
        }
    }
}

/// The recorded outcome of the approval wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalOutcome {
    /// No decision yet.
    #[default]
    Pending,
    /// The first signal approved.
    Approved,
    /// The first signal rejected.
    Rejected,
    /// The timer fired first.
    TimedOut,
}

/// Record of the notify activity's outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyRecord {
    /// Chat message identifier, when a message was posted.
    pub message_id: Option<String>,
    /// True when the activity soft-skipped.
    pub soft_skipped: bool,
}

/// One durable execution of the pipeline state machine.
///
/// Rebuilt from the journal; never mutated except through [`Self::apply`].
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowInstance {
    /// Deterministic workflow identifier.
    pub workflow_id: WorkflowId,
    /// Engine-assigned run identifier.
    pub run_id: Option<RunId>,
    /// Current state.
    pub state: WorkflowState,
    /// The feedback event being processed.
    pub event: Option<FeedbackEvent>,
    /// The analyzer's verdict, once the analyze activity completed.
    pub analysis: Option<AnalysisResult>,
    /// The notify activity's outcome, once completed.
    pub notify: Option<NotifyRecord>,
    /// Approval wait deadline, once the wait started.
    pub approval_deadline: Option<DateTime<Utc>>,
    /// Outcome of the approval wait.
    pub approval: ApprovalOutcome,
    /// Tracker URL, set at most once on publish.
    pub external_ref: Option<String>,
    /// Failure reason, when the workflow failed.
    pub failure_reason: Option<String>,
    /// Durable signal record IDs already consumed.
    pub consumed_signal_ids: Vec<String>,
    /// Next journal sequence number.
    pub next_seq: u64,
}

impl WorkflowInstance {
    /// Creates an empty instance awaiting its start record.
    #[must_use]
    pub fn new(workflow_id: WorkflowId) -> Self {
        Self {
            workflow_id,
            run_id: None,
            state: WorkflowState::Created,
            event: None,
            analysis: None,
            notify: None,
            approval_deadline: None,
            approval: ApprovalOutcome::Pending,
            external_ref: None,
            failure_reason: None,
            consumed_signal_ids: Vec::new(),
            next_seq: 0,
        }
    }

    /// Folds the journal into an instance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::JournalCorrupt`] on sequence gaps and
    /// [`Error::InvalidStateTransition`] if the journal encodes an
    /// impossible transition; both are internal invariant violations.
    pub fn fold(workflow_id: WorkflowId, events: &[WorkflowEvent]) -> Result<Self> {
        let mut instance = Self::new(workflow_id);
        for event in events {
            instance.apply(event)?;
        }
        Ok(instance)
    }

    /// Applies one journal event.
    ///
    /// # Errors
    ///
    /// See [`Self::fold`].
    pub fn apply(&mut self, event: &WorkflowEvent) -> Result<()> {
        if event.seq != self.next_seq {
            return Err(Error::JournalCorrupt {
                workflow_id: self.workflow_id.clone(),
                message: format!("expected seq {}, found {}", self.next_seq, event.seq),
            });
        }

        match &event.data {
            WorkflowEventData::WorkflowStarted { run_id, event: feedback } => {
                self.expect_state(WorkflowState::Created, "workflow_started")?;
                self.run_id = Some(*run_id);
                self.event = Some(feedback.clone());
                self.state = WorkflowState::Analyzing;
            }
            WorkflowEventData::AnalysisCompleted { analysis } => {
                self.expect_state(WorkflowState::Analyzing, "analysis_completed")?;
                if self.analysis.is_some() {
                    return self.transition_error("analysis_completed", "analysis already recorded");
                }
                let duplicate = analysis.is_duplicate;
                self.analysis = Some(analysis.clone());
                if duplicate {
                    self.state = WorkflowState::DuplicateTerminal;
                }
            }
            WorkflowEventData::NotifyCompleted { message_id, soft_skipped } => {
                self.expect_state(WorkflowState::Analyzing, "notify_completed")?;
                if self.analysis.is_none() {
                    return self.transition_error("notify_completed", "analysis not recorded");
                }
                if self.notify.is_some() {
                    return self.transition_error("notify_completed", "notify already recorded");
                }
                self.notify = Some(NotifyRecord {
                    message_id: message_id.clone(),
                    soft_skipped: *soft_skipped,
                });
            }
            WorkflowEventData::ApprovalWaitStarted { deadline } => {
                self.expect_state(WorkflowState::Analyzing, "approval_wait_started")?;
                if self.notify.is_none() {
                    return self.transition_error("approval_wait_started", "notify not recorded");
                }
                self.approval_deadline = Some(*deadline);
                self.state = WorkflowState::AwaitingApproval;
            }
            WorkflowEventData::SignalReceived { signal_id, decision, .. } => {
                self.expect_state(WorkflowState::AwaitingApproval, "signal_received")?;
                self.consumed_signal_ids.push(signal_id.clone());
                match decision {
                    Decision::Approve => {
                        self.approval = ApprovalOutcome::Approved;
                        self.state = WorkflowState::ApprovedPublishing;
                    }
                    Decision::Reject => {
                        self.approval = ApprovalOutcome::Rejected;
                        self.state = WorkflowState::RejectedTerminal;
                    }
                }
            }
            WorkflowEventData::ApprovalTimedOut => {
                self.expect_state(WorkflowState::AwaitingApproval, "approval_timed_out")?;
                self.approval = ApprovalOutcome::TimedOut;
                self.state = WorkflowState::TimedOutTerminal;
            }
            WorkflowEventData::PublishCompleted { external_ref, .. } => {
                self.expect_state(WorkflowState::ApprovedPublishing, "publish_completed")?;
                if self.external_ref.is_some() {
                    return self.transition_error("publish_completed", "external_ref already set");
                }
                self.external_ref = external_ref.clone();
                self.state = WorkflowState::PublishedTerminal;
            }
            WorkflowEventData::WorkflowFailed { reason } => {
                if self.state.is_terminal() {
                    return self.transition_error("workflow_failed", "workflow already terminal");
                }
                self.failure_reason = Some(reason.clone());
                self.state = WorkflowState::Failed;
            }
        }

        self.next_seq += 1;
        Ok(())
    }

    fn expect_state(&self, expected: WorkflowState, event_name: &str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::InvalidStateTransition {
                from: self.state.as_str().to_string(),
                to: event_name.to_string(),
                reason: format!("event requires state {}", expected.as_str()),
            })
        }
    }

    fn transition_error(&self, event_name: &str, reason: &str) -> Result<()> {
        Err(Error::InvalidStateTransition {
            from: self.state.as_str().to_string(),
            to: event_name.to_string(),
            reason: reason.to_string(),
        })
    }

    /// Returns the read-only projection exposed to operator tooling.
    #[must_use]
    pub fn describe(&self) -> WorkflowDescription {
        WorkflowDescription {
            workflow_id: self.workflow_id.clone(),
            run_id: self.run_id,
            state: self.state,
            analysis: self.analysis.clone(),
            approval: self.approval,
            external_ref: self.external_ref.clone(),
            failure_reason: self.failure_reason.clone(),
        }
    }
}

/// Read-only projection of a workflow instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDescription {
    /// Workflow identifier.
    pub workflow_id: WorkflowId,
    /// Run identifier.
    pub run_id: Option<RunId>,
    /// Current state.
    pub state: WorkflowState,
    /// Analyzer verdict, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisResult>,
    /// Approval outcome.
    pub approval: ApprovalOutcome,
    /// Tracker URL, when published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<String>,
    /// Failure reason, when failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}
