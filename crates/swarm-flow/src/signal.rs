//! Inbound approval signals.

use serde::{Deserialize, Serialize};

use swarm_core::{Decision, WorkflowId};

/// An inbound approval decision targeting one workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalEnvelope {
    /// Target workflow.
    pub workflow_id: WorkflowId,
    /// The decision.
    pub decision: Decision,
    /// Who made the decision.
    pub actor_id: String,
    /// Chat-side interaction identifier, for acknowledgement correlation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction_id: Option<String>,
}

/// Outcome of delivering a signal to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalDelivery {
    /// The workflow was awaiting approval; the signal will be consumed.
    Accepted,
    /// The workflow is still running but not yet awaiting approval; the
    /// signal is buffered and consumed when the wait starts.
    Buffered,
    /// An earlier decision already resolved the approval; this one is
    /// acknowledged but changes nothing.
    Superseded,
    /// The workflow already reached a terminal state.
    AlreadyCompleted,
    /// No workflow with this ID exists.
    NotFound,
}

impl SignalDelivery {
    /// Returns true when the signal can still influence the workflow.
    #[must_use]
    pub const fn is_effective(self) -> bool {
        matches!(self, Self::Accepted | Self::Buffered)
    }
}
