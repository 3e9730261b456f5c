//! Error types for the orchestration domain.

use swarm_core::WorkflowId;

/// The result type used throughout swarm-flow.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in orchestration operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A workflow was not found.
    #[error("workflow not found: {workflow_id}")]
    WorkflowNotFound {
        /// The workflow ID that was not found.
        workflow_id: WorkflowId,
    },

    /// A bounded wait for a terminal state elapsed.
    #[error("workflow {workflow_id} did not reach a terminal state in time")]
    AwaitTimeout {
        /// The workflow still in flight.
        workflow_id: WorkflowId,
    },

    /// An invalid state transition was attempted.
    #[error("invalid state transition: {from} -> {to} ({reason})")]
    InvalidStateTransition {
        /// The current state.
        from: String,
        /// The attempted target state.
        to: String,
        /// The reason the transition is invalid.
        reason: String,
    },

    /// The journal for a workflow is malformed.
    ///
    /// This is an internal invariant violation: the journal is the source of
    /// truth, and a corrupt journal means the durable state itself is broken.
    /// It is never caught inside the workflow layer.
    #[error("journal corrupt for {workflow_id}: {message}")]
    JournalCorrupt {
        /// The affected workflow.
        workflow_id: WorkflowId,
        /// Description of the corruption.
        message: String,
    },

    /// A serialization error occurred.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// An error from swarm-core (storage, identifiers).
    #[error("core error: {0}")]
    Core(#[from] swarm_core::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarm_core::{FeedbackId, WorkflowId};

    #[test]
    fn not_found_display_names_the_workflow() {
        let workflow_id = WorkflowId::for_feedback(FeedbackId::generate());
        let err = Error::WorkflowNotFound {
            workflow_id: workflow_id.clone(),
        };
        assert!(err.to_string().contains(workflow_id.as_str()));
    }

    #[test]
    fn transition_error_display() {
        let err = Error::InvalidStateTransition {
            from: "analyzing".into(),
            to: "published_terminal".into(),
            reason: "publish requires an approval".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("analyzing"));
        assert!(msg.contains("publish requires an approval"));
    }
}
