//! The correlation identifier carried by chat action controls.
//!
//! Approve/reject buttons carry `"{decision}:{workflow_id}"` as their opaque
//! payload. The string must round-trip through the chat platform unchanged;
//! [`parse_correlation`] is the inverse of [`encode_correlation`] for all
//! valid inputs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::id::WorkflowId;

/// An approval decision carried by a chat interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Publish the proposed issue.
    Approve,
    /// Discard the proposed issue.
    Reject,
}

impl Decision {
    /// Returns the canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "approve" => Ok(Self::Approve),
            "reject" => Ok(Self::Reject),
            other => Err(Error::InvalidInput(format!(
                "decision must be 'approve' or 'reject' (got '{other}')"
            ))),
        }
    }
}

/// Encodes a decision and workflow ID into an opaque control payload.
#[must_use]
pub fn encode_correlation(decision: Decision, workflow_id: &WorkflowId) -> String {
    format!("{decision}:{workflow_id}")
}

/// Decodes a control payload back into a decision and workflow ID.
///
/// Splits on the first `:` only; the workflow ID itself contains no colon
/// but this keeps the parse total on adversarial input.
///
/// # Errors
///
/// Returns an error if the payload has no separator, the decision is not
/// `approve`/`reject`, or the workflow ID does not parse.
pub fn parse_correlation(payload: &str) -> Result<(Decision, WorkflowId)> {
    let (decision, workflow_id) = payload.split_once(':').ok_or_else(|| {
        Error::InvalidInput(format!("correlation payload '{payload}' has no ':' separator"))
    })?;
    Ok((decision.parse()?, workflow_id.parse()?))
}
