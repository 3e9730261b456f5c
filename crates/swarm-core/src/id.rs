//! Strongly-typed identifiers for pipeline entities.
//!
//! All identifiers are:
//! - **Strongly typed**: Prevents mixing up different ID types at compile time
//! - **Deterministically derivable where it matters**: A [`WorkflowId`] is a
//!   pure function of the [`FeedbackId`] it processes, which is what makes
//!   duplicate workflow starts collapse into one instance
//!
//! # Example
//!
//! ```rust
//! use swarm_core::id::{FeedbackId, WorkflowId};
//!
//! let feedback = FeedbackId::generate();
//! let workflow = WorkflowId::for_feedback(feedback);
//! assert!(workflow.to_string().starts_with("fbk-"));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;
use uuid::Uuid;

use crate::error::{Error, Result};

/// A unique identifier for one ingested feedback item.
///
/// Assigned by the gateway at accept time and carried unchanged through the
/// broker, the workflow, and the idempotency markers on external systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedbackId(Uuid);

impl FeedbackId {
    /// Generates a new random feedback ID (UUID v4).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a feedback ID from a raw UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for FeedbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FeedbackId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s).map(Self).map_err(|e| Error::InvalidId {
            message: format!("invalid feedback ID '{s}': {e}"),
        })
    }
}

/// The deterministic identifier of the workflow processing one feedback item.
///
/// Always `fbk-{feedback_id}`. Deriving the workflow ID from the feedback ID
/// is the uniqueness mechanism: a redelivered broker record maps to the same
/// workflow ID and the duplicate start is absorbed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(String);

const WORKFLOW_ID_PREFIX: &str = "fbk-";

impl WorkflowId {
    /// Derives the workflow ID for a feedback item.
    #[must_use]
    pub fn for_feedback(feedback_id: FeedbackId) -> Self {
        Self(format!("{WORKFLOW_ID_PREFIX}{feedback_id}"))
    }

    /// Returns the feedback ID this workflow processes.
    ///
    /// # Errors
    ///
    /// Returns an error if the suffix is not a valid feedback ID. This can
    /// only happen for IDs constructed via `FromStr` from untrusted input.
    pub fn feedback_id(&self) -> Result<FeedbackId> {
        self.0[WORKFLOW_ID_PREFIX.len()..].parse()
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for WorkflowId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let suffix = s.strip_prefix(WORKFLOW_ID_PREFIX).ok_or_else(|| {
            Error::InvalidId {
                message: format!("invalid workflow ID '{s}': missing '{WORKFLOW_ID_PREFIX}' prefix"),
            }
        })?;
        let _: FeedbackId = suffix.parse()?;
        Ok(Self(s.to_string()))
    }
}

/// A unique identifier for one execution of a workflow instance.
///
/// Engine-assigned at start. ULIDs sort by creation time, which keeps
/// journal listings chronological without a separate timestamp column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Ulid);

impl RunId {
    /// Generates a new unique run ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    /// Creates a run ID from a raw ULID.
    #[must_use]
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// Returns the creation timestamp encoded in the ID.
    #[must_use]
    pub fn created_at(&self) -> chrono::DateTime<chrono::Utc> {
        let ms = i64::try_from(self.0.timestamp_ms()).unwrap_or(i64::MAX);
        chrono::DateTime::from_timestamp_millis(ms).unwrap_or_else(chrono::Utc::now)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ulid::from_string(s).map(Self).map_err(|e| Error::InvalidId {
            message: format!("invalid run ID '{s}': {e}"),
        })
    }
}
