//! # swarm-flow
//!
//! The durable orchestrator for the IterateSwarm feedback pipeline.
//!
//! Each accepted feedback item is driven through a fixed sequence of stages:
//! analyze, notify, await approval, publish. Progress is persisted as an
//! append-only journal of events; the in-memory instance is a fold over that
//! journal and the driver resumes from it after any crash.
//!
//! ## Guarantees
//!
//! - **Idempotent start**: the workflow ID is a pure function of the
//!   feedback ID and the start record is a preconditioned create, so
//!   duplicate starts collapse into one instance
//! - **At-most-once recording**: every activity completion is one
//!   preconditioned journal append; racing writers converge on the first
//!   recorded outcome and never re-execute a completed activity
//! - **Durable timers**: the approval deadline is journaled, so the wait
//!   survives restarts and fires exactly once
//! - **In-order signals**: the durable signal inbox lists in arrival order
//!   and the first decision is authoritative

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

pub mod activity;
pub mod engine;
pub mod error;
pub mod events;
pub mod instance;
pub mod journal;
pub mod signal;

pub use activity::{
    ActivityError, ActivitySet, AnalyzeActivity, AnalyzeInput, NotifyActivity, NotifyInput,
    NotifyOutcome, PublishActivity, PublishInput, PublishOutcome,
};
pub use engine::{Engine, EngineConfig, StartOutcome};
pub use error::{Error, Result};
pub use events::{WorkflowEvent, WorkflowEventData};
pub use instance::{ApprovalOutcome, WorkflowDescription, WorkflowInstance, WorkflowState};
pub use journal::Journal;
pub use signal::{SignalDelivery, SignalEnvelope};
