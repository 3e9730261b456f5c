//! # swarm-core
//!
//! Core types and shared infrastructure for the IterateSwarm feedback
//! pipeline.
//!
//! This crate provides:
//!
//! - **Strongly-typed identifiers**: feedback, workflow, and run IDs that
//!   cannot be mixed up at compile time
//! - **The domain model**: feedback events, analysis results, and issue
//!   specifications exchanged between the gateway, the orchestrator, and
//!   the activity layer
//! - **Durable storage**: a preconditioned-write storage abstraction with
//!   in-memory and local-filesystem backends
//! - **Retry policy**: exponential backoff with jitter shared by every
//!   external call site
//!
//! Everything here is deliberately free of I/O except the storage module;
//! the orchestrator depends on that discipline for deterministic replay.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

pub mod backoff;
pub mod correlation;
pub mod error;
pub mod feedback;
pub mod id;
pub mod observability;
pub mod storage;

pub use backoff::RetryPolicy;
pub use correlation::{Decision, encode_correlation, parse_correlation};
pub use error::{Error, Result};
pub use feedback::{
    AnalysisResult, FeedbackEvent, FeedbackOrigin, FeedbackSource, IssueSpec, IssueType, Severity,
};
pub use id::{FeedbackId, RunId, WorkflowId};
pub use storage::{
    FsBackend, MemoryBackend, ObjectMeta, StorageBackend, WritePrecondition, WriteResult,
};
