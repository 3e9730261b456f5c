//! # swarm-broker
//!
//! The ordered event stream between the ingestion gateway and the workflow
//! launcher.
//!
//! This crate provides:
//!
//! - [`FeedbackProducer`] / [`FeedbackConsumer`]: backend-agnostic traits
//!   for the `feedback-events` topic
//! - [`MemoryBroker`]: an in-process log for tests and single-binary local
//!   deployments
//! - A Kafka backend (feature `kafka`) for production deployments
//! - [`Launcher`]: the consume → start-workflow → commit loop
//!
//! ## Delivery semantics
//!
//! The broker delivers at-least-once. The launcher commits an offset only
//! after the orchestrator's start returns (including the already-exists
//! outcome), so a crash mid-batch redelivers records and the deterministic
//! workflow ID absorbs the duplicates.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

pub mod error;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod launcher;
pub mod memory;

pub use error::{Error, Result};
pub use launcher::Launcher;
pub use memory::MemoryBroker;

use async_trait::async_trait;
use bytes::Bytes;

/// Default topic for feedback events.
pub const FEEDBACK_TOPIC: &str = "feedback-events";

/// Consumer group used by the workflow launcher.
pub const CONSUMER_GROUP: &str = "iterateswarm-consumer";

/// One record consumed from the feedback topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumedRecord {
    /// Partition key (the feedback ID).
    pub key: String,
    /// JSON-encoded `FeedbackEvent`.
    pub payload: Bytes,
    /// Partition the record was read from.
    pub partition: i32,
    /// Backend-specific position, committed after a successful launch.
    pub offset: u64,
}

/// Publishes feedback events onto the broker.
///
/// Records with the same key land on the same partition, so a given
/// feedback's records are processed in order.
#[async_trait]
pub trait FeedbackProducer: Send + Sync {
    /// Publishes one record keyed by feedback ID.
    async fn publish(&self, key: &str, payload: Bytes) -> Result<()>;

    /// Verifies the broker is reachable.
    async fn health(&self) -> Result<()>;
}

/// Consumes feedback events from the broker.
#[async_trait]
pub trait FeedbackConsumer: Send + Sync {
    /// Fetches the next uncommitted record, waiting until one is available.
    ///
    /// Returns `None` when the stream is closed.
    async fn next(&self) -> Result<Option<ConsumedRecord>>;

    /// Commits the record's offset; earlier offsets are implied.
    async fn commit(&self, record: &ConsumedRecord) -> Result<()>;
}
