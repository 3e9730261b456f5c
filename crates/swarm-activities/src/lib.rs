//! # swarm-activities
//!
//! Side-effectful activity implementations driven by the orchestrator:
//!
//! - [`GrpcAnalyzer`]: the analyzer RPC activity (tonic)
//! - [`DiscordNotifier`]: the chat notify activity (Discord REST)
//! - [`GitHubPublisher`]: the tracker publish activity (GitHub REST)
//!
//! Activities classify errors at the boundary (retryable, fatal, soft-skip)
//! and own no durable state beyond what they return to the workflow; every
//! retry is safe. Connection pools are captured at construction and shared
//! across invocations, but no handle ever crosses a workflow suspension
//! point.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

pub mod analyze;
pub mod chat;
pub mod rate_limit;
pub mod tracker;

pub use analyze::GrpcAnalyzer;
pub use chat::DiscordNotifier;
pub use rate_limit::DestinationLimiter;
pub use tracker::{GitHubPublisher, RepoTarget};
