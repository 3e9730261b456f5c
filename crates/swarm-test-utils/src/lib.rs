//! # swarm-test-utils
//!
//! Test support shared by the pipeline crates:
//!
//! - [`ScriptedAnalyzer`]: an in-process analyzer gRPC server with a real
//!   cosine-similarity index (durable-index-before-reply, as the contract
//!   requires), plus an optional script of canned responses
//! - Signed webhook builders for both ingestion sources
//!
//! Nothing here ships in production binaries; production crates depend on
//! this crate only from `dev-dependencies`.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

pub mod analyzer;
pub mod signing;

pub use analyzer::{ScriptedAnalyzer, serve_analyzer};
pub use signing::{DiscordSigner, slack_signature};
