//! # swarm-api
//!
//! The IterateSwarm ingestion edge and server binary:
//!
//! - Webhook gateway with per-source signature verification
//! - Chat interaction handler routing approval signals to workflows
//! - Health endpoints and the operator workflow projection
//! - Environment-driven configuration with a closed key set

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod routes;
pub mod server;
pub mod verify;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use server::{AppState, build_router, serve};
pub use verify::{SourceVerifier, VerifyError, WebhookSource};
