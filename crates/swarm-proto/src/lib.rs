//! Generated protobuf types for the analyzer RPC contract.
//!
//! This crate provides Rust types generated from the proto/ definitions.
//! The analyzer boundary is the only cross-language contract in the system
//! and is defined entirely via Protobuf.

#![forbid(unsafe_code)]
#![allow(missing_docs)] // Generated code doesn't have docs

#[allow(clippy::all, clippy::pedantic)]
mod generated {
    // Include generated code; all types are re-exported at crate root.
    tonic::include_proto!("swarm.v1");
}

pub use generated::*;
