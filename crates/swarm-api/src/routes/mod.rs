//! HTTP route handlers.

pub mod health;
pub mod interaction;
pub mod webhooks;
pub mod workflows;
