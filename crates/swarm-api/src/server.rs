//! Router assembly and server state.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use chrono::Utc;

use swarm_broker::FeedbackProducer;
use swarm_core::{Result, StorageBackend};
use swarm_flow::Engine;

use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::routes;
use crate::verify::{SourceVerifier, WebhookSource};

/// Request body limit: 256 KiB.
pub const MAX_BODY_BYTES: usize = 256 * 1024;

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    /// Immutable configuration captured at startup.
    pub config: Arc<Config>,
    /// The workflow engine.
    pub engine: Arc<Engine>,
    /// Broker producer for the feedback topic.
    pub producer: Arc<dyn FeedbackProducer>,
    /// Storage backend, probed by the readiness endpoint.
    pub storage: Arc<dyn StorageBackend>,
    /// Per-route signature verifier table.
    pub verifiers: Arc<HashMap<WebhookSource, SourceVerifier>>,
}

impl AppState {
    /// Builds state, deriving the verifier table from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured verification key is invalid.
    pub fn new(
        config: Arc<Config>,
        engine: Arc<Engine>,
        producer: Arc<dyn FeedbackProducer>,
        storage: Arc<dyn StorageBackend>,
    ) -> Result<Self> {
        let mut verifiers = HashMap::new();
        if let Some(key) = config.discord_public_key.as_deref() {
            verifiers.insert(
                WebhookSource::Discord,
                SourceVerifier::ed25519_from_hex(key)?,
            );
        }
        if let Some(secret) = config.slack_signing_secret.as_deref() {
            verifiers.insert(
                WebhookSource::Slack,
                SourceVerifier::hmac_sha256(secret.as_bytes()),
            );
        }
        Ok(Self {
            config,
            engine,
            producer,
            storage,
            verifiers: Arc::new(verifiers),
        })
    }

    /// Verifies an inbound webhook against the route's configured scheme.
    ///
    /// Debug deployments with no key configured accept unsigned requests;
    /// outside debug a missing verifier rejects everything.
    ///
    /// # Errors
    ///
    /// Returns the uniform unauthorized error on any failure.
    pub fn verify_webhook(
        &self,
        source: WebhookSource,
        headers: &HeaderMap,
        body: &[u8],
    ) -> ApiResult<()> {
        let Some(verifier) = self.verifiers.get(&source) else {
            if self.config.debug {
                return Ok(());
            }
            return Err(ApiError::unauthorized());
        };

        let (timestamp_header, signature_header) = match source {
            WebhookSource::Discord => ("x-signature-timestamp", "x-signature-ed25519"),
            WebhookSource::Slack => ("x-slack-request-timestamp", "x-slack-signature"),
        };
        let timestamp = headers
            .get(timestamp_header)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(ApiError::unauthorized)?;
        let signature = headers
            .get(signature_header)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(ApiError::unauthorized)?;

        verifier
            .verify(timestamp, signature, body, Utc::now())
            .map_err(|_| ApiError::unauthorized())
    }
}

/// Builds the full router.
#[must_use]
pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/webhooks/discord", post(routes::webhooks::discord_webhook))
        .route("/webhooks/slack", post(routes::webhooks::slack_webhook))
        .route(
            "/webhooks/interaction",
            post(routes::interaction::handle_interaction),
        )
        .route("/health", get(routes::health::health))
        .route("/health/details", get(routes::health::health_details))
        .route(
            "/workflows/{workflow_id}",
            get(routes::workflows::describe_workflow),
        );
    if state.config.debug {
        router = router.route("/debug/feedback", post(routes::webhooks::debug_feedback));
    }
    router
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

/// Binds the listen port and serves until the shutdown future resolves.
///
/// # Errors
///
/// Returns an error if binding or serving fails.
pub async fn serve(
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let port = state.config.http_port;
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "gateway listening");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
