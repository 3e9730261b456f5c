//! Server configuration.
//!
//! Loaded from `SWARM_*` environment variables. The recognized set is
//! closed: any other `SWARM_`-prefixed variable is rejected at startup with
//! a diagnostic naming the offending key, so typos fail fast instead of
//! silently configuring nothing.

use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;

use swarm_activities::RepoTarget;
use swarm_core::{Error, Result};

/// Environment variables the server recognizes.
const RECOGNIZED_KEYS: &[&str] = &[
    "SWARM_ENGINE_ENDPOINT",
    "SWARM_ENGINE_NAMESPACE",
    "SWARM_ANALYZER_ENDPOINT",
    "SWARM_BROKER_BROKERS",
    "SWARM_FEEDBACK_TOPIC",
    "SWARM_TASK_QUEUE",
    "SWARM_APPROVAL_TIMEOUT_SECS",
    "SWARM_ACTIVITY_TIMEOUT_SECS",
    "SWARM_DEDUP_THRESHOLD",
    "SWARM_DISCORD_BOT_TOKEN",
    "SWARM_DISCORD_PUBLIC_KEY",
    "SWARM_SLACK_SIGNING_SECRET",
    "SWARM_GITHUB_TOKEN",
    "SWARM_GITHUB_REPO",
    "SWARM_AUTO_APPROVE_ON_SOFT_SKIP",
    "SWARM_HTTP_PORT",
    "SWARM_STATE_DIR",
    "SWARM_DEBUG",
    "SWARM_RATE_LIMIT_PER_MINUTE",
];

/// Configuration for the IterateSwarm server.
#[derive(Clone)]
pub struct Config {
    /// HTTP listen port.
    pub http_port: u16,

    /// Debug mode: pretty logs, in-memory state allowed, unsigned webhooks
    /// accepted when no verification key is configured, and the test
    /// publish endpoint mounted.
    pub debug: bool,

    /// Workflow engine endpoint (`host:port`). The engine runs in-process
    /// in the single-binary deployment; the endpoint is validated and
    /// reported through `/health/details` for split deployments.
    pub engine_endpoint: String,

    /// Namespace scoping the engine's journal and signal paths.
    pub engine_namespace: String,

    /// Analyzer RPC endpoint.
    pub analyzer_endpoint: String,

    /// Comma-separated broker addresses.
    pub broker_brokers: String,

    /// Feedback topic name.
    pub feedback_topic: String,

    /// Task queue for chat/tracker activities.
    pub task_queue: String,

    /// Upper bound on the approval wait.
    pub approval_timeout: Duration,

    /// Per-activity start-to-close timeout.
    pub activity_timeout: Duration,

    /// Cosine-similarity cutoff for duplicate detection, in [0, 1].
    /// Advertised to operators; the analyzer owns the index.
    pub dedup_threshold: f64,

    /// Chat bot credential. Absent: notify soft-skips.
    pub discord_bot_token: Option<String>,

    /// Hex-encoded Ed25519 public key verifying source-A webhooks.
    pub discord_public_key: Option<String>,

    /// Shared secret verifying source-B webhooks.
    pub slack_signing_secret: Option<String>,

    /// Tracker credential. Absent: publish soft-skips.
    pub github_token: Option<String>,

    /// Tracker target repository.
    pub github_repo: Option<RepoTarget>,

    /// Soft-skip policy: advance past a soft-skipped notify by
    /// synthesizing an approval. Default off.
    pub auto_approve_on_soft_skip: bool,

    /// Durable state directory. Absent: in-memory state (debug only).
    pub state_dir: Option<PathBuf>,

    /// Per-destination outbound token bucket. Absent: disabled.
    pub rate_limit_per_minute: Option<NonZeroU32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 8080,
            debug: false,
            engine_endpoint: "localhost:7233".to_string(),
            engine_namespace: "default".to_string(),
            analyzer_endpoint: "http://localhost:50051".to_string(),
            broker_brokers: "localhost:9092".to_string(),
            feedback_topic: "feedback-events".to_string(),
            task_queue: "feedback-queue".to_string(),
            approval_timeout: Duration::from_secs(300),
            activity_timeout: Duration::from_secs(120),
            dedup_threshold: 0.85,
            discord_bot_token: None,
            discord_public_key: None,
            slack_signing_secret: None,
            github_token: None,
            github_repo: None,
            auto_approve_on_soft_skip: false,
            state_dir: None,
            rate_limit_per_minute: None,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("http_port", &self.http_port)
            .field("debug", &self.debug)
            .field("engine_endpoint", &self.engine_endpoint)
            .field("engine_namespace", &self.engine_namespace)
            .field("analyzer_endpoint", &self.analyzer_endpoint)
            .field("broker_brokers", &self.broker_brokers)
            .field("feedback_topic", &self.feedback_topic)
            .field("task_queue", &self.task_queue)
            .field("approval_timeout", &self.approval_timeout)
            .field("activity_timeout", &self.activity_timeout)
            .field("dedup_threshold", &self.dedup_threshold)
            .field(
                "discord_bot_token",
                &self.discord_bot_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("discord_public_key", &self.discord_public_key)
            .field(
                "slack_signing_secret",
                &self.slack_signing_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "github_token",
                &self.github_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("github_repo", &self.github_repo)
            .field("auto_approve_on_soft_skip", &self.auto_approve_on_soft_skip)
            .field("state_dir", &self.state_dir)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .finish()
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// Supported env vars:
    /// - `SWARM_ENGINE_ENDPOINT` (default `localhost:7233`)
    /// - `SWARM_ENGINE_NAMESPACE` (default `default`)
    /// - `SWARM_ANALYZER_ENDPOINT` (default `http://localhost:50051`)
    /// - `SWARM_BROKER_BROKERS` (default `localhost:9092`)
    /// - `SWARM_FEEDBACK_TOPIC` (default `feedback-events`)
    /// - `SWARM_TASK_QUEUE` (default `feedback-queue`)
    /// - `SWARM_APPROVAL_TIMEOUT_SECS` (default 300)
    /// - `SWARM_ACTIVITY_TIMEOUT_SECS` (default 120)
    /// - `SWARM_DEDUP_THRESHOLD` (default 0.85)
    /// - `SWARM_DISCORD_BOT_TOKEN` (absent: notify soft-skips)
    /// - `SWARM_DISCORD_PUBLIC_KEY` (hex Ed25519 key)
    /// - `SWARM_SLACK_SIGNING_SECRET`
    /// - `SWARM_GITHUB_TOKEN` (absent: publish soft-skips)
    /// - `SWARM_GITHUB_REPO` (`owner/repo`)
    /// - `SWARM_AUTO_APPROVE_ON_SOFT_SKIP` (default false)
    /// - `SWARM_HTTP_PORT` (default 8080)
    /// - `SWARM_STATE_DIR` (required unless `SWARM_DEBUG=true`)
    /// - `SWARM_DEBUG` (default false)
    /// - `SWARM_RATE_LIMIT_PER_MINUTE` (absent: disabled)
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but unparseable, if an
    /// unrecognized `SWARM_*` variable is set, or if cross-field
    /// validation fails.
    pub fn from_env() -> Result<Self> {
        check_recognized(std::env::vars().map(|(key, _)| key))?;

        let mut config = Self::default();

        if let Some(port) = env_u16("SWARM_HTTP_PORT")? {
            config.http_port = port;
        }
        if let Some(debug) = env_bool("SWARM_DEBUG")? {
            config.debug = debug;
        }
        if let Some(endpoint) = env_string("SWARM_ENGINE_ENDPOINT") {
            config.engine_endpoint = endpoint;
        }
        if let Some(namespace) = env_string("SWARM_ENGINE_NAMESPACE") {
            config.engine_namespace = namespace;
        }
        if let Some(endpoint) = env_string("SWARM_ANALYZER_ENDPOINT") {
            config.analyzer_endpoint = endpoint;
        }
        if let Some(brokers) = env_string("SWARM_BROKER_BROKERS") {
            config.broker_brokers = brokers;
        }
        if let Some(topic) = env_string("SWARM_FEEDBACK_TOPIC") {
            config.feedback_topic = topic;
        }
        if let Some(queue) = env_string("SWARM_TASK_QUEUE") {
            config.task_queue = queue;
        }
        if let Some(secs) = env_u64("SWARM_APPROVAL_TIMEOUT_SECS")? {
            config.approval_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("SWARM_ACTIVITY_TIMEOUT_SECS")? {
            config.activity_timeout = Duration::from_secs(secs);
        }
        if let Some(threshold) = env_f64("SWARM_DEDUP_THRESHOLD")? {
            config.dedup_threshold = threshold;
        }
        config.discord_bot_token = env_string("SWARM_DISCORD_BOT_TOKEN");
        config.discord_public_key = env_string("SWARM_DISCORD_PUBLIC_KEY");
        config.slack_signing_secret = env_string("SWARM_SLACK_SIGNING_SECRET");
        config.github_token = env_string("SWARM_GITHUB_TOKEN");
        if let Some(repo) = env_string("SWARM_GITHUB_REPO") {
            config.github_repo = Some(repo.parse()?);
        }
        if let Some(auto) = env_bool("SWARM_AUTO_APPROVE_ON_SOFT_SKIP")? {
            config.auto_approve_on_soft_skip = auto;
        }
        config.state_dir = env_string("SWARM_STATE_DIR").map(PathBuf::from);
        if let Some(limit) = env_u32("SWARM_RATE_LIMIT_PER_MINUTE")? {
            config.rate_limit_per_minute = Some(NonZeroU32::new(limit).ok_or_else(|| {
                Error::InvalidInput(
                    "SWARM_RATE_LIMIT_PER_MINUTE must be greater than 0".to_string(),
                )
            })?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns an error naming the failing option.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.dedup_threshold) {
            return Err(Error::InvalidInput(format!(
                "SWARM_DEDUP_THRESHOLD must be within [0, 1] (got {})",
                self.dedup_threshold
            )));
        }
        validate_host_port("SWARM_ENGINE_ENDPOINT", &self.engine_endpoint)?;
        if self.broker_brokers.trim().is_empty() {
            return Err(Error::InvalidInput(
                "SWARM_BROKER_BROKERS must not be empty".to_string(),
            ));
        }
        if self.state_dir.is_none() && !self.debug {
            return Err(Error::InvalidInput(
                "SWARM_STATE_DIR is required when SWARM_DEBUG=false".to_string(),
            ));
        }
        if let Some(key) = self.discord_public_key.as_deref() {
            let decoded = hex::decode(key).map_err(|e| {
                Error::InvalidInput(format!("SWARM_DISCORD_PUBLIC_KEY must be hex: {e}"))
            })?;
            if decoded.len() != 32 {
                return Err(Error::InvalidInput(format!(
                    "SWARM_DISCORD_PUBLIC_KEY must decode to 32 bytes (got {})",
                    decoded.len()
                )));
            }
        }
        Ok(())
    }
}

/// Rejects unrecognized `SWARM_*` keys with a diagnostic naming the key.
fn check_recognized(keys: impl IntoIterator<Item = String>) -> Result<()> {
    for key in keys {
        if key.starts_with("SWARM_") && !RECOGNIZED_KEYS.contains(&key.as_str()) {
            return Err(Error::InvalidInput(format!(
                "unrecognized configuration key {key}; recognized keys are: {}",
                RECOGNIZED_KEYS.join(", ")
            )));
        }
    }
    Ok(())
}

fn validate_host_port(name: &str, value: &str) -> Result<()> {
    let valid = match value.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "{name} must be host:port (got '{value}')"
        )))
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn env_u16(name: &str) -> Result<Option<u16>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    v.parse::<u16>()
        .map(Some)
        .map_err(|e| Error::InvalidInput(format!("{name} must be a u16: {e}")))
}

fn env_u32(name: &str) -> Result<Option<u32>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    v.parse::<u32>()
        .map(Some)
        .map_err(|e| Error::InvalidInput(format!("{name} must be a u32: {e}")))
}

fn env_u64(name: &str) -> Result<Option<u64>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    v.parse::<u64>()
        .map(Some)
        .map_err(|e| Error::InvalidInput(format!("{name} must be a u64: {e}")))
}

fn env_f64(name: &str) -> Result<Option<f64>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    v.parse::<f64>()
        .map(Some)
        .map_err(|e| Error::InvalidInput(format!("{name} must be a number: {e}")))
}

fn env_bool(name: &str) -> Result<Option<bool>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    match v.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(Some(true)),
        "false" | "0" | "no" => Ok(Some(false)),
        _ => Err(Error::InvalidInput(format!(
            "{name} must be a boolean (true/false/1/0)"
        ))),
    }
}
