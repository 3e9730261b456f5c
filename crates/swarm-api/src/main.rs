//! `swarm-api` binary entrypoint.
//!
//! Loads configuration from environment variables, recovers in-flight
//! workflows from the durable journal, starts the broker launcher, and
//! serves the HTTP gateway.
//!
//! Exit codes: 0 normal shutdown, 1 fatal startup error, 2 configuration
//! invalid, 130 interrupted.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;

use swarm_activities::{DestinationLimiter, DiscordNotifier, GitHubPublisher, GrpcAnalyzer};
use swarm_api::config::Config;
use swarm_api::server::{AppState, serve};
use swarm_broker::{FeedbackProducer, Launcher};
use swarm_core::observability::{LogFormat, init_logging};
use swarm_core::{FsBackend, MemoryBackend, RetryPolicy, StorageBackend};
use swarm_flow::{ActivitySet, Engine, EngineConfig, Journal};

const EXIT_OK: i32 = 0;
const EXIT_FATAL: i32 = 1;
const EXIT_CONFIG: i32 = 2;
const EXIT_INTERRUPTED: i32 = 130;

fn choose_log_format(config: &Config) -> LogFormat {
    if config.debug {
        LogFormat::Pretty
    } else {
        LogFormat::Json
    }
}

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("configuration error: {error}");
            std::process::exit(EXIT_CONFIG);
        }
    };
    init_logging(choose_log_format(&config));

    let interrupted = Arc::new(AtomicBool::new(false));
    let code = match run(Arc::new(config), interrupted.clone()).await {
        Ok(()) => {
            if interrupted.load(Ordering::SeqCst) {
                EXIT_INTERRUPTED
            } else {
                EXIT_OK
            }
        }
        Err(error) => {
            tracing::error!(%error, "fatal startup error");
            EXIT_FATAL
        }
    };
    std::process::exit(code);
}

async fn run(config: Arc<Config>, interrupted: Arc<AtomicBool>) -> Result<()> {
    tracing::info!(?config, "starting iterateswarm");

    let storage: Arc<dyn StorageBackend> = match &config.state_dir {
        Some(dir) => {
            tracing::info!(dir = %dir.display(), "using filesystem state backend");
            Arc::new(FsBackend::new(dir)?)
        }
        None => {
            tracing::warn!("SWARM_STATE_DIR not set; using in-memory state (debug only)");
            Arc::new(MemoryBackend::new())
        }
    };

    let chat_limiter = config
        .rate_limit_per_minute
        .map(|limit| Arc::new(DestinationLimiter::per_minute(limit)));
    let tracker_limiter = config
        .rate_limit_per_minute
        .map(|limit| Arc::new(DestinationLimiter::per_minute(limit)));

    let analyze = GrpcAnalyzer::new(config.analyzer_endpoint.clone())?;
    let mut notify = DiscordNotifier::new(config.discord_bot_token.clone());
    if let Some(limiter) = chat_limiter {
        notify = notify.with_limiter(limiter);
    }
    let mut publish =
        GitHubPublisher::new(config.github_token.clone(), config.github_repo.clone());
    if let Some(limiter) = tracker_limiter {
        publish = publish.with_limiter(limiter);
    }

    let engine = Arc::new(Engine::new(
        EngineConfig {
            namespace: config.engine_namespace.clone(),
            approval_timeout: config.approval_timeout,
            activity_timeout: config.activity_timeout,
            retry_policy: RetryPolicy::default(),
            auto_approve_on_soft_skip: config.auto_approve_on_soft_skip,
        },
        Journal::new(storage.clone(), config.engine_namespace.clone()),
        ActivitySet {
            analyze: Arc::new(analyze),
            notify: Arc::new(notify),
            publish: Arc::new(publish),
        },
    ));

    let resumed = engine.recover().await?;
    if resumed > 0 {
        tracing::info!(resumed, "resumed in-flight workflows");
    }

    let producer = spawn_broker(&config, engine.clone())?;
    producer.health().await?;

    let state = AppState::new(config.clone(), engine, producer, storage)?;
    serve(state, shutdown_signal(interrupted)).await?;
    tracing::info!("shutdown complete");
    Ok(())
}

/// Connects the broker, spawns the launcher, and returns the producer.
#[cfg(feature = "kafka")]
fn spawn_broker(config: &Config, engine: Arc<Engine>) -> Result<Arc<dyn FeedbackProducer>> {
    use swarm_broker::kafka::{KafkaConfig, KafkaFeedbackConsumer, KafkaFeedbackProducer};

    let kafka = KafkaConfig::new(config.broker_brokers.clone(), config.feedback_topic.clone());
    let producer = Arc::new(KafkaFeedbackProducer::connect(&kafka)?);
    let consumer = KafkaFeedbackConsumer::connect(&kafka)?;
    tokio::spawn(async move {
        if let Err(error) = Launcher::new(consumer, engine).run().await {
            tracing::error!(%error, "launcher exited");
        }
    });
    Ok(producer)
}

/// Single-binary mode: the in-process broker connects the gateway
/// directly to the launcher.
#[cfg(not(feature = "kafka"))]
fn spawn_broker(config: &Config, engine: Arc<Engine>) -> Result<Arc<dyn FeedbackProducer>> {
    use swarm_broker::MemoryBroker;

    tracing::info!(
        brokers = %config.broker_brokers,
        "kafka feature disabled; using the in-process broker"
    );
    let broker = MemoryBroker::new();
    let consumer = broker.clone();
    tokio::spawn(async move {
        if let Err(error) = Launcher::new(consumer, engine).run().await {
            tracing::error!(%error, "launcher exited");
        }
    });
    Ok(Arc::new(broker))
}

/// Resolves on SIGINT or SIGTERM; records which one for the exit code.
async fn shutdown_signal(interrupted: Arc<AtomicBool>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(error) => {
                tracing::error!(%error, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                interrupted.store(true, Ordering::SeqCst);
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                interrupted.store(true, Ordering::SeqCst);
                tracing::info!("interrupt received, shutting down");
            }
            _ = sigterm.recv() => {
                tracing::info!("termination requested, shutting down");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        interrupted.store(true, Ordering::SeqCst);
        tracing::info!("interrupt received, shutting down");
    }
}
