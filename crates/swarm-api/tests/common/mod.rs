//! Shared end-to-end harness: real router, in-memory broker and storage,
//! scripted analyzer over gRPC, and wiremock chat/tracker APIs.

// Each test binary uses a different subset of the harness.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tower::ServiceExt;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use swarm_activities::{DiscordNotifier, GitHubPublisher, GrpcAnalyzer};
use swarm_api::config::Config;
use swarm_api::server::{AppState, build_router};
use swarm_broker::{Launcher, MemoryBroker};
use swarm_core::{MemoryBackend, RetryPolicy, WorkflowId};
use swarm_flow::{ActivitySet, Engine, EngineConfig, Journal, WorkflowState};
use swarm_test_utils::{DiscordSigner, ScriptedAnalyzer, serve_analyzer, slack_signature};

pub const SLACK_SECRET: &str = "test-slack-signing-secret";
pub const TRACKER_URL: &str = "https://tracker/1";

pub struct StackOptions {
    pub discord_token: Option<String>,
    pub github_token: Option<String>,
    pub approval_timeout: Duration,
    pub auto_approve_on_soft_skip: bool,
    pub debug: bool,
    pub mount_default_mocks: bool,
}

impl Default for StackOptions {
    fn default() -> Self {
        Self {
            discord_token: Some("chat-token".to_string()),
            github_token: Some("tracker-token".to_string()),
            approval_timeout: Duration::from_secs(30),
            auto_approve_on_soft_skip: false,
            debug: false,
            mount_default_mocks: true,
        }
    }
}

pub struct TestStack {
    pub router: Router,
    pub broker: MemoryBroker,
    pub engine: Arc<Engine>,
    pub signer: DiscordSigner,
    pub discord: MockServer,
    pub github: MockServer,
    pub analyzer_handle: JoinHandle<()>,
    pub analyzer_endpoint: String,
}

pub async fn stack(options: StackOptions) -> TestStack {
    let storage = Arc::new(MemoryBackend::new());
    let broker = MemoryBroker::new();
    let signer = DiscordSigner::generate();

    let (analyzer_endpoint, analyzer_handle) = serve_analyzer(ScriptedAnalyzer::default()).await;

    let discord = MockServer::start().await;
    let github = MockServer::start().await;
    if options.mount_default_mocks {
        Mock::given(method("POST"))
            .and(path_regex(r"^/channels/[^/]+/messages$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "m1"
            })))
            .mount(&discord)
            .await;
        Mock::given(method("GET"))
            .and(path("/search/issues"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "total_count": 0,
                "items": []
            })))
            .mount(&github)
            .await;
        Mock::given(method("POST"))
            .and(path("/repos/acme/product/issues"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "html_url": TRACKER_URL,
                "number": 1
            })))
            .mount(&github)
            .await;
    }

    let config = Arc::new(Config {
        debug: options.debug,
        analyzer_endpoint: analyzer_endpoint.clone(),
        discord_bot_token: options.discord_token.clone(),
        discord_public_key: Some(signer.public_key_hex()),
        slack_signing_secret: Some(SLACK_SECRET.to_string()),
        github_token: options.github_token.clone(),
        github_repo: Some("acme/product".parse().unwrap()),
        approval_timeout: options.approval_timeout,
        auto_approve_on_soft_skip: options.auto_approve_on_soft_skip,
        ..Config::default()
    });

    let analyze = GrpcAnalyzer::new(analyzer_endpoint.clone()).unwrap();
    let notify =
        DiscordNotifier::new(options.discord_token).with_api_base(discord.uri());
    let publish = GitHubPublisher::new(
        options.github_token,
        Some("acme/product".parse().unwrap()),
    )
    .with_api_base(github.uri());

    let engine = Arc::new(Engine::new(
        EngineConfig {
            namespace: config.engine_namespace.clone(),
            approval_timeout: options.approval_timeout,
            activity_timeout: Duration::from_secs(30),
            retry_policy: RetryPolicy {
                initial: Duration::from_millis(5),
                max_jitter: Duration::ZERO,
                ..RetryPolicy::default()
            },
            auto_approve_on_soft_skip: options.auto_approve_on_soft_skip,
        },
        Journal::new(storage.clone(), config.engine_namespace.clone()),
        ActivitySet {
            analyze: Arc::new(analyze),
            notify: Arc::new(notify),
            publish: Arc::new(publish),
        },
    ));

    {
        let consumer = broker.clone();
        let engine = engine.clone();
        tokio::spawn(async move {
            let _ = Launcher::new(consumer, engine).run().await;
        });
    }

    let state = AppState::new(
        config,
        engine.clone(),
        Arc::new(broker.clone()),
        storage,
    )
    .unwrap();

    TestStack {
        router: build_router(state),
        broker,
        engine,
        signer,
        discord,
        github,
        analyzer_handle,
        analyzer_endpoint,
    }
}

pub async fn send(stack: &TestStack, request: Request<Body>) -> (StatusCode, Value) {
    let response = stack
        .router
        .clone()
        .oneshot(request)
        .await
        .expect("router never fails");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("readable body")
        .to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

pub async fn post_discord_webhook(stack: &TestStack, payload: &Value) -> (StatusCode, Value) {
    let body = serde_json::to_vec(payload).unwrap();
    let timestamp = Utc::now().timestamp().to_string();
    let signature = stack.signer.sign(&timestamp, &body);
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/discord")
        .header("content-type", "application/json")
        .header("x-signature-ed25519", signature)
        .header("x-signature-timestamp", timestamp)
        .body(Body::from(body))
        .unwrap();
    send(stack, request).await
}

pub async fn post_slack_webhook(stack: &TestStack, payload: &Value) -> (StatusCode, Value) {
    let body = serde_json::to_vec(payload).unwrap();
    let timestamp = Utc::now().timestamp().to_string();
    let signature = slack_signature(SLACK_SECRET, &timestamp, &body);
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/slack")
        .header("content-type", "application/json")
        .header("x-slack-signature", signature)
        .header("x-slack-request-timestamp", timestamp)
        .body(Body::from(body))
        .unwrap();
    send(stack, request).await
}

pub async fn post_interaction(stack: &TestStack, payload: &Value) -> (StatusCode, Value) {
    let body = serde_json::to_vec(payload).unwrap();
    let timestamp = Utc::now().timestamp().to_string();
    let signature = stack.signer.sign(&timestamp, &body);
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/interaction")
        .header("content-type", "application/json")
        .header("x-signature-ed25519", signature)
        .header("x-signature-timestamp", timestamp)
        .body(Body::from(body))
        .unwrap();
    send(stack, request).await
}

pub fn button_click(custom_id: &str) -> Value {
    serde_json::json!({
        "type": 3,
        "id": "interaction-1",
        "data": { "custom_id": custom_id },
        "user": { "id": "alice" }
    })
}

pub async fn wait_for_state(stack: &TestStack, workflow_id: &WorkflowId, state: WorkflowState) {
    for _ in 0..1000 {
        if let Some(description) = stack.engine.describe(workflow_id).await.unwrap() {
            if description.state == state {
                return;
            }
            assert!(
                !(description.state.is_terminal() && description.state != state),
                "workflow settled in {:?} while waiting for {state:?}",
                description.state
            );
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("workflow never reached {state:?}");
}

pub fn workflow_id_from(response: &Value) -> WorkflowId {
    let feedback_id = response["feedback_id"].as_str().expect("feedback_id");
    format!("fbk-{feedback_id}").parse().expect("workflow id")
}
