//! End-to-end pipeline scenarios: webhook → broker → workflow → chat
//! prompt → interaction → tracker.

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use swarm_flow::WorkflowState;

use common::{
    StackOptions, TRACKER_URL, button_click, post_discord_webhook, post_interaction, stack,
    wait_for_state, workflow_id_from,
};

fn crash_report() -> Value {
    json!({
        "content": "App crashes on startup",
        "author": { "username": "alice", "id": "alice" },
        "channel_id": "C1",
        "id": "msg-1"
    })
}

#[tokio::test]
async fn s1_happy_path_bug_report_is_published_after_approval() {
    let stack = stack(StackOptions::default()).await;

    let (status, response) = post_discord_webhook(&stack, &crash_report()).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(response["status"], "accepted");
    let workflow_id = workflow_id_from(&response);

    wait_for_state(&stack, &workflow_id, WorkflowState::AwaitingApproval).await;

    // The prompt carries the rendering contract: emoji title, severity
    // color, and correlation-bearing buttons.
    let chat_requests = stack.discord.received_requests().await.unwrap();
    assert_eq!(chat_requests.len(), 1);
    let message: Value = serde_json::from_slice(&chat_requests[0].body).unwrap();
    let embed = &message["embeds"][0];
    assert!(embed["title"].as_str().unwrap().starts_with("🐛 "));
    assert_eq!(embed["color"], 0x00ff_6600);
    let buttons = message["components"][0]["components"].as_array().unwrap();
    assert_eq!(
        buttons[0]["custom_id"].as_str().unwrap(),
        format!("approve:{workflow_id}")
    );
    assert_eq!(
        buttons[1]["custom_id"].as_str().unwrap(),
        format!("reject:{workflow_id}")
    );

    let (status, ack) =
        post_interaction(&stack, &button_click(&format!("approve:{workflow_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["type"], 4);

    let description = stack
        .engine
        .await_terminal(&workflow_id, Duration::from_secs(10))
        .await
        .unwrap();
    assert_eq!(description.state, WorkflowState::PublishedTerminal);
    assert_eq!(description.external_ref.as_deref(), Some(TRACKER_URL));

    // Exactly one tracker issue was created.
    let creates = stack
        .github
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|request| request.method.as_str() == "POST")
        .count();
    assert_eq!(creates, 1);
}

#[tokio::test]
async fn s2_semantically_identical_feedback_is_a_duplicate() {
    let stack = stack(StackOptions::default()).await;

    let report = json!({
        "content": "Login button is broken",
        "author": { "username": "alice" },
        "channel_id": "C1"
    });
    let (_, first) = post_discord_webhook(&stack, &report).await;
    let first_workflow = workflow_id_from(&first);
    wait_for_state(&stack, &first_workflow, WorkflowState::AwaitingApproval).await;

    let (_, second) = post_discord_webhook(&stack, &report).await;
    let second_workflow = workflow_id_from(&second);
    wait_for_state(&stack, &second_workflow, WorkflowState::DuplicateTerminal).await;

    // No second prompt and no publish for the duplicate.
    let chat_requests = stack.discord.received_requests().await.unwrap();
    assert_eq!(chat_requests.len(), 1);
    let tracker_creates = stack
        .github
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|request| request.method.as_str() == "POST")
        .count();
    assert_eq!(tracker_creates, 0);
}

#[tokio::test]
async fn s3_rejection_skips_publish() {
    let stack = stack(StackOptions::default()).await;

    let (_, response) = post_discord_webhook(&stack, &crash_report()).await;
    let workflow_id = workflow_id_from(&response);
    wait_for_state(&stack, &workflow_id, WorkflowState::AwaitingApproval).await;

    post_interaction(&stack, &button_click(&format!("reject:{workflow_id}"))).await;

    let description = stack
        .engine
        .await_terminal(&workflow_id, Duration::from_secs(10))
        .await
        .unwrap();
    assert_eq!(description.state, WorkflowState::RejectedTerminal);
    assert!(description.external_ref.is_none());

    let tracker_creates = stack
        .github
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|request| request.method.as_str() == "POST")
        .count();
    assert_eq!(tracker_creates, 0);
}

#[tokio::test]
async fn s4_approval_timeout_ends_the_workflow() {
    let stack = stack(StackOptions {
        approval_timeout: Duration::from_millis(200),
        ..StackOptions::default()
    })
    .await;

    let (_, response) = post_discord_webhook(&stack, &crash_report()).await;
    let workflow_id = workflow_id_from(&response);

    let description = stack
        .engine
        .await_terminal(&workflow_id, Duration::from_secs(10))
        .await
        .unwrap();
    assert_eq!(description.state, WorkflowState::TimedOutTerminal);
    assert!(description.external_ref.is_none());
}

#[tokio::test]
async fn s5_missing_chat_credential_fails_without_local_approval() {
    let stack = stack(StackOptions {
        discord_token: None,
        ..StackOptions::default()
    })
    .await;

    let (_, response) = post_discord_webhook(&stack, &crash_report()).await;
    let workflow_id = workflow_id_from(&response);

    let description = stack
        .engine
        .await_terminal(&workflow_id, Duration::from_secs(10))
        .await
        .unwrap();
    assert_eq!(description.state, WorkflowState::Failed);
    assert!(stack.discord.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn s5_soft_skip_with_auto_approve_publishes() {
    let stack = stack(StackOptions {
        discord_token: None,
        auto_approve_on_soft_skip: true,
        ..StackOptions::default()
    })
    .await;

    let (_, response) = post_discord_webhook(&stack, &crash_report()).await;
    let workflow_id = workflow_id_from(&response);

    let description = stack
        .engine
        .await_terminal(&workflow_id, Duration::from_secs(10))
        .await
        .unwrap();
    assert_eq!(description.state, WorkflowState::PublishedTerminal);
    assert_eq!(description.external_ref.as_deref(), Some(TRACKER_URL));
}

#[tokio::test]
async fn s6_publish_conflict_recovers_the_existing_issue() {
    let stack = stack(StackOptions {
        mount_default_mocks: false,
        ..StackOptions::default()
    })
    .await;

    // Chat succeeds normally.
    Mock::given(method("POST"))
        .and(path("/channels/C1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "m1" })))
        .mount(&stack.discord)
        .await;
    // First search misses, create conflicts (the issue exists server-side
    // from a lost earlier attempt), second search recovers the URL.
    Mock::given(method("GET"))
        .and(path("/search/issues"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_count": 0,
            "items": []
        })))
        .up_to_n_times(1)
        .mount(&stack.github)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/acme/product/issues"))
        .respond_with(ResponseTemplate::new(409))
        .mount(&stack.github)
        .await;
    Mock::given(method("GET"))
        .and(path("/search/issues"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_count": 1,
            "items": [{ "html_url": TRACKER_URL }]
        })))
        .mount(&stack.github)
        .await;

    let (_, response) = post_discord_webhook(&stack, &crash_report()).await;
    let workflow_id = workflow_id_from(&response);
    wait_for_state(&stack, &workflow_id, WorkflowState::AwaitingApproval).await;

    post_interaction(&stack, &button_click(&format!("approve:{workflow_id}"))).await;

    let description = stack
        .engine
        .await_terminal(&workflow_id, Duration::from_secs(10))
        .await
        .unwrap();
    assert_eq!(description.state, WorkflowState::PublishedTerminal);
    assert_eq!(description.external_ref.as_deref(), Some(TRACKER_URL));
}

#[tokio::test]
async fn describe_endpoint_projects_workflow_state() {
    let stack = stack(StackOptions::default()).await;

    let (_, response) = post_discord_webhook(&stack, &crash_report()).await;
    let workflow_id = workflow_id_from(&response);
    wait_for_state(&stack, &workflow_id, WorkflowState::AwaitingApproval).await;

    let request = axum::http::Request::builder()
        .method("GET")
        .uri(format!("/workflows/{workflow_id}"))
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, body) = common::send(&stack, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "awaiting_approval");
    assert_eq!(body["workflow_id"], workflow_id.as_str());
}
