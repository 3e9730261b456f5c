//! Gateway boundary behaviors: authentication, validation, body limits,
//! liveness, and the interaction handler's edge cases.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use serde_json::json;

use swarm_api::server::MAX_BODY_BYTES;
use swarm_api::verify::REPLAY_WINDOW_SECS;
use swarm_test_utils::slack_signature;

use common::{
    StackOptions, button_click, post_discord_webhook, post_interaction, post_slack_webhook, send,
    stack,
};

#[tokio::test]
async fn health_reports_healthy() {
    let stack = stack(StackOptions::default()).await;
    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&stack, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert!(body["ts"].as_str().is_some());
}

#[tokio::test]
async fn health_details_reports_dependencies() {
    let stack = stack(StackOptions::default()).await;
    let request = Request::builder()
        .method("GET")
        .uri("/health/details")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&stack, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    let names: Vec<&str> = body["dependencies"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"storage"));
    assert!(names.contains(&"broker"));
    assert!(names.contains(&"analyzer"));
}

#[tokio::test]
async fn health_details_degrades_when_analyzer_is_down() {
    let stack = stack(StackOptions::default()).await;
    stack.analyzer_handle.abort();
    // Give the listener a moment to actually close.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let request = Request::builder()
        .method("GET")
        .uri("/health/details")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&stack, request).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn valid_discord_webhook_is_accepted_and_enqueued() {
    let stack = stack(StackOptions::default()).await;
    let (status, body) = post_discord_webhook(
        &stack,
        &json!({ "content": "something is off", "channel_id": "C1" }),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "accepted");
    assert!(body["feedback_id"].as_str().is_some());
    assert_eq!(stack.broker.record_count(), 1);
}

#[tokio::test]
async fn empty_text_is_rejected_without_enqueueing() {
    let stack = stack(StackOptions::default()).await;
    let (status, _) =
        post_discord_webhook(&stack, &json!({ "content": "   ", "channel_id": "C1" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(stack.broker.record_count(), 0);
}

#[tokio::test]
async fn unsigned_webhook_is_unauthorized() {
    let stack = stack(StackOptions::default()).await;
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/discord")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"content":"hi"}"#))
        .unwrap();
    let (status, body) = send(&stack, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
    assert_eq!(stack.broker.record_count(), 0);
}

#[tokio::test]
async fn structural_and_cryptographic_failures_look_identical() {
    let stack = stack(StackOptions::default()).await;
    let body_bytes = br#"{"content":"hi"}"#.to_vec();
    let timestamp = Utc::now().timestamp().to_string();

    let garbage = Request::builder()
        .method("POST")
        .uri("/webhooks/discord")
        .header("x-signature-ed25519", "zz-not-hex")
        .header("x-signature-timestamp", &timestamp)
        .body(Body::from(body_bytes.clone()))
        .unwrap();
    let (garbage_status, garbage_body) = send(&stack, garbage).await;

    let wrong_key = swarm_test_utils::DiscordSigner::generate();
    let forged = Request::builder()
        .method("POST")
        .uri("/webhooks/discord")
        .header("x-signature-ed25519", wrong_key.sign(&timestamp, &body_bytes))
        .header("x-signature-timestamp", &timestamp)
        .body(Body::from(body_bytes))
        .unwrap();
    let (forged_status, forged_body) = send(&stack, forged).await;

    assert_eq!(garbage_status, StatusCode::UNAUTHORIZED);
    assert_eq!(forged_status, StatusCode::UNAUTHORIZED);
    assert_eq!(garbage_body, forged_body);
}

#[tokio::test]
async fn replay_window_is_enforced() {
    let stack = stack(StackOptions::default()).await;
    let body = serde_json::to_vec(&json!({ "content": "hello", "channel_id": "C1" })).unwrap();

    // Just inside the window (two seconds of slack against clock ticks):
    // accepted. The exact 300/301 boundary is pinned by the verifier's
    // unit tests against a fixed clock.
    let at_edge = (Utc::now().timestamp() - REPLAY_WINDOW_SECS + 2).to_string();
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/discord")
        .header("x-signature-ed25519", stack.signer.sign(&at_edge, &body))
        .header("x-signature-timestamp", &at_edge)
        .body(Body::from(body.clone()))
        .unwrap();
    let (status, _) = send(&stack, request).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    // Past the window: rejected.
    let past_edge = (Utc::now().timestamp() - REPLAY_WINDOW_SECS - 2).to_string();
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/discord")
        .header("x-signature-ed25519", stack.signer.sign(&past_edge, &body))
        .header("x-signature-timestamp", &past_edge)
        .body(Body::from(body))
        .unwrap();
    let (status, _) = send(&stack, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn body_at_the_exact_limit_is_accepted() {
    let stack = stack(StackOptions::default()).await;

    // A valid, signed payload padded to exactly the body limit.
    let frame = r#"{"content":"","channel_id":"C1"}"#;
    let padding = "x".repeat(MAX_BODY_BYTES - frame.len());
    let body = format!(r#"{{"content":"{padding}","channel_id":"C1"}}"#).into_bytes();
    assert_eq!(body.len(), MAX_BODY_BYTES);

    let timestamp = Utc::now().timestamp().to_string();
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/discord")
        .header("x-signature-ed25519", stack.signer.sign(&timestamp, &body))
        .header("x-signature-timestamp", timestamp)
        .body(Body::from(body))
        .unwrap();
    let (status, _) = send(&stack, request).await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let stack = stack(StackOptions::default()).await;
    let oversized = vec![b'x'; MAX_BODY_BYTES + 1];
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/discord")
        .header("content-type", "application/json")
        .body(Body::from(oversized))
        .unwrap();
    let (status, _) = send(&stack, request).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(stack.broker.record_count(), 0);
}

#[tokio::test]
async fn slack_url_verification_echoes_the_challenge() {
    let stack = stack(StackOptions::default()).await;
    let (status, body) = post_slack_webhook(
        &stack,
        &json!({ "type": "url_verification", "challenge": "challenge-token-42" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["challenge"], "challenge-token-42");
    assert_eq!(stack.broker.record_count(), 0);
}

#[tokio::test]
async fn slack_event_callback_is_accepted() {
    let stack = stack(StackOptions::default()).await;
    let (status, body) = post_slack_webhook(
        &stack,
        &json!({
            "type": "event_callback",
            "event": {
                "type": "message",
                "text": "Search is returning stale results",
                "channel": "C9",
                "user": "U1",
                "ts": "1700000000.000100"
            }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body["feedback_id"].as_str().is_some());
    assert_eq!(stack.broker.record_count(), 1);
}

#[tokio::test]
async fn slack_signature_with_wrong_secret_is_rejected() {
    let stack = stack(StackOptions::default()).await;
    let payload = serde_json::to_vec(&json!({ "type": "url_verification", "challenge": "c" }))
        .unwrap();
    let timestamp = Utc::now().timestamp().to_string();
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/slack")
        .header(
            "x-slack-signature",
            slack_signature("wrong-secret", &timestamp, &payload),
        )
        .header("x-slack-request-timestamp", timestamp)
        .body(Body::from(payload))
        .unwrap();
    let (status, _) = send(&stack, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn interaction_ping_gets_a_pong() {
    let stack = stack(StackOptions::default()).await;
    let (status, body) = post_interaction(&stack, &json!({ "type": 1 })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], 1);
}

#[tokio::test]
async fn interaction_with_invalid_decision_is_rejected() {
    let stack = stack(StackOptions::default()).await;
    let (status, _) = post_interaction(&stack, &button_click("maybe:fbk-whatever")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn interaction_without_workflow_id_is_rejected() {
    let stack = stack(StackOptions::default()).await;
    let (status, _) = post_interaction(&stack, &button_click("approve:")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn interaction_for_unknown_workflow_gets_a_benign_ack() {
    let stack = stack(StackOptions::default()).await;
    let workflow_id = format!("fbk-{}", swarm_core::FeedbackId::generate());
    let (status, body) =
        post_interaction(&stack, &button_click(&format!("approve:{workflow_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], 4);
    assert!(body["data"]["content"]
        .as_str()
        .unwrap()
        .contains("no longer needed"));
}

#[tokio::test]
async fn unknown_workflow_projection_is_not_found() {
    let stack = stack(StackOptions::default()).await;
    let workflow_id = format!("fbk-{}", swarm_core::FeedbackId::generate());
    let request = Request::builder()
        .method("GET")
        .uri(format!("/workflows/{workflow_id}"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&stack, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_workflow_id_is_a_bad_request() {
    let stack = stack(StackOptions::default()).await;
    let request = Request::builder()
        .method("GET")
        .uri("/workflows/garbage")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&stack, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn debug_publish_endpoint_exists_only_in_debug_mode() {
    let without_debug = stack(StackOptions::default()).await;
    let request = Request::builder()
        .method("POST")
        .uri("/debug/feedback")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"text":"test feedback"}"#))
        .unwrap();
    let (status, _) = send(&without_debug, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let with_debug = stack(StackOptions {
        debug: true,
        ..StackOptions::default()
    })
    .await;
    let request = Request::builder()
        .method("POST")
        .uri("/debug/feedback")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"text":"test feedback"}"#))
        .unwrap();
    let (status, body) = send(&with_debug, request).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body["feedback_id"].as_str().is_some());
}
