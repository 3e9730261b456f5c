//! Liveness and readiness endpoints.

use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;

use swarm_core::WritePrecondition;

use crate::server::AppState;

const DEPENDENCY_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// GET `/health`: process liveness.
pub async fn health() -> Response {
    Json(serde_json::json!({
        "status": "healthy",
        "ts": Utc::now().to_rfc3339(),
    }))
    .into_response()
}

/// Per-dependency readiness report.
#[derive(Debug, Serialize)]
pub struct DependencyReport {
    /// Dependency name.
    pub name: String,
    /// Whether the probe succeeded.
    pub healthy: bool,
    /// Probe detail (endpoint, error, or status note).
    pub detail: String,
}

/// GET `/health/details`: readiness with a per-dependency report.
///
/// 200 when every dependency probe passes; 503 with the full report
/// otherwise.
pub async fn health_details(State(state): State<AppState>) -> Response {
    let mut reports = Vec::new();

    reports.push(probe_storage(&state).await);
    reports.push(probe_broker(&state).await);
    reports.push(probe_analyzer(&state).await);
    reports.push(DependencyReport {
        name: "engine".to_string(),
        healthy: true,
        detail: format!(
            "namespace {} at {}",
            state.config.engine_namespace, state.config.engine_endpoint
        ),
    });

    let healthy = reports.iter().all(|report| report.healthy);
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = serde_json::json!({
        "status": if healthy { "healthy" } else { "degraded" },
        "ts": Utc::now().to_rfc3339(),
        "dependencies": reports,
    });
    (status, Json(body)).into_response()
}

async fn probe_storage(state: &AppState) -> DependencyReport {
    let path = format!("{}/health/probe", state.config.engine_namespace);
    let result = async {
        state
            .storage
            .put(&path, Bytes::from_static(b"ok"), WritePrecondition::None)
            .await?;
        state.storage.get(&path).await?;
        state.storage.delete(&path).await
    }
    .await;

    match result {
        Ok(()) => DependencyReport {
            name: "storage".to_string(),
            healthy: true,
            detail: "read/write probe ok".to_string(),
        },
        Err(error) => DependencyReport {
            name: "storage".to_string(),
            healthy: false,
            detail: error.to_string(),
        },
    }
}

async fn probe_broker(state: &AppState) -> DependencyReport {
    match state.producer.health().await {
        Ok(()) => DependencyReport {
            name: "broker".to_string(),
            healthy: true,
            detail: state.config.broker_brokers.clone(),
        },
        Err(error) => DependencyReport {
            name: "broker".to_string(),
            healthy: false,
            detail: error.to_string(),
        },
    }
}

async fn probe_analyzer(state: &AppState) -> DependencyReport {
    let endpoint = &state.config.analyzer_endpoint;
    let target = endpoint
        .trim_start_matches("http://")
        .trim_start_matches("https://")
        .to_string();

    let healthy = matches!(
        tokio::time::timeout(
            DEPENDENCY_PROBE_TIMEOUT,
            tokio::net::TcpStream::connect(&target),
        )
        .await,
        Ok(Ok(_))
    );
    DependencyReport {
        name: "analyzer".to_string(),
        healthy,
        detail: if healthy {
            format!("reachable at {endpoint}")
        } else {
            format!("unreachable at {endpoint}")
        },
    }
}
