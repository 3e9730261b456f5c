//! The analyzer RPC activity.
//!
//! Wraps the tonic client for `swarm.v1.Analyzer/AnalyzeFeedback`. The
//! channel is created lazily at construction and reconnects on demand, so
//! the worker starts even when the analyzer is still coming up.

use async_trait::async_trait;
use tonic::Code;
use tonic::transport::{Channel, Endpoint};

use swarm_core::{AnalysisResult, IssueSpec, IssueType, Severity};
use swarm_flow::{ActivityError, AnalyzeActivity, AnalyzeInput};
use swarm_proto::analyzer_client::AnalyzerClient;

/// Analyzer RPC activity over a shared lazily-connected channel.
#[derive(Debug, Clone)]
pub struct GrpcAnalyzer {
    channel: Channel,
}

impl GrpcAnalyzer {
    /// Creates an analyzer client for the given endpoint
    /// (e.g. `http://localhost:50051`).
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint URI is malformed.
    pub fn new(endpoint: impl Into<String>) -> swarm_core::Result<Self> {
        let endpoint = Endpoint::from_shared(endpoint.into())
            .map_err(|e| swarm_core::Error::InvalidInput(format!("invalid analyzer endpoint: {e}")))?;
        Ok(Self {
            channel: endpoint.connect_lazy(),
        })
    }
}

#[async_trait]
impl AnalyzeActivity for GrpcAnalyzer {
    #[tracing::instrument(skip(self, input), fields(source = %input.source))]
    async fn analyze(&self, input: AnalyzeInput) -> Result<AnalysisResult, ActivityError> {
        let request = swarm_proto::AnalyzeFeedbackRequest {
            text: input.text,
            source: input.source.as_str().to_string(),
            user_id: input.user_id.unwrap_or_default(),
        };

        let mut client = AnalyzerClient::new(self.channel.clone());
        match client.analyze_feedback(request).await {
            Ok(response) => convert_response(response.into_inner()),
            Err(status) => Err(classify_status(&status)),
        }
    }
}

/// Maps a gRPC status to the workflow's error taxonomy.
///
/// Only `invalid-argument` is fatal for a feedback item; everything else
/// (unavailable, resource-exhausted, deadline, internal) is retried.
fn classify_status(status: &tonic::Status) -> ActivityError {
    let message = format!("analyzer rpc {}: {}", status.code(), status.message());
    match status.code() {
        Code::InvalidArgument => ActivityError::fatal(message),
        _ => ActivityError::retryable(message),
    }
}

fn convert_response(
    response: swarm_proto::AnalyzeFeedbackResponse,
) -> Result<AnalysisResult, ActivityError> {
    let spec = if response.is_duplicate {
        None
    } else {
        let proto_spec = response.spec.ok_or_else(|| {
            ActivityError::fatal("analyzer returned no issue spec for non-duplicate feedback")
        })?;
        Some(convert_spec(proto_spec)?)
    };

    let duplicate_of =
        (response.is_duplicate && !response.duplicate_of.is_empty()).then_some(response.duplicate_of);

    Ok(AnalysisResult {
        is_duplicate: response.is_duplicate,
        duplicate_of,
        reasoning: response.reasoning,
        spec,
    })
}

fn convert_spec(spec: swarm_proto::IssueSpec) -> Result<IssueSpec, ActivityError> {
    let issue_type = match swarm_proto::IssueType::try_from(spec.r#type) {
        Ok(swarm_proto::IssueType::Bug) => IssueType::Bug,
        Ok(swarm_proto::IssueType::Feature) => IssueType::Feature,
        Ok(swarm_proto::IssueType::Question) => IssueType::Question,
        _ => IssueType::Unspecified,
    };
    let severity = match swarm_proto::Severity::try_from(spec.severity) {
        Ok(swarm_proto::Severity::Low) => Severity::Low,
        Ok(swarm_proto::Severity::Medium) => Severity::Medium,
        Ok(swarm_proto::Severity::High) => Severity::High,
        Ok(swarm_proto::Severity::Critical) => Severity::Critical,
        _ => Severity::Unspecified,
    };

    IssueSpec::new(
        spec.title,
        spec.description,
        issue_type,
        severity,
        spec.labels,
        spec.confidence,
    )
    .map_err(|e| ActivityError::fatal(format!("analyzer returned an invalid spec: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proto_spec() -> swarm_proto::IssueSpec {
        swarm_proto::IssueSpec {
            title: "App crashes on startup".into(),
            description: "Crash on boot".into(),
            r#type: swarm_proto::IssueType::Bug as i32,
            severity: swarm_proto::Severity::High as i32,
            labels: vec!["bug".into(), "crash".into()],
            confidence: 0.9,
        }
    }

    #[test]
    fn non_duplicate_response_converts_spec() {
        let result = convert_response(swarm_proto::AnalyzeFeedbackResponse {
            spec: Some(proto_spec()),
            is_duplicate: false,
            reasoning: "novel".into(),
            duplicate_of: String::new(),
        })
        .unwrap();
        assert!(!result.is_duplicate);
        let spec = result.spec.unwrap();
        assert_eq!(spec.issue_type, IssueType::Bug);
        assert_eq!(spec.severity, Severity::High);
        assert!(spec.labels.contains("crash"));
    }

    #[test]
    fn duplicate_response_needs_no_spec() {
        let result = convert_response(swarm_proto::AnalyzeFeedbackResponse {
            spec: None,
            is_duplicate: true,
            reasoning: "sim=0.97".into(),
            duplicate_of: "prior".into(),
        })
        .unwrap();
        assert!(result.is_duplicate);
        assert_eq!(result.duplicate_of.as_deref(), Some("prior"));
        assert!(result.spec.is_none());
    }

    #[test]
    fn missing_spec_for_non_duplicate_is_fatal() {
        let err = convert_response(swarm_proto::AnalyzeFeedbackResponse {
            spec: None,
            is_duplicate: false,
            reasoning: String::new(),
            duplicate_of: String::new(),
        })
        .unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn unknown_enum_values_map_to_unspecified() {
        let mut spec = proto_spec();
        spec.r#type = 99;
        spec.severity = 99;
        let converted = convert_spec(spec).unwrap();
        assert_eq!(converted.issue_type, IssueType::Unspecified);
        assert_eq!(converted.severity, Severity::Unspecified);
    }

    #[test]
    fn invalid_argument_is_fatal_everything_else_retries() {
        assert!(!classify_status(&tonic::Status::invalid_argument("empty text")).is_retryable());
        assert!(classify_status(&tonic::Status::unavailable("down")).is_retryable());
        assert!(classify_status(&tonic::Status::resource_exhausted("quota")).is_retryable());
        assert!(classify_status(&tonic::Status::deadline_exceeded("slow")).is_retryable());
        assert!(classify_status(&tonic::Status::internal("bug")).is_retryable());
    }

    #[test]
    fn bad_endpoint_is_rejected_at_construction() {
        assert!(GrpcAnalyzer::new("not a uri").is_err());
    }
}
