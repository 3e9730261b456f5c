//! In-process analyzer server for tests.
//!
//! Implements the `swarm.v1.Analyzer` contract faithfully enough to test
//! against: feedback text is embedded into a fixed-dimensional vector, the
//! top-1 cosine match against the index decides duplicates, and a
//! non-duplicate item is indexed *before* the response is sent, so two
//! near-identical items arriving in sequence cannot both be accepted.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::{Request, Response, Status};
use ulid::Ulid;

use swarm_proto::analyzer_server::{Analyzer, AnalyzerServer};
use swarm_proto::{AnalyzeFeedbackRequest, AnalyzeFeedbackResponse, IssueSpec, IssueType, Severity};

const EMBEDDING_DIM: usize = 64;

/// Default similarity threshold, matching the pipeline default.
pub const DEFAULT_THRESHOLD: f64 = 0.85;

/// Embeds text as a normalized hashed bag-of-words vector.
fn embed(text: &str) -> Vec<f64> {
    let mut vector = vec![0.0_f64; EMBEDDING_DIM];
    for word in text.to_lowercase().split_whitespace() {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in word.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        vector[(hash % EMBEDDING_DIM as u64) as usize] += 1.0;
    }
    let norm = vector.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

fn cosine(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Drafts a deterministic issue spec from raw text.
fn draft_spec(text: &str) -> IssueSpec {
    let lower = text.to_lowercase();
    let (issue_type, severity, labels): (IssueType, Severity, Vec<&str>) =
        if lower.contains("crash") {
            (IssueType::Bug, Severity::High, vec!["bug", "crash"])
        } else if lower.contains("broken") || lower.contains("error") || lower.contains("bug") {
            (IssueType::Bug, Severity::Medium, vec!["bug"])
        } else if lower.ends_with('?') || lower.starts_with("how ") {
            (IssueType::Question, Severity::Unspecified, vec!["question"])
        } else if lower.contains("feature") || lower.contains("would be nice") {
            (IssueType::Feature, Severity::Low, vec!["feature"])
        } else {
            (IssueType::Unspecified, Severity::Unspecified, vec![])
        };

    let title: String = text.lines().next().unwrap_or(text).chars().take(255).collect();
    IssueSpec {
        title,
        description: text.to_string(),
        r#type: issue_type as i32,
        severity: severity as i32,
        labels: labels.into_iter().map(ToString::to_string).collect(),
        confidence: 0.9,
    }
}

/// Scripted analyzer: canned responses first, then the heuristic drafting
/// path with a real similarity index.
pub struct ScriptedAnalyzer {
    threshold: f64,
    index: Mutex<Vec<(String, Vec<f64>)>>,
    script: Mutex<VecDeque<Result<AnalyzeFeedbackResponse, Status>>>,
}

impl Default for ScriptedAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl ScriptedAnalyzer {
    /// Creates an analyzer with the given duplicate threshold.
    #[must_use]
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            index: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
        }
    }

    /// Queues a canned outcome returned before heuristic analysis resumes.
    pub fn push_response(&self, response: Result<AnalyzeFeedbackResponse, Status>) {
        self.script.lock().unwrap().push_back(response);
    }

    /// Number of items currently indexed.
    #[must_use]
    pub fn indexed_count(&self) -> usize {
        self.index.lock().unwrap().len()
    }
}

#[tonic::async_trait]
impl Analyzer for ScriptedAnalyzer {
    async fn analyze_feedback(
        &self,
        request: Request<AnalyzeFeedbackRequest>,
    ) -> Result<Response<AnalyzeFeedbackResponse>, Status> {
        if let Some(scripted) = self.script.lock().unwrap().pop_front() {
            return scripted.map(Response::new);
        }

        let request = request.into_inner();
        if request.text.trim().is_empty() {
            return Err(Status::invalid_argument("text must not be empty"));
        }

        let embedding = embed(&request.text);
        let mut index = self.index.lock().unwrap();

        let best = index
            .iter()
            .map(|(id, stored)| (id.clone(), cosine(&embedding, stored)))
            .max_by(|a, b| a.1.total_cmp(&b.1));

        if let Some((duplicate_of, score)) = best {
            if score >= self.threshold {
                return Ok(Response::new(AnalyzeFeedbackResponse {
                    spec: None,
                    is_duplicate: true,
                    reasoning: format!("sim={score:.2}"),
                    duplicate_of,
                }));
            }
        }

        // Index before replying: a racing near-duplicate must observe this
        // item.
        let id = Ulid::new().to_string();
        index.push((id, embedding));
        drop(index);

        Ok(Response::new(AnalyzeFeedbackResponse {
            spec: Some(draft_spec(&request.text)),
            is_duplicate: false,
            reasoning: "no similar feedback indexed".to_string(),
            duplicate_of: String::new(),
        }))
    }
}

/// Serves an analyzer on an ephemeral local port.
///
/// Returns the endpoint URI (`http://127.0.0.1:{port}`) and the server
/// task handle.
///
/// # Panics
///
/// Panics if no local port can be bound (test environment failure).
pub async fn serve_analyzer(analyzer: ScriptedAnalyzer) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind analyzer test port");
    let addr = listener.local_addr().expect("analyzer local addr");
    let endpoint = format!("http://{addr}");

    let handle = tokio::spawn(async move {
        let result = tonic::transport::Server::builder()
            .add_service(AnalyzerServer::new(analyzer))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await;
        if let Err(error) = result {
            tracing::error!(%error, "test analyzer server exited");
        }
    });

    (endpoint, handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(text: &str) -> Request<AnalyzeFeedbackRequest> {
        Request::new(AnalyzeFeedbackRequest {
            text: text.to_string(),
            source: "discord".into(),
            user_id: "alice".into(),
        })
    }

    #[tokio::test]
    async fn identical_text_is_a_duplicate_of_the_first() {
        let analyzer = ScriptedAnalyzer::default();

        let first = analyzer
            .analyze_feedback(request("Login button is broken"))
            .await
            .unwrap()
            .into_inner();
        assert!(!first.is_duplicate);
        assert_eq!(analyzer.indexed_count(), 1);

        let second = analyzer
            .analyze_feedback(request("Login button is broken"))
            .await
            .unwrap()
            .into_inner();
        assert!(second.is_duplicate);
        assert!(!second.duplicate_of.is_empty());
        // The duplicate was not indexed.
        assert_eq!(analyzer.indexed_count(), 1);
    }

    #[tokio::test]
    async fn unrelated_text_is_not_a_duplicate() {
        let analyzer = ScriptedAnalyzer::default();
        analyzer
            .analyze_feedback(request("Login button is broken"))
            .await
            .unwrap();
        let second = analyzer
            .analyze_feedback(request("Exported reports render upside down on tablets"))
            .await
            .unwrap()
            .into_inner();
        assert!(!second.is_duplicate);
        assert_eq!(analyzer.indexed_count(), 2);
    }

    #[tokio::test]
    async fn empty_text_is_invalid_argument() {
        let analyzer = ScriptedAnalyzer::default();
        let status = analyzer.analyze_feedback(request("   ")).await.unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn crash_reports_draft_a_high_severity_bug() {
        let analyzer = ScriptedAnalyzer::default();
        let response = analyzer
            .analyze_feedback(request("App crashes on startup"))
            .await
            .unwrap()
            .into_inner();
        let spec = response.spec.unwrap();
        assert_eq!(spec.r#type, IssueType::Bug as i32);
        assert_eq!(spec.severity, Severity::High as i32);
        assert_eq!(spec.labels, vec!["bug", "crash"]);
        assert!((spec.confidence - 0.9).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn scripted_responses_take_precedence() {
        let analyzer = ScriptedAnalyzer::default();
        analyzer.push_response(Err(Status::unavailable("down for maintenance")));
        let status = analyzer
            .analyze_feedback(request("anything"))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unavailable);
    }
}
