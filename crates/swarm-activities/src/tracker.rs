//! The tracker publish activity (GitHub REST).
//!
//! Creates one issue per approved feedback item. Idempotency: the
//! deterministic token derived from the feedback ID is embedded in the
//! issue body as a hidden HTML comment, and every attempt searches for
//! that marker before creating. A retry after a partial success (the
//! tracker created the issue but the response was lost) finds the marker
//! and recovers the existing URL instead of creating a duplicate.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use swarm_flow::{ActivityError, PublishActivity, PublishInput, PublishOutcome};

use crate::rate_limit::DestinationLimiter;

const DEFAULT_API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = "iterateswarm";

/// Label attached when the analyzer supplied none.
const DEFAULT_LABEL: &str = "ai-generated";

/// The `owner/repo` route of the target repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoTarget {
    /// Repository owner (user or organization).
    pub owner: String,
    /// Repository name.
    pub name: String,
}

impl FromStr for RepoTarget {
    type Err = swarm_core::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self {
                    owner: owner.to_string(),
                    name: name.to_string(),
                })
            }
            _ => Err(swarm_core::Error::InvalidInput(format!(
                "tracker target must be 'owner/repo' (got '{s}')"
            ))),
        }
    }
}

impl std::fmt::Display for RepoTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Formats the hidden idempotency marker embedded in issue bodies.
#[must_use]
pub fn idempotency_marker(token: &str) -> String {
    format!("<!-- {token} -->")
}

/// GitHub-backed publish activity.
pub struct GitHubPublisher {
    http: reqwest::Client,
    token: Option<String>,
    repo: Option<RepoTarget>,
    api_base: String,
    limiter: Option<Arc<DestinationLimiter>>,
}

impl GitHubPublisher {
    /// Creates a publisher. A `None` token or target puts the activity in
    /// soft-skip mode: it succeeds without publishing.
    #[must_use]
    pub fn new(token: Option<String>, repo: Option<RepoTarget>) -> Self {
        Self {
            http: reqwest::Client::new(),
            token,
            repo,
            api_base: DEFAULT_API_BASE.to_string(),
            limiter: None,
        }
    }

    /// Overrides the API base URL (tests).
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Attaches a per-destination rate limiter applied before each call.
    #[must_use]
    pub fn with_limiter(mut self, limiter: Arc<DestinationLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Searches for an existing issue carrying the idempotency token.
    async fn find_existing(
        &self,
        token: &str,
        repo: &RepoTarget,
        auth: &str,
    ) -> Result<Option<String>, ActivityError> {
        let query = format!("\"{token}\" repo:{repo} in:body");
        let response = self
            .http
            .get(format!("{}/search/issues", self.api_base))
            .query(&[("q", query.as_str())])
            .header("Authorization", format!("Bearer {auth}"))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(|e| ActivityError::retryable(format!("tracker transport error: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, "search"));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| ActivityError::retryable(format!("tracker search unreadable: {e}")))?;
        Ok(body
            .get("items")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .and_then(|item| item.get("html_url"))
            .and_then(Value::as_str)
            .map(ToString::to_string))
    }

    async fn create_issue(
        &self,
        input: &PublishInput,
        repo: &RepoTarget,
        auth: &str,
    ) -> Result<CreateOutcome, ActivityError> {
        let labels: Vec<String> = if input.spec.labels.is_empty() {
            vec![DEFAULT_LABEL.to_string()]
        } else {
            input.spec.labels.iter().cloned().collect()
        };
        let body = format!(
            "{}\n\n{}",
            input.spec.body,
            idempotency_marker(&input.idempotency_token)
        );

        let response = self
            .http
            .post(format!(
                "{}/repos/{}/{}/issues",
                self.api_base, repo.owner, repo.name
            ))
            .header("Authorization", format!("Bearer {auth}"))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT)
            .json(&json!({
                "title": input.spec.title,
                "body": body,
                "labels": labels,
            }))
            .send()
            .await
            .map_err(|e| ActivityError::retryable(format!("tracker transport error: {e}")))?;

        let status = response.status();
        if status.is_success() {
            let created: Value = response
                .json()
                .await
                .map_err(|e| ActivityError::retryable(format!("tracker response unreadable: {e}")))?;
            let url = created
                .get("html_url")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            return Ok(CreateOutcome::Created(url));
        }
        if status.as_u16() == 409 {
            // The issue already exists; the marker will locate it.
            return Ok(CreateOutcome::AlreadyExists);
        }
        Err(classify_status(status, "create"))
    }
}

enum CreateOutcome {
    Created(String),
    AlreadyExists,
}

/// Maps tracker HTTP statuses to the workflow's error taxonomy:
/// transport/5xx retry; 404 retries (eventual visibility); 4xx otherwise
/// is fatal.
fn classify_status(status: reqwest::StatusCode, operation: &str) -> ActivityError {
    let message = format!("tracker {operation} rejected with status {status}");
    if status.is_server_error() || status.as_u16() == 404 || status.as_u16() == 429 {
        ActivityError::retryable(message)
    } else {
        ActivityError::fatal(message)
    }
}

#[async_trait]
impl PublishActivity for GitHubPublisher {
    #[tracing::instrument(skip(self, input), fields(token = %input.idempotency_token))]
    async fn publish(&self, input: PublishInput) -> Result<PublishOutcome, ActivityError> {
        let (Some(auth), Some(repo)) = (self.token.as_deref(), self.repo.as_ref()) else {
            tracing::info!("tracker credential or target absent, soft-skipping publish");
            return Ok(PublishOutcome::SoftSkipped);
        };

        if let Some(limiter) = &self.limiter {
            limiter.acquire().await;
        }

        // Pre-check: a retry after partial success must find the issue the
        // first attempt created.
        if let Some(url) = self.find_existing(&input.idempotency_token, repo, auth).await? {
            tracing::info!(url, "existing issue recovered via idempotency marker");
            return Ok(PublishOutcome::Published { url });
        }

        match self.create_issue(&input, repo, auth).await? {
            CreateOutcome::Created(url) => {
                tracing::info!(url, "issue published");
                Ok(PublishOutcome::Published { url })
            }
            CreateOutcome::AlreadyExists => {
                let url = self
                    .find_existing(&input.idempotency_token, repo, auth)
                    .await?
                    .ok_or_else(|| {
                        ActivityError::retryable(
                            "tracker reported a conflict but the marker was not found",
                        )
                    })?;
                tracing::info!(url, "conflict resolved to existing issue");
                Ok(PublishOutcome::Published { url })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarm_core::{FeedbackId, IssueSpec, IssueType, Severity};
    use wiremock::matchers::{method, path, query_param_contains};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn input() -> PublishInput {
        PublishInput {
            spec: IssueSpec::new(
                "App crashes on startup",
                "Crash on boot",
                IssueType::Bug,
                Severity::High,
                ["bug".to_string()],
                0.9,
            )
            .unwrap(),
            idempotency_token: PublishInput::token_for(FeedbackId::generate()),
        }
    }

    fn publisher(server: &MockServer) -> GitHubPublisher {
        GitHubPublisher::new(
            Some("gh-token".into()),
            Some("acme/product".parse().unwrap()),
        )
        .with_api_base(server.uri())
    }

    fn empty_search() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "total_count": 0,
            "items": []
        }))
    }

    #[test]
    fn repo_target_parses_owner_slash_repo() {
        let target: RepoTarget = "acme/product".parse().unwrap();
        assert_eq!(target.owner, "acme");
        assert_eq!(target.name, "product");
        assert!("acme".parse::<RepoTarget>().is_err());
        assert!("acme/".parse::<RepoTarget>().is_err());
        assert!("a/b/c".parse::<RepoTarget>().is_err());
    }

    #[test]
    fn marker_format_is_stable() {
        let token = PublishInput::token_for(FeedbackId::generate());
        let marker = idempotency_marker(&token);
        assert!(marker.starts_with("<!-- swarm-feedback:"));
        assert!(marker.ends_with(" -->"));
    }

    #[tokio::test]
    async fn missing_credentials_soft_skip() {
        let publisher = GitHubPublisher::new(None, Some("acme/product".parse().unwrap()));
        let outcome = publisher.publish(input()).await.unwrap();
        assert_eq!(outcome, PublishOutcome::SoftSkipped);
    }

    #[tokio::test]
    async fn creates_issue_with_marker_and_labels() {
        let server = MockServer::start().await;
        let input = input();

        Mock::given(method("GET"))
            .and(path("/search/issues"))
            .respond_with(empty_search())
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/repos/acme/product/issues"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "html_url": "https://tracker/1",
                "number": 1
            })))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = publisher(&server).publish(input.clone()).await.unwrap();
        assert_eq!(
            outcome,
            PublishOutcome::Published {
                url: "https://tracker/1".into()
            }
        );

        // The created issue embeds the idempotency marker.
        let requests = server.received_requests().await.unwrap();
        let create = requests
            .iter()
            .find(|r| r.method.as_str() == "POST")
            .unwrap();
        let body: Value = serde_json::from_slice(&create.body).unwrap();
        assert!(body["body"]
            .as_str()
            .unwrap()
            .contains(&idempotency_marker(&input.idempotency_token)));
        assert_eq!(body["labels"][0], "bug");
    }

    #[tokio::test]
    async fn retry_after_partial_success_recovers_url() {
        let server = MockServer::start().await;
        let input = input();

        // The issue already exists from a lost first attempt.
        Mock::given(method("GET"))
            .and(path("/search/issues"))
            .and(query_param_contains("q", &input.idempotency_token))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "total_count": 1,
                "items": [{ "html_url": "https://tracker/1" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = publisher(&server).publish(input).await.unwrap();
        assert_eq!(
            outcome,
            PublishOutcome::Published {
                url: "https://tracker/1".into()
            }
        );
        // No create request was made.
        let requests = server.received_requests().await.unwrap();
        assert!(requests.iter().all(|r| r.method.as_str() != "POST"));
    }

    #[tokio::test]
    async fn conflict_resolves_to_existing_issue() {
        let server = MockServer::start().await;

        // First search: nothing. Create: 409. Second search: found.
        Mock::given(method("GET"))
            .and(path("/search/issues"))
            .respond_with(empty_search())
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/repos/acme/product/issues"))
            .respond_with(ResponseTemplate::new(409))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search/issues"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "total_count": 1,
                "items": [{ "html_url": "https://tracker/1" }]
            })))
            .mount(&server)
            .await;

        let outcome = publisher(&server).publish(input()).await.unwrap();
        assert_eq!(
            outcome,
            PublishOutcome::Published {
                url: "https://tracker/1".into()
            }
        );
    }

    #[tokio::test]
    async fn auth_failure_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/issues"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = publisher(&server).publish(input()).await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn server_errors_are_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/issues"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = publisher(&server).publish(input()).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
