//! The feedback domain model.
//!
//! [`FeedbackEvent`] is the immutable ingestion record: created at the
//! gateway, JSON-encoded onto the broker keyed by its feedback ID, and never
//! mutated afterwards. [`AnalysisResult`] and [`IssueSpec`] are the
//! analyzer's output, stored inside the workflow journal.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::id::FeedbackId;

/// Maximum length of an issue title.
pub const MAX_TITLE_LEN: usize = 255;

/// Where a feedback item entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackSource {
    /// Discord webhook ingestion.
    Discord,
    /// Slack webhook ingestion.
    Slack,
    /// Direct submission (debug endpoint, operator tooling).
    Direct,
}

impl FeedbackSource {
    /// Returns the canonical wire name of the source.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Discord => "discord",
            Self::Slack => "slack",
            Self::Direct => "direct",
        }
    }
}

impl fmt::Display for FeedbackSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque per-source context carried alongside the raw text.
///
/// The orchestrator treats this as a value bag; only the notify activity
/// interprets `channel_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackOrigin {
    /// Channel the feedback was posted in, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    /// Platform identifier of the author, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Platform identifier of the originating message, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

/// The immutable ingestion record for one inbound user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEvent {
    /// Unique identifier, assigned at the gateway.
    pub feedback_id: FeedbackId,
    /// Raw feedback content.
    pub text: String,
    /// Which platform the feedback came from.
    pub source: FeedbackSource,
    /// Per-source context (channel, author, message).
    #[serde(default)]
    pub origin: FeedbackOrigin,
    /// When the gateway accepted the feedback.
    pub received_at: DateTime<Utc>,
}

impl FeedbackEvent {
    /// Creates a new feedback event with a fresh ID and the current time.
    ///
    /// # Errors
    ///
    /// Returns an error if `text` is empty after trimming.
    pub fn new(
        text: impl Into<String>,
        source: FeedbackSource,
        origin: FeedbackOrigin,
    ) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(Error::InvalidInput(
                "feedback text must not be empty".to_string(),
            ));
        }
        Ok(Self {
            feedback_id: FeedbackId::generate(),
            text,
            source,
            origin,
            received_at: Utc::now(),
        })
    }
}

/// Issue classification produced by the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    /// A defect report.
    Bug,
    /// A feature request.
    Feature,
    /// A question rather than actionable feedback.
    Question,
    /// The analyzer could not classify the feedback.
    #[default]
    Unspecified,
}

impl IssueType {
    /// Returns the canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bug => "bug",
            Self::Feature => "feature",
            Self::Question => "question",
            Self::Unspecified => "unspecified",
        }
    }

    /// Returns the emoji shown in chat prompts for this type.
    #[must_use]
    pub const fn emoji(self) -> &'static str {
        match self {
            Self::Bug => "\u{1f41b}",         // 🐛
            Self::Feature => "\u{2728}",      // ✨
            Self::Question => "\u{2753}",     // ❓
            Self::Unspecified => "\u{1f4dd}", // 📝
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity assigned by the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Minor annoyance.
    Low,
    /// Degraded experience with a workaround.
    Medium,
    /// Major functionality broken.
    High,
    /// Data loss, security, or total outage.
    Critical,
    /// The analyzer did not assign a severity.
    #[default]
    Unspecified,
}

impl Severity {
    /// Returns the canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
            Self::Unspecified => "unspecified",
        }
    }

    /// Returns the embed color shown in chat prompts for this severity.
    #[must_use]
    pub const fn color(self) -> u32 {
        match self {
            Self::Critical => 0x00ff_0000,
            Self::High => 0x00ff_6600,
            Self::Medium => 0x00ff_ff00,
            Self::Low => 0x0000_ff00,
            Self::Unspecified => 0x0080_8080,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The structured artifact to be published to the issue tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueSpec {
    /// Issue title, at most [`MAX_TITLE_LEN`] characters.
    pub title: String,
    /// Markdown body.
    pub body: String,
    /// Issue classification.
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    /// Issue severity.
    pub severity: Severity,
    /// Labels to attach on publish.
    pub labels: BTreeSet<String>,
    /// Analyzer confidence in [0, 1].
    pub confidence: f64,
}

impl IssueSpec {
    /// Creates a new issue spec, enforcing the title bound and clamping
    /// confidence into [0, 1].
    ///
    /// # Errors
    ///
    /// Returns an error if the title is empty.
    pub fn new(
        title: impl Into<String>,
        body: impl Into<String>,
        issue_type: IssueType,
        severity: Severity,
        labels: impl IntoIterator<Item = String>,
        confidence: f64,
    ) -> Result<Self> {
        let mut title = title.into();
        if title.trim().is_empty() {
            return Err(Error::InvalidInput("issue title must not be empty".into()));
        }
        if title.chars().count() > MAX_TITLE_LEN {
            title = title.chars().take(MAX_TITLE_LEN).collect();
        }
        Ok(Self {
            title,
            body: body.into(),
            issue_type,
            severity,
            labels: labels.into_iter().collect(),
            confidence: confidence.clamp(0.0, 1.0),
        })
    }
}

/// The analyzer's verdict for one feedback event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Whether the feedback semantically duplicates an earlier item.
    pub is_duplicate: bool,
    /// The earlier item this duplicates, when `is_duplicate`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<String>,
    /// Free-text reasoning from the analyzer.
    pub reasoning: String,
    /// The drafted issue spec; present when not a duplicate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<IssueSpec>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_feedback_text_is_rejected() {
        let err = FeedbackEvent::new("   ", FeedbackSource::Direct, FeedbackOrigin::default())
            .unwrap_err();
        assert!(err.to_string().contains("must not be empty"));
    }

    #[test]
    fn feedback_event_serde_roundtrip() {
        let event = FeedbackEvent::new(
            "App crashes on startup",
            FeedbackSource::Discord,
            FeedbackOrigin {
                channel_id: Some("C1".into()),
                user_id: Some("alice".into()),
                message_id: None,
            },
        )
        .unwrap();
        let json = serde_json::to_string(&event).unwrap();
        let parsed: FeedbackEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
        assert!(json.contains("\"discord\""));
    }

    #[test]
    fn severity_color_mapping_is_stable() {
        assert_eq!(Severity::Critical.color(), 0x00ff_0000);
        assert_eq!(Severity::High.color(), 0x00ff_6600);
        assert_eq!(Severity::Medium.color(), 0x00ff_ff00);
        assert_eq!(Severity::Low.color(), 0x0000_ff00);
        assert_eq!(Severity::Unspecified.color(), 0x0080_8080);
    }

    #[test]
    fn issue_type_emoji_mapping_is_stable() {
        assert_eq!(IssueType::Bug.emoji(), "🐛");
        assert_eq!(IssueType::Feature.emoji(), "✨");
        assert_eq!(IssueType::Question.emoji(), "❓");
        assert_eq!(IssueType::Unspecified.emoji(), "📝");
    }

    #[test]
    fn issue_spec_truncates_overlong_title() {
        let long = "x".repeat(MAX_TITLE_LEN + 40);
        let spec = IssueSpec::new(
            long,
            "body",
            IssueType::Bug,
            Severity::High,
            ["bug".to_string()],
            0.9,
        )
        .unwrap();
        assert_eq!(spec.title.chars().count(), MAX_TITLE_LEN);
    }

    #[test]
    fn issue_spec_clamps_confidence() {
        let spec = IssueSpec::new("t", "b", IssueType::Bug, Severity::Low, [], 1.7).unwrap();
        assert!((spec.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unspecified_defaults_are_the_serde_defaults() {
        assert_eq!(IssueType::default(), IssueType::Unspecified);
        assert_eq!(Severity::default(), Severity::Unspecified);
    }
}
