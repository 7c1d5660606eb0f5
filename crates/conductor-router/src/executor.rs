use async_trait::async_trait;
use conductor_core::{ConductorResult, Task};
use serde::{Deserialize, Serialize};

/// Terminal status of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Completed,
    Failed,
}

/// Severity of a review issue, ordered ascending so issues can be sorted
/// most-severe-first with `Reverse`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Info,
    Minor,
    Major,
    Critical,
}

/// One issue reported by a reviewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewIssue {
    pub description: String,
    pub severity: IssueSeverity,
}

/// Structured payload attached to review-category outcomes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewReport {
    #[serde(default)]
    pub issues: Vec<ReviewIssue>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    /// Reviewer's overall quality score in [0.0, 1.0].
    #[serde(default)]
    pub quality_score: f64,
}

/// What one execution of a task produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub status: OutcomeStatus,
    /// Primary textual artifact (code, report, answer).
    #[serde(default)]
    pub output: String,
    /// References to stored outputs (paths, artifact ids).
    #[serde(default)]
    pub output_refs: Vec<String>,
    /// Self-reported confidence in [0.0, 1.0].
    #[serde(default)]
    pub confidence: f64,
    /// Present for review-category work.
    #[serde(default)]
    pub review: Option<ReviewReport>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ExecutionOutcome {
    /// A completed outcome with the given output text.
    pub fn completed(output: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Completed,
            output: output.into(),
            output_refs: Vec::new(),
            confidence: 1.0,
            review: None,
            error: None,
        }
    }

    /// A failed outcome with the given error message.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Failed,
            output: String::new(),
            output_refs: Vec::new(),
            confidence: 0.0,
            review: None,
            error: Some(error.into()),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_output_refs(mut self, refs: Vec<String>) -> Self {
        self.output_refs = refs;
        self
    }

    pub fn with_review(mut self, review: ReviewReport) -> Self {
        self.review = Some(review);
        self
    }

    /// True when the execution completed.
    pub fn is_completed(&self) -> bool {
        self.status == OutcomeStatus::Completed
    }
}

/// Boundary to the external collaborator that does the actual work.
///
/// Everything behind this trait — model calls, code generation, review
/// text — is out of scope for the core. Implementations must be safe to
/// call repeatedly: the resilience layer may retry.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Perform the task and report what happened.
    async fn execute(&self, task: &Task) -> ConductorResult<ExecutionOutcome>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(IssueSeverity::Critical > IssueSeverity::Major);
        assert!(IssueSeverity::Major > IssueSeverity::Minor);
        assert!(IssueSeverity::Minor > IssueSeverity::Info);
    }

    #[test]
    fn test_outcome_builders() {
        let ok = ExecutionOutcome::completed("fn main() {}")
            .with_confidence(0.8)
            .with_output_refs(vec!["artifacts/main.rs".into()]);
        assert!(ok.is_completed());
        assert_eq!(ok.confidence, 0.8);
        assert_eq!(ok.output_refs.len(), 1);

        let bad = ExecutionOutcome::failed("compile error");
        assert!(!bad.is_completed());
        assert_eq!(bad.error.as_deref(), Some("compile error"));
    }

    #[test]
    fn test_outcome_json_roundtrip() {
        let outcome = ExecutionOutcome::completed("done").with_review(ReviewReport {
            issues: vec![ReviewIssue {
                description: "missing tests".into(),
                severity: IssueSeverity::Major,
            }],
            suggestions: vec!["add a regression test".into()],
            quality_score: 0.7,
        });
        let json = serde_json::to_string(&outcome).unwrap();
        let parsed: ExecutionOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.review.unwrap().issues.len(), 1);
    }
}
