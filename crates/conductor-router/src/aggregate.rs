use crate::executor::{ExecutionOutcome, ReviewIssue, ReviewReport};
use conductor_core::{AgentClass, TaskCategory};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashSet;

/// One branch's contribution to a hybrid execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub class: AgentClass,
    pub outcome: ExecutionOutcome,
}

/// The merged result of a hybrid execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridResult {
    /// The chosen outcome. For reviews, its report is the merged report.
    pub primary: ExecutionOutcome,
    /// Which class produced the primary.
    pub primary_class: AgentClass,
    /// Non-empty outputs of the candidates that were not chosen.
    pub alternatives: Vec<String>,
    /// Fraction of candidates whose output text equals the primary's.
    pub consensus_score: f64,
    /// Every class that contributed a candidate.
    pub contributors: Vec<AgentClass>,
}

impl HybridResult {
    /// Collapse into the primary outcome for reporting through the
    /// single-outcome worker channel.
    pub fn into_outcome(self) -> ExecutionOutcome {
        self.primary
    }
}

/// Merge hybrid candidates according to the task's category.
///
/// `candidates` must be non-empty; the hybrid executor guarantees that by
/// failing the task when every branch errored.
pub fn aggregate(category: TaskCategory, candidates: Vec<Candidate>) -> HybridResult {
    match category {
        TaskCategory::Review => aggregate_review(candidates),
        // code generation merges alternatives; everything else just picks
        // the most confident candidate
        _ => aggregate_by_confidence(candidates, category == TaskCategory::CodeGeneration),
    }
}

/// Index of the most confident candidate; first wins on ties.
fn most_confident(candidates: &[Candidate]) -> usize {
    let mut best = 0;
    for (i, candidate) in candidates.iter().enumerate().skip(1) {
        if candidate.outcome.confidence > candidates[best].outcome.confidence {
            best = i;
        }
    }
    best
}

fn consensus(candidates: &[Candidate], primary_output: &str) -> f64 {
    let agreeing = candidates
        .iter()
        .filter(|c| c.outcome.output == primary_output)
        .count();
    agreeing as f64 / candidates.len() as f64
}

fn aggregate_by_confidence(candidates: Vec<Candidate>, keep_alternatives: bool) -> HybridResult {
    let contributors: Vec<AgentClass> = candidates.iter().map(|c| c.class).collect();
    let best = most_confident(&candidates);
    let consensus_score = consensus(&candidates, &candidates[best].outcome.output);

    let alternatives = if keep_alternatives {
        candidates
            .iter()
            .enumerate()
            .filter(|(i, c)| *i != best && !c.outcome.output.is_empty())
            .map(|(_, c)| c.outcome.output.clone())
            .collect()
    } else {
        Vec::new()
    };

    let primary_class = candidates[best].class;
    let primary = candidates.into_iter().nth(best).map(|c| c.outcome);

    HybridResult {
        // best is a valid index by construction
        primary: primary.unwrap_or_else(|| ExecutionOutcome::failed("no candidates")),
        primary_class,
        alternatives,
        consensus_score,
        contributors,
    }
}

fn aggregate_review(candidates: Vec<Candidate>) -> HybridResult {
    let mut issues: Vec<ReviewIssue> = Vec::new();
    let mut seen_issues: HashSet<String> = HashSet::new();
    let mut suggestions: Vec<String> = Vec::new();
    let mut seen_suggestions: HashSet<String> = HashSet::new();
    let mut quality_scores: Vec<f64> = Vec::new();

    for candidate in &candidates {
        let Some(report) = &candidate.outcome.review else {
            continue;
        };
        quality_scores.push(report.quality_score);
        for issue in &report.issues {
            if seen_issues.insert(issue.description.clone()) {
                issues.push(issue.clone());
            }
        }
        for suggestion in &report.suggestions {
            if seen_suggestions.insert(suggestion.clone()) {
                suggestions.push(suggestion.clone());
            }
        }
    }

    issues.sort_by_key(|issue| Reverse(issue.severity));

    let overall_quality = if quality_scores.is_empty() {
        0.0
    } else {
        quality_scores.iter().sum::<f64>() / quality_scores.len() as f64
    };

    let merged = ReviewReport {
        issues,
        suggestions,
        quality_score: overall_quality,
    };

    let mut result = aggregate_by_confidence(candidates, false);
    result.primary = result.primary.with_review(merged);
    result
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::executor::IssueSeverity;

    fn candidate(class: AgentClass, output: &str, confidence: f64) -> Candidate {
        Candidate {
            class,
            outcome: ExecutionOutcome::completed(output).with_confidence(confidence),
        }
    }

    #[test]
    fn test_code_gen_primary_and_consensus() {
        // 0.9 and 0.6 agree on the output text; primary is the 0.9 one and
        // consensus is 2/3
        let candidates = vec![
            candidate(AgentClass::Planner, "fn a() {}", 0.9),
            candidate(AgentClass::Builder, "fn b() {}", 0.7),
            candidate(AgentClass::Builder, "fn a() {}", 0.6),
        ];

        let result = aggregate(TaskCategory::CodeGeneration, candidates);
        assert_eq!(result.primary.output, "fn a() {}");
        assert_eq!(result.primary_class, AgentClass::Planner);
        assert_eq!(result.primary.confidence, 0.9);
        assert!((result.consensus_score - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(result.alternatives, vec!["fn b() {}".to_string(), "fn a() {}".to_string()]);
    }

    #[test]
    fn test_code_gen_tie_keeps_first() {
        let candidates = vec![
            candidate(AgentClass::Planner, "first", 0.8),
            candidate(AgentClass::Builder, "second", 0.8),
        ];
        let result = aggregate(TaskCategory::CodeGeneration, candidates);
        assert_eq!(result.primary.output, "first");
        assert_eq!(result.primary_class, AgentClass::Planner);
    }

    #[test]
    fn test_code_gen_empty_alternatives_dropped() {
        let candidates = vec![
            candidate(AgentClass::Planner, "real output", 0.9),
            candidate(AgentClass::Builder, "", 0.5),
        ];
        let result = aggregate(TaskCategory::CodeGeneration, candidates);
        assert!(result.alternatives.is_empty());
    }

    #[test]
    fn test_review_union_dedup_and_sort() {
        let report_a = ReviewReport {
            issues: vec![
                ReviewIssue {
                    description: "unchecked index".into(),
                    severity: IssueSeverity::Major,
                },
                ReviewIssue {
                    description: "typo in doc".into(),
                    severity: IssueSeverity::Info,
                },
            ],
            suggestions: vec!["add bounds check".into()],
            quality_score: 0.8,
        };
        let report_b = ReviewReport {
            issues: vec![
                ReviewIssue {
                    description: "unchecked index".into(),
                    severity: IssueSeverity::Major,
                },
                ReviewIssue {
                    description: "panics on empty input".into(),
                    severity: IssueSeverity::Critical,
                },
            ],
            suggestions: vec!["add bounds check".into(), "handle empty input".into()],
            quality_score: 0.6,
        };

        let candidates = vec![
            Candidate {
                class: AgentClass::Planner,
                outcome: ExecutionOutcome::completed("review A")
                    .with_confidence(0.9)
                    .with_review(report_a),
            },
            Candidate {
                class: AgentClass::Builder,
                outcome: ExecutionOutcome::completed("review B")
                    .with_confidence(0.7)
                    .with_review(report_b),
            },
        ];

        let result = aggregate(TaskCategory::Review, candidates);
        let merged = result.primary.review.unwrap();

        // deduplicated union: 3 distinct issues, most severe first
        assert_eq!(merged.issues.len(), 3);
        assert_eq!(merged.issues[0].severity, IssueSeverity::Critical);
        assert_eq!(merged.issues[0].description, "panics on empty input");
        assert_eq!(merged.issues[2].severity, IssueSeverity::Info);

        assert_eq!(merged.suggestions.len(), 2);
        assert!((merged.quality_score - 0.7).abs() < 1e-9);

        // primary is still the most confident reviewer's outcome
        assert_eq!(result.primary.output, "review A");
    }

    #[test]
    fn test_default_aggregation_no_merging() {
        let candidates = vec![
            candidate(AgentClass::Planner, "analysis A", 0.6),
            candidate(AgentClass::Builder, "analysis B", 0.9),
        ];
        let result = aggregate(TaskCategory::Analysis, candidates);
        assert_eq!(result.primary.output, "analysis B");
        assert!(result.alternatives.is_empty());
        assert_eq!(result.contributors.len(), 2);
    }

    #[test]
    fn test_single_candidate() {
        let candidates = vec![candidate(AgentClass::Builder, "only", 0.5)];
        let result = aggregate(TaskCategory::CodeGeneration, candidates);
        assert_eq!(result.primary.output, "only");
        assert_eq!(result.consensus_score, 1.0);
        assert!(result.alternatives.is_empty());
    }
}
