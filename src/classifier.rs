//! Interpreting query results as findings.
//!
//! # Sampling
//!
//! A classifier never sees more than `sample_cap` rows. When a result is
//! larger, the first `sample_cap` rows are kept together with aggregate
//! counts over the whole result (total rows, omitted rows, non-null values
//! per column). The finding's supporting sample is that same subset.
//!
//! # Severity
//!
//! Severity comes from a [`SeverityPolicy`]. [`DefaultSeverityPolicy`]:
//!
//! 1. a per-category override on the check wins;
//! 2. otherwise the classifier's suggestion is used;
//! 3. otherwise `high` for problems, `medium` for opportunities and
//!    unclassified results, `low` for informational findings.

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    catalog::CheckDefinition,
    context::Baseline,
    error::ClassificationError,
    finding::{Category, Finding, Narrative, Severity},
    llm::{GenerationBackend, GenerationRequest, strip_code_fence},
    warehouse::{Column, QueryResult, Row}
};

/// What a classifier gets to see of a query result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSample {
    pub columns:         Vec<Column>,
    pub rows:            Vec<Row>,
    pub total_rows:      u64,
    pub omitted_rows:    u64,
    /// Non-null values per column over the full result
    pub non_null_counts: IndexMap<String, u64>
}

impl ResultSample {
    pub fn is_truncated(&self) -> bool {
        self.omitted_rows > 0
    }
}

/// Reduce a result to at most `cap` rows plus aggregate counts.
pub fn sample_result(result: QueryResult, cap: usize) -> ResultSample {
    let mut non_null_counts: IndexMap<String, u64> =
        result.columns.iter().map(|c| (c.name.clone(), 0)).collect();
    for row in &result.rows {
        for (name, value) in row {
            if !value.is_null() {
                *non_null_counts.entry(name.clone()).or_insert(0) += 1;
            }
        }
    }
    let total_rows = result.row_count.max(result.rows.len() as u64);
    let mut rows = result.rows;
    rows.truncate(cap);
    ResultSample {
        columns: result.columns,
        omitted_rows: total_rows - rows.len() as u64,
        rows,
        total_rows,
        non_null_counts
    }
}

/// Outcome of classifying one result.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Finding(Finding),
    /// Expected variance, nothing to report
    Noise {
        reason: String
    }
}

/// Decides severity for a classified result.
pub trait SeverityPolicy: Send + Sync {
    fn assign(
        &self,
        check: &CheckDefinition,
        category: Category,
        suggested: Option<Severity>
    ) -> Severity;
}

/// Override, then suggestion, then a per-category default.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSeverityPolicy;

impl SeverityPolicy for DefaultSeverityPolicy {
    fn assign(
        &self,
        check: &CheckDefinition,
        category: Category,
        suggested: Option<Severity>
    ) -> Severity {
        if let Some(fixed) = check.severity.get(&category) {
            return *fixed;
        }
        suggested.unwrap_or(match category {
            Category::Problem => Severity::High,
            Category::Opportunity | Category::Unclassified => Severity::Medium,
            Category::Informational => Severity::Low
        })
    }
}

/// Interprets result rows for a check.
#[async_trait]
pub trait FindingClassifier: Send + Sync {
    async fn classify(
        &self,
        check: &CheckDefinition,
        sample: &ResultSample,
        baseline: Option<&Baseline>
    ) -> Result<Verdict, ClassificationError>;
}

/// Finding recorded when the classifier is unavailable, so rows are never
/// dropped silently.
pub fn unclassified_finding(check: &CheckDefinition, sample: &ResultSample, reason: &str) -> Finding {
    let narrative = Narrative {
        title:          truncate_title(&format!("Unclassified result from {}", check.name)),
        body:           format!(
            "Check '{}' returned {} row(s) but could not be classified: {}",
            check.name, sample.total_rows, reason
        ),
        recommendation: String::from("Review the returned rows manually.")
    };
    Finding::new(
        &check.name,
        Category::Unclassified,
        Severity::Medium,
        narrative,
        &sample.columns,
        sample.rows.clone(),
        sample.total_rows
    )
}

/// Labels the model chooses from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Label {
    ProblemCritical,
    ProblemMinor,
    Opportunity,
    Insight,
    Noise
}

impl Label {
    fn category(self) -> Option<Category> {
        match self {
            Self::ProblemCritical | Self::ProblemMinor => Some(Category::Problem),
            Self::Opportunity => Some(Category::Opportunity),
            Self::Insight => Some(Category::Informational),
            Self::Noise => None
        }
    }

    /// Lowest severity the label allows
    fn floor(self) -> Option<Severity> {
        match self {
            Self::ProblemCritical => Some(Severity::High),
            _ => None
        }
    }
}

#[derive(Debug, Deserialize)]
struct Assessment {
    category:       Label,
    #[serde(default)]
    severity:       Option<String>,
    #[serde(default)]
    title:          String,
    #[serde(default)]
    message:        String,
    #[serde(default)]
    recommendation: String
}

/// Classifier backed by a language model.
pub struct LlmClassifier {
    backend: Arc<dyn GenerationBackend>,
    policy:  Arc<dyn SeverityPolicy>
}

impl LlmClassifier {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            backend,
            policy: Arc::new(DefaultSeverityPolicy)
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn SeverityPolicy>) -> Self {
        self.policy = policy;
        self
    }

    fn build_request(
        &self,
        check: &CheckDefinition,
        sample: &ResultSample,
        baseline: Option<&Baseline>
    ) -> GenerationRequest {
        let aggregates = json!({
            "total_rows": sample.total_rows,
            "rows_shown": sample.rows.len(),
            "rows_omitted": sample.omitted_rows,
            "non_null_counts": sample.non_null_counts
        });
        let rows = serde_json::to_string_pretty(&sample.rows).unwrap_or_default();
        let mut prompt = format!(
            "Classify the result of an analytics check.\n\n\
             Check name: {}\n\
             Description: {}\n\
             Aggregates: {}\n\
             Rows:\n{}\n",
            check.name, check.description, aggregates, rows
        );
        if let Some(previous) = baseline {
            prompt.push_str(&format!(
                "\nPrevious run at {} returned {} row(s).\n",
                previous.observed.to_rfc3339(),
                previous.row_count
            ));
        }
        prompt.push_str(
            "\nCategories:\n\
             - problem_critical: tracking broken, PII leak or major data issue\n\
             - problem_minor: data quality issue to fix, not urgent\n\
             - opportunity: positive change worth investigating\n\
             - insight: pattern worth noting\n\
             - noise: expected variance, not actionable\n\n\
             Answer with a JSON object with the keys category, severity \
             (critical, high, medium or low), title (at most 100 characters), \
             message and recommendation.\n"
        );
        GenerationRequest {
            system: String::from("You are an analytics quality reviewer. Answer with JSON only."),
            prompt,
            temperature: Some(0.0)
        }
    }
}

#[async_trait]
impl FindingClassifier for LlmClassifier {
    async fn classify(
        &self,
        check: &CheckDefinition,
        sample: &ResultSample,
        baseline: Option<&Baseline>
    ) -> Result<Verdict, ClassificationError> {
        let answer = self
            .backend
            .complete(&self.build_request(check, sample, baseline))
            .await
            .map_err(|e| ClassificationError(e.to_string()))?;
        let assessment = parse_assessment(&answer)?;

        let Some(category) = assessment.category.category() else {
            return Ok(Verdict::Noise {
                reason: if assessment.message.is_empty() {
                    assessment.title
                } else {
                    assessment.message
                }
            });
        };
        let suggested = assessment
            .severity
            .as_deref()
            .and_then(Severity::parse)
            .max(assessment.category.floor());
        let severity = self.policy.assign(check, category, suggested);
        let narrative = Narrative {
            title:          truncate_title(&assessment.title),
            body:           assessment.message,
            recommendation: assessment.recommendation
        };
        Ok(Verdict::Finding(Finding::new(
            &check.name,
            category,
            severity,
            narrative,
            &sample.columns,
            sample.rows.clone(),
            sample.total_rows
        )))
    }
}

fn parse_assessment(answer: &str) -> Result<Assessment, ClassificationError> {
    let text = strip_code_fence(answer);
    let object = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => return Err(ClassificationError(format!("no JSON object in answer: {}", text)))
    };
    serde_json::from_str(object)
        .map_err(|e| ClassificationError(format!("unreadable classification: {}", e)))
}

fn truncate_title(title: &str) -> String {
    let title = title.trim();
    if title.chars().count() <= 100 {
        return title.to_string();
    }
    let mut cut: String = title.chars().take(99).collect();
    cut.push('…');
    cut
}
