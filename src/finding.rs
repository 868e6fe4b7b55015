//! Classified findings and their deterministic fingerprints.

use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::warehouse::{Column, Row};

/// What a finding means for the business.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Tracking broken, data quality issue, privacy leak
    Problem,
    /// Positive change worth investigating
    Opportunity,
    /// Pattern worth noting without action
    Informational,
    /// The classifier was unavailable; rows were not interpreted
    Unclassified
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Problem => "problem",
            Self::Opportunity => "opportunity",
            Self::Informational => "informational",
            Self::Unclassified => "unclassified"
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a finding.
///
/// Ordered from lowest to highest so policies can take a maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical
}

impl Severity {
    /// Lenient parse of a model-supplied label.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "low" | "minor" => Some(Self::Low),
            "medium" | "moderate" => Some(Self::Medium),
            "high" | "major" => Some(Self::High),
            "critical" | "severe" => Some(Self::Critical),
            _ => None
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Critical => write!(f, "CRITICAL")
        }
    }
}

/// A classified, notifiable result of running one check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    /// Name of the check that produced the rows
    pub check:          String,
    pub category:       Category,
    pub severity:       Severity,
    pub title:          String,
    pub body:           String,
    pub recommendation: String,
    /// The rows the classifier saw
    pub sample:         Vec<Row>,
    /// Row count of the full result, not just the sample
    pub total_rows:     u64,
    pub fingerprint:    String
}

/// Human-readable parts of a finding supplied by a classifier.
#[derive(Debug, Clone, Default)]
pub struct Narrative {
    pub title:          String,
    pub body:           String,
    pub recommendation: String
}

impl Finding {
    /// Build a finding; the fingerprint is derived from the check, the
    /// category and the sampled rows.
    pub fn new(
        check: &str,
        category: Category,
        severity: Severity,
        narrative: Narrative,
        columns: &[Column],
        sample: Vec<Row>,
        total_rows: u64
    ) -> Self {
        let fingerprint = fingerprint(check, category, columns, &sample);
        Self {
            check: check.to_string(),
            category,
            severity,
            title: narrative.title,
            body: narrative.body,
            recommendation: narrative.recommendation,
            sample,
            total_rows,
            fingerprint
        }
    }
}

/// Stable identity of a finding used for deduplication.
///
/// Hashes the check name, the category and a normalized summary of the
/// triggering data: sorted column names plus the sorted, de-duplicated,
/// lower-cased text values of the sample. Numbers and nulls are left out so a
/// metric that keeps drifting still maps to the same finding.
pub fn fingerprint(check: &str, category: Category, columns: &[Column], rows: &[Row]) -> String {
    let column_names: BTreeSet<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    let mut dimensions = BTreeSet::new();
    for row in rows {
        for (name, value) in row {
            if let Some(text) = value.as_str() {
                let normalized = text.trim().to_lowercase();
                if !normalized.is_empty() && normalized.parse::<f64>().is_err() {
                    dimensions.insert(format!("{}={}", name, normalized));
                }
            }
        }
    }

    let mut hasher = Sha256::new();
    hasher.update(check.as_bytes());
    hasher.update([0]);
    hasher.update(category.as_str().as_bytes());
    hasher.update([0]);
    for name in column_names {
        hasher.update(name.as_bytes());
        hasher.update([0x1f]);
    }
    hasher.update([0]);
    for dim in dimensions {
        hasher.update(dim.as_bytes());
        hasher.update([0x1f]);
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn row(pairs: &[(&str, serde_json::Value)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn numeric_drift_keeps_fingerprint() {
        let cols = vec![Column::new("platform", "STRING"), Column::new("events", "INTEGER")];
        let a = vec![row(&[("platform", json!("iOS")), ("events", json!(120))])];
        let b = vec![row(&[("platform", json!("ios ")), ("events", json!(95))])];
        assert_eq!(
            fingerprint("volume", Category::Problem, &cols, &a),
            fingerprint("volume", Category::Problem, &cols, &b)
        );
    }

    #[test]
    fn numeric_strings_are_ignored() {
        let cols = vec![Column::new("count", "STRING")];
        let a = vec![row(&[("count", json!("12"))])];
        let b = vec![row(&[("count", json!("40"))])];
        assert_eq!(
            fingerprint("c", Category::Problem, &cols, &a),
            fingerprint("c", Category::Problem, &cols, &b)
        );
    }

    #[test]
    fn category_changes_fingerprint() {
        let cols = vec![Column::new("platform", "STRING")];
        let rows = vec![row(&[("platform", json!("web"))])];
        assert_ne!(
            fingerprint("c", Category::Problem, &cols, &rows),
            fingerprint("c", Category::Opportunity, &cols, &rows)
        );
    }

    #[test]
    fn severity_parse_is_lenient() {
        assert_eq!(Severity::parse(" High "), Some(Severity::High));
        assert_eq!(Severity::parse("minor"), Some(Severity::Low));
        assert_eq!(Severity::parse("urgent"), None);
        assert!(Severity::Critical > Severity::High);
    }
}
