//! Check catalog loading.
//!
//! A catalog is an ordered list of checks read from YAML:
//!
//! ```yaml
//! checks:
//!   - name: event_volume_drop
//!     description: Daily event count dropped more than 50% versus the 7 day average
//!     schedule: daily
//!     severity:
//!       problem: critical
//!   - name: missing_consent_state
//!     description: Events from EU countries without a consent_state value
//!     enabled: false
//! ```
//!
//! Catalog order is preserved; the run report lists outcomes in the same
//! order so reports from consecutive runs diff cleanly.

use std::{collections::{BTreeMap, HashSet}, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    error::{AppResult, catalog_error, file_read_error},
    finding::{Category, Severity}
};

/// A named, natural-language question to ask of the warehouse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckDefinition {
    /// Unique within a catalog
    pub name:        String,
    /// What to look for, in plain English
    pub description: String,
    #[serde(default = "default_enabled")]
    pub enabled:     bool,
    /// Few-shot SQL shown to the generator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub examples:    Option<String>,
    /// Free-form schedule tag, e.g. `hourly` or `daily`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule:    Option<String>,
    /// Fixed severity per category, overriding the classifier
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub severity:    BTreeMap<Category, Severity>,
    /// Hand-written SQL; skips generation but is still checked as read-only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql:         Option<String>
}

fn default_enabled() -> bool {
    true
}

impl CheckDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name:        name.into(),
            description: description.into(),
            enabled:     true,
            examples:    None,
            schedule:    None,
            severity:    BTreeMap::new(),
            sql:         None
        }
    }

    /// Whether this check belongs to a run filtered by schedule tag.
    pub fn matches_schedule(&self, schedule: Option<&str>) -> bool {
        match schedule {
            None => true,
            Some(tag) => self
                .schedule
                .as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case(tag))
        }
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    checks: Vec<CheckDefinition>
}

/// Ordered, validated collection of checks.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    checks: Vec<CheckDefinition>
}

impl Catalog {
    /// Build a catalog from definitions, rejecting empty or duplicate names.
    pub fn new(checks: Vec<CheckDefinition>) -> AppResult<Self> {
        let mut seen = HashSet::new();
        for check in &checks {
            let name = check.name.trim();
            if name.is_empty() {
                return Err(catalog_error("check with empty name"));
            }
            if check.description.trim().is_empty() && check.sql.is_none() {
                return Err(catalog_error(format!(
                    "check '{}' has neither a description nor SQL",
                    name
                )));
            }
            if !seen.insert(name.to_string()) {
                return Err(catalog_error(format!("duplicate check name '{}'", name)));
            }
        }
        Ok(Self {
            checks
        })
    }

    /// Parse YAML catalog text
    pub fn from_yaml(content: &str) -> AppResult<Self> {
        let file: CatalogFile = serde_yaml::from_str(content)
            .map_err(|e| catalog_error(format!("invalid YAML: {}", e)))?;
        if file.checks.is_empty() {
            return Err(catalog_error("no checks defined"));
        }
        Self::new(file.checks)
    }

    /// Read and parse a YAML catalog file
    pub fn load(path: &Path) -> AppResult<Self> {
        let content =
            fs::read_to_string(path).map_err(|e| file_read_error(&path.display().to_string(), e))?;
        Self::from_yaml(&content)
    }

    pub fn checks(&self) -> &[CheckDefinition] {
        &self.checks
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Checks a run should execute, in catalog order.
    pub fn runnable<'a>(
        &'a self,
        schedule: Option<&'a str>,
        only: &'a [String]
    ) -> impl Iterator<Item = &'a CheckDefinition> + 'a {
        self.checks.iter().filter(move |c| {
            c.enabled
                && c.matches_schedule(schedule)
                && (only.is_empty() || only.iter().any(|n| n == &c.name))
        })
    }
}
