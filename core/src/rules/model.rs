use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical severity scale, declared from least to most severe so the
/// derived ordering can be used to pick the stronger of two reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Unknown,
    Minor,
    Major,
    Critical,
}

impl Severity {
    /// Maps free-form severity text onto the canonical scale. AI models
    /// tend to answer high/medium/low; anything unrecognized is `unknown`.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "critical" => Severity::Critical,
            "high" | "major" => Severity::Major,
            "medium" | "low" | "minor" => Severity::Minor,
            _ => Severity::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Major => "major",
            Severity::Minor => "minor",
            Severity::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the builtin rule table.
#[derive(Debug)]
pub struct BugRule {
    /// Machine category, e.g. "sql-injection". Ends up on every Finding.
    pub category: &'static str,
    /// Human grouping label, e.g. "Security".
    pub label: &'static str,
    pub severity: Severity,
    pub description: &'static str,
    pub remediation: &'static str,
    pub patterns: Vec<Regex>,
}
