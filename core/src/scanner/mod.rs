// Scanner module
// Finding type, the Scanner trait and the dedup shared by all detectors.

pub mod ai_scanner;
pub mod detector;
pub mod pattern_scanner;

use crate::collector::CandidateFile;
use crate::error::{CoreError, Result};
use crate::rules::Severity;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single detected issue within a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    /// Machine category, e.g. "sql-injection".
    pub category: String,
    pub severity: Severity,
    pub description: String,
    pub remediation: String,
    /// Display name of the file, e.g. "app.js".
    pub file: String,
    /// Path within the repository.
    pub relative_path: String,
    /// 1-based line number.
    pub line: usize,
    /// 0-based column, when the source can pinpoint it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,
    /// The snippet that triggered the rule.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_text: Option<String>,
}

impl Finding {
    /// Two findings with the same key describe the same issue.
    pub fn dedup_key(&self) -> (String, String, usize, Option<usize>) {
        (
            self.category.clone(),
            self.file.clone(),
            self.line,
            self.column,
        )
    }

    /// A finding with no category, no description or no file location is
    /// unusable; reject it instead of storing a hollow record.
    pub fn validate(&self) -> Result<()> {
        if self.category.is_empty()
            || self.description.is_empty()
            || self.file.is_empty()
            || self.relative_path.is_empty()
        {
            return Err(CoreError::Scan(format!(
                "finding is missing required fields: {self:?}"
            )));
        }
        if self.line == 0 {
            return Err(CoreError::Scan(format!(
                "finding has an invalid line number: {self:?}"
            )));
        }
        Ok(())
    }
}

/// Scanner trait - every detector backend implements this interface.
#[async_trait]
pub trait Scanner: Send + Sync {
    /// Scanner name used in logs.
    fn name(&self) -> String;

    /// Scan a single file.
    async fn scan_file(&self, file: &CandidateFile, content: &str) -> Vec<Finding>;
}

/// Collapses findings sharing (category, file, line, column). A later
/// finding replaces an earlier one only when it reports a strictly higher
/// severity; input order is preserved otherwise.
pub fn dedup_findings(findings: Vec<Finding>) -> Vec<Finding> {
    let mut unique: Vec<Finding> = Vec::new();
    let mut index: HashMap<(String, String, usize, Option<usize>), usize> = HashMap::new();

    for finding in findings {
        match index.get(&finding.dedup_key()) {
            Some(&slot) => {
                if finding.severity > unique[slot].severity {
                    unique[slot] = finding;
                }
            }
            None => {
                index.insert(finding.dedup_key(), unique.len());
                unique.push(finding);
            }
        }
    }

    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(category: &str, severity: Severity, line: usize, column: Option<usize>) -> Finding {
        Finding {
            category: category.to_string(),
            severity,
            description: "desc".to_string(),
            remediation: "fix".to_string(),
            file: "app.js".to_string(),
            relative_path: "src/app.js".to_string(),
            line,
            column,
            matched_text: None,
        }
    }

    #[test]
    fn dedup_collapses_identical_keys() {
        let input = vec![
            finding("sql-injection", Severity::Major, 3, Some(4)),
            finding("sql-injection", Severity::Major, 3, Some(4)),
            finding("sql-injection", Severity::Major, 9, Some(4)),
        ];
        let out = dedup_findings(input);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn dedup_keeps_higher_severity() {
        let input = vec![
            finding("null-pointer", Severity::Minor, 3, Some(4)),
            finding("null-pointer", Severity::Critical, 3, Some(4)),
            finding("null-pointer", Severity::Major, 3, Some(4)),
        ];
        let out = dedup_findings(input);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].severity, Severity::Critical);
    }

    #[test]
    fn dedup_is_idempotent() {
        let input = vec![
            finding("xss-vulnerability", Severity::Critical, 1, Some(0)),
            finding("memory-leak", Severity::Minor, 2, Some(0)),
        ];
        let once = dedup_findings(input.clone());
        let mut doubled = input.clone();
        doubled.extend(input);
        let twice = dedup_findings(doubled);
        assert_eq!(once.len(), twice.len());
    }

    #[test]
    fn dedup_preserves_first_seen_order() {
        let input = vec![
            finding("a", Severity::Minor, 1, None),
            finding("b", Severity::Minor, 2, None),
            finding("a", Severity::Critical, 1, None),
        ];
        let out = dedup_findings(input);
        assert_eq!(out[0].category, "a");
        assert_eq!(out[0].severity, Severity::Critical);
        assert_eq!(out[1].category, "b");
    }

    #[test]
    fn validate_rejects_missing_fields() {
        let mut f = finding("sql-injection", Severity::Major, 1, None);
        f.file = String::new();
        assert!(f.validate().is_err());

        let mut f = finding("sql-injection", Severity::Major, 1, None);
        f.line = 0;
        assert!(f.validate().is_err());

        assert!(finding("sql-injection", Severity::Major, 1, None)
            .validate()
            .is_ok());
    }

    #[test]
    fn finding_serializes_camel_case() {
        let f = finding("sql-injection", Severity::Major, 7, Some(2));
        let value = serde_json::to_value(&f).unwrap();
        assert_eq!(value["relativePath"], "src/app.js");
        assert_eq!(value["severity"], "major");
        assert!(value.get("matchedText").is_none());
    }
}
