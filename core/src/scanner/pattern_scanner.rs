use super::{Finding, Scanner};
use crate::collector::CandidateFile;
use crate::rules::{builtin_rules, BugRule};
use async_trait::async_trait;

/// Applies the builtin rule table to file contents. Fast and offline.
pub struct PatternScanner {
    rules: &'static [BugRule],
}

impl PatternScanner {
    pub fn new() -> Self {
        Self {
            rules: builtin_rules(),
        }
    }
}

#[async_trait]
impl Scanner for PatternScanner {
    fn name(&self) -> String {
        "PatternScanner".to_string()
    }

    async fn scan_file(&self, file: &CandidateFile, content: &str) -> Vec<Finding> {
        let mut findings = Vec::new();

        for rule in self.rules {
            for pattern in &rule.patterns {
                for m in pattern.find_iter(content) {
                    let (line, column) = locate(content, m.start());
                    findings.push(Finding {
                        category: rule.category.to_string(),
                        severity: rule.severity,
                        description: rule.description.to_string(),
                        remediation: rule.remediation.to_string(),
                        file: file.file_name.clone(),
                        relative_path: file.relative_path.clone(),
                        line,
                        column: Some(column),
                        matched_text: Some(m.as_str().trim().to_string()),
                    });
                }
            }
        }

        findings
    }
}

/// Computes the 1-based line and 0-based column of a byte offset.
fn locate(content: &str, offset: usize) -> (usize, usize) {
    let before = &content[..offset];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map(|p| p + 1).unwrap_or(0);
    (line, offset - line_start)
}
