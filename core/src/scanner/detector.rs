use super::ai_scanner::AiScanner;
use super::pattern_scanner::PatternScanner;
use super::{dedup_findings, Finding, Scanner};
use crate::collector::CandidateFile;
use crate::error::Result;
use std::sync::Arc;

/// Runs every registered scanner backend over a file, then validates and
/// deduplicates the merged findings.
pub struct Detector {
    scanners: Vec<Arc<dyn Scanner>>,
}

impl Detector {
    /// Pattern matching always runs.
    pub fn new() -> Self {
        Self {
            scanners: vec![Arc::new(PatternScanner::new())],
        }
    }

    /// Adds best-effort AI analysis on top of the pattern rules.
    pub fn with_ai(self, scanner: AiScanner) -> Self {
        self.register(Arc::new(scanner))
    }

    /// Registers an additional scanner backend.
    pub fn register(mut self, scanner: Arc<dyn Scanner>) -> Self {
        self.scanners.push(scanner);
        self
    }

    /// A malformed finding from any backend fails the whole scan; silently
    /// storing hollow records would be worse than failing loudly.
    pub async fn scan_file(&self, file: &CandidateFile, content: &str) -> Result<Vec<Finding>> {
        let mut findings = Vec::new();

        for scanner in &self.scanners {
            let mut reported = scanner.scan_file(file, content).await;
            tracing::debug!(
                "{} reported {} findings for {}",
                scanner.name(),
                reported.len(),
                file.relative_path
            );
            findings.append(&mut reported);
        }

        for finding in &findings {
            finding.validate()?;
        }

        Ok(dedup_findings(findings))
    }
}
