// BugWise Core Library
// Scan engine: rule table, file collector, detectors and repository cloning.

mod collector;
mod engine;
mod git;
mod rules;
mod scanner;

// Re-export common types
pub use collector::{collect_files, CandidateFile, EXCLUDED_DIRS, SCANNABLE_EXTENSIONS};
pub use engine::{CancelFlag, ScanConfig, ScanEngine, ScanResults, SeverityCounts};
pub use git::{GitCloner, RepoCloner};
pub use scanner::ai_scanner::{AiConfig, AiScanner};
pub use scanner::detector::Detector;
pub use scanner::pattern_scanner::PatternScanner;
pub use scanner::{Finding, Scanner};

// Rule table
pub use rules::{builtin_rules, BugRule, Severity};

pub mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum CoreError {
        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),

        #[error("Failed to clone repository: {0}")]
        Clone(String),

        #[error("AI analysis error: {0}")]
        Ai(String),

        #[error("{0}")]
        Scan(String),

        #[error("Scan cancelled by user")]
        Cancelled,
    }

    pub type Result<T> = std::result::Result<T, CoreError>;
}
