// Scan engine
// Clones a repository into a temporary workspace, runs the detector over
// every candidate file and aggregates the findings. The workspace is
// removed on every exit path, including errors and cancellation.

use crate::collector;
use crate::error::{CoreError, Result};
use crate::git::RepoCloner;
use crate::rules::Severity;
use crate::scanner::ai_scanner::{AiConfig, AiScanner};
use crate::scanner::detector::Detector;
use crate::scanner::Finding;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation handle, checked between files.
pub type CancelFlag = Arc<AtomicBool>;

#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// At most this many files are analyzed per scan; the rest of the
    /// repository is ignored.
    pub max_files: usize,
    /// Files larger than this many bytes are skipped.
    pub max_file_size: u64,
    /// Where scan workspaces are created; the system temp dir when unset.
    pub temp_root: Option<PathBuf>,
    /// AI analysis runs only when this is present.
    pub ai: Option<AiConfig>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_files: 100,
            max_file_size: 100 * 1024,
            temp_root: None,
            ai: None,
        }
    }
}

/// Per-severity finding counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: u64,
    pub major: u64,
    pub minor: u64,
    pub unknown: u64,
}

impl SeverityCounts {
    pub fn record(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::Major => self.major += 1,
            Severity::Minor => self.minor += 1,
            Severity::Unknown => self.unknown += 1,
        }
    }
}

/// Aggregate outcome of one repository scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResults {
    pub total_findings: u64,
    pub files_scanned: u64,
    pub severity_counts: SeverityCounts,
    pub category_counts: BTreeMap<String, u64>,
    pub findings: Vec<Finding>,
}

pub struct ScanEngine {
    config: ScanConfig,
    cloner: Arc<dyn RepoCloner>,
    detector: Detector,
}

impl ScanEngine {
    pub fn new(config: ScanConfig, cloner: Arc<dyn RepoCloner>) -> Result<Self> {
        let mut detector = Detector::new();
        if let Some(ai) = &config.ai {
            detector = detector.with_ai(AiScanner::new(ai.clone())?);
        }
        Ok(Self {
            config,
            cloner,
            detector,
        })
    }

    /// Runs a full scan of `repo_url`. Checks `cancel` between files and
    /// aborts with [`CoreError::Cancelled`] once it is set.
    pub async fn scan_repository(&self, repo_url: &str, cancel: &CancelFlag) -> Result<ScanResults> {
        let workspace = self.create_workspace().await?;
        let result = self.scan_into(workspace.path(), repo_url, cancel).await;

        // The TempDir guard also removes the clone if we unwind instead of
        // reaching this line.
        if let Err(e) = workspace.close() {
            tracing::warn!("failed to remove scan workspace: {}", e);
        }

        result
    }

    async fn create_workspace(&self) -> Result<tempfile::TempDir> {
        let created = match &self.config.temp_root {
            Some(root) => {
                tokio::fs::create_dir_all(root).await?;
                tempfile::Builder::new().prefix("bugwise-scan-").tempdir_in(root)
            }
            None => tempfile::Builder::new().prefix("bugwise-scan-").tempdir(),
        };
        created.map_err(CoreError::Io)
    }

    async fn scan_into(
        &self,
        workdir: &Path,
        repo_url: &str,
        cancel: &CancelFlag,
    ) -> Result<ScanResults> {
        self.cloner.clone_repo(repo_url, workdir).await?;

        let candidates =
            collector::collect_files(workdir, self.config.max_files, self.config.max_file_size)
                .await;
        tracing::info!("found {} files to analyze in {}", candidates.len(), repo_url);

        if candidates.is_empty() {
            return Err(CoreError::Scan(
                "No scannable files found in repository".to_string(),
            ));
        }

        let mut findings: Vec<Finding> = Vec::new();
        for (index, file) in candidates.iter().enumerate() {
            if cancel.load(Ordering::Relaxed) {
                return Err(CoreError::Cancelled);
            }

            tracing::debug!(
                "analyzing [{}/{}] {}",
                index + 1,
                candidates.len(),
                file.relative_path
            );

            let content = match tokio::fs::read_to_string(&file.path).await {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!("failed to read {}: {}", file.relative_path, e);
                    continue;
                }
            };

            findings.extend(self.detector.scan_file(file, &content).await?);
        }

        Ok(aggregate(findings, candidates.len() as u64))
    }
}

fn aggregate(findings: Vec<Finding>, files_scanned: u64) -> ScanResults {
    let mut severity_counts = SeverityCounts::default();
    let mut category_counts: BTreeMap<String, u64> = BTreeMap::new();

    for finding in &findings {
        severity_counts.record(finding.severity);
        *category_counts.entry(finding.category.clone()).or_insert(0) += 1;
    }

    ScanResults {
        total_findings: findings.len() as u64,
        files_scanned,
        severity_counts,
        category_counts,
        findings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Materializes a fixed file tree instead of hitting the network.
    struct StubCloner {
        files: Vec<(&'static str, &'static str)>,
    }

    #[async_trait]
    impl RepoCloner for StubCloner {
        async fn clone_repo(&self, _repo_url: &str, dest: &Path) -> Result<()> {
            for (rel, content) in &self.files {
                let path = dest.join(rel);
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(path, content).await?;
            }
            Ok(())
        }
    }

    struct FailingCloner;

    #[async_trait]
    impl RepoCloner for FailingCloner {
        async fn clone_repo(&self, _repo_url: &str, _dest: &Path) -> Result<()> {
            Err(CoreError::Clone("repository not found".to_string()))
        }
    }

    fn engine_with(
        cloner: Arc<dyn RepoCloner>,
        temp_root: Option<PathBuf>,
    ) -> ScanEngine {
        let config = ScanConfig {
            temp_root,
            ..ScanConfig::default()
        };
        ScanEngine::new(config, cloner).unwrap()
    }

    fn unset_flag() -> CancelFlag {
        Arc::new(AtomicBool::new(false))
    }

    #[tokio::test]
    async fn scans_cloned_files_and_aggregates() {
        let cloner = Arc::new(StubCloner {
            files: vec![
                ("src/render.js", "eval(userInput)"),
                ("src/sum.js", "let total = 1 + 2;"),
                ("util.py", "total = 1"),
            ],
        });
        let engine = engine_with(cloner, None);

        let results = engine
            .scan_repository("https://github.com/acme/widgets", &unset_flag())
            .await
            .unwrap();

        assert_eq!(results.files_scanned, 3);
        assert!(results.total_findings >= 1);
        assert_eq!(results.total_findings, results.findings.len() as u64);

        let xss = results
            .findings
            .iter()
            .find(|f| f.category == "xss-vulnerability")
            .expect("eval() should be reported");
        assert_eq!(xss.severity, Severity::Critical);
        assert_eq!(xss.file, "render.js");
        assert_eq!(results.severity_counts.critical, 1);
        assert_eq!(results.category_counts.get("xss-vulnerability"), Some(&1));
    }

    #[tokio::test]
    async fn empty_repository_is_an_error() {
        let cloner = Arc::new(StubCloner {
            files: vec![("README.md", "# nothing to scan")],
        });
        let engine = engine_with(cloner, None);

        let err = engine
            .scan_repository("https://github.com/acme/empty", &unset_flag())
            .await
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("No scannable files found in repository"));
    }

    #[tokio::test]
    async fn clone_failure_propagates() {
        let engine = engine_with(Arc::new(FailingCloner), None);
        let err = engine
            .scan_repository("https://github.com/acme/missing", &unset_flag())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to clone repository"));
        assert!(err.to_string().contains("repository not found"));
    }

    #[tokio::test]
    async fn workspace_is_removed_on_success() {
        let holder = tempfile::TempDir::new().unwrap();
        let temp_root = holder.path().join("scans");
        let cloner = Arc::new(StubCloner {
            files: vec![("a.js", "let x = 1;")],
        });
        let engine = engine_with(cloner, Some(temp_root.clone()));

        engine
            .scan_repository("https://github.com/acme/widgets", &unset_flag())
            .await
            .unwrap();

        let mut entries = tokio::fs::read_dir(&temp_root).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn workspace_is_removed_on_failure() {
        let holder = tempfile::TempDir::new().unwrap();
        let temp_root = holder.path().join("scans");
        let engine = engine_with(Arc::new(FailingCloner), Some(temp_root.clone()));

        let _ = engine
            .scan_repository("https://github.com/acme/missing", &unset_flag())
            .await;

        let mut entries = tokio::fs::read_dir(&temp_root).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cancellation_stops_the_scan() {
        let cloner = Arc::new(StubCloner {
            files: vec![("a.js", "let x = 1;"), ("b.js", "let y = 2;")],
        });
        let engine = engine_with(cloner, None);

        let cancel = Arc::new(AtomicBool::new(true));
        let err = engine
            .scan_repository("https://github.com/acme/widgets", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Cancelled));
        assert_eq!(err.to_string(), "Scan cancelled by user");
    }

    #[tokio::test]
    async fn unreadable_file_is_skipped_not_fatal() {
        let cloner = Arc::new(StubCloner {
            files: vec![("ok.js", "let x = 1;")],
        });
        // Invalid UTF-8 is the portable way to make read_to_string fail.
        struct BinaryCloner;
        #[async_trait]
        impl RepoCloner for BinaryCloner {
            async fn clone_repo(&self, _repo_url: &str, dest: &Path) -> Result<()> {
                tokio::fs::write(dest.join("bin.js"), [0xff, 0xfe, 0x00, 0x9f]).await?;
                tokio::fs::write(dest.join("ok.js"), "eval(x)").await?;
                Ok(())
            }
        }
        let _ = cloner;

        let engine = engine_with(Arc::new(BinaryCloner), None);
        let results = engine
            .scan_repository("https://github.com/acme/widgets", &unset_flag())
            .await
            .unwrap();

        // Both files count as scanned; only the readable one yields findings.
        assert_eq!(results.files_scanned, 2);
        assert!(results
            .findings
            .iter()
            .any(|f| f.category == "xss-vulnerability" && f.file == "ok.js"));
    }
}
