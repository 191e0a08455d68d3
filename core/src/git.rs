// Repository cloning
// Shallow clone via the system git binary, behind a trait so the engine can
// be driven with prepared fixtures.

use crate::error::{CoreError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

#[async_trait]
pub trait RepoCloner: Send + Sync {
    /// Clones `repo_url` into the existing empty directory `dest`.
    async fn clone_repo(&self, repo_url: &str, dest: &Path) -> Result<()>;
}

/// Shallow-clones with `git clone --depth 1` and a hard timeout. The child
/// process is killed when the timeout fires.
pub struct GitCloner {
    timeout: Duration,
}

impl GitCloner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl RepoCloner for GitCloner {
    async fn clone_repo(&self, repo_url: &str, dest: &Path) -> Result<()> {
        tracing::info!("cloning repository {}", repo_url);

        let mut command = Command::new("git");
        command
            .arg("clone")
            .arg("--depth")
            .arg("1")
            .arg(repo_url)
            .arg(dest)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| CoreError::Clone(format!("timed out after {}s", self.timeout.as_secs())))?
            .map_err(|e| CoreError::Clone(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            let message = if stderr.is_empty() {
                format!("git exited with {}", output.status)
            } else {
                stderr.to_string()
            };
            return Err(CoreError::Clone(message));
        }

        Ok(())
    }
}
