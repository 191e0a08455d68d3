// Scan orchestrator
// Owns the scan lifecycle: pending -> scanning -> completed | failed, with
// pending -> cancelled reachable only by user action. `submit` returns as
// soon as the record exists; the scan itself runs as a detached task held
// in a registry keyed by scan id, so a crash inside the pipeline always
// lands in the failed transition instead of a record stuck in `scanning`.

use crate::db;
use crate::error::ApiError;
use bugwise_core::{CancelFlag, ScanEngine};
use chrono::{Duration, Utc};
use regex::Regex;
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock, Mutex};
use uuid::Uuid;

/// Minimum gap, in minutes, between two scans of the same repository by
/// the same user.
pub const COOL_DOWN_MINUTES: i64 = 10;
/// Scans one user may start per UTC day.
pub const DAILY_SCAN_LIMIT: i64 = 50;

fn cool_down() -> Duration {
    Duration::minutes(COOL_DOWN_MINUTES)
}

static GITHUB_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://github\.com/[A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+/?$")
        .unwrap_or_else(|e| panic!("invalid GitHub URL pattern: {e}"))
});

/// Outcome of an accepted submission.
pub struct Submission {
    pub scan_id: String,
    pub daily_scans_remaining: i64,
}

/// What a cancel request achieved.
pub enum CancelOutcome {
    /// The record was still pending and is now terminally cancelled.
    Cancelled,
    /// The scan is running; it will stop at the next file boundary.
    Cancelling,
}

struct ActiveScan {
    cancel: CancelFlag,
}

/// Cheap to clone; all clones share the pool, engine and task registry.
#[derive(Clone)]
pub struct Orchestrator {
    db: Pool<Sqlite>,
    engine: Arc<ScanEngine>,
    active: Arc<Mutex<HashMap<String, ActiveScan>>>,
}

impl Orchestrator {
    pub fn new(db: Pool<Sqlite>, engine: Arc<ScanEngine>) -> Self {
        Self {
            db,
            engine,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Validates and records a scan request, then starts the scan in the
    /// background. Returns before the scan makes any progress.
    pub async fn submit(
        &self,
        owner_id: &str,
        repository_url: &str,
    ) -> Result<Submission, ApiError> {
        let repository_url = repository_url.trim();
        if repository_url.is_empty() {
            return Err(ApiError::Validation(
                "Repository URL is required".to_string(),
            ));
        }
        if !GITHUB_URL.is_match(repository_url) {
            return Err(ApiError::Validation(
                "Invalid GitHub repository URL. Please provide a valid public GitHub repository URL."
                    .to_string(),
            ));
        }

        let now = Utc::now();

        if let Some(prior) =
            db::recent_scan_created_at(&self.db, owner_id, repository_url, now - cool_down())
                .await?
        {
            let next_scan_allowed = prior + cool_down();
            return Err(ApiError::RateLimited {
                message: "You must wait 10 minutes before scanning this repository again."
                    .to_string(),
                next_scan_allowed: Some(db::fmt_ts(next_scan_allowed)),
            });
        }

        let day_start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc())
            .unwrap_or(now);
        let used_today = db::daily_scan_count(&self.db, owner_id, day_start).await?;
        if used_today >= DAILY_SCAN_LIMIT {
            return Err(ApiError::RateLimited {
                message: format!("Daily scan limit reached ({DAILY_SCAN_LIMIT} scans per day)."),
                next_scan_allowed: None,
            });
        }

        let scan_id = Uuid::new_v4().to_string();
        let repository_name = repository_name_from_url(repository_url);
        db::insert_scan(
            &self.db,
            &scan_id,
            owner_id,
            repository_url,
            &repository_name,
            &db::fmt_ts(now),
        )
        .await?;

        tracing::info!("scan {} created for {}", scan_id, repository_url);
        self.spawn_run(scan_id.clone(), repository_url.to_string());

        Ok(Submission {
            scan_id,
            daily_scans_remaining: DAILY_SCAN_LIMIT - used_today - 1,
        })
    }

    /// Spawns the one and only `run` for this record. The pipeline runs in
    /// an inner task joined by a wrapper, so a panic anywhere inside it
    /// surfaces as a `JoinError` and still reaches the failed transition
    /// and the registry cleanup instead of stranding the record.
    fn spawn_run(&self, scan_id: String, repository_url: String) {
        let cancel: CancelFlag = Arc::new(AtomicBool::new(false));
        if let Ok(mut active) = self.active.lock() {
            active.insert(
                scan_id.clone(),
                ActiveScan {
                    cancel: cancel.clone(),
                },
            );
        }

        let orchestrator = self.clone();
        tokio::spawn(async move {
            let worker = {
                let orchestrator = orchestrator.clone();
                let scan_id = scan_id.clone();
                let repository_url = repository_url.clone();
                tokio::spawn(async move {
                    orchestrator.run(&scan_id, &repository_url, cancel).await;
                })
            };

            if let Err(join_err) = worker.await {
                let message = format!("Scan task crashed: {}", panic_reason(join_err));
                tracing::error!("scan {}: {}", scan_id, message);
                match db::mark_failed(&orchestrator.db, &scan_id, &message).await {
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!("scan {}: failed to record crash: {}", scan_id, e)
                    }
                }
            }

            if let Ok(mut active) = orchestrator.active.lock() {
                active.remove(&scan_id);
            }
        });
    }

    /// Drives one scan to a terminal state. Every error path funnels into
    /// the failed transition with the message stored verbatim.
    async fn run(&self, scan_id: &str, repository_url: &str, cancel: CancelFlag) {
        match db::mark_scanning(&self.db, scan_id).await {
            Ok(true) => {}
            Ok(false) => {
                // Cancelled while still pending; nothing to do.
                tracing::info!("scan {} no longer pending, skipping", scan_id);
                return;
            }
            Err(e) => {
                // The record is still pending; push it to failed rather
                // than leaving it to poll forever.
                tracing::error!("scan {}: failed to start: {}", scan_id, e);
                let message = format!("Failed to start scan: {e}");
                if let Err(e2) = db::mark_failed(&self.db, scan_id, &message).await {
                    tracing::error!("scan {}: failed to record start error: {}", scan_id, e2);
                }
                return;
            }
        }

        let outcome = self.engine.scan_repository(repository_url, &cancel).await;

        let transition = match outcome {
            Ok(results) => {
                let total = results.total_findings as i64;
                let files = results.files_scanned as i64;
                match serde_json::to_string(&results) {
                    Ok(json) => db::mark_completed(&self.db, scan_id, &json, total, files).await,
                    Err(e) => {
                        db::mark_failed(&self.db, scan_id, &format!("internal error: {e}")).await
                    }
                }
            }
            Err(e) => db::mark_failed(&self.db, scan_id, &e.to_string()).await,
        };

        match transition {
            Ok(true) => tracing::info!("scan {} reached a terminal state", scan_id),
            Ok(false) => tracing::warn!("scan {} was not in scanning state at finish", scan_id),
            Err(e) => tracing::error!("scan {}: failed to record outcome: {}", scan_id, e),
        }
    }

    /// Cancels the owner's scan. Pending records become `cancelled`
    /// outright; a running scan is asked to stop at the next file boundary
    /// and will fail with "Scan cancelled by user".
    pub async fn cancel(&self, scan_id: &str, owner_id: &str) -> Result<CancelOutcome, ApiError> {
        let scan = db::get_scan(&self.db, scan_id, owner_id)
            .await?
            .ok_or(ApiError::NotFound)?;

        match scan.status.as_str() {
            "pending" => {
                if db::mark_cancelled(&self.db, scan_id, owner_id).await? {
                    return Ok(CancelOutcome::Cancelled);
                }
                // Lost the race against mark_scanning; fall through to the
                // cooperative path.
                self.request_stop(scan_id)
            }
            "scanning" => self.request_stop(scan_id),
            _ => Err(ApiError::Conflict(format!(
                "Scan is already {}",
                scan.status
            ))),
        }
    }

    fn request_stop(&self, scan_id: &str) -> Result<CancelOutcome, ApiError> {
        let active = self
            .active
            .lock()
            .map_err(|_| ApiError::Internal("scan registry poisoned".to_string()))?;
        match active.get(scan_id) {
            Some(task) => {
                task.cancel.store(true, Ordering::Relaxed);
                Ok(CancelOutcome::Cancelling)
            }
            None => Err(ApiError::Conflict("Scan is not running".to_string())),
        }
    }
}

/// Pulls the payload text out of a crashed worker, falling back to a
/// generic description for non-string panics and aborts.
fn panic_reason(join_err: tokio::task::JoinError) -> String {
    if !join_err.is_panic() {
        return "scan task was aborted".to_string();
    }
    let payload = join_err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}

/// "https://github.com/acme/widgets/" -> "acme/widgets"
fn repository_name_from_url(url: &str) -> String {
    url.trim_start_matches("https://github.com/")
        .trim_end_matches('/')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_pattern_accepts_plain_repository_urls() {
        for url in [
            "https://github.com/acme/widgets",
            "https://github.com/acme/widgets/",
            "https://github.com/a-b_c.d/repo.name",
        ] {
            assert!(GITHUB_URL.is_match(url), "{url} should be valid");
        }
    }

    #[test]
    fn url_pattern_rejects_everything_else() {
        for url in [
            "http://github.com/acme/widgets",
            "https://gitlab.com/acme/widgets",
            "https://github.com/acme",
            "https://github.com/acme/widgets/tree/main",
            "github.com/acme/widgets",
            "",
        ] {
            assert!(!GITHUB_URL.is_match(url), "{url} should be invalid");
        }
    }

    #[test]
    fn repository_name_strips_host_and_trailing_slash() {
        assert_eq!(
            repository_name_from_url("https://github.com/acme/widgets/"),
            "acme/widgets"
        );
        assert_eq!(
            repository_name_from_url("https://github.com/acme/widgets"),
            "acme/widgets"
        );
    }
}
