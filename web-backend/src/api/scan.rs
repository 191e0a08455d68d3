// Scan endpoints
// Submission, polling, history, detail, delete, cancel and the dashboard
// aggregates. Every route sits behind the JWT gate; all record access is
// owner-scoped.

use crate::auth::AuthUser;
use crate::db::{self, HistoryQuery, ScanRow, SortField};
use crate::error::ApiError;
use crate::orchestrator::CancelOutcome;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

pub fn configure_scan_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("", web::post().to(submit_scan))
        .route("/history", web::get().to(scan_history))
        .route("/stats/dashboard", web::get().to(dashboard_stats))
        .route("/status/{scan_id}", web::get().to(scan_status))
        .route("/{scan_id}/cancel", web::post().to(cancel_scan))
        .service(
            web::resource("/{scan_id}")
                .route(web::get().to(scan_detail))
                .route(web::delete().to(delete_scan)),
        );
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    #[serde(default)]
    pub repository_url: Option<String>,
}

async fn submit_scan(
    user: AuthUser,
    state: web::Data<AppState>,
    body: web::Json<SubmitRequest>,
) -> Result<HttpResponse, ApiError> {
    let repository_url = body
        .repository_url
        .as_deref()
        .ok_or_else(|| ApiError::Validation("Repository URL is required".to_string()))?;

    let submission = state.orchestrator.submit(&user.id, repository_url).await?;

    Ok(HttpResponse::Accepted().json(serde_json::json!({
        "scanId": submission.scan_id,
        "status": "pending",
        "message": "Scan started successfully",
        "dailyScansRemaining": submission.daily_scans_remaining,
    })))
}

async fn scan_status(
    user: AuthUser,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let scan_id = path.into_inner();
    let scan = db::get_scan(&state.db, &scan_id, &user.id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let mut body = serde_json::json!({ "status": scan.status });
    if scan.status == "completed" {
        body["results"] = parse_results(&scan)?;
    }
    if scan.status == "failed" {
        body["error"] = serde_json::json!(scan.error);
    }
    Ok(HttpResponse::Ok().json(body))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub status: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScanSummary {
    scan_id: String,
    repository_url: String,
    repository_name: String,
    status: String,
    total_findings: i64,
    files_scanned: i64,
    created_at: String,
    completed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<ScanRow> for ScanSummary {
    fn from(scan: ScanRow) -> Self {
        let error = (scan.status == "failed").then_some(scan.error).flatten();
        Self {
            scan_id: scan.id,
            repository_url: scan.repository_url,
            repository_name: scan.repository_name,
            status: scan.status,
            total_findings: scan.total_findings,
            files_scanned: scan.files_scanned,
            created_at: scan.created_at,
            completed_at: scan.completed_at,
            error,
        }
    }
}

const KNOWN_STATUSES: &[&str] = &["pending", "scanning", "completed", "failed", "cancelled"];

async fn scan_history(
    user: AuthUser,
    state: web::Data<AppState>,
    params: web::Query<HistoryParams>,
) -> Result<HttpResponse, ApiError> {
    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(10).clamp(1, 50);

    let sort_field = match params.sort_by.as_deref() {
        Some("repositoryName") => SortField::RepositoryName,
        _ => SortField::CreatedAt,
    };
    let ascending = params.sort_order.as_deref() == Some("asc");
    let status = params
        .status
        .clone()
        .filter(|s| KNOWN_STATUSES.contains(&s.as_str()));

    let (rows, total) = db::history_page(
        &state.db,
        &HistoryQuery {
            owner_id: user.id,
            page,
            limit,
            sort_field,
            ascending,
            status,
        },
    )
    .await?;

    let total_pages = (total + limit - 1) / limit;
    let data: Vec<ScanSummary> = rows.into_iter().map(ScanSummary::from).collect();

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "data": data,
        "pagination": {
            "currentPage": page,
            "totalPages": total_pages,
            "totalScans": total,
            "hasNextPage": page < total_pages,
            "hasPrevPage": page > 1,
        },
    })))
}

async fn scan_detail(
    user: AuthUser,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let scan_id = path.into_inner();
    let scan = db::get_scan(&state.db, &scan_id, &user.id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let duration = scan_duration_seconds(&scan);
    let mut body = serde_json::json!({
        "scanId": scan.id,
        "repositoryUrl": scan.repository_url,
        "repositoryName": scan.repository_name,
        "status": scan.status,
        "createdAt": scan.created_at,
        "startedAt": scan.started_at,
        "completedAt": scan.completed_at,
        "duration": duration,
    });
    if scan.status == "completed" {
        body["results"] = parse_results(&scan)?;
    }
    if scan.status == "failed" {
        body["error"] = serde_json::json!(scan.error);
    }
    Ok(HttpResponse::Ok().json(body))
}

async fn delete_scan(
    user: AuthUser,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let scan_id = path.into_inner();
    if !db::delete_scan(&state.db, &scan_id, &user.id).await? {
        return Err(ApiError::NotFound);
    }
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Scan deleted successfully"
    })))
}

async fn cancel_scan(
    user: AuthUser,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let scan_id = path.into_inner();
    let status = match state.orchestrator.cancel(&scan_id, &user.id).await? {
        CancelOutcome::Cancelled => "cancelled",
        CancelOutcome::Cancelling => "cancelling",
    };
    Ok(HttpResponse::Ok().json(serde_json::json!({ "status": status })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardParams {
    pub time_range: Option<String>,
}

async fn dashboard_stats(
    user: AuthUser,
    state: web::Data<AppState>,
    params: web::Query<DashboardParams>,
) -> Result<HttpResponse, ApiError> {
    let since = match params.time_range.as_deref() {
        Some("all") => None,
        Some("30d") => Some(30),
        Some("90d") => Some(90),
        _ => Some(7),
    }
    .map(|days| chrono::Utc::now() - chrono::Duration::days(days));

    let overview = db::overview_stats(&state.db, &user.id, since).await?;
    let recent = db::recent_activity(&state.db, &user.id, since).await?;
    let (critical, major, minor, unknown) =
        db::severity_distribution(&state.db, &user.id, since).await?;

    let success_rate = if overview.total_scans > 0 {
        (overview.completed_scans as f64 / overview.total_scans as f64 * 100.0).round() as i64
    } else {
        0
    };

    let recent_activity: Vec<_> = recent
        .into_iter()
        .map(|(repository_name, status, created_at, total_findings)| {
            serde_json::json!({
                "repositoryName": repository_name,
                "status": status,
                "createdAt": created_at,
                "findingsFound": total_findings,
            })
        })
        .collect();

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "overview": {
            "totalScans": overview.total_scans,
            "completedScans": overview.completed_scans,
            "failedScans": overview.failed_scans,
            "successRate": success_rate,
            "totalFindings": overview.total_findings,
            "totalFilesScanned": overview.total_files_scanned,
            "avgScanTime": overview.avg_scan_seconds.round() as i64,
        },
        "recentActivity": recent_activity,
        "severityDistribution": {
            "critical": critical,
            "major": major,
            "minor": minor,
            "unknown": unknown,
        },
    })))
}

fn parse_results(scan: &ScanRow) -> Result<serde_json::Value, ApiError> {
    let raw = scan
        .results
        .as_deref()
        .ok_or_else(|| ApiError::Internal("completed scan has no stored results".to_string()))?;
    serde_json::from_str(raw)
        .map_err(|e| ApiError::Internal(format!("stored results are unreadable: {e}")))
}

/// Wall-clock seconds from `started_at` to `completed_at`; null until the
/// scan reaches a terminal state.
fn scan_duration_seconds(scan: &ScanRow) -> Option<i64> {
    let started = db::parse_ts(scan.started_at.as_deref()?)?;
    let completed = db::parse_ts(scan.completed_at.as_deref()?)?;
    Some((completed - started).num_seconds())
}
