// Scan record persistence
// Free query helpers over the SQLite pool. Status transitions are
// compare-and-set updates so a record can never reach a terminal state
// twice, and every owner-scoped query filters by owner_id in SQL so a
// foreign scan id behaves exactly like a missing one.

use crate::error::ApiError;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Pool, Sqlite};

/// Timestamps are stored as fixed-width RFC3339 UTC text, so lexicographic
/// comparison in SQL matches chronological order.
pub fn fmt_ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[derive(Debug, Clone)]
pub struct ScanRow {
    pub id: String,
    pub owner_id: String,
    pub repository_url: String,
    pub repository_name: String,
    pub status: String,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub total_findings: i64,
    pub files_scanned: i64,
    /// Full ScanResults JSON, present only for completed scans.
    pub results: Option<String>,
    /// Failure message, present only for failed scans.
    pub error: Option<String>,
}

type ScanTuple = (
    String,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    i64,
    i64,
    Option<String>,
    Option<String>,
);

const SCAN_COLUMNS: &str = "id, owner_id, repository_url, repository_name, status, \
     created_at, started_at, completed_at, total_findings, files_scanned, results, error";

fn into_row(t: ScanTuple) -> ScanRow {
    ScanRow {
        id: t.0,
        owner_id: t.1,
        repository_url: t.2,
        repository_name: t.3,
        status: t.4,
        created_at: t.5,
        started_at: t.6,
        completed_at: t.7,
        total_findings: t.8,
        files_scanned: t.9,
        results: t.10,
        error: t.11,
    }
}

pub async fn insert_scan(
    pool: &Pool<Sqlite>,
    id: &str,
    owner_id: &str,
    repository_url: &str,
    repository_name: &str,
    created_at: &str,
) -> Result<(), ApiError> {
    sqlx::query(
        "INSERT INTO scans (id, owner_id, repository_url, repository_name, status, created_at)
         VALUES (?, ?, ?, ?, 'pending', ?)",
    )
    .bind(id)
    .bind(owner_id)
    .bind(repository_url)
    .bind(repository_name)
    .bind(created_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Most recent scan of (owner, url) created at or after `since`, used for
/// the per-repository cool-down.
pub async fn recent_scan_created_at(
    pool: &Pool<Sqlite>,
    owner_id: &str,
    repository_url: &str,
    since: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, ApiError> {
    let row: Option<(String,)> = sqlx::query_as(
        "SELECT created_at FROM scans
         WHERE owner_id = ? AND repository_url = ? AND created_at >= ?
         ORDER BY created_at DESC LIMIT 1",
    )
    .bind(owner_id)
    .bind(repository_url)
    .bind(fmt_ts(since))
    .fetch_optional(pool)
    .await?;

    Ok(row.and_then(|(created,)| parse_ts(&created)))
}

/// Scans this owner created since UTC midnight, for the daily quota.
pub async fn daily_scan_count(
    pool: &Pool<Sqlite>,
    owner_id: &str,
    day_start: DateTime<Utc>,
) -> Result<i64, ApiError> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM scans WHERE owner_id = ? AND created_at >= ?")
            .bind(owner_id)
            .bind(fmt_ts(day_start))
            .fetch_one(pool)
            .await?;
    Ok(count)
}

/// pending -> scanning. Returns false when the record was cancelled (or
/// otherwise left pending) in the meantime.
pub async fn mark_scanning(pool: &Pool<Sqlite>, id: &str) -> Result<bool, ApiError> {
    let result = sqlx::query(
        "UPDATE scans SET status = 'scanning', started_at = ?
         WHERE id = ? AND status = 'pending'",
    )
    .bind(fmt_ts(Utc::now()))
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// scanning -> completed, the single point where `results` is written.
pub async fn mark_completed(
    pool: &Pool<Sqlite>,
    id: &str,
    results_json: &str,
    total_findings: i64,
    files_scanned: i64,
) -> Result<bool, ApiError> {
    let result = sqlx::query(
        "UPDATE scans
         SET status = 'completed', completed_at = ?, results = ?,
             total_findings = ?, files_scanned = ?
         WHERE id = ? AND status = 'scanning'",
    )
    .bind(fmt_ts(Utc::now()))
    .bind(results_json)
    .bind(total_findings)
    .bind(files_scanned)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// scanning -> failed, the single point where `error` is written. The
/// message is stored verbatim. Also reaches a record still in `pending`
/// so a crash before the scanning transition cannot strand it there.
pub async fn mark_failed(pool: &Pool<Sqlite>, id: &str, error: &str) -> Result<bool, ApiError> {
    let result = sqlx::query(
        "UPDATE scans SET status = 'failed', completed_at = ?, error = ?
         WHERE id = ? AND status IN ('pending', 'scanning')",
    )
    .bind(fmt_ts(Utc::now()))
    .bind(error)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// pending -> cancelled, only ever triggered by the owner.
pub async fn mark_cancelled(
    pool: &Pool<Sqlite>,
    id: &str,
    owner_id: &str,
) -> Result<bool, ApiError> {
    let result = sqlx::query(
        "UPDATE scans SET status = 'cancelled', completed_at = ?
         WHERE id = ? AND owner_id = ? AND status = 'pending'",
    )
    .bind(fmt_ts(Utc::now()))
    .bind(id)
    .bind(owner_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn get_scan(
    pool: &Pool<Sqlite>,
    id: &str,
    owner_id: &str,
) -> Result<Option<ScanRow>, ApiError> {
    let row: Option<ScanTuple> = sqlx::query_as(&format!(
        "SELECT {SCAN_COLUMNS} FROM scans WHERE id = ? AND owner_id = ?"
    ))
    .bind(id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(into_row))
}

pub async fn delete_scan(pool: &Pool<Sqlite>, id: &str, owner_id: &str) -> Result<bool, ApiError> {
    let result = sqlx::query("DELETE FROM scans WHERE id = ? AND owner_id = ?")
        .bind(id)
        .bind(owner_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() == 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    RepositoryName,
}

impl SortField {
    fn column(self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::RepositoryName => "repository_name",
        }
    }
}

pub struct HistoryQuery {
    pub owner_id: String,
    pub page: i64,
    pub limit: i64,
    pub sort_field: SortField,
    pub ascending: bool,
    pub status: Option<String>,
}

/// One page of scan summaries plus the unpaged total. Sort column and
/// direction come from a whitelist, never from request text.
pub async fn history_page(
    pool: &Pool<Sqlite>,
    query: &HistoryQuery,
) -> Result<(Vec<ScanRow>, i64), ApiError> {
    let mut filter = String::from("WHERE owner_id = ?");
    if query.status.is_some() {
        filter.push_str(" AND status = ?");
    }

    let direction = if query.ascending { "ASC" } else { "DESC" };
    let order = format!(
        "ORDER BY {} {}, created_at DESC",
        query.sort_field.column(),
        direction
    );
    let offset = (query.page - 1) * query.limit;

    let select = format!(
        "SELECT {SCAN_COLUMNS} FROM scans {filter} {order} LIMIT ? OFFSET ?"
    );
    let mut rows = sqlx::query_as::<_, ScanTuple>(&select).bind(&query.owner_id);
    if let Some(status) = &query.status {
        rows = rows.bind(status);
    }
    let rows = rows.bind(query.limit).bind(offset).fetch_all(pool).await?;

    let count_sql = format!("SELECT COUNT(*) FROM scans {filter}");
    let mut count = sqlx::query_as::<_, (i64,)>(&count_sql).bind(&query.owner_id);
    if let Some(status) = &query.status {
        count = count.bind(status);
    }
    let (total,) = count.fetch_one(pool).await?;

    Ok((rows.into_iter().map(into_row).collect(), total))
}

#[derive(Debug, Default)]
pub struct OverviewStats {
    pub total_scans: i64,
    pub completed_scans: i64,
    pub failed_scans: i64,
    pub total_findings: i64,
    pub total_files_scanned: i64,
    /// Mean completed-scan duration in seconds.
    pub avg_scan_seconds: f64,
}

/// Aggregates for the dashboard overview, scoped to scans created at or
/// after `since` (unset means all time).
pub async fn overview_stats(
    pool: &Pool<Sqlite>,
    owner_id: &str,
    since: Option<DateTime<Utc>>,
) -> Result<OverviewStats, ApiError> {
    let since = since.map(fmt_ts).unwrap_or_default();
    let row: (i64, i64, i64, i64, i64, f64) = sqlx::query_as(
        "SELECT COUNT(*),
                COALESCE(SUM(status = 'completed'), 0),
                COALESCE(SUM(status = 'failed'), 0),
                COALESCE(SUM(total_findings), 0),
                COALESCE(SUM(files_scanned), 0),
                COALESCE(AVG(CASE WHEN status = 'completed'
                    THEN (julianday(completed_at) - julianday(started_at)) * 86400.0
                END), 0.0)
         FROM scans WHERE owner_id = ? AND created_at >= ?",
    )
    .bind(owner_id)
    .bind(since)
    .fetch_one(pool)
    .await?;

    Ok(OverviewStats {
        total_scans: row.0,
        completed_scans: row.1,
        failed_scans: row.2,
        total_findings: row.3,
        total_files_scanned: row.4,
        avg_scan_seconds: row.5,
    })
}

/// The ten most recent scans for the dashboard activity feed:
/// (repository_name, status, created_at, total_findings).
pub async fn recent_activity(
    pool: &Pool<Sqlite>,
    owner_id: &str,
    since: Option<DateTime<Utc>>,
) -> Result<Vec<(String, String, String, i64)>, ApiError> {
    let since = since.map(fmt_ts).unwrap_or_default();
    let rows = sqlx::query_as(
        "SELECT repository_name, status, created_at, total_findings
         FROM scans WHERE owner_id = ? AND created_at >= ?
         ORDER BY created_at DESC LIMIT 10",
    )
    .bind(owner_id)
    .bind(since)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Finding counts per severity summed over completed scans, pulled out of
/// the stored results JSON.
pub async fn severity_distribution(
    pool: &Pool<Sqlite>,
    owner_id: &str,
    since: Option<DateTime<Utc>>,
) -> Result<(i64, i64, i64, i64), ApiError> {
    let since = since.map(fmt_ts).unwrap_or_default();
    let row = sqlx::query_as(
        "SELECT COALESCE(SUM(json_extract(results, '$.severityCounts.critical')), 0),
                COALESCE(SUM(json_extract(results, '$.severityCounts.major')), 0),
                COALESCE(SUM(json_extract(results, '$.severityCounts.minor')), 0),
                COALESCE(SUM(json_extract(results, '$.severityCounts.unknown')), 0)
         FROM scans
         WHERE owner_id = ? AND status = 'completed' AND created_at >= ?",
    )
    .bind(owner_id)
    .bind(since)
    .fetch_one(pool)
    .await?;
    Ok(row)
}
