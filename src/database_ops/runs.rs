//! Bookkeeping for import runs: one row per pipeline invocation.

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use sqlx::FromRow;

use crate::database_ops::db::Db;

/// Final state of a run as stored in `import_runs.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Ok,
    /// Completed, but with per-entry errors or fallback sources.
    Partial,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Ok => "ok",
            RunStatus::Partial => "partial",
            RunStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ImportRun {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub status: String,
    pub fetch_only: bool,
    pub report: Option<String>,
}

pub async fn import_run_start(db: &Db, fetch_only: bool) -> Result<i64> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO import_runs (started_at, status, fetch_only) VALUES (?, 'running', ?) RETURNING id",
    )
    .bind(Utc::now().to_rfc3339())
    .bind(fetch_only)
    .fetch_one(&db.pool)
    .await?;
    Ok(id)
}

pub async fn import_run_finish(db: &Db, run_id: i64, status: RunStatus, report: Option<&Value>) -> Result<()> {
    sqlx::query("UPDATE import_runs SET finished_at = ?, status = ?, report = ? WHERE id = ?")
        .bind(Utc::now().to_rfc3339())
        .bind(status.as_str())
        .bind(report.map(Value::to_string))
        .bind(run_id)
        .execute(&db.pool)
        .await?;
    Ok(())
}

pub async fn last_import_run(db: &Db) -> Result<Option<ImportRun>> {
    let run = sqlx::query_as::<_, ImportRun>("SELECT * FROM import_runs ORDER BY id DESC LIMIT 1")
        .fetch_optional(&db.pool)
        .await?;
    Ok(run)
}
