use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::core::{
    errors::{AppError, AppResult},
    types::{AnalysisRun, DocumentAnalysis, GetRunResponse, RunStatus},
};

fn parse_timestamp(value: String) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|v| v.with_timezone(&Utc))
        .map_err(|err| AppError::Database(format!("invalid timestamp {value}: {err}")))
}

pub async fn create_run(pool: &SqlitePool, run_id: &str, model: &str) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO analysis_runs (id, model, status)
        VALUES (?1, ?2, 'running')
        "#,
    )
    .bind(run_id)
    .bind(model)
    .execute(pool)
    .await?;
    Ok(())
}

/// Stores one section result. Re-saving the same document and section replaces it.
pub async fn save_analysis(pool: &SqlitePool, run_id: &str, analysis: &DocumentAnalysis) -> AppResult<()> {
    let result_json = serde_json::to_string(&analysis.result)
        .map_err(|err: serde_json::Error| AppError::Internal(err.to_string()))?;
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO document_analyses (
          run_id, document_id, section, result_json, error_count, latency_ms
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(run_id)
    .bind(&analysis.document_id)
    .bind(&analysis.section)
    .bind(result_json)
    .bind(analysis.result.errors.len() as i64)
    .bind(analysis.latency_ms)
    .execute(pool)
    .await?;
    Ok(())
}

/// Marks the run completed and folds the per-document counts into it.
pub async fn complete_run(pool: &SqlitePool, run_id: &str) -> AppResult<()> {
    let affected = sqlx::query(
        r#"
        UPDATE analysis_runs
        SET status = 'completed',
            ended_at = (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            document_count = (
              SELECT COUNT(DISTINCT document_id) FROM document_analyses WHERE run_id = ?1
            ),
            error_count = (
              SELECT COALESCE(SUM(error_count), 0) FROM document_analyses WHERE run_id = ?1
            )
        WHERE id = ?1
        "#,
    )
    .bind(run_id)
    .execute(pool)
    .await?
    .rows_affected();
    if affected == 0 {
        return Err(AppError::NotFound(format!("run {run_id}")));
    }
    Ok(())
}

pub async fn fail_run(pool: &SqlitePool, run_id: &str) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE analysis_runs
        SET status = 'failed',
            ended_at = (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        WHERE id = ?1
        "#,
    )
    .bind(run_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_run(pool: &SqlitePool, run_id: &str) -> AppResult<GetRunResponse> {
    let run_row = sqlx::query(
        r#"
        SELECT id, model, status, started_at, ended_at, document_count, error_count
        FROM analysis_runs
        WHERE id = ?1
        "#,
    )
    .bind(run_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("run {run_id}")))?;

    let status_raw: String = run_row.try_get("status")?;
    let started_at: String = run_row.try_get("started_at")?;
    let ended_at: Option<String> = run_row.try_get("ended_at")?;
    let run = AnalysisRun {
        id: run_row.try_get("id")?,
        model: run_row.try_get("model")?,
        status: match status_raw.as_str() {
            "completed" => RunStatus::Completed,
            "failed" => RunStatus::Failed,
            _ => RunStatus::Running,
        },
        started_at: parse_timestamp(started_at)?,
        ended_at: ended_at.map(parse_timestamp).transpose()?,
        document_count: run_row.try_get("document_count")?,
        error_count: run_row.try_get("error_count")?,
    };

    let analyses = list_analyses(pool, run_id, None).await?;
    Ok(GetRunResponse { run, analyses })
}

/// Analyses of a run, optionally narrowed to one document, in document/section order.
pub async fn list_analyses(
    pool: &SqlitePool,
    run_id: &str,
    document_id: Option<&str>,
) -> AppResult<Vec<DocumentAnalysis>> {
    let rows = sqlx::query(
        r#"
        SELECT document_id, section, result_json, latency_ms
        FROM document_analyses
        WHERE run_id = ?1 AND (?2 IS NULL OR document_id = ?2)
        ORDER BY document_id ASC, section ASC
        "#,
    )
    .bind(run_id)
    .bind(document_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(map_analysis).collect()
}

fn map_analysis(row: SqliteRow) -> AppResult<DocumentAnalysis> {
    let result_raw: String = row.try_get("result_json")?;
    Ok(DocumentAnalysis {
        document_id: row.try_get("document_id")?,
        section: row.try_get("section")?,
        result: serde_json::from_str(&result_raw)
            .map_err(|err| AppError::Database(format!("corrupt result_json: {err}")))?,
        latency_ms: row.try_get("latency_ms")?,
    })
}
