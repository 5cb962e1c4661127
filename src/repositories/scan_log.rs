use sqlx::PgPool;
use uuid::Uuid;

use crate::core::time::primitive_now_utc;
use crate::db::models::ScanLogEntry;
use crate::services::scan_processing::ScanAttempt;

pub(crate) const COLUMNS: &str =
    "id, evaluation_id, student_id, row_label, status, detail, created_at";

pub(crate) async fn record(
    pool: &PgPool,
    evaluation_id: &str,
    attempt: &ScanAttempt,
) -> Result<(), sqlx::Error> {
    let payload = attempt.payload.as_ref();
    sqlx::query(
        "INSERT INTO scan_log (id, evaluation_id, student_id, row_label, status, detail, created_at)
         VALUES ($1,$2,$3,$4,$5,$6,$7)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(evaluation_id)
    .bind(payload.map(|payload| payload.student_id.as_str()))
    .bind(payload.map(|payload| payload.row_label.as_str()))
    .bind(attempt.status)
    .bind(&attempt.detail)
    .bind(primitive_now_utc())
    .execute(pool)
    .await?;
    Ok(())
}

pub(crate) async fn list_recent(
    pool: &PgPool,
    evaluation_id: &str,
    limit: i64,
) -> Result<Vec<ScanLogEntry>, sqlx::Error> {
    sqlx::query_as::<_, ScanLogEntry>(&format!(
        "SELECT {COLUMNS}
         FROM scan_log
         WHERE evaluation_id = $1
         ORDER BY created_at DESC
         LIMIT $2"
    ))
    .bind(evaluation_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}
