use sqlx::types::Json;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::Evaluation;
use crate::services::assessment::AssessmentItem;
use crate::services::versioning::VersionOptions;

pub(crate) const COLUMNS: &str = "\
    id, title, items, randomize_items, randomize_alternatives, created_at, updated_at";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Evaluation>, sqlx::Error> {
    sqlx::query_as::<_, Evaluation>(&format!("SELECT {COLUMNS} FROM evaluations WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn upsert(
    pool: &PgPool,
    id: &str,
    title: &str,
    items: &[AssessmentItem],
    options: VersionOptions,
    now: PrimitiveDateTime,
) -> Result<Evaluation, sqlx::Error> {
    sqlx::query_as::<_, Evaluation>(&format!(
        "INSERT INTO evaluations (
            id, title, items, randomize_items, randomize_alternatives, created_at, updated_at
         ) VALUES ($1,$2,$3,$4,$5,$6,$6)
         ON CONFLICT (id) DO UPDATE
             SET title = EXCLUDED.title,
                 items = EXCLUDED.items,
                 randomize_items = EXCLUDED.randomize_items,
                 randomize_alternatives = EXCLUDED.randomize_alternatives,
                 updated_at = EXCLUDED.updated_at
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(title)
    .bind(Json(items))
    .bind(options.randomize_items)
    .bind(options.randomize_alternatives)
    .bind(now)
    .fetch_one(pool)
    .await
}
