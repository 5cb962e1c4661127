use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::core::time::primitive_now_utc;
use crate::db::models::{GradedAnswerRecord, GradedResponseRecord};
use crate::services::reconciler::GradedResponse;
use crate::services::scan_processing::{ResponseSubmitter, SubmissionError};

pub(crate) const COLUMNS: &str = "id, evaluation_id, student_id, row_label, submitted_at";
pub(crate) const ANSWER_COLUMNS: &str = "response_id, position, item_id, alternative_id";

pub(crate) async fn replace(
    pool: &PgPool,
    evaluation_id: &str,
    student_id: &str,
    row_label: &str,
    response: &GradedResponse,
) -> Result<String, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let now = primitive_now_utc();

    sqlx::query("DELETE FROM graded_responses WHERE evaluation_id = $1 AND student_id = $2")
        .bind(evaluation_id)
        .bind(student_id)
        .execute(&mut *tx)
        .await?;

    let response_id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO graded_responses (id, evaluation_id, student_id, row_label, submitted_at)
         VALUES ($1,$2,$3,$4,$5)",
    )
    .bind(&response_id)
    .bind(evaluation_id)
    .bind(student_id)
    .bind(row_label)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    for (position, answer) in response.answers.iter().enumerate() {
        sqlx::query(
            "INSERT INTO graded_answers (response_id, position, item_id, alternative_id)
             VALUES ($1,$2,$3,$4)",
        )
        .bind(&response_id)
        .bind(position as i32)
        .bind(&answer.item_id)
        .bind(&answer.alternative_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(response_id)
}

pub(crate) async fn find_by_student(
    pool: &PgPool,
    evaluation_id: &str,
    student_id: &str,
) -> Result<Option<GradedResponseRecord>, sqlx::Error> {
    sqlx::query_as::<_, GradedResponseRecord>(&format!(
        "SELECT {COLUMNS}
         FROM graded_responses
         WHERE evaluation_id = $1 AND student_id = $2"
    ))
    .bind(evaluation_id)
    .bind(student_id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list_answers(
    pool: &PgPool,
    response_id: &str,
) -> Result<Vec<GradedAnswerRecord>, sqlx::Error> {
    sqlx::query_as::<_, GradedAnswerRecord>(&format!(
        "SELECT {ANSWER_COLUMNS} FROM graded_answers WHERE response_id = $1 ORDER BY position"
    ))
    .bind(response_id)
    .fetch_all(pool)
    .await
}

#[derive(Debug, Clone)]
pub(crate) struct PgResponseSubmitter {
    pool: PgPool,
}

impl PgResponseSubmitter {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResponseSubmitter for PgResponseSubmitter {
    async fn submit(
        &self,
        evaluation_id: &str,
        student_id: &str,
        row_label: &str,
        response: &GradedResponse,
    ) -> Result<(), SubmissionError> {
        let response_id =
            replace(&self.pool, evaluation_id, student_id, row_label, response).await?;
        tracing::debug!(evaluation_id, student_id, %response_id, "Graded response stored");
        Ok(())
    }
}
