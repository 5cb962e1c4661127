use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, Query, State},
    Json,
};
use image::RgbaImage;
use sqlx::PgPool;

use crate::api::errors::ApiError;
use crate::api::evaluations::load_evaluation;
use crate::core::state::AppState;
use crate::repositories;
use crate::repositories::graded_responses::PgResponseSubmitter;
use crate::schemas::scan::{GradedResponseView, ScanLogQuery, ScanLogView};
use crate::services::scan_processing::{ScanAttempt, ScanContext, ScanProcessor};
use crate::tasks::capture::ScanEvent;

const MAX_LOG_LIMIT: i64 = 500;

pub(crate) async fn decode_frame(bytes: Vec<u8>) -> Result<RgbaImage, ApiError> {
    tokio::task::spawn_blocking(move || {
        image::load_from_memory(&bytes).map(|image| image.to_rgba8())
    })
    .await
    .map_err(|e| ApiError::internal(e, "Image decoder failed"))?
    .map_err(|e| ApiError::BadRequest(format!("Unreadable image: {e}")))
}

pub(crate) async fn scan_processor(
    state: &AppState,
    evaluation_id: &str,
    seed: String,
) -> Result<ScanProcessor, ApiError> {
    if seed.is_empty() {
        return Err(ApiError::BadRequest("seed must not be empty".to_string()));
    }
    let evaluation = load_evaluation(state, evaluation_id).await?;
    let context = ScanContext::for_evaluation(evaluation, seed, state.settings());
    Ok(ScanProcessor::new(context, Arc::new(PgResponseSubmitter::new(state.db().clone()))))
}

pub(crate) async fn journal(pool: &PgPool, evaluation_id: &str, events: &[ScanEvent]) {
    for event in events {
        if let ScanEvent::Result(attempt) = event {
            journal_attempt(pool, evaluation_id, attempt).await;
        }
    }
}

pub(crate) async fn journal_attempt(pool: &PgPool, evaluation_id: &str, attempt: &ScanAttempt) {
    if let Err(err) = repositories::scan_log::record(pool, evaluation_id, attempt).await {
        tracing::warn!(error = %err, evaluation_id, "Failed to journal scan attempt");
    }
}

pub(crate) async fn scan_photo(
    Path(evaluation_id): Path<String>,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ScanAttempt>, ApiError> {
    let mut seed: Option<String> = None;
    let mut file_bytes: Option<Vec<u8>> = None;
    let max_bytes = state.settings().scanner().max_upload_bytes();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::BadRequest("Invalid multipart data".to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name == "file" {
            let mut bytes = Vec::new();
            while let Some(chunk) = field
                .chunk()
                .await
                .map_err(|_| ApiError::BadRequest("Failed to read file".to_string()))?
            {
                if bytes.len() + chunk.len() > max_bytes {
                    return Err(ApiError::BadRequest(format!(
                        "File size exceeds {}MB limit",
                        state.settings().scanner().max_upload_size_mb
                    )));
                }
                bytes.extend_from_slice(&chunk);
            }
            file_bytes = Some(bytes);
        } else if name == "seed" {
            let text = field
                .text()
                .await
                .map_err(|_| ApiError::BadRequest("Invalid seed".to_string()))?;
            seed = Some(text);
        }
    }

    let seed = seed.ok_or_else(|| ApiError::BadRequest("seed is required".to_string()))?;
    let file_bytes =
        file_bytes.ok_or_else(|| ApiError::BadRequest("File is required".to_string()))?;

    let processor = scan_processor(&state, &evaluation_id, seed).await?;
    let frame = decode_frame(file_bytes).await?;
    let attempt = processor.scan_photo(frame, state.decoder()).await;
    journal_attempt(state.db(), &evaluation_id, &attempt).await;

    Ok(Json(attempt))
}

pub(crate) async fn get_response(
    Path((evaluation_id, student_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<GradedResponseView>, ApiError> {
    let record =
        repositories::graded_responses::find_by_student(state.db(), &evaluation_id, &student_id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to fetch graded response"))?
            .ok_or_else(|| {
                ApiError::NotFound(format!(
                    "No graded response for student {student_id} in evaluation {evaluation_id}"
                ))
            })?;

    let answers = repositories::graded_responses::list_answers(state.db(), &record.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch graded answers"))?;

    Ok(Json(GradedResponseView::new(record, answers)))
}

pub(crate) async fn scan_log(
    Path(evaluation_id): Path<String>,
    Query(query): Query<ScanLogQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<ScanLogView>>, ApiError> {
    let limit = query.limit.clamp(1, MAX_LOG_LIMIT);
    let entries = repositories::scan_log::list_recent(state.db(), &evaluation_id, limit)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch scan log"))?;

    Ok(Json(entries.into_iter().map(ScanLogView::from).collect()))
}
