use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::{scan_sessions, scans};
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::Evaluation;
use crate::repositories;
use crate::schemas::evaluation::{
    AnswerKeyRequest, AnswerKeyResponse, EvaluationResponse, EvaluationUpsert, PrintedVersion,
};
use crate::services::bubble_grid::{BubbleGrid, FiducialCorners};
use crate::services::permutation::seed_fingerprint;
use crate::services::versioning::{generate_answer_keys, row_labels, validate_items, VersionOptions};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:evaluation_id", get(get_evaluation).put(upsert_evaluation))
        .route("/:evaluation_id/answer-keys", post(answer_keys))
        .route("/:evaluation_id/scans", post(scans::scan_photo))
        .route("/:evaluation_id/responses/:student_id", get(scans::get_response))
        .route("/:evaluation_id/scan-log", get(scans::scan_log))
        .route("/:evaluation_id/scan-sessions", post(scan_sessions::create_session))
}

const MAX_EVALUATION_ID_LEN: usize = 64;

fn validate_evaluation_id(evaluation_id: &str) -> Result<(), ApiError> {
    if evaluation_id.trim().is_empty()
        || evaluation_id.len() > MAX_EVALUATION_ID_LEN
        || evaluation_id.contains('|')
    {
        return Err(ApiError::BadRequest(format!("Invalid evaluation id: {evaluation_id:?}")));
    }
    Ok(())
}

pub(crate) async fn load_evaluation(
    state: &AppState,
    evaluation_id: &str,
) -> Result<Evaluation, ApiError> {
    repositories::evaluations::find_by_id(state.db(), evaluation_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch evaluation"))?
        .ok_or_else(|| ApiError::NotFound(format!("Evaluation {evaluation_id} not found")))
}

async fn upsert_evaluation(
    Path(evaluation_id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<EvaluationUpsert>,
) -> Result<Json<EvaluationResponse>, ApiError> {
    validate_evaluation_id(&evaluation_id)?;
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    validate_items(&payload.items, state.settings().geometry().max_alternatives)
        .map_err(ApiError::bad_request)?;

    let options = VersionOptions {
        randomize_items: payload.randomize_items,
        randomize_alternatives: payload.randomize_alternatives,
    };
    let evaluation = repositories::evaluations::upsert(
        state.db(),
        &evaluation_id,
        &payload.title,
        &payload.items,
        options,
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to store evaluation"))?;

    tracing::info!(
        evaluation_id = %evaluation.id,
        items = payload.items.len(),
        randomize_items = options.randomize_items,
        randomize_alternatives = options.randomize_alternatives,
        "Evaluation stored"
    );

    Ok(Json(EvaluationResponse::from(evaluation)))
}

async fn get_evaluation(
    Path(evaluation_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<EvaluationResponse>, ApiError> {
    let evaluation = load_evaluation(&state, &evaluation_id).await?;
    Ok(Json(EvaluationResponse::from(evaluation)))
}

async fn answer_keys(
    Path(evaluation_id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<AnswerKeyRequest>,
) -> Result<Json<AnswerKeyResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let rows = match (payload.rows, payload.row_count) {
        (Some(_), Some(_)) => {
            return Err(ApiError::BadRequest(
                "Provide either rows or row_count, not both".to_string(),
            ));
        }
        (Some(rows), None) => rows,
        (None, count) => row_labels(count.unwrap_or(1)).map_err(ApiError::bad_request)?,
    };

    let evaluation = load_evaluation(&state, &evaluation_id).await?;
    let geometry = *state.settings().geometry();
    let (versions, keys) =
        generate_answer_keys(&evaluation.items, evaluation.options(), &payload.seed, &rows)
            .map_err(ApiError::bad_request)?;

    let corners = payload
        .fiducial
        .map(|fiducial| FiducialCorners::square(fiducial.left, fiducial.top, fiducial.size));

    let mut printed = Vec::with_capacity(versions.len());
    for version in versions {
        let layout = corners
            .as_ref()
            .map(|corners| BubbleGrid::locate(corners, &geometry, &version))
            .transpose()
            .map_err(ApiError::bad_request)?;
        let answer_key = keys.get(&version.row_label).cloned().unwrap_or_default();
        printed.push(PrintedVersion {
            row_label: version.row_label,
            items: version.items,
            answer_key,
            layout,
        });
    }

    let seed_tag = seed_fingerprint(&payload.seed);
    tracing::info!(
        evaluation_id = %evaluation.id,
        seed = %seed_tag,
        rows = printed.len(),
        "Answer keys generated"
    );

    Ok(Json(AnswerKeyResponse {
        evaluation_id: evaluation.id,
        seed_fingerprint: seed_tag,
        geometry,
        versions: printed,
        answer_keys: keys,
    }))
}
