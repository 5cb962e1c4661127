use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::scans::{decode_frame, journal, scan_processor};
use crate::core::state::AppState;
use crate::schemas::scan::{ScanSessionCreate, ScanSessionCreated, ScanSessionEvents};
use crate::tasks::capture::registry::SessionSnapshot;
use crate::tasks::capture::session::LoopPhase;
use crate::tasks::capture::{self, CaptureError, ChannelFrameSource, LiveSession, RegistryError};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:session_id", delete(stop_session))
        .route("/:session_id/frames", post(push_frame))
        .route("/:session_id/events", get(session_events))
}

fn session_not_found(session_id: Uuid) -> ApiError {
    ApiError::NotFound(format!("Scan session {session_id} not found"))
}

pub(crate) async fn create_session(
    Path(evaluation_id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<ScanSessionCreate>,
) -> Result<(StatusCode, Json<ScanSessionCreated>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let processor = scan_processor(&state, &evaluation_id, payload.seed).await?;
    let seed_fingerprint = processor.context().seed_tag();
    let scanner = state.settings().scanner();
    let (frames, source) = ChannelFrameSource::channel(scanner.frame_buffer);

    let handle = capture::start(source, state.decoder(), processor, scanner.capture)
        .await
        .map_err(|err| match err {
            CaptureError::CameraAccess(message) => ApiError::ServiceUnavailable(message),
        })?;

    let session_id = state
        .scan_sessions()
        .insert(LiveSession { evaluation_id: evaluation_id.clone(), frames, handle })
        .await
        .map_err(|err| match err {
            RegistryError::Full(limit) => {
                tracing::warn!(limit, "Scan session limit reached");
                ApiError::TooManyRequests("Too many live scan sessions")
            }
        })?;

    tracing::info!(%session_id, %evaluation_id, "Live scan session registered");

    Ok((
        StatusCode::CREATED,
        Json(ScanSessionCreated { session_id, evaluation_id, seed_fingerprint }),
    ))
}

async fn push_frame(
    Path(session_id): Path<Uuid>,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let sender = state
        .scan_sessions()
        .frame_sender(session_id)
        .await
        .ok_or_else(|| session_not_found(session_id))?;

    let frame = decode_frame(body.to_vec()).await?;
    match sender.try_send(frame) {
        Ok(()) => Ok(StatusCode::ACCEPTED),
        Err(TrySendError::Full(_)) => {
            tracing::debug!(%session_id, "Frame buffer full, dropping frame");
            Ok(StatusCode::ACCEPTED)
        }
        Err(TrySendError::Closed(_)) => {
            Err(ApiError::Conflict(format!("Scan session {session_id} has stopped")))
        }
    }
}

async fn session_events(
    Path(session_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<ScanSessionEvents>, ApiError> {
    let snapshot = state
        .scan_sessions()
        .snapshot(session_id)
        .await
        .ok_or_else(|| session_not_found(session_id))?;

    journal(state.db(), &snapshot.evaluation_id, &snapshot.events).await;
    Ok(Json(ScanSessionEvents::new(session_id, snapshot)))
}

async fn stop_session(
    Path(session_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<ScanSessionEvents>, ApiError> {
    let live = state
        .scan_sessions()
        .remove(session_id)
        .await
        .ok_or_else(|| session_not_found(session_id))?;

    let LiveSession { evaluation_id, frames, handle } = live;
    drop(frames);
    let events = handle.shutdown().await;
    journal(state.db(), &evaluation_id, &events).await;

    tracing::info!(%session_id, %evaluation_id, "Live scan session stopped");
    let snapshot =
        SessionSnapshot { evaluation_id, phase: LoopPhase::Idle, finished: true, events };
    Ok(Json(ScanSessionEvents::new(session_id, snapshot)))
}
