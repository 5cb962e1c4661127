pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use crate::core::{config::Settings, state::AppState, telemetry};
use crate::db::types::ScanStatus;
use crate::services::fiducial::QrFiducialDecoder;
use crate::services::scan_processing::{ScanContext, ScanProcessor};
use crate::tasks::capture::{self, ImageSequenceSource, ScanEvent};

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let db_pool = db::init_pool(&settings).await?;
    db::run_migrations(&db_pool).await?;

    let state = AppState::new(settings, db_pool);
    let sweeper = state.scan_sessions().spawn_sweeper();
    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        project = %state.settings().api().project_name,
        version = %state.settings().api().version,
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        "Gabarito Rust API listening"
    );

    let result =
        axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await;

    sweeper.abort();
    state.scan_sessions().shutdown_all().await;
    tracing::info!("Scan sessions stopped");

    result?;

    Ok(())
}

pub async fn run_scanner() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;
    let job = settings.scanner_job()?;

    let db_pool = db::init_pool(&settings).await?;
    db::run_migrations(&db_pool).await?;

    let evaluation = repositories::evaluations::find_by_id(&db_pool, &job.evaluation_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("evaluation {} not found", job.evaluation_id))?;
    let context = ScanContext::for_evaluation(evaluation, job.seed, &settings);
    let submitter =
        Arc::new(repositories::graded_responses::PgResponseSubmitter::new(db_pool.clone()));
    let processor = ScanProcessor::new(context, submitter);

    let source = ImageSequenceSource::new(&job.frame_dir);
    let mut handle = capture::start(
        source,
        Arc::new(QrFiducialDecoder),
        processor,
        settings.scanner().capture,
    )
    .await?;

    let mut shutdown = core::shutdown::shutdown_channel();
    let mut submitted = 0usize;
    let mut rejected = 0usize;
    let mut stopping = false;

    loop {
        let event = tokio::select! {
            event = handle.next_event() => event,
            changed = shutdown.changed(), if !stopping => {
                if changed.is_ok() && *shutdown.borrow() {
                    tracing::info!("Stopping scanner");
                    handle.stop();
                }
                stopping = true;
                continue;
            }
        };
        let Some(event) = event else { break };

        match &event {
            ScanEvent::Result(attempt) => {
                if attempt.status == ScanStatus::Success {
                    submitted += 1;
                } else {
                    rejected += 1;
                }
                api::scans::journal_attempt(&db_pool, &job.evaluation_id, attempt).await;
            }
            ScanEvent::Duplicate { student_id } => {
                tracing::debug!(%student_id, "Sheet already submitted, skipping");
            }
            ScanEvent::Guides { verdict, .. } => {
                tracing::trace!(?verdict, "Alignment");
            }
            ScanEvent::Stopped { reason } => {
                tracing::info!(?reason, "Capture loop finished");
            }
        }
    }

    tracing::info!(
        evaluation_id = %job.evaluation_id,
        frame_dir = %job.frame_dir.display(),
        submitted,
        rejected,
        "Scanner run complete"
    );

    Ok(())
}
