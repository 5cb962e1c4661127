use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use image::RgbaImage;
use serde::Serialize;
use thiserror::Error;

use crate::core::config::Settings;
use crate::db::models::Evaluation;
use crate::db::types::ScanStatus;
use crate::services::assessment::AssessmentItem;
use crate::services::bubble_grid::{BubbleGrid, FiducialCorners, GridError};
use crate::services::fiducial::{FiducialDecoder, FiducialPayload, PayloadError};
use crate::services::geometry::SheetGeometry;
use crate::services::mark_detector::{detect_marks, DetectedMark, MarkDetectorSettings};
use crate::services::permutation::seed_fingerprint;
use crate::services::reconciler::{reconcile, GradedResponse, ReconcileError};
use crate::services::versioning::{generate_version, VersionError, VersionOptions};
use crate::tasks::capture::alignment::AlignmentVerdict;

#[derive(Debug, Error)]
pub(crate) enum SubmissionError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("submission rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub(crate) enum ScanError {
    #[error("no readable fiducial in the image")]
    NoFiducial,
    #[error("unreadable fiducial: {0}")]
    Payload(#[from] PayloadError),
    #[error("sheet belongs to evaluation {found}, not {expected}")]
    EvaluationMismatch { expected: String, found: String },
    #[error(transparent)]
    Version(#[from] VersionError),
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error("image worker failed: {0}")]
    Worker(String),
}

impl ScanError {
    pub(crate) fn status(&self) -> ScanStatus {
        match self {
            ScanError::EvaluationMismatch { .. } => ScanStatus::Mismatch,
            ScanError::Reconcile(ReconcileError::IncompleteScan { .. }) => ScanStatus::Incomplete,
            _ => ScanStatus::Error,
        }
    }
}

#[async_trait]
pub(crate) trait ResponseSubmitter: Send + Sync {
    async fn submit(
        &self,
        evaluation_id: &str,
        student_id: &str,
        row_label: &str,
        response: &GradedResponse,
    ) -> Result<(), SubmissionError>;
}

#[derive(Debug, Clone)]
pub(crate) struct ScanContext {
    pub(crate) evaluation_id: String,
    pub(crate) items: Arc<Vec<AssessmentItem>>,
    pub(crate) options: VersionOptions,
    pub(crate) seed: String,
    pub(crate) geometry: SheetGeometry,
    pub(crate) detector: MarkDetectorSettings,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ScanAttempt {
    pub(crate) payload: Option<FiducialPayload>,
    pub(crate) verdict: AlignmentVerdict,
    pub(crate) status: ScanStatus,
    pub(crate) marks: Vec<DetectedMark>,
    pub(crate) expected: usize,
    pub(crate) detail: String,
}

impl ScanAttempt {
    pub(crate) fn failed(
        payload: Option<FiducialPayload>,
        verdict: AlignmentVerdict,
        marks: Vec<DetectedMark>,
        expected: usize,
        error: &ScanError,
    ) -> Self {
        Self {
            payload,
            verdict,
            status: error.status(),
            marks,
            expected,
            detail: error.to_string(),
        }
    }
}

struct SheetReading {
    marks: Vec<DetectedMark>,
    expected: usize,
    response: Result<GradedResponse, ScanError>,
}

#[derive(Clone)]
pub(crate) struct ScanProcessor {
    context: Arc<ScanContext>,
    submitter: Arc<dyn ResponseSubmitter>,
}

impl ScanProcessor {
    pub(crate) fn new(context: ScanContext, submitter: Arc<dyn ResponseSubmitter>) -> Self {
        Self { context: Arc::new(context), submitter }
    }

    pub(crate) fn context(&self) -> &ScanContext {
        &self.context
    }

    pub(crate) fn accept(&self, content: &str) -> Result<FiducialPayload, ScanError> {
        let payload: FiducialPayload = content.parse()?;
        if payload.evaluation_id != self.context.evaluation_id {
            return Err(ScanError::EvaluationMismatch {
                expected: self.context.evaluation_id.clone(),
                found: payload.evaluation_id,
            });
        }
        Ok(payload)
    }

    pub(crate) async fn process(
        &self,
        frame: RgbaImage,
        corners: FiducialCorners,
        payload: FiducialPayload,
    ) -> ScanAttempt {
        let started = Instant::now();
        let context = Arc::clone(&self.context);
        let row_label = payload.row_label.clone();

        let reading =
            tokio::task::spawn_blocking(move || read_sheet(&context, &frame, &corners, &row_label))
                .await
                .unwrap_or_else(|err| SheetReading {
                    marks: Vec::new(),
                    expected: 0,
                    response: Err(ScanError::Worker(err.to_string())),
                });

        let SheetReading { marks, expected, response } = reading;
        let outcome = match response {
            Ok(response) => self
                .submitter
                .submit(
                    &payload.evaluation_id,
                    &payload.student_id,
                    &payload.row_label,
                    &response,
                )
                .await
                .map_err(ScanError::from),
            Err(err) => Err(err),
        };

        let attempt = match outcome {
            Ok(()) => ScanAttempt {
                payload: Some(payload),
                verdict: AlignmentVerdict::Aligned,
                status: ScanStatus::Success,
                detail: format!("read {} of {expected}", marks.len()),
                marks,
                expected,
            },
            Err(err) => {
                ScanAttempt::failed(Some(payload), AlignmentVerdict::Aligned, marks, expected, &err)
            }
        };

        record(&attempt, started);
        attempt
    }

    pub(crate) async fn scan_photo(
        &self,
        frame: RgbaImage,
        decoder: Arc<dyn FiducialDecoder>,
    ) -> ScanAttempt {
        let started = Instant::now();
        let decoded = tokio::task::spawn_blocking(move || {
            let decoded = decoder.decode(&frame);
            (frame, decoded)
        })
        .await;

        let (frame, decoded) = match decoded {
            Ok((frame, Some(decoded))) => (frame, decoded),
            Ok((_, None)) => {
                let error = ScanError::NoFiducial;
                return self.reject(None, AlignmentVerdict::Searching, error, started);
            }
            Err(err) => {
                let error = ScanError::Worker(err.to_string());
                return self.reject(None, AlignmentVerdict::Searching, error, started);
            }
        };

        match self.accept(&decoded.content) {
            Ok(payload) => self.process(frame, decoded.corners, payload).await,
            Err(err) => {
                let payload = decoded.content.parse::<FiducialPayload>().ok();
                self.reject(payload, AlignmentVerdict::Aligned, err, started)
            }
        }
    }

    fn reject(
        &self,
        payload: Option<FiducialPayload>,
        verdict: AlignmentVerdict,
        error: ScanError,
        started: Instant,
    ) -> ScanAttempt {
        let attempt = ScanAttempt::failed(payload, verdict, Vec::new(), 0, &error);
        record(&attempt, started);
        attempt
    }
}

fn read_sheet(
    context: &ScanContext,
    frame: &RgbaImage,
    corners: &FiducialCorners,
    row_label: &str,
) -> SheetReading {
    let version =
        match generate_version(&context.items, context.options, &context.seed, row_label) {
            Ok(version) => version,
            Err(err) => {
                return SheetReading { marks: Vec::new(), expected: 0, response: Err(err.into()) };
            }
        };
    let expected = version.scoreable_count();

    let grid = match BubbleGrid::locate(corners, &context.geometry, &version) {
        Ok(grid) => grid,
        Err(err) => return SheetReading { marks: Vec::new(), expected, response: Err(err.into()) },
    };

    tracing::debug!(
        row_label,
        fiducial_size = grid.fiducial_size,
        bubbles = grid.bubble_count(),
        "Bubble grid located"
    );
    let marks = detect_marks(frame, &grid, &context.detector);
    let response = reconcile(&version, &marks).map_err(ScanError::from);
    SheetReading { marks, expected, response }
}

fn record(attempt: &ScanAttempt, started: Instant) {
    metrics::counter!("scan_attempts_total", "status" => attempt.status.as_str()).increment(1);
    metrics::histogram!("scan_processing_seconds").record(started.elapsed().as_secs_f64());

    let payload = attempt.payload.as_ref();
    let student_id = payload.map(|payload| payload.student_id.as_str()).unwrap_or("-");
    let row_label = payload.map(|payload| payload.row_label.as_str()).unwrap_or("-");
    match attempt.status {
        ScanStatus::Success => tracing::info!(
            student_id,
            row_label,
            answered = attempt.marks.len(),
            "Answer sheet graded and submitted"
        ),
        ScanStatus::Mismatch => tracing::debug!(
            student_id,
            detail = %attempt.detail,
            "Ignoring sheet of another evaluation"
        ),
        ScanStatus::Incomplete => tracing::warn!(
            student_id,
            row_label,
            detail = %attempt.detail,
            "Incomplete answer sheet discarded"
        ),
        ScanStatus::Error => tracing::error!(
            student_id,
            row_label,
            detail = %attempt.detail,
            "Answer sheet scan failed"
        ),
    }
}

impl ScanContext {
    pub(crate) fn for_evaluation(
        evaluation: Evaluation,
        seed: String,
        settings: &Settings,
    ) -> Self {
        let options = evaluation.options();
        Self {
            evaluation_id: evaluation.id,
            items: Arc::new(evaluation.items.0),
            options,
            seed,
            geometry: *settings.geometry(),
            detector: settings.scanner().detector,
        }
    }

    pub(crate) fn seed_tag(&self) -> String {
        seed_fingerprint(&self.seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::assessment::fixtures::*;
    use crate::services::fiducial::QrFiducialDecoder;
    use crate::test_support::{
        render_marked_sheet, render_qr_sheet, scan_context, RecordingSubmitter, StaticDecoder,
    };

    #[tokio::test]
    async fn marked_sheet_is_submitted_with_canonical_ids() {
        let context = scan_context("eval-1", exam_2024(), "exam-2024");
        let submitter = Arc::new(RecordingSubmitter::default());
        let processor = ScanProcessor::new(context.clone(), submitter.clone());

        let (frame, corners, expected) = render_marked_sheet(&context, "B", None);
        let payload = FiducialPayload::new("eval-1", "stu-7", "B").unwrap();
        let attempt = processor.process(frame, corners, payload).await;

        assert_eq!(attempt.status, ScanStatus::Success, "{}", attempt.detail);
        assert_eq!(attempt.detail, "read 2 of 2");
        let calls = submitter.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].student_id, "stu-7");
        assert_eq!(calls[0].row_label, "B");
        assert_eq!(calls[0].response, expected);
    }

    #[tokio::test]
    async fn incomplete_sheet_is_never_submitted() {
        let items = vec![
            multiple_choice("q1", 1, 4, 0),
            multiple_choice("q2", 2, 4, 1),
            multiple_choice("q3", 3, 4, 2),
        ];
        let context = scan_context("eval-1", items, "exam-2024");
        let submitter = Arc::new(RecordingSubmitter::default());
        let processor = ScanProcessor::new(context.clone(), submitter.clone());

        let (frame, corners, _) = render_marked_sheet(&context, "A", Some("q2"));
        let payload = FiducialPayload::new("eval-1", "stu-1", "A").unwrap();
        let attempt = processor.process(frame, corners, payload).await;

        assert_eq!(attempt.status, ScanStatus::Incomplete);
        assert_eq!(attempt.detail, "read 2 of 3");
        assert_eq!(attempt.marks.len(), 2);
        assert!(submitter.calls().is_empty());
    }

    #[tokio::test]
    async fn submission_failures_are_reported_as_errors() {
        let context = scan_context("eval-1", exam_2024(), "exam-2024");
        let submitter = Arc::new(RecordingSubmitter::failing());
        let processor = ScanProcessor::new(context.clone(), submitter.clone());

        let (frame, corners, _) = render_marked_sheet(&context, "A", None);
        let payload = FiducialPayload::new("eval-1", "stu-1", "A").unwrap();
        let attempt = processor.process(frame, corners, payload).await;

        assert_eq!(attempt.status, ScanStatus::Error);
        assert!(attempt.detail.contains("rejected"), "{}", attempt.detail);
    }

    #[test]
    fn foreign_evaluations_are_rejected_before_image_work() {
        let context = scan_context("eval-1", exam_2024(), "exam-2024");
        let processor = ScanProcessor::new(context, Arc::new(RecordingSubmitter::default()));

        let error = processor.accept("eval-2|stu-1|A").unwrap_err();
        assert_eq!(error.status(), ScanStatus::Mismatch);
        assert!(matches!(processor.accept("garbage"), Err(ScanError::Payload(_))));
        assert_eq!(processor.accept("eval-1|stu-1|A").unwrap().student_id, "stu-1");
    }

    #[tokio::test]
    async fn still_photo_without_fiducial_fails_cleanly() {
        let context = scan_context("eval-1", exam_2024(), "exam-2024");
        let submitter = Arc::new(RecordingSubmitter::default());
        let processor = ScanProcessor::new(context.clone(), submitter.clone());

        let (frame, _, _) = render_marked_sheet(&context, "A", None);
        let attempt = processor.scan_photo(frame, Arc::new(StaticDecoder::none())).await;
        assert_eq!(attempt.status, ScanStatus::Error);
        assert_eq!(attempt.verdict, AlignmentVerdict::Searching);
        assert!(attempt.payload.is_none());
        assert!(submitter.calls().is_empty());
    }

    #[tokio::test]
    async fn still_photo_goes_through_the_full_pipeline() {
        let context = scan_context("eval-1", exam_2024(), "exam-2024");
        let submitter = Arc::new(RecordingSubmitter::default());
        let processor = ScanProcessor::new(context.clone(), submitter.clone());

        let (frame, corners, _) = render_marked_sheet(&context, "C", None);
        let decoder = Arc::new(StaticDecoder::always("eval-1|stu-3|C", corners));
        let attempt = processor.scan_photo(frame.clone(), decoder).await;
        assert_eq!(attempt.status, ScanStatus::Success, "{}", attempt.detail);
        assert_eq!(attempt.verdict, AlignmentVerdict::Aligned);

        let foreign = Arc::new(StaticDecoder::always("eval-9|stu-3|C", corners));
        let attempt = processor.scan_photo(frame, foreign).await;
        assert_eq!(attempt.status, ScanStatus::Mismatch);
        assert_eq!(submitter.calls().len(), 1);
    }

    #[tokio::test]
    async fn printed_qr_sheets_are_read_by_the_qr_decoder() {
        let context = scan_context("eval-1", exam_2024(), "exam-2024");
        let submitter = Arc::new(RecordingSubmitter::default());
        let processor = ScanProcessor::new(context.clone(), submitter.clone());

        for module_px in [3, 4, 5] {
            let (frame, expected) = render_qr_sheet(&context, "eval-1|stu-7|B", "B", module_px);
            let attempt = processor.scan_photo(frame, Arc::new(QrFiducialDecoder)).await;
            assert_eq!(attempt.status, ScanStatus::Success, "{module_px}px: {}", attempt.detail);
            assert_eq!(submitter.calls().last().map(|call| &call.response), Some(&expected));
        }
        assert_eq!(submitter.calls().len(), 3);
    }
}
