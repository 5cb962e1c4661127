use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use qrcode::{Color, QrCode};

use crate::services::assessment::AssessmentItem;
use crate::services::bubble_grid::{BubbleGrid, FiducialCorners};
use crate::services::fiducial::{DecodedFiducial, FiducialDecoder};
use crate::services::geometry::{Point, SheetGeometry};
use crate::services::mark_detector::MarkDetectorSettings;
use crate::services::reconciler::{GradedAnswer, GradedResponse};
use crate::services::scan_processing::{ResponseSubmitter, ScanContext, SubmissionError};
use crate::services::versioning::{generate_version, VersionOptions};

pub(crate) const SHEET_WIDTH: u32 = 640;
pub(crate) const SHEET_HEIGHT: u32 = 480;
const FIDUCIAL_LEFT: f32 = 40.0;
const FIDUCIAL_TOP: f32 = 40.0;
const FIDUCIAL_SIZE: f32 = 100.0;
const INK: u8 = 30;
const EMPTY_BUBBLE: u8 = 235;

pub(crate) fn env_lock() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(())).lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn blank_sheet(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]))
}

pub(crate) fn fill_disk(frame: &mut RgbaImage, center: Point, radius: f32, value: u8) {
    let (width, height) = frame.dimensions();
    let radius_sq = radius * radius;
    for y in 0..height {
        let dy = y as f32 - center.y;
        if dy.abs() > radius {
            continue;
        }
        for x in 0..width {
            let dx = x as f32 - center.x;
            if dx * dx + dy * dy <= radius_sq {
                frame.put_pixel(x, y, Rgba([value, value, value, 255]));
            }
        }
    }
}

fn fill_square(frame: &mut RgbaImage, left: f32, top: f32, size: f32, value: u8) {
    for y in top as u32..(top + size) as u32 {
        for x in left as u32..(left + size) as u32 {
            frame.put_pixel(x, y, Rgba([value, value, value, 255]));
        }
    }
}

pub(crate) fn scan_context(
    evaluation_id: &str,
    items: Vec<AssessmentItem>,
    seed: &str,
) -> ScanContext {
    ScanContext {
        evaluation_id: evaluation_id.to_string(),
        items: Arc::new(items),
        options: VersionOptions { randomize_items: true, randomize_alternatives: true },
        seed: seed.to_string(),
        geometry: SheetGeometry::default(),
        detector: MarkDetectorSettings::default(),
    }
}

pub(crate) fn sheet_corners() -> FiducialCorners {
    FiducialCorners::square(FIDUCIAL_LEFT, FIDUCIAL_TOP, FIDUCIAL_SIZE)
}

pub(crate) fn render_marked_sheet(
    context: &ScanContext,
    row_label: &str,
    skip_item: Option<&str>,
) -> (RgbaImage, FiducialCorners, GradedResponse) {
    let corners = sheet_corners();
    let mut frame = blank_sheet(SHEET_WIDTH, SHEET_HEIGHT);
    fill_square(&mut frame, FIDUCIAL_LEFT, FIDUCIAL_TOP, FIDUCIAL_SIZE, 0);
    let response = ink_bubbles(&mut frame, context, row_label, &corners, skip_item);
    (frame, corners, response)
}

pub(crate) fn render_qr_sheet(
    context: &ScanContext,
    content: &str,
    row_label: &str,
    module_px: u32,
) -> (RgbaImage, GradedResponse) {
    let mut frame = blank_sheet(SHEET_WIDTH, SHEET_HEIGHT);
    let (left, top) = (FIDUCIAL_LEFT as u32, FIDUCIAL_TOP as u32);
    let size = draw_qr(&mut frame, content, left, top, module_px);
    let corners = FiducialCorners::square(FIDUCIAL_LEFT, FIDUCIAL_TOP, size);
    let response = ink_bubbles(&mut frame, context, row_label, &corners, None);
    (frame, response)
}

pub(crate) fn draw_qr(
    frame: &mut RgbaImage,
    content: &str,
    left: u32,
    top: u32,
    module_px: u32,
) -> f32 {
    let code = QrCode::new(content.as_bytes()).expect("qr encodes");
    let width = code.width();
    for (index, color) in code.to_colors().into_iter().enumerate() {
        if color != Color::Dark {
            continue;
        }
        let x = left + (index % width) as u32 * module_px;
        let y = top + (index / width) as u32 * module_px;
        fill_square(frame, x as f32, y as f32, module_px as f32, 0);
    }
    (width as u32 * module_px) as f32
}

fn ink_bubbles(
    frame: &mut RgbaImage,
    context: &ScanContext,
    row_label: &str,
    corners: &FiducialCorners,
    skip_item: Option<&str>,
) -> GradedResponse {
    let version = generate_version(&context.items, context.options, &context.seed, row_label)
        .expect("version");
    let grid = BubbleGrid::locate(corners, &context.geometry, &version).expect("grid");

    let mut answers = Vec::new();
    for (question, item) in grid.questions.iter().zip(version.scoreable_items()) {
        let correct = item.correct_slot().expect("correct slot");
        for bubble in &question.bubbles {
            fill_disk(frame, bubble.center, bubble.radius, EMPTY_BUBBLE);
        }
        if skip_item == Some(item.item_id.as_str()) {
            continue;
        }
        let bubble = question.bubbles[correct];
        fill_disk(frame, bubble.center, bubble.radius, INK);
        answers.push(GradedAnswer {
            item_id: item.item_id.clone(),
            alternative_id: item.alternatives[correct].id.clone(),
        });
    }
    GradedResponse { answers }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SubmittedResponse {
    pub(crate) evaluation_id: String,
    pub(crate) student_id: String,
    pub(crate) row_label: String,
    pub(crate) response: GradedResponse,
}

#[derive(Debug, Default)]
pub(crate) struct RecordingSubmitter {
    calls: Mutex<Vec<SubmittedResponse>>,
    fail: bool,
}

impl RecordingSubmitter {
    pub(crate) fn failing() -> Self {
        Self { calls: Mutex::new(Vec::new()), fail: true }
    }

    pub(crate) fn calls(&self) -> Vec<SubmittedResponse> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl ResponseSubmitter for RecordingSubmitter {
    async fn submit(
        &self,
        evaluation_id: &str,
        student_id: &str,
        row_label: &str,
        response: &GradedResponse,
    ) -> Result<(), SubmissionError> {
        if self.fail {
            return Err(SubmissionError::Rejected("persistence unavailable".to_string()));
        }
        self.calls.lock().expect("calls lock").push(SubmittedResponse {
            evaluation_id: evaluation_id.to_string(),
            student_id: student_id.to_string(),
            row_label: row_label.to_string(),
            response: response.clone(),
        });
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct StaticDecoder {
    decoded: Option<DecodedFiducial>,
}

impl StaticDecoder {
    pub(crate) fn none() -> Self {
        Self { decoded: None }
    }

    pub(crate) fn always(content: &str, corners: FiducialCorners) -> Self {
        Self { decoded: Some(DecodedFiducial { content: content.to_string(), corners }) }
    }
}

impl FiducialDecoder for StaticDecoder {
    fn decode(&self, _frame: &RgbaImage) -> Option<DecodedFiducial> {
        self.decoded.clone()
    }
}
