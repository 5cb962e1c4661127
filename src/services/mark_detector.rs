use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::services::bubble_grid::BubbleGrid;
use crate::services::geometry::Point;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub(crate) struct MarkDetectorSettings {
    /// Mean luminance (0–255) below which the darkest bubble counts as filled.
    pub(crate) filled_threshold: f32,
}

impl Default for MarkDetectorSettings {
    fn default() -> Self {
        Self { filled_threshold: 110.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct DetectedMark {
    pub(crate) question_number: u32,
    pub(crate) item_id: String,
    pub(crate) slot: usize,
    pub(crate) brightness: f32,
}

pub(crate) fn luminance(pixel: &Rgba<u8>) -> f32 {
    let [r, g, b, _] = pixel.0;
    0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b)
}

pub(crate) fn mean_brightness(frame: &RgbaImage, center: Point, radius: f32) -> Option<f32> {
    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 || !(radius > 0.0) {
        return None;
    }

    let min_x = (center.x - radius).floor().max(0.0) as u32;
    let min_y = (center.y - radius).floor().max(0.0) as u32;
    let max_x = (center.x + radius).ceil().min((width - 1) as f32);
    let max_y = (center.y + radius).ceil().min((height - 1) as f32);
    if max_x < 0.0 || max_y < 0.0 {
        return None;
    }
    let (max_x, max_y) = (max_x as u32, max_y as u32);

    let radius_sq = radius * radius;
    let mut sum = 0.0f32;
    let mut count = 0u32;
    for y in min_y..=max_y {
        let dy = y as f32 - center.y;
        for x in min_x..=max_x {
            let dx = x as f32 - center.x;
            if dx * dx + dy * dy <= radius_sq {
                sum += luminance(frame.get_pixel(x, y));
                count += 1;
            }
        }
    }

    (count > 0).then(|| sum / count as f32)
}

pub(crate) fn detect_marks(
    frame: &RgbaImage,
    grid: &BubbleGrid,
    settings: &MarkDetectorSettings,
) -> Vec<DetectedMark> {
    let mut marks = Vec::with_capacity(grid.questions.len());
    for question in &grid.questions {
        let darkest = question
            .bubbles
            .iter()
            .filter_map(|bubble| {
                mean_brightness(frame, bubble.center, bubble.radius)
                    .map(|value| (bubble.slot, value))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1));

        match darkest {
            Some((slot, brightness)) if brightness < settings.filled_threshold => {
                marks.push(DetectedMark {
                    question_number: question.question_number,
                    item_id: question.item_id.clone(),
                    slot,
                    brightness,
                });
            }
            Some((_, brightness)) => {
                tracing::debug!(
                    question = question.question_number,
                    brightness,
                    "No filled bubble found"
                );
            }
            None => {
                tracing::debug!(
                    question = question.question_number,
                    "Question lies outside the frame"
                );
            }
        }
    }
    marks
}
