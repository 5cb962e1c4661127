use serde::{Deserialize, Serialize};

use crate::services::geometry::Point;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub(crate) struct AlignmentTarget {
    pub(crate) x: f32,
    pub(crate) y: f32,
    pub(crate) tolerance: f32,
}

impl Default for AlignmentTarget {
    fn default() -> Self {
        Self { x: 0.10, y: 0.10, tolerance: 0.06 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum AlignmentVerdict {
    Searching,
    Misaligned,
    Aligned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum GuideColor {
    Neutral,
    Failure,
    Success,
}

impl GuideColor {
    pub(crate) fn rgb(self) -> [u8; 3] {
        match self {
            GuideColor::Neutral => [255, 255, 255],
            GuideColor::Failure => [220, 38, 38],
            GuideColor::Success => [22, 163, 74],
        }
    }
}

impl AlignmentVerdict {
    pub(crate) fn guide_color(self) -> GuideColor {
        match self {
            AlignmentVerdict::Searching => GuideColor::Neutral,
            AlignmentVerdict::Misaligned => GuideColor::Failure,
            AlignmentVerdict::Aligned => GuideColor::Success,
        }
    }
}

impl AlignmentTarget {
    pub(crate) fn target_px(&self, width: u32, height: u32) -> Point {
        Point::new(self.x * width as f32, self.y * height as f32)
    }

    pub(crate) fn evaluate(&self, top_left: Point, width: u32, height: u32) -> AlignmentVerdict {
        let target = self.target_px(width, height);
        let window = self.tolerance * width as f32;
        if (top_left.x - target.x).abs() <= window && (top_left.y - target.y).abs() <= window {
            AlignmentVerdict::Aligned
        } else {
            AlignmentVerdict::Misaligned
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corner_inside_the_window_is_aligned() {
        let target = AlignmentTarget::default();
        assert_eq!(target.evaluate(Point::new(64.0, 48.0), 640, 480), AlignmentVerdict::Aligned);
        assert_eq!(target.evaluate(Point::new(40.0, 40.0), 640, 480), AlignmentVerdict::Aligned);
    }

    #[test]
    fn corner_outside_the_window_is_misaligned() {
        let target = AlignmentTarget::default();
        assert_eq!(target.evaluate(Point::new(300.0, 48.0), 640, 480), AlignmentVerdict::Misaligned);
        assert_eq!(target.evaluate(Point::new(64.0, 100.0), 640, 480), AlignmentVerdict::Misaligned);
    }

    #[test]
    fn verdicts_map_to_guide_colors() {
        assert_eq!(AlignmentVerdict::Searching.guide_color(), GuideColor::Neutral);
        assert_eq!(AlignmentVerdict::Misaligned.guide_color(), GuideColor::Failure);
        assert_eq!(AlignmentVerdict::Aligned.guide_color().rgb(), [22, 163, 74]);
    }
}
