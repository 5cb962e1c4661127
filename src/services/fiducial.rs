use std::fmt;
use std::str::FromStr;

use image::RgbaImage;
use rqrr::PreparedImage;
use serde::Serialize;
use thiserror::Error;

use crate::services::bubble_grid::FiducialCorners;
use crate::services::geometry::Point;
use crate::services::mark_detector::luminance;

const DELIMITER: char = '|';
const FIELD_COUNT: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum PayloadError {
    #[error("expected {FIELD_COUNT} fields separated by '|', got {0}")]
    FieldCount(usize),
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("{0} must not contain '|'")]
    Delimiter(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub(crate) struct FiducialPayload {
    pub(crate) evaluation_id: String,
    pub(crate) student_id: String,
    pub(crate) row_label: String,
}

impl FiducialPayload {
    pub(crate) fn new(
        evaluation_id: impl Into<String>,
        student_id: impl Into<String>,
        row_label: impl Into<String>,
    ) -> Result<Self, PayloadError> {
        let payload = Self {
            evaluation_id: evaluation_id.into(),
            student_id: student_id.into(),
            row_label: row_label.into(),
        };
        for (field, value) in payload.fields() {
            if value.is_empty() {
                return Err(PayloadError::EmptyField(field));
            }
            if value.contains(DELIMITER) {
                return Err(PayloadError::Delimiter(field));
            }
        }
        Ok(payload)
    }

    fn fields(&self) -> [(&'static str, &str); FIELD_COUNT] {
        [
            ("evaluation_id", self.evaluation_id.as_str()),
            ("student_id", self.student_id.as_str()),
            ("row_label", self.row_label.as_str()),
        ]
    }
}

impl fmt::Display for FiducialPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{DELIMITER}{}{DELIMITER}{}",
            self.evaluation_id, self.student_id, self.row_label
        )
    }
}

impl FromStr for FiducialPayload {
    type Err = PayloadError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = raw.split(DELIMITER).collect();
        let [evaluation_id, student_id, row_label] = parts.as_slice() else {
            return Err(PayloadError::FieldCount(parts.len()));
        };
        Self::new(evaluation_id.trim(), student_id.trim(), row_label.trim())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DecodedFiducial {
    pub(crate) content: String,
    pub(crate) corners: FiducialCorners,
}

pub(crate) trait FiducialDecoder: Send + Sync {
    fn decode(&self, frame: &RgbaImage) -> Option<DecodedFiducial>;
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct QrFiducialDecoder;

impl FiducialDecoder for QrFiducialDecoder {
    fn decode(&self, frame: &RgbaImage) -> Option<DecodedFiducial> {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return None;
        }

        let grey: Vec<u8> = frame.pixels().map(|pixel| luminance(pixel).round() as u8).collect();
        let width = width as usize;
        let mut prepared =
            PreparedImage::prepare_from_greyscale(width, height as usize, |x, y| {
                grey[y * width + x]
            });

        prepared.detect_grids().into_iter().find_map(|grid| {
            let (meta, content) = grid.decode().ok()?;
            let bounds = grid.bounds.map(|corner| Point::new(corner.x as f32, corner.y as f32));
            let corners = symbol_corners(bounds, meta.version.0);
            Some(DecodedFiducial { content, corners })
        })
    }
}

// rqrr's bounds end one module past the printed symbol; pull them back towards the first
// corner so the size matches the square the renderer drew.
fn symbol_corners(bounds: [Point; 4], version: usize) -> FiducialCorners {
    let modules = (17 + 4 * version) as f32;
    let scale = modules / (modules + 1.0);
    let origin = bounds[0];
    FiducialCorners::new(bounds.map(|corner| {
        Point::new(
            origin.x + (corner.x - origin.x) * scale,
            origin.y + (corner.y - origin.y) * scale,
        )
    }))
}
