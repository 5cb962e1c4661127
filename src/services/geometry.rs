// Every distance is a factor of the fiducial's size. The sheet renderer must use exactly these.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub(crate) const MAX_PRINTABLE_ALTERNATIVES: usize = 5;

#[derive(Debug, Error, PartialEq)]
pub(crate) enum GeometryError {
    #[error("{field} must be a positive finite factor, got {value}")]
    InvalidFactor { field: &'static str, value: f32 },
    #[error("columns must be at least 1")]
    NoColumns,
    #[error("max_alternatives must be between 2 and {MAX_PRINTABLE_ALTERNATIVES}, got {0}")]
    MaxAlternatives(usize),
    #[error("bubbles overlap: {0}")]
    Overlap(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub(crate) struct Point {
    pub(crate) x: f32,
    pub(crate) y: f32,
}

impl Point {
    pub(crate) fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub(crate) struct SheetGeometry {
    pub(crate) bubble_radius: f32,
    pub(crate) row_spacing: f32,
    pub(crate) slot_spacing: f32,
    pub(crate) origin_offset_x: f32,
    pub(crate) origin_offset_y: f32,
    pub(crate) columns: usize,
    pub(crate) column_spacing: f32,
    pub(crate) max_alternatives: usize,
}

impl Default for SheetGeometry {
    fn default() -> Self {
        Self {
            bubble_radius: 0.10,
            row_spacing: 0.35,
            slot_spacing: 0.35,
            origin_offset_x: 0.30,
            origin_offset_y: 0.55,
            columns: 3,
            column_spacing: 1.75,
            max_alternatives: 4,
        }
    }
}

impl SheetGeometry {
    pub(crate) fn validate(self) -> Result<Self, GeometryError> {
        for (field, value) in [
            ("bubble_radius", self.bubble_radius),
            ("row_spacing", self.row_spacing),
            ("slot_spacing", self.slot_spacing),
            ("column_spacing", self.column_spacing),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(GeometryError::InvalidFactor { field, value });
            }
        }
        for (field, value) in
            [("origin_offset_x", self.origin_offset_x), ("origin_offset_y", self.origin_offset_y)]
        {
            if !value.is_finite() {
                return Err(GeometryError::InvalidFactor { field, value });
            }
        }
        if self.columns == 0 {
            return Err(GeometryError::NoColumns);
        }
        if !(2..=MAX_PRINTABLE_ALTERNATIVES).contains(&self.max_alternatives) {
            return Err(GeometryError::MaxAlternatives(self.max_alternatives));
        }

        let diameter = self.bubble_radius * 2.0;
        if diameter > self.slot_spacing {
            return Err(GeometryError::Overlap("slot_spacing is smaller than a bubble"));
        }
        if diameter > self.row_spacing {
            return Err(GeometryError::Overlap("row_spacing is smaller than a bubble"));
        }
        let column_width = self.slot_spacing * (self.max_alternatives - 1) as f32 + diameter;
        if column_width > self.column_spacing {
            return Err(GeometryError::Overlap("column_spacing is narrower than a full column"));
        }
        Ok(self)
    }

    pub(crate) fn questions_per_column(&self, question_count: usize) -> usize {
        question_count.div_ceil(self.columns.max(1))
    }

    pub(crate) fn bubble_center(
        &self,
        bottom_left: Point,
        fiducial_size: f32,
        ordinal: usize,
        per_column: usize,
        slot: usize,
    ) -> Point {
        let per_column = per_column.max(1);
        let column = (ordinal / per_column) as f32;
        let row = (ordinal % per_column) as f32;
        let dx =
            self.origin_offset_x + column * self.column_spacing + slot as f32 * self.slot_spacing;
        let dy = self.origin_offset_y + row * self.row_spacing;
        Point::new(bottom_left.x + dx * fiducial_size, bottom_left.y + dy * fiducial_size)
    }

    pub(crate) fn radius_px(&self, fiducial_size: f32) -> f32 {
        self.bubble_radius * fiducial_size
    }
}
