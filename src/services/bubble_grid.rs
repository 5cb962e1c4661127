use serde::Serialize;
use thiserror::Error;

use crate::services::geometry::{Point, SheetGeometry};
use crate::services::versioning::ExamVersion;

#[derive(Debug, Error, PartialEq)]
pub(crate) enum GridError {
    #[error("fiducial has no measurable size")]
    DegenerateFiducial,
    #[error("item {item_id} has {count} alternatives but the sheet prints at most {max}")]
    TooManyAlternatives { item_id: String, count: usize, max: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub(crate) struct FiducialCorners {
    pub(crate) points: [Point; 4],
}

impl FiducialCorners {
    pub(crate) fn new(points: [Point; 4]) -> Self {
        Self { points }
    }

    pub(crate) fn square(left: f32, top: f32, size: f32) -> Self {
        Self::new([
            Point::new(left, top),
            Point::new(left + size, top),
            Point::new(left + size, top + size),
            Point::new(left, top + size),
        ])
    }

    fn extent(&self) -> (f32, f32, f32, f32) {
        self.points.iter().fold(
            (f32::INFINITY, f32::INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
            |(min_x, min_y, max_x, max_y), point| {
                (min_x.min(point.x), min_y.min(point.y), max_x.max(point.x), max_y.max(point.y))
            },
        )
    }

    pub(crate) fn top_left(&self) -> Point {
        let (min_x, min_y, _, _) = self.extent();
        Point::new(min_x, min_y)
    }

    pub(crate) fn bottom_left(&self) -> Point {
        let (min_x, _, _, max_y) = self.extent();
        Point::new(min_x, max_y)
    }

    pub(crate) fn size(&self) -> f32 {
        let (min_x, min_y, max_x, max_y) = self.extent();
        (max_x - min_x).max(max_y - min_y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub(crate) struct Bubble {
    pub(crate) slot: usize,
    pub(crate) center: Point,
    pub(crate) radius: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct QuestionBubbles {
    pub(crate) question_number: u32,
    pub(crate) item_id: String,
    pub(crate) bubbles: Vec<Bubble>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct BubbleGrid {
    pub(crate) fiducial_size: f32,
    pub(crate) questions: Vec<QuestionBubbles>,
}

impl BubbleGrid {
    pub(crate) fn locate(
        corners: &FiducialCorners,
        geometry: &SheetGeometry,
        version: &ExamVersion,
    ) -> Result<Self, GridError> {
        let fiducial_size = corners.size();
        if !fiducial_size.is_finite() || fiducial_size <= 0.0 {
            return Err(GridError::DegenerateFiducial);
        }

        let bottom_left = corners.bottom_left();
        let radius = geometry.radius_px(fiducial_size);
        let scoreable: Vec<_> = version.scoreable_items().collect();
        let per_column = geometry.questions_per_column(scoreable.len());

        let mut questions = Vec::with_capacity(scoreable.len());
        for (ordinal, item) in scoreable.into_iter().enumerate() {
            let count = item.alternatives.len();
            if count > geometry.max_alternatives {
                return Err(GridError::TooManyAlternatives {
                    item_id: item.item_id.clone(),
                    count,
                    max: geometry.max_alternatives,
                });
            }
            let bubbles = (0..count)
                .map(|slot| Bubble {
                    slot,
                    center: geometry.bubble_center(
                        bottom_left,
                        fiducial_size,
                        ordinal,
                        per_column,
                        slot,
                    ),
                    radius,
                })
                .collect();
            questions.push(QuestionBubbles {
                question_number: item.number,
                item_id: item.item_id.clone(),
                bubbles,
            });
        }

        Ok(Self { fiducial_size, questions })
    }

    pub(crate) fn bubble_count(&self) -> usize {
        self.questions.iter().map(|question| question.bubbles.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::assessment::fixtures::*;
    use crate::services::versioning::{generate_version, VersionOptions};

    fn version_for(items: &[crate::services::assessment::AssessmentItem]) -> ExamVersion {
        generate_version(items, VersionOptions::default(), "grid", "A").expect("version")
    }

    #[test]
    fn corner_order_does_not_matter() {
        let square = FiducialCorners::square(20.0, 30.0, 80.0);
        let mut shuffled = square.points;
        shuffled.rotate_left(2);
        let rotated = FiducialCorners::new(shuffled);

        assert_eq!(rotated.top_left(), Point::new(20.0, 30.0));
        assert_eq!(rotated.bottom_left(), Point::new(20.0, 110.0));
        assert_eq!(rotated.size(), 80.0);
    }

    #[test]
    fn size_is_the_larger_side() {
        let corners = FiducialCorners::new([
            Point::new(0.0, 0.0),
            Point::new(90.0, 2.0),
            Point::new(92.0, 70.0),
            Point::new(1.0, 68.0),
        ]);
        assert_eq!(corners.size(), 92.0);
    }

    #[test]
    fn true_false_and_open_items_get_no_bubbles() {
        let items = vec![
            multiple_choice("q1", 1, 4, 0),
            true_false("q2", 2, true),
            open("q3", 3),
            multiple_choice("q4", 4, 3, 1),
        ];
        let grid = BubbleGrid::locate(
            &FiducialCorners::square(0.0, 0.0, 100.0),
            &SheetGeometry::default(),
            &version_for(&items),
        )
        .unwrap();

        let ids: Vec<&str> = grid.questions.iter().map(|q| q.item_id.as_str()).collect();
        assert_eq!(ids, vec!["q1", "q4"]);
        assert_eq!(grid.questions[1].question_number, 4);
        assert_eq!(grid.bubble_count(), 7);
    }

    #[test]
    fn questions_fill_columns_top_to_bottom() {
        let items: Vec<_> = (1..=7).map(|i| multiple_choice(&format!("q{i}"), i, 4, 0)).collect();
        let geometry = SheetGeometry::default();
        let grid = BubbleGrid::locate(
            &FiducialCorners::square(0.0, 0.0, 100.0),
            &geometry,
            &version_for(&items),
        )
        .unwrap();

        // ceil(7 / 3) = 3 per column: q4 opens the second column at the top row.
        let first = grid.questions[0].bubbles[0].center;
        let fourth = grid.questions[3].bubbles[0].center;
        let seventh = grid.questions[6].bubbles[0].center;
        assert!((fourth.x - first.x - geometry.column_spacing * 100.0).abs() < 1e-3);
        assert!((fourth.y - first.y).abs() < 1e-3);
        assert!((seventh.x - first.x - 2.0 * geometry.column_spacing * 100.0).abs() < 1e-3);
        assert!((grid.questions[2].bubbles[0].center.y - first.y - 0.70 * 100.0).abs() < 1e-3);
        assert!((grid.questions[0].bubbles[0].radius - 10.0).abs() < 1e-4);
    }

    #[test]
    fn wider_items_than_printed_are_an_error() {
        let items = vec![multiple_choice("q1", 1, 5, 0)];
        let error = BubbleGrid::locate(
            &FiducialCorners::square(0.0, 0.0, 100.0),
            &SheetGeometry::default(),
            &version_for(&items),
        )
        .unwrap_err();
        assert_eq!(error, GridError::TooManyAlternatives { item_id: "q1".into(), count: 5, max: 4 });
    }

    #[test]
    fn collapsed_fiducial_is_rejected() {
        let corners = FiducialCorners::new([Point::new(5.0, 5.0); 4]);
        let error = BubbleGrid::locate(&corners, &SheetGeometry::default(), &version_for(&exam_2024()))
            .unwrap_err();
        assert_eq!(error, GridError::DegenerateFiducial);
    }
}
