use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::Evaluation;
use crate::services::assessment::AssessmentItem;
use crate::services::bubble_grid::BubbleGrid;
use crate::services::geometry::SheetGeometry;
use crate::services::versioning::{AnswerKey, AnswerKeySet, VersionedItem};

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct EvaluationUpsert {
    #[serde(default)]
    #[validate(length(max = 255, message = "title must be at most 255 characters"))]
    pub(crate) title: String,
    #[validate(length(min = 1, message = "items must not be empty"))]
    pub(crate) items: Vec<AssessmentItem>,
    #[serde(default = "default_true", alias = "randomizeItems")]
    pub(crate) randomize_items: bool,
    #[serde(default = "default_true", alias = "randomizeAlternatives")]
    pub(crate) randomize_alternatives: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct EvaluationResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) items: Vec<AssessmentItem>,
    pub(crate) randomize_items: bool,
    pub(crate) randomize_alternatives: bool,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl From<Evaluation> for EvaluationResponse {
    fn from(evaluation: Evaluation) -> Self {
        Self {
            id: evaluation.id,
            title: evaluation.title,
            items: evaluation.items.0,
            randomize_items: evaluation.randomize_items,
            randomize_alternatives: evaluation.randomize_alternatives,
            created_at: format_primitive(evaluation.created_at),
            updated_at: format_primitive(evaluation.updated_at),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Validate)]
pub(crate) struct PrintedFiducial {
    pub(crate) left: f32,
    pub(crate) top: f32,
    #[validate(range(exclusive_min = 0.0, message = "fiducial size must be positive"))]
    pub(crate) size: f32,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct AnswerKeyRequest {
    #[validate(length(min = 1, message = "seed must not be empty"))]
    pub(crate) seed: String,
    #[serde(default)]
    pub(crate) rows: Option<Vec<String>>,
    #[serde(default, alias = "rowCount")]
    #[validate(range(min = 1, max = 26, message = "row_count must be between 1 and 26"))]
    pub(crate) row_count: Option<usize>,
    #[serde(default)]
    #[validate(nested)]
    pub(crate) fiducial: Option<PrintedFiducial>,
}

#[derive(Debug, Serialize)]
pub(crate) struct PrintedVersion {
    pub(crate) row_label: String,
    pub(crate) items: Vec<VersionedItem>,
    pub(crate) answer_key: AnswerKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) layout: Option<BubbleGrid>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerKeyResponse {
    pub(crate) evaluation_id: String,
    pub(crate) seed_fingerprint: String,
    pub(crate) geometry: SheetGeometry,
    pub(crate) versions: Vec<PrintedVersion>,
    pub(crate) answer_keys: AnswerKeySet,
}
