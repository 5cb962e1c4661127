use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::ScanStatus;
use crate::services::assessment::AssessmentItem;
use crate::services::versioning::VersionOptions;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Evaluation {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) items: Json<Vec<AssessmentItem>>,
    pub(crate) randomize_items: bool,
    pub(crate) randomize_alternatives: bool,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

impl Evaluation {
    pub(crate) fn options(&self) -> VersionOptions {
        VersionOptions {
            randomize_items: self.randomize_items,
            randomize_alternatives: self.randomize_alternatives,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct GradedResponseRecord {
    pub(crate) id: String,
    pub(crate) evaluation_id: String,
    pub(crate) student_id: String,
    pub(crate) row_label: String,
    pub(crate) submitted_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct GradedAnswerRecord {
    pub(crate) response_id: String,
    pub(crate) position: i32,
    pub(crate) item_id: String,
    pub(crate) alternative_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ScanLogEntry {
    pub(crate) id: String,
    pub(crate) evaluation_id: String,
    pub(crate) student_id: Option<String>,
    pub(crate) row_label: Option<String>,
    pub(crate) status: ScanStatus,
    pub(crate) detail: String,
    pub(crate) created_at: PrimitiveDateTime,
}
