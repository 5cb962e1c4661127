use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::mark_detector::DetectedMark;
use crate::services::versioning::ExamVersion;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct GradedAnswer {
    pub(crate) item_id: String,
    pub(crate) alternative_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct GradedResponse {
    pub(crate) answers: Vec<GradedAnswer>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum ReconcileError {
    #[error("read {read} of {expected}")]
    IncompleteScan { read: usize, expected: usize },
    #[error("mark for item {item_id} points at slot {slot}, not printed in row {row_label}")]
    UnknownSlot { item_id: String, slot: usize, row_label: String },
}

// `version` must be regenerated from the sheet's seed and row; the slot index is only
// meaningful against that exact permutation.
pub(crate) fn reconcile(
    version: &ExamVersion,
    marks: &[DetectedMark],
) -> Result<GradedResponse, ReconcileError> {
    let expected = version.scoreable_count();
    let mut answers = Vec::with_capacity(expected);

    for item in version.scoreable_items() {
        let Some(mark) = marks.iter().find(|mark| mark.item_id == item.item_id) else {
            continue;
        };
        let alternative =
            item.alternative_at(mark.slot).ok_or_else(|| ReconcileError::UnknownSlot {
                item_id: item.item_id.clone(),
                slot: mark.slot,
                row_label: version.row_label.clone(),
            })?;
        answers.push(GradedAnswer {
            item_id: item.item_id.clone(),
            alternative_id: alternative.id.clone(),
        });
    }

    if answers.len() != expected {
        return Err(ReconcileError::IncompleteScan { read: answers.len(), expected });
    }
    Ok(GradedResponse { answers })
}
