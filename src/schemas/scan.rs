use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{GradedAnswerRecord, GradedResponseRecord, ScanLogEntry};
use crate::db::types::ScanStatus;
use crate::services::reconciler::GradedAnswer;
use crate::tasks::capture::registry::SessionSnapshot;
use crate::tasks::capture::session::{LoopPhase, ScanEvent};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ScanSessionCreate {
    #[validate(length(min = 1, message = "seed must not be empty"))]
    pub(crate) seed: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ScanSessionCreated {
    pub(crate) session_id: Uuid,
    pub(crate) evaluation_id: String,
    pub(crate) seed_fingerprint: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ScanSessionEvents {
    pub(crate) session_id: Uuid,
    pub(crate) evaluation_id: String,
    pub(crate) phase: LoopPhase,
    pub(crate) finished: bool,
    pub(crate) events: Vec<ScanEvent>,
}

impl ScanSessionEvents {
    pub(crate) fn new(session_id: Uuid, snapshot: SessionSnapshot) -> Self {
        Self {
            session_id,
            evaluation_id: snapshot.evaluation_id,
            phase: snapshot.phase,
            finished: snapshot.finished,
            events: snapshot.events,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct GradedResponseView {
    pub(crate) evaluation_id: String,
    pub(crate) student_id: String,
    pub(crate) row_label: String,
    pub(crate) submitted_at: String,
    pub(crate) answers: Vec<GradedAnswer>,
}

impl GradedResponseView {
    pub(crate) fn new(record: GradedResponseRecord, answers: Vec<GradedAnswerRecord>) -> Self {
        Self {
            evaluation_id: record.evaluation_id,
            student_id: record.student_id,
            row_label: record.row_label,
            submitted_at: format_primitive(record.submitted_at),
            answers: answers
                .into_iter()
                .map(|answer| GradedAnswer {
                    item_id: answer.item_id,
                    alternative_id: answer.alternative_id,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ScanLogQuery {
    #[serde(default = "default_log_limit")]
    pub(crate) limit: i64,
}

fn default_log_limit() -> i64 {
    50
}

#[derive(Debug, Serialize)]
pub(crate) struct ScanLogView {
    pub(crate) student_id: Option<String>,
    pub(crate) row_label: Option<String>,
    pub(crate) status: ScanStatus,
    pub(crate) detail: String,
    pub(crate) created_at: String,
}

impl From<ScanLogEntry> for ScanLogView {
    fn from(entry: ScanLogEntry) -> Self {
        Self {
            student_id: entry.student_id,
            row_label: entry.row_label,
            status: entry.status,
            detail: entry.detail,
            created_at: format_primitive(entry.created_at),
        }
    }
}
