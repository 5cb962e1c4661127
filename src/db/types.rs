use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "scanstatus", rename_all = "lowercase")]
pub(crate) enum ScanStatus {
    Success,
    Mismatch,
    Incomplete,
    Error,
}

impl ScanStatus {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            ScanStatus::Success => "success",
            ScanStatus::Mismatch => "mismatch",
            ScanStatus::Incomplete => "incomplete",
            ScanStatus::Error => "error",
        }
    }
}
