pub(crate) mod evaluations;
pub(crate) mod graded_responses;
pub(crate) mod health;
pub(crate) mod scan_log;
