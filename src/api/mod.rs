pub(crate) mod errors;
pub(crate) mod evaluations;
pub(crate) mod handlers;
pub(crate) mod router;
pub(crate) mod scan_sessions;
pub(crate) mod scans;
