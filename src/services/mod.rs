pub(crate) mod assessment;
pub(crate) mod bubble_grid;
pub(crate) mod fiducial;
pub(crate) mod geometry;
pub(crate) mod mark_detector;
pub(crate) mod permutation;
pub(crate) mod reconciler;
pub(crate) mod scan_processing;
pub(crate) mod versioning;
