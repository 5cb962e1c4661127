pub(crate) mod alignment;
pub(crate) mod registry;
pub(crate) mod session;
pub(crate) mod source;

use thiserror::Error;

pub(crate) use alignment::AlignmentTarget;
pub(crate) use registry::{LiveSession, RegistryError, ScanSessionRegistry};
pub(crate) use session::{start, CaptureSettings, ScanEvent};
pub(crate) use source::{ChannelFrameSource, ImageSequenceSource};

#[derive(Debug, Error)]
pub(crate) enum CaptureError {
    #[error("camera unavailable: {0}")]
    CameraAccess(String),
}
