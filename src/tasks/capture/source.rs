use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::RgbaImage;
use thiserror::Error;
use tokio::sync::mpsc;

use super::CaptureError;

const FRAME_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

#[derive(Debug, Error)]
pub(crate) enum FrameError {
    #[error("frame source closed")]
    Closed,
    #[error("failed to read frame: {0}")]
    Read(String),
}

#[async_trait]
pub(crate) trait FrameSource: Send {
    async fn open(&mut self) -> Result<(), CaptureError>;

    async fn next_frame(&mut self) -> Result<Option<RgbaImage>, FrameError>;

    fn release(&mut self);
}

#[derive(Debug)]
pub(crate) struct ImageSequenceSource {
    dir: PathBuf,
    pending: VecDeque<PathBuf>,
}

impl ImageSequenceSource {
    pub(crate) fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), pending: VecDeque::new() }
    }
}

fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[async_trait]
impl FrameSource for ImageSequenceSource {
    async fn open(&mut self) -> Result<(), CaptureError> {
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(|err| {
            CaptureError::CameraAccess(format!("{}: {err}", self.dir.display()))
        })?;

        let mut frames = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| CaptureError::CameraAccess(err.to_string()))?
        {
            let path = entry.path();
            if is_frame_file(&path) {
                frames.push(path);
            }
        }
        if frames.is_empty() {
            return Err(CaptureError::CameraAccess(format!(
                "{} contains no frames",
                self.dir.display()
            )));
        }

        frames.sort();
        tracing::info!(dir = %self.dir.display(), frames = frames.len(), "Image sequence opened");
        self.pending = frames.into();
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Option<RgbaImage>, FrameError> {
        let Some(path) = self.pending.pop_front() else {
            return Err(FrameError::Closed);
        };
        let frame = tokio::task::spawn_blocking(move || {
            image::open(&path)
                .map(|image| image.to_rgba8())
                .map_err(|err| FrameError::Read(format!("{}: {err}", path.display())))
        })
        .await
        .map_err(|err| FrameError::Read(err.to_string()))??;
        Ok(Some(frame))
    }

    fn release(&mut self) {
        self.pending.clear();
    }
}

pub(crate) type FrameSender = mpsc::Sender<RgbaImage>;

#[derive(Debug)]
pub(crate) struct ChannelFrameSource {
    receiver: mpsc::Receiver<RgbaImage>,
}

impl ChannelFrameSource {
    pub(crate) fn channel(capacity: usize) -> (FrameSender, Self) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (sender, Self { receiver })
    }
}

#[async_trait]
impl FrameSource for ChannelFrameSource {
    async fn open(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Option<RgbaImage>, FrameError> {
        let mut latest = None;
        loop {
            match self.receiver.try_recv() {
                Ok(frame) => latest = Some(frame),
                Err(mpsc::error::TryRecvError::Empty) => return Ok(latest),
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    return match latest {
                        Some(frame) => Ok(Some(frame)),
                        None => Err(FrameError::Closed),
                    };
                }
            }
        }
    }

    fn release(&mut self) {
        self.receiver.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::blank_sheet;

    #[tokio::test]
    async fn channel_source_keeps_only_the_newest_frame() {
        let (sender, mut source) = ChannelFrameSource::channel(4);
        source.open().await.unwrap();
        assert!(source.next_frame().await.unwrap().is_none());

        sender.send(blank_sheet(10, 10)).await.unwrap();
        sender.send(blank_sheet(20, 10)).await.unwrap();
        let frame = source.next_frame().await.unwrap().expect("frame");
        assert_eq!(frame.width(), 20);

        drop(sender);
        assert!(matches!(source.next_frame().await, Err(FrameError::Closed)));
    }

    #[tokio::test]
    async fn missing_directory_is_a_camera_error() {
        let mut source = ImageSequenceSource::new("/definitely/not/a/frame/dir");
        assert!(matches!(source.open().await, Err(CaptureError::CameraAccess(_))));
    }

    #[tokio::test]
    async fn image_sequence_replays_files_in_order() {
        let dir = std::env::temp_dir().join(format!("gabarito-frames-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        blank_sheet(12, 8).save(dir.join("002.png")).unwrap();
        blank_sheet(16, 8).save(dir.join("001.png")).unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let mut source = ImageSequenceSource::new(&dir);
        source.open().await.unwrap();
        assert_eq!(source.next_frame().await.unwrap().unwrap().width(), 16);
        assert_eq!(source.next_frame().await.unwrap().unwrap().width(), 12);
        assert!(matches!(source.next_frame().await, Err(FrameError::Closed)));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn only_image_files_are_frames() {
        assert!(is_frame_file(Path::new("a/b/scan.JPG")));
        assert!(is_frame_file(Path::new("scan.png")));
        assert!(!is_frame_file(Path::new("scan.txt")));
        assert!(!is_frame_file(Path::new("scan")));
    }
}
