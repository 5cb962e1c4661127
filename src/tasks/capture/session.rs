use std::sync::Arc;

use image::RgbaImage;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Duration, Instant, MissedTickBehavior};

use super::alignment::{AlignmentTarget, AlignmentVerdict, GuideColor};
use super::source::{FrameError, FrameSource};
use super::CaptureError;
use crate::db::types::ScanStatus;
use crate::services::fiducial::{DecodedFiducial, FiducialDecoder};
use crate::services::scan_processing::{ScanAttempt, ScanError, ScanProcessor};

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct CaptureSettings {
    pub(crate) frame_interval: Duration,
    pub(crate) cooldown: Duration,
    /// How long a successfully submitted sheet is ignored. Never shorter than `cooldown`.
    pub(crate) duplicate_window: Duration,
    pub(crate) alignment: AlignmentTarget,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(100),
            cooldown: Duration::from_millis(1500),
            duplicate_window: Duration::from_secs(5),
            alignment: AlignmentTarget::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum LoopPhase {
    Idle,
    Aligning,
    Processing,
    CoolingDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum StopReason {
    Requested,
    SourceClosed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ScanEvent {
    Guides { verdict: AlignmentVerdict, color: GuideColor, rgb: [u8; 3] },
    Duplicate { student_id: String },
    Result(ScanAttempt),
    Stopped { reason: StopReason },
}

#[derive(Debug)]
pub(crate) struct ScanSessionHandle {
    stop: watch::Sender<bool>,
    phase: watch::Receiver<LoopPhase>,
    events: mpsc::UnboundedReceiver<ScanEvent>,
    task: JoinHandle<()>,
}

impl ScanSessionHandle {
    pub(crate) fn stop(&self) {
        let _ = self.stop.send(true);
    }

    pub(crate) fn phase(&self) -> LoopPhase {
        *self.phase.borrow()
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub(crate) async fn next_event(&mut self) -> Option<ScanEvent> {
        self.events.recv().await
    }

    pub(crate) fn drain_events(&mut self) -> Vec<ScanEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }

    pub(crate) async fn shutdown(mut self) -> Vec<ScanEvent> {
        self.stop();
        if let Err(err) = (&mut self.task).await {
            tracing::error!(error = %err, "Capture loop join failed");
        }
        self.drain_events()
    }
}

pub(crate) async fn start<S>(
    mut source: S,
    decoder: Arc<dyn FiducialDecoder>,
    processor: ScanProcessor,
    mut settings: CaptureSettings,
) -> Result<ScanSessionHandle, CaptureError>
where
    S: FrameSource + 'static,
{
    source.open().await?;
    settings.duplicate_window = settings.duplicate_window.max(settings.cooldown);

    let (stop_tx, stop_rx) = watch::channel(false);
    let (phase_tx, phase_rx) = watch::channel(LoopPhase::Idle);
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    tracing::info!(
        evaluation_id = %processor.context().evaluation_id,
        seed = %processor.context().seed_tag(),
        "Scan session started"
    );

    let capture = CaptureLoop {
        source,
        decoder,
        processor,
        settings,
        phase: phase_tx,
        events: events_tx,
        last_success: None,
    };
    let task = tokio::spawn(capture.run(stop_rx));

    Ok(ScanSessionHandle { stop: stop_tx, phase: phase_rx, events: events_rx, task })
}

enum TickFlow {
    Continue,
    Stop,
}

struct CaptureLoop<S> {
    source: S,
    decoder: Arc<dyn FiducialDecoder>,
    processor: ScanProcessor,
    settings: CaptureSettings,
    phase: watch::Sender<LoopPhase>,
    events: mpsc::UnboundedSender<ScanEvent>,
    last_success: Option<(String, Instant)>,
}

impl<S: FrameSource> CaptureLoop<S> {
    async fn run(mut self, mut stop: watch::Receiver<bool>) {
        let mut ticker = interval(self.settings.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let reason = loop {
            tokio::select! {
                biased;
                _ = stop.changed() => break StopReason::Requested,
                _ = ticker.tick() => {}
            }
            if *stop.borrow() {
                break StopReason::Requested;
            }

            match self.tick(&mut stop).await {
                Ok(TickFlow::Continue) => {}
                Ok(TickFlow::Stop) => break StopReason::Requested,
                Err(FrameError::Closed) => break StopReason::SourceClosed,
                Err(err) => tracing::warn!(error = %err, "Skipping unreadable frame"),
            }
        };

        self.source.release();
        self.set_phase(LoopPhase::Idle);
        tracing::info!(
            evaluation_id = %self.processor.context().evaluation_id,
            reason = ?reason,
            "Scan session stopped"
        );
        self.emit(ScanEvent::Stopped { reason });
    }

    async fn tick(&mut self, stop: &mut watch::Receiver<bool>) -> Result<TickFlow, FrameError> {
        self.expire_duplicate();

        let next = tokio::select! {
            biased;
            _ = stop.changed() => return Ok(TickFlow::Stop),
            next = self.source.next_frame() => next?,
        };
        let Some(frame) = next else {
            return Ok(TickFlow::Continue);
        };
        self.set_phase(LoopPhase::Aligning);

        let (frame, decoded) = tokio::select! {
            biased;
            _ = stop.changed() => return Ok(TickFlow::Stop),
            decoded = decode(Arc::clone(&self.decoder), frame) => decoded,
        };
        let Some(decoded) = decoded else {
            self.guides(AlignmentVerdict::Searching);
            self.set_phase(LoopPhase::Idle);
            return Ok(TickFlow::Continue);
        };

        let (width, height) = frame.dimensions();
        let verdict = self.settings.alignment.evaluate(decoded.corners.top_left(), width, height);
        self.guides(verdict);
        if verdict != AlignmentVerdict::Aligned {
            self.set_phase(LoopPhase::Idle);
            return Ok(TickFlow::Continue);
        }

        let payload = match self.processor.accept(&decoded.content) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::debug!(error = %err, "Ignoring fiducial");
                self.set_phase(LoopPhase::Idle);
                return Ok(TickFlow::Continue);
            }
        };

        let key = payload.to_string();
        if self.last_success.as_ref().is_some_and(|(last, _)| *last == key) {
            self.emit(ScanEvent::Duplicate { student_id: payload.student_id });
            self.set_phase(LoopPhase::Idle);
            return Ok(TickFlow::Continue);
        }

        self.set_phase(LoopPhase::Processing);
        let processor = self.processor.clone();
        let fallback = payload.clone();
        let mut job = tokio::spawn(async move {
            processor.process(frame, decoded.corners, payload).await
        });

        // Dropping the handle on stop detaches the job; it still finishes its submission.
        let joined = tokio::select! {
            biased;
            _ = stop.changed() => return Ok(TickFlow::Stop),
            joined = &mut job => joined,
        };
        let attempt = joined.unwrap_or_else(|err| {
            let error = ScanError::Worker(err.to_string());
            ScanAttempt::failed(Some(fallback), AlignmentVerdict::Aligned, Vec::new(), 0, &error)
        });

        self.last_success = match attempt.status {
            ScanStatus::Success => Some((key, Instant::now())),
            _ => None,
        };
        self.emit(ScanEvent::Result(attempt));

        self.set_phase(LoopPhase::CoolingDown);
        tokio::select! {
            biased;
            _ = stop.changed() => return Ok(TickFlow::Stop),
            _ = sleep(self.settings.cooldown) => {}
        }
        self.set_phase(LoopPhase::Idle);
        Ok(TickFlow::Continue)
    }

    fn expire_duplicate(&mut self) {
        if self
            .last_success
            .as_ref()
            .is_some_and(|(_, at)| at.elapsed() >= self.settings.duplicate_window)
        {
            self.last_success = None;
        }
    }

    fn guides(&self, verdict: AlignmentVerdict) {
        let color = verdict.guide_color();
        self.emit(ScanEvent::Guides { verdict, color, rgb: color.rgb() });
    }

    fn emit(&self, event: ScanEvent) {
        let _ = self.events.send(event);
    }

    fn set_phase(&self, phase: LoopPhase) {
        self.phase.send_replace(phase);
    }
}

async fn decode(
    decoder: Arc<dyn FiducialDecoder>,
    frame: RgbaImage,
) -> (RgbaImage, Option<DecodedFiducial>) {
    let (width, height) = frame.dimensions();
    match tokio::task::spawn_blocking(move || {
        let decoded = decoder.decode(&frame);
        (frame, decoded)
    })
    .await
    {
        Ok(result) => result,
        Err(err) => {
            tracing::error!(error = %err, "Fiducial decoder panicked");
            (RgbaImage::new(width, height), None)
        }
    }
}
