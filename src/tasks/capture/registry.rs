use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use uuid::Uuid;

use super::session::{LoopPhase, ScanEvent, ScanSessionHandle};
use super::source::FrameSender;

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum RegistryError {
    #[error("too many live scan sessions (limit {0})")]
    Full(usize),
}

#[derive(Debug)]
pub(crate) struct LiveSession {
    pub(crate) evaluation_id: String,
    pub(crate) frames: FrameSender,
    pub(crate) handle: ScanSessionHandle,
}

#[derive(Debug)]
pub(crate) struct SessionSnapshot {
    pub(crate) evaluation_id: String,
    pub(crate) phase: LoopPhase,
    pub(crate) finished: bool,
    pub(crate) events: Vec<ScanEvent>,
}

#[derive(Debug)]
struct Entry {
    live: LiveSession,
    last_seen: Instant,
}

#[derive(Debug, Clone)]
pub(crate) struct ScanSessionRegistry {
    sessions: Arc<Mutex<HashMap<Uuid, Entry>>>,
    limit: usize,
    idle_timeout: Duration,
}

impl ScanSessionRegistry {
    pub(crate) fn new(limit: usize, idle_timeout: Duration) -> Self {
        Self { sessions: Arc::new(Mutex::new(HashMap::new())), limit: limit.max(1), idle_timeout }
    }

    pub(crate) async fn insert(&self, session: LiveSession) -> Result<Uuid, RegistryError> {
        self.sweep().await;

        let mut sessions = self.sessions.lock().await;
        if sessions.len() >= self.limit {
            session.handle.stop();
            return Err(RegistryError::Full(self.limit));
        }

        let id = Uuid::new_v4();
        sessions.insert(id, Entry { live: session, last_seen: Instant::now() });
        metrics::gauge!("scan_sessions_active").set(sessions.len() as f64);
        Ok(id)
    }

    pub(crate) async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub(crate) async fn frame_sender(&self, id: Uuid) -> Option<FrameSender> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions.get_mut(&id)?;
        entry.last_seen = Instant::now();
        Some(entry.live.frames.clone())
    }

    pub(crate) async fn snapshot(&self, id: Uuid) -> Option<SessionSnapshot> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions.get_mut(&id)?;
        entry.last_seen = Instant::now();
        let live = &mut entry.live;
        Some(SessionSnapshot {
            evaluation_id: live.evaluation_id.clone(),
            phase: live.handle.phase(),
            finished: live.handle.is_finished(),
            events: live.handle.drain_events(),
        })
    }

    pub(crate) async fn remove(&self, id: Uuid) -> Option<LiveSession> {
        let mut sessions = self.sessions.lock().await;
        let removed = sessions.remove(&id).map(|entry| entry.live);
        metrics::gauge!("scan_sessions_active").set(sessions.len() as f64);
        removed
    }

    pub(crate) async fn sweep(&self) -> usize {
        let expired: Vec<(Uuid, LiveSession)> = {
            let mut sessions = self.sessions.lock().await;
            let stale: Vec<Uuid> = sessions
                .iter()
                .filter(|(_, entry)| {
                    entry.live.handle.is_finished()
                        || entry.last_seen.elapsed() >= self.idle_timeout
                })
                .map(|(id, _)| *id)
                .collect();
            let expired = stale
                .into_iter()
                .filter_map(|id| sessions.remove(&id).map(|entry| (id, entry.live)))
                .collect();
            metrics::gauge!("scan_sessions_active").set(sessions.len() as f64);
            expired
        };

        let count = expired.len();
        for (session_id, live) in expired {
            let LiveSession { evaluation_id, frames, handle } = live;
            drop(frames);
            let undelivered = handle.shutdown().await.len();
            tracing::info!(%session_id, %evaluation_id, undelivered, "Idle scan session dropped");
        }
        count
    }

    pub(crate) fn spawn_sweeper(&self) -> JoinHandle<()> {
        let registry = self.clone();
        let period = (self.idle_timeout / 2).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                registry.sweep().await;
            }
        })
    }

    pub(crate) async fn shutdown_all(&self) {
        let drained: Vec<LiveSession> = {
            let mut sessions = self.sessions.lock().await;
            sessions.drain().map(|(_, entry)| entry.live).collect()
        };
        for live in drained {
            live.handle.shutdown().await;
        }
        metrics::gauge!("scan_sessions_active").set(0.0);
    }
}
