use std::sync::Arc;

use sqlx::PgPool;

use crate::core::config::Settings;
use crate::services::fiducial::{FiducialDecoder, QrFiducialDecoder};
use crate::tasks::capture::ScanSessionRegistry;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    db: PgPool,
    decoder: Arc<dyn FiducialDecoder>,
    scan_sessions: ScanSessionRegistry,
}

impl AppState {
    pub(crate) fn new(settings: Settings, db: PgPool) -> Self {
        Self::with_decoder(settings, db, Arc::new(QrFiducialDecoder))
    }

    pub(crate) fn with_decoder(
        settings: Settings,
        db: PgPool,
        decoder: Arc<dyn FiducialDecoder>,
    ) -> Self {
        let scanner = settings.scanner();
        let scan_sessions =
            ScanSessionRegistry::new(scanner.max_sessions, scanner.session_idle_timeout);
        Self { inner: Arc::new(InnerState { settings, db, decoder, scan_sessions }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub(crate) fn decoder(&self) -> Arc<dyn FiducialDecoder> {
        Arc::clone(&self.inner.decoder)
    }

    pub(crate) fn scan_sessions(&self) -> &ScanSessionRegistry {
        &self.inner.scan_sessions
    }
}
