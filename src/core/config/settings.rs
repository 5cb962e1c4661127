use std::path::PathBuf;

use tokio::time::Duration;

use super::parsing::{
    env_f32, env_optional, env_or_default, parse_bool, parse_cors_origins, parse_environment,
    parse_u16, parse_u32, parse_u64, parse_usize,
};
use super::types::{
    ApiSettings, ConfigError, CorsSettings, DatabaseSettings, RuntimeSettings, ScannerJob,
    ScannerSettings, ServerHost, ServerPort, ServerSettings, Settings, TelemetrySettings,
};
use crate::services::geometry::SheetGeometry;
use crate::services::mark_detector::MarkDetectorSettings;
use crate::tasks::capture::{AlignmentTarget, CaptureSettings};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("GABARITO_HOST", "0.0.0.0");
        let port = env_or_default("GABARITO_PORT", "8000");

        let environment = parse_environment(
            env_optional("GABARITO_ENV").or_else(|| env_optional("ENVIRONMENT")),
        );
        let strict_config = env_optional("GABARITO_STRICT_CONFIG")
            .map(|value| parse_bool(&value))
            .unwrap_or(false)
            || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Gabarito API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "gabarito");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "gabarito_db");
        let database_url = env_optional("DATABASE_URL");
        let max_connections = parse_u32(
            "DATABASE_MAX_CONNECTIONS",
            env_or_default("DATABASE_MAX_CONNECTIONS", "20"),
        )?;

        let defaults = SheetGeometry::default();
        let geometry = SheetGeometry {
            bubble_radius: env_f32("SHEET_BUBBLE_RADIUS", defaults.bubble_radius)?,
            row_spacing: env_f32("SHEET_ROW_SPACING", defaults.row_spacing)?,
            slot_spacing: env_f32("SHEET_SLOT_SPACING", defaults.slot_spacing)?,
            origin_offset_x: env_f32("SHEET_ORIGIN_OFFSET_X", defaults.origin_offset_x)?,
            origin_offset_y: env_f32("SHEET_ORIGIN_OFFSET_Y", defaults.origin_offset_y)?,
            columns: parse_usize("SHEET_COLUMNS", env_or_default("SHEET_COLUMNS", "3"))?,
            column_spacing: env_f32("SHEET_COLUMN_SPACING", defaults.column_spacing)?,
            max_alternatives: parse_usize(
                "SHEET_MAX_ALTERNATIVES",
                env_or_default("SHEET_MAX_ALTERNATIVES", "4"),
            )?,
        }
        .validate()?;

        let alignment_defaults = AlignmentTarget::default();
        let capture = CaptureSettings {
            frame_interval: Duration::from_millis(parse_u64(
                "SCANNER_FRAME_INTERVAL_MS",
                env_or_default("SCANNER_FRAME_INTERVAL_MS", "100"),
            )?),
            cooldown: Duration::from_millis(parse_u64(
                "SCANNER_COOLDOWN_MS",
                env_or_default("SCANNER_COOLDOWN_MS", "1500"),
            )?),
            duplicate_window: Duration::from_millis(parse_u64(
                "SCANNER_DUPLICATE_WINDOW_MS",
                env_or_default("SCANNER_DUPLICATE_WINDOW_MS", "5000"),
            )?),
            alignment: AlignmentTarget {
                x: env_f32("SCANNER_ALIGN_X", alignment_defaults.x)?,
                y: env_f32("SCANNER_ALIGN_Y", alignment_defaults.y)?,
                tolerance: env_f32("SCANNER_ALIGN_TOLERANCE", alignment_defaults.tolerance)?,
            },
        };
        let detector = MarkDetectorSettings {
            filled_threshold: env_f32(
                "SCANNER_FILLED_THRESHOLD",
                MarkDetectorSettings::default().filled_threshold,
            )?,
        };
        let max_upload_size_mb =
            parse_u64("MAX_UPLOAD_SIZE_MB", env_or_default("MAX_UPLOAD_SIZE_MB", "10"))?;
        let frame_buffer =
            parse_usize("SCANNER_FRAME_BUFFER", env_or_default("SCANNER_FRAME_BUFFER", "4"))?;
        let max_sessions =
            parse_usize("SCANNER_MAX_SESSIONS", env_or_default("SCANNER_MAX_SESSIONS", "32"))?;
        let session_idle_timeout = Duration::from_secs(parse_u64(
            "SCANNER_SESSION_IDLE_SECS",
            env_or_default("SCANNER_SESSION_IDLE_SECS", "300"),
        )?);

        let log_level = env_or_default("GABARITO_LOG_LEVEL", "info");
        let json =
            env_optional("GABARITO_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
                max_connections,
            },
            geometry,
            scanner: ScannerSettings {
                capture,
                detector,
                max_upload_size_mb,
                frame_buffer,
                max_sessions,
                session_idle_timeout,
            },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;

        Ok(settings)
    }

    pub(crate) fn scanner_job(&self) -> Result<ScannerJob, ConfigError> {
        let frame_dir = env_optional("SCANNER_FRAME_DIR")
            .ok_or(ConfigError::MissingValue("SCANNER_FRAME_DIR"))?;
        let evaluation_id = env_optional("SCANNER_EVALUATION_ID")
            .ok_or(ConfigError::MissingValue("SCANNER_EVALUATION_ID"))?;
        let seed = env_optional("SCANNER_SEED").ok_or(ConfigError::MissingSecret("SCANNER_SEED"))?;

        Ok(ScannerJob { frame_dir: PathBuf::from(frame_dir), evaluation_id, seed })
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn geometry(&self) -> &SheetGeometry {
        &self.geometry
    }

    pub(crate) fn scanner(&self) -> &ScannerSettings {
        &self.scanner
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let capture = &self.scanner.capture;
        if capture.frame_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "SCANNER_FRAME_INTERVAL_MS",
                value: "0".to_string(),
            });
        }

        if capture.duplicate_window < capture.cooldown {
            return Err(ConfigError::InvalidValue {
                field: "SCANNER_DUPLICATE_WINDOW_MS",
                value: capture.duplicate_window.as_millis().to_string(),
            });
        }

        let alignment = capture.alignment;
        for (field, value) in [
            ("SCANNER_ALIGN_X", alignment.x),
            ("SCANNER_ALIGN_Y", alignment.y),
            ("SCANNER_ALIGN_TOLERANCE", alignment.tolerance),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue { field, value: value.to_string() });
            }
        }

        let threshold = self.scanner.detector.filled_threshold;
        if !(0.0..=255.0).contains(&threshold) {
            return Err(ConfigError::InvalidValue {
                field: "SCANNER_FILLED_THRESHOLD",
                value: threshold.to_string(),
            });
        }

        if self.scanner.session_idle_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "SCANNER_SESSION_IDLE_SECS",
                value: "0".to_string(),
            });
        }

        if self.scanner.max_upload_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "MAX_UPLOAD_SIZE_MB",
                value: "0".to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::types::Environment;
    use crate::test_support::env_lock;

    const KEYS: &[&str] = &[
        "GABARITO_ENV",
        "GABARITO_STRICT_CONFIG",
        "POSTGRES_PASSWORD",
        "DATABASE_URL",
        "SHEET_MAX_ALTERNATIVES",
        "SCANNER_COOLDOWN_MS",
        "SCANNER_DUPLICATE_WINDOW_MS",
        "SCANNER_FILLED_THRESHOLD",
        "SCANNER_FRAME_DIR",
        "SCANNER_EVALUATION_ID",
        "SCANNER_SEED",
        "SCANNER_SESSION_IDLE_SECS",
    ];

    fn clear_env() {
        for key in KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn defaults_load_in_development() {
        let _guard = env_lock();
        clear_env();

        let settings = Settings::load().expect("settings");
        assert_eq!(settings.runtime().environment, Environment::Development);
        assert_eq!(settings.api().api_v1_str, "/api/v1");
        assert_eq!(*settings.geometry(), SheetGeometry::default());
        assert_eq!(settings.scanner().detector.filled_threshold, 110.0);
        assert_eq!(settings.scanner().capture.cooldown, Duration::from_millis(1500));
        assert_eq!(settings.scanner().max_upload_bytes(), 10 * 1024 * 1024);
        assert_eq!(settings.scanner().session_idle_timeout, Duration::from_secs(300));
    }

    #[test]
    fn production_requires_a_database_secret() {
        let _guard = env_lock();
        clear_env();
        std::env::set_var("GABARITO_ENV", "production");

        let result = Settings::load();
        clear_env();
        assert!(matches!(result, Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"))));
    }

    #[test]
    fn unprintable_alternative_cap_is_rejected() {
        let _guard = env_lock();
        clear_env();
        std::env::set_var("SHEET_MAX_ALTERNATIVES", "7");

        let result = Settings::load();
        clear_env();
        assert!(matches!(result, Err(ConfigError::InvalidGeometry(_))));
    }

    #[test]
    fn duplicate_window_shorter_than_cooldown_is_rejected() {
        let _guard = env_lock();
        clear_env();
        std::env::set_var("SCANNER_COOLDOWN_MS", "3000");
        std::env::set_var("SCANNER_DUPLICATE_WINDOW_MS", "1000");

        let result = Settings::load();
        clear_env();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field: "SCANNER_DUPLICATE_WINDOW_MS", .. })
        ));
    }

    #[test]
    fn scanner_job_needs_all_three_values() {
        let _guard = env_lock();
        clear_env();
        let settings = Settings::load().expect("settings");

        std::env::set_var("SCANNER_FRAME_DIR", "/tmp/frames");
        std::env::set_var("SCANNER_EVALUATION_ID", "eval-1");
        assert!(matches!(settings.scanner_job(), Err(ConfigError::MissingSecret("SCANNER_SEED"))));

        std::env::set_var("SCANNER_SEED", "exam-2024");
        let job = settings.scanner_job().expect("job");
        clear_env();
        assert_eq!(job.frame_dir, PathBuf::from("/tmp/frames"));
        assert_eq!(job.evaluation_id, "eval-1");
    }
}
