//! Runtime settings: optional TOML file overlaid with `CARETAKER__*` environment variables.
//!
//! Double underscores nest, e.g. `CARETAKER__SCHEDULE__MEDICINE_STOCK=5`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "config/caretaker.toml";
pub const ENV_PREFIX: &str = "CARETAKER";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub robot: RobotSettings,
    pub timing: TimingSettings,
    pub schedule: ScheduleSettings,
    pub calendar: CalendarSettings,
    pub email: EmailSettings,
    pub journal: JournalSettings,
}

/// [robot]: who to look for and how to reach the SDK bridge.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RobotSettings {
    pub user_name: String,
    pub bridge_socket: String,
    /// Speech slowdown passed with every utterance.
    pub speech_duration_scalar: f32,
}

impl Default for RobotSettings {
    fn default() -> Self {
        Self {
            user_name: "sheena".to_string(),
            bridge_socket: "/tmp/cozmo_bridge.sock".to_string(),
            speech_duration_scalar: 0.65,
        }
    }
}

/// [timing]: polling rates, search deadlines and retry counts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    pub face_poll_hz: u32,
    pub face_search_timeout_secs: u64,
    /// Second, shorter face search after the user has been called out to.
    pub face_retry_timeout_secs: u64,
    pub cube_search_timeout_secs: u64,
    pub cube_count: usize,
    pub tap_timeout_secs: u64,
    pub motion_retries: u32,
    /// How far short of the face deliveries are dropped, in millimetres.
    pub standoff_mm: f32,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            face_poll_hz: 4,
            face_search_timeout_secs: 60,
            face_retry_timeout_secs: 30,
            cube_search_timeout_secs: 60,
            cube_count: 3,
            tap_timeout_secs: 10,
            motion_retries: 3,
            standoff_mm: 250.0,
        }
    }
}

impl TimingSettings {
    pub fn face_poll_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.face_poll_hz.max(1)))
    }
}

/// [schedule]: event windows and the medicine supply.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleSettings {
    pub event_count: u32,
    pub medicine_window_minutes: i64,
    pub trip_threshold_hours: i64,
    pub party_threshold_hours: i64,
    pub medicine_stock: u32,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            event_count: 3,
            medicine_window_minutes: 30,
            trip_threshold_hours: 3,
            party_threshold_hours: 12,
            medicine_stock: 10,
        }
    }
}

/// [calendar]: Google Calendar v3 access.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CalendarSettings {
    pub base_url: String,
    pub calendar_id: String,
    /// OAuth bearer token; obtaining and refreshing it happens outside this program.
    pub access_token: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for CalendarSettings {
    fn default() -> Self {
        Self {
            base_url: "https://www.googleapis.com/calendar/v3".to_string(),
            calendar_id: "primary".to_string(),
            access_token: None,
            request_timeout_secs: 30,
        }
    }
}

/// [email]: Gmail v1 send access and the supervisor address.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmailSettings {
    pub base_url: String,
    pub to: String,
    pub from: String,
    pub access_token: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            base_url: "https://gmail.googleapis.com/gmail/v1".to_string(),
            to: "supervisor@example.com".to_string(),
            from: "caretaker@example.com".to_string(),
            access_token: None,
            request_timeout_secs: 30,
        }
    }
}

/// [journal]: on-disk delivery log.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JournalSettings {
    pub enabled: bool,
    pub path: PathBuf,
}

impl Default for JournalSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("caretaker_journal"),
        }
    }
}

impl Settings {
    /// Loads `path` (or the default location, if present) and applies env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        let required = path.is_some();

        config::Config::builder()
            .add_source(config::File::from(file).required(required))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_robot_conventions() {
        let s = Settings::default();
        assert_eq!(s.robot.user_name, "sheena");
        assert_eq!(s.timing.face_poll_interval(), Duration::from_millis(250));
        assert_eq!(s.timing.motion_retries, 3);
        assert_eq!(s.timing.standoff_mm, 250.0);
        assert_eq!(s.schedule.medicine_window_minutes, 30);
        assert_eq!(s.schedule.event_count, 3);
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[schedule]\nmedicine_stock = 2\ntrip_threshold_hours = 12\n\n[robot]\nuser_name = \"ada\""
        )
        .unwrap();

        let s = Settings::load(Some(file.path())).unwrap();

        assert_eq!(s.schedule.medicine_stock, 2);
        assert_eq!(s.schedule.trip_threshold_hours, 12);
        assert_eq!(s.schedule.medicine_window_minutes, 30);
        assert_eq!(s.robot.user_name, "ada");
        assert_eq!(s.timing.tap_timeout_secs, 10);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(Settings::load(Some(Path::new("/nonexistent/caretaker.toml"))).is_err());
    }
}
