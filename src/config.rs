use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, anyhow};
use chrono::{FixedOffset, Weekday};
use dotenvy::dotenv;

use crate::store::KdfParams;
use crate::verify::policy::parse_minute_of_day;
use crate::verify::{AttendancePolicy, CaptureSettings, FaceMatcher, Geofence, SystemClock};

#[derive(Debug, Clone)]
pub struct Config {
    pub server_addr: String,
    pub api_prefix: String,
    pub database_url: String,
    pub device_key_path: PathBuf,

    pub backend_url: String,
    pub backend_timeout: Duration,

    pub log_dir: String,
    pub log_level: String,

    /// Reference offset for day boundaries and wall-clock timestamps.
    pub utc_offset: FixedOffset,
    pub attendance_window_start: u32,
    pub attendance_window_end: u32,
    pub eligible_weekdays: Vec<Weekday>,

    pub geofence_radius_meters: f64,
    pub face_match_threshold: f32,
    pub detection_max_attempts: u32,
    pub detection_interval: Duration,
    pub detection_warmup: Duration,
    pub face_cache_ttl: Duration,
    /// How long a session waits for the UI to answer a position request.
    pub location_timeout: Duration,
    /// Pushed frames older than this are not used for detection.
    pub frame_max_age: Duration,

    pub kdf: KdfParams,
    pub start_online: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`Config::from_env`] but reads values through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let utc_offset_minutes: i32 = parse(&var("UTC_OFFSET_MINUTES", "0"), "UTC_OFFSET_MINUTES")?;
        let utc_offset = FixedOffset::east_opt(utc_offset_minutes * 60)
            .ok_or_else(|| anyhow!("UTC_OFFSET_MINUTES out of range: {utc_offset_minutes}"))?;

        let attendance_window_start = minute(&var("ATTENDANCE_WINDOW_START", "07:50"), "ATTENDANCE_WINDOW_START")?;
        let attendance_window_end = minute(&var("ATTENDANCE_WINDOW_END", "22:40"), "ATTENDANCE_WINDOW_END")?;

        let eligible_weekdays = var("ELIGIBLE_WEEKDAYS", "mon,tue,wed,thu,fri")
            .split(',')
            .filter(|d| !d.trim().is_empty())
            .map(|d| {
                d.trim()
                    .parse::<Weekday>()
                    .map_err(|_| anyhow!("ELIGIBLE_WEEKDAYS: unknown weekday `{d}`"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self {
            server_addr: var("SERVER_ADDR", "127.0.0.1:8080"),
            api_prefix: var("API_PREFIX", "/api"),
            database_url: var("DATABASE_URL", "sqlite://attendance-agent.db"),
            device_key_path: PathBuf::from(var("DEVICE_KEY_PATH", "device.key")),

            backend_url: var("BACKEND_URL", "http://localhost:3000/api"),
            backend_timeout: Duration::from_secs(parse(
                &var("BACKEND_TIMEOUT_SECS", "10"),
                "BACKEND_TIMEOUT_SECS",
            )?),

            log_dir: var("LOG_DIR", "logs"),
            log_level: var("LOG_LEVEL", "info"),

            utc_offset,
            attendance_window_start,
            attendance_window_end,
            eligible_weekdays,

            geofence_radius_meters: parse(&var("GEOFENCE_RADIUS_METERS", "100"), "GEOFENCE_RADIUS_METERS")?,
            face_match_threshold: parse(&var("FACE_MATCH_THRESHOLD", "0.5"), "FACE_MATCH_THRESHOLD")?,
            detection_max_attempts: parse(&var("DETECTION_MAX_ATTEMPTS", "30"), "DETECTION_MAX_ATTEMPTS")?,
            // a zero period would make the detection ticker panic
            detection_interval: Duration::from_millis(
                parse::<u64>(&var("DETECTION_INTERVAL_MS", "1000"), "DETECTION_INTERVAL_MS")?.max(1),
            ),
            detection_warmup: Duration::from_millis(parse(
                &var("DETECTION_WARMUP_MS", "3000"),
                "DETECTION_WARMUP_MS",
            )?),
            face_cache_ttl: Duration::from_secs(parse(
                &var("FACE_CACHE_TTL_SECS", "86400"),
                "FACE_CACHE_TTL_SECS",
            )?),
            location_timeout: Duration::from_secs(parse(
                &var("LOCATION_TIMEOUT_SECS", "15"),
                "LOCATION_TIMEOUT_SECS",
            )?),
            frame_max_age: Duration::from_millis(parse(
                &var("FRAME_MAX_AGE_MS", "2000"),
                "FRAME_MAX_AGE_MS",
            )?),

            kdf: KdfParams {
                memory_kib: parse(&var("KDF_MEMORY_KIB", "19456"), "KDF_MEMORY_KIB")?,
                iterations: parse(&var("KDF_ITERATIONS", "2"), "KDF_ITERATIONS")?,
            },
            start_online: parse(&var("START_ONLINE", "true"), "START_ONLINE")?,
        })
    }

    pub fn policy(&self) -> AttendancePolicy {
        AttendancePolicy {
            eligible_days: self.eligible_weekdays.clone(),
            window_start_minute: self.attendance_window_start,
            window_end_minute: self.attendance_window_end,
        }
    }

    pub fn geofence(&self) -> Geofence {
        Geofence {
            radius_meters: self.geofence_radius_meters,
        }
    }

    pub fn matcher(&self) -> FaceMatcher {
        FaceMatcher {
            threshold: self.face_match_threshold,
        }
    }

    pub fn clock(&self) -> SystemClock {
        SystemClock::new(self.utc_offset)
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            max_attempts: self.detection_max_attempts,
            interval: self.detection_interval,
            warmup: self.detection_warmup,
            ..CaptureSettings::default()
        }
    }
}

fn parse<T>(raw: &str, key: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("{key}: invalid value `{raw}`"))
}

fn minute(raw: &str, key: &str) -> anyhow::Result<u32> {
    parse_minute_of_day(raw).ok_or_else(|| anyhow!("{key}: expected HH:MM, got `{raw}`"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_match_the_attendance_rules() {
        let config = config(&[]).unwrap();
        let policy = config.policy();
        assert_eq!(policy, AttendancePolicy::default());
        assert_eq!(config.geofence_radius_meters, 100.0);
        assert_eq!(config.capture_settings().max_attempts, 30);
        assert_eq!(config.matcher().threshold, 0.5);
        assert_eq!(config.geofence().radius_meters, 100.0);
        assert_eq!(config.api_prefix, "/api");
        assert_eq!(config.location_timeout, Duration::from_secs(15));
        assert_eq!(config.frame_max_age, Duration::from_secs(2));
        assert_eq!(config.face_cache_ttl, Duration::from_secs(86_400));
        assert!(config.start_online);
    }

    #[test]
    fn offset_and_weekdays_are_parsed() {
        let config = config(&[
            ("UTC_OFFSET_MINUTES", "-360"),
            ("ELIGIBLE_WEEKDAYS", "mon, sat"),
            ("ATTENDANCE_WINDOW_START", "06:00"),
        ])
        .unwrap();
        assert_eq!(config.utc_offset.local_minus_utc(), -360 * 60);
        assert_eq!(config.eligible_weekdays, vec![Weekday::Mon, Weekday::Sat]);
        assert_eq!(config.attendance_window_start, 360);
    }

    #[test]
    fn detection_interval_is_never_zero() {
        let config = config(&[("DETECTION_INTERVAL_MS", "0")]).unwrap();
        assert_eq!(config.detection_interval, Duration::from_millis(1));
    }

    #[test]
    fn bad_values_name_the_key() {
        let err = config(&[("DETECTION_MAX_ATTEMPTS", "lots")]).unwrap_err();
        assert!(err.to_string().contains("DETECTION_MAX_ATTEMPTS"));
        assert!(config(&[("ATTENDANCE_WINDOW_END", "25:00")]).is_err());
        assert!(config(&[("ELIGIBLE_WEEKDAYS", "mon,funday")]).is_err());
    }
}
