use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::lifecycle::DEFAULT_LEAD_WINDOW_MS;
use crate::model::{Ms, DAY_MS};
use crate::scheduler::DEFAULT_CADENCE;

const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_COMPACT_THRESHOLD: u64 = 1000;

/// Service settings, read from `TIMETABLE_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub sweep_interval: Duration,
    pub lead_window_ms: Ms,
    pub metrics_port: Option<u16>,
    /// WAL appends between compactions.
    pub compact_threshold: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            sweep_interval: DEFAULT_CADENCE,
            lead_window_ms: DEFAULT_LEAD_WINDOW_MS,
            metrics_port: None,
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Invalid { var: &'static str, value: String, reason: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Invalid { var, value, reason } => {
                write!(f, "invalid {var}={value:?}: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Unset variables fall back to defaults; set but malformed ones are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(dir) = lookup("TIMETABLE_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(secs) = parse::<u64>(&lookup, "TIMETABLE_SWEEP_INTERVAL_SECS")? {
            if secs == 0 {
                return Err(invalid("TIMETABLE_SWEEP_INTERVAL_SECS", "0", "must be positive"));
            }
            config.sweep_interval = Duration::from_secs(secs);
        }
        if let Some(days) = parse::<u32>(&lookup, "TIMETABLE_LEAD_WINDOW_DAYS")? {
            config.lead_window_ms = days as Ms * DAY_MS;
        }
        config.metrics_port = parse::<u16>(&lookup, "TIMETABLE_METRICS_PORT")?;
        if let Some(n) = parse::<u64>(&lookup, "TIMETABLE_COMPACT_THRESHOLD")? {
            config.compact_threshold = n;
        }
        Ok(config)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("timetable.wal")
    }
}

fn invalid(var: &'static str, value: &str, reason: &'static str) -> ConfigError {
    ConfigError::Invalid { var, value: value.to_string(), reason }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| invalid(var, &raw, "not a valid number")),
    }
}
