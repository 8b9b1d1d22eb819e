//! Worker configuration: defaults, optional .cadencerc or ~/.cadencerc (JSON), env overrides.

use std::env;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::WorkerError;

pub const CONFIG_FILE: &str = ".cadencerc";
pub const PERIOD_ENV: &str = "CADENCE_PERIOD_MS";
pub const NAME_ENV: &str = "CADENCE_TIMER_NAME";

/// Configuration for a periodic worker
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkerConfig {
    /// Period between the end of one run and the next fire, in milliseconds
    pub period_ms: u64,
    /// Name of the timer thread
    pub name: String,
    /// Stack size for the timer thread
    pub stack_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            period_ms: 1000,
            name: "cadence-timer".to_string(),
            stack_size: 2 * 1024 * 1024, // 2 MB
        }
    }
}

impl WorkerConfig {
    pub fn with_period(period: Duration) -> Self {
        Self {
            period_ms: period.as_millis() as u64,
            ..Default::default()
        }
    }

    /// Validated period.
    pub fn period(&self) -> Result<Duration, WorkerError> {
        validate_period(Duration::from_millis(self.period_ms))
    }

    /// Apply CADENCE_PERIOD_MS / CADENCE_TIMER_NAME. Unparseable values are an error, not ignored.
    pub fn apply_env(&mut self) -> Result<(), WorkerError> {
        if let Ok(v) = env::var(PERIOD_ENV) {
            self.period_ms = v.trim().parse().map_err(|e| {
                WorkerError::invalid_configuration(PERIOD_ENV, format!("{:?}: {}", v, e))
            })?;
        }
        if let Ok(v) = env::var(NAME_ENV) {
            if !v.trim().is_empty() {
                self.name = v.trim().to_string();
            }
        }
        Ok(())
    }
}

pub(crate) fn validate_period(period: Duration) -> Result<Duration, WorkerError> {
    if period.is_zero() {
        return Err(WorkerError::invalid_configuration(
            "period",
            "must be greater than zero",
        ));
    }
    if Instant::now().checked_add(period).is_none() {
        return Err(WorkerError::invalid_configuration(
            "period",
            format!("{:?} is too large to schedule", period),
        ));
    }
    Ok(period)
}

/// Parse a config file. Keys not present keep their defaults.
pub fn read_config_file(path: &Path) -> Result<WorkerConfig, WorkerError> {
    let s = std::fs::read_to_string(path).map_err(|e| {
        WorkerError::invalid_configuration(&path.display().to_string(), e.to_string())
    })?;
    serde_json::from_str(&s).map_err(|e| {
        WorkerError::invalid_configuration(&path.display().to_string(), e.to_string())
    })
}

/// Load config from .cadencerc in dir, then ~/.cadencerc, then env.
/// Missing or invalid file = defaults; the first file found wins.
pub fn load_config(dir: &Path) -> Result<WorkerConfig, WorkerError> {
    let mut candidates: Vec<PathBuf> = vec![dir.join(CONFIG_FILE)];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(CONFIG_FILE));
    }

    let mut cfg = WorkerConfig::default();
    for path in &candidates {
        if path.is_file() {
            if let Ok(found) = read_config_file(path) {
                cfg = found;
            }
            break;
        }
    }
    cfg.apply_env()?;
    Ok(cfg)
}
