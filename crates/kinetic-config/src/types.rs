use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Orientation engine tuning.
    pub imu: ImuConfig,
    /// CSV orientation log.
    pub logging: LoggingConfig,
    /// Live display of the latest orientation.
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImuConfig {
    /// Gyro readings (rad/s) below this magnitude are treated as jitter. 0 disables.
    pub noise_threshold: f64,
    /// Wrap each angle into [0, 360) after every update.
    pub normalize_angles: bool,
    /// When drift calibration is considered complete.
    pub calibration: CalibrationConfig,
}

impl Default for ImuConfig {
    fn default() -> Self {
        Self {
            noise_threshold: 0.06,
            normalize_angles: true,
            calibration: CalibrationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationMode {
    /// Calibrated on the first usable accelerometer sample.
    FirstSample,
    /// Calibrated once the accelerometer has settled.
    Settled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub policy: CalibrationMode,
    /// Consecutive settled accelerometer samples required (`settled` only).
    pub stable_samples: u32,
    /// Per-axis difference in m/s^2 that still counts as settled (`settled` only).
    pub tolerance: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            policy: CalibrationMode::Settled,
            stable_samples: 10,
            tolerance: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    /// Log destination. `None` means `orientation.csv` in the data directory.
    pub path: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// How often the display polls the latest orientation.
    pub refresh_interval_ms: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 250,
        }
    }
}
