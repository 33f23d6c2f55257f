use crate::error::KineticError;
use glam::DVec3;
use std::fmt;

/// Which physical sensor produced a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    Accelerometer,
    Gyroscope,
    Unknown,
}

impl SensorKind {
    /// Parse a sensor tag as written in replay files. Unrecognized tags map to `Unknown`.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "accel" | "accelerometer" => SensorKind::Accelerometer,
            "gyro" | "gyroscope" => SensorKind::Gyroscope,
            _ => SensorKind::Unknown,
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SensorKind::Accelerometer => "accelerometer",
            SensorKind::Gyroscope => "gyroscope",
            SensorKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Device axis. Angles about X, Y, Z are reported as pitch, yaw, roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Read this axis' component of `v`.
    pub fn of(self, v: DVec3) -> f64 {
        match self {
            Axis::X => v.x,
            Axis::Y => v.y,
            Axis::Z => v.z,
        }
    }

    pub fn component_mut(self, v: &mut DVec3) -> &mut f64 {
        match self {
            Axis::X => &mut v.x,
            Axis::Y => &mut v.y,
            Axis::Z => &mut v.z,
        }
    }
}

/// Raw event as delivered by the platform sensor feed, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorEvent {
    pub kind: SensorKind,
    /// Monotonic timestamp in nanoseconds.
    pub timestamp_ns: u64,
    /// Raw values. Anything past the third component is ignored.
    pub values: Vec<f64>,
}

impl SensorEvent {
    pub fn new(kind: SensorKind, timestamp_ns: u64, values: impl Into<Vec<f64>>) -> Self {
        Self {
            kind,
            timestamp_ns,
            values: values.into(),
        }
    }
}

/// Validated 3-axis sensor reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub kind: SensorKind,
    /// Monotonic timestamp in nanoseconds.
    pub timestamp_ns: u64,
    /// Accelerometer: m/s^2. Gyroscope: rad/s.
    pub values: DVec3,
}

impl Sample {
    pub fn new(kind: SensorKind, timestamp_ns: u64, values: DVec3) -> Self {
        Self {
            kind,
            timestamp_ns,
            values,
        }
    }

    pub fn gyro(timestamp_ns: u64, rate: DVec3) -> Self {
        Self::new(SensorKind::Gyroscope, timestamp_ns, rate)
    }

    pub fn accel(timestamp_ns: u64, accel: DVec3) -> Self {
        Self::new(SensorKind::Accelerometer, timestamp_ns, accel)
    }
}

impl TryFrom<&SensorEvent> for Sample {
    type Error = KineticError;

    fn try_from(event: &SensorEvent) -> Result<Self, Self::Error> {
        match event.values[..] {
            [x, y, z, ..] => {
                let values = DVec3::new(x, y, z);
                if !values.is_finite() {
                    return Err(KineticError::NonFiniteSample {
                        kind: event.kind,
                        values: values.to_array(),
                    });
                }
                Ok(Sample::new(event.kind, event.timestamp_ns, values))
            }
            _ => Err(KineticError::MalformedSample {
                kind: event.kind,
                components: event.values.len(),
            }),
        }
    }
}

/// Phase of the orientation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    /// No session running; samples are ignored.
    #[default]
    Idle,
    /// Collecting gravity and drift observations.
    Calibrating,
    /// Calibrated; drift correction is applied.
    Measuring,
}

/// Latest published view of a running session, read by the display side.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Snapshot {
    /// Integrated orientation in degrees (x = pitch, y = yaw, z = roll).
    pub angle: DVec3,
    /// Most recent raw accelerometer vector.
    pub accel: DVec3,
    /// Deviation of `accel` from the calibration gravity, in the gravity-referenced frame.
    pub earth_accel: Option<DVec3>,
    pub state: EngineState,
    pub calibrated: bool,
    /// Gyroscope samples processed so far.
    pub gyro_samples: u64,
}

/// One CSV row written by the sample logger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogRecord {
    /// Seconds since the first logged sample. Never negative.
    pub relative_time: f64,
    pub angle: DVec3,
}

/// Totals reported when a session stops.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SessionSummary {
    pub gyro_samples: u64,
    pub accel_samples: u64,
    /// Samples from sensors the engine does not use.
    pub ignored_samples: u64,
    /// Events dropped at delivery for having fewer than three components.
    pub rejected_samples: u64,
    pub log_records: u64,
    pub final_angle: DVec3,
}
