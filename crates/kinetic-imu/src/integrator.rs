use crate::calibration::CalibrationTracker;
use crate::filter::NoiseFilter;
use crate::math;
use crate::types::{Axis, Sample};
use glam::DVec3;

/// Nanoseconds to seconds.
pub const NS2S: f64 = 1.0e-9;

/// Orientation estimate owned by one recording session.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OrientationState {
    angle: DVec3,
    previous_timestamp: Option<u64>,
    calibrated: bool,
}

impl OrientationState {
    /// Per-axis angle in degrees.
    pub fn angle(&self) -> DVec3 {
        self.angle
    }

    /// Timestamp of the last gyro sample, `None` before the first one.
    pub fn previous_timestamp(&self) -> Option<u64> {
        self.previous_timestamp
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }
}

/// Integrates gyroscope angular velocity into a running angle estimate.
///
/// The first gyro sample only establishes the time baseline. Every later
/// sample adds `rate * dt` (converted to degrees) per axis, after noise
/// suppression, minus the calibration drift correction when calibrated.
#[derive(Debug, Clone)]
pub struct OrientationIntegrator {
    state: OrientationState,
    filter: NoiseFilter,
    normalize: bool,
}

impl OrientationIntegrator {
    pub fn new(filter: NoiseFilter, normalize: bool) -> Self {
        Self {
            state: OrientationState::default(),
            filter,
            normalize,
        }
    }

    /// Copy of the current state.
    pub fn state(&self) -> OrientationState {
        self.state
    }

    pub fn angle(&self) -> DVec3 {
        self.state.angle
    }

    pub fn set_calibrated(&mut self, calibrated: bool) {
        self.state.calibrated = calibrated;
    }

    /// Fold one gyroscope sample into the estimate and return the new angle.
    pub fn integrate(&mut self, sample: &Sample, calibration: &CalibrationTracker) -> DVec3 {
        let Some(previous) = self.state.previous_timestamp else {
            self.state.previous_timestamp = Some(sample.timestamp_ns);
            return self.state.angle;
        };

        let dt = match sample.timestamp_ns.checked_sub(previous) {
            Some(elapsed) => elapsed as f64 * NS2S,
            None => {
                tracing::trace!(
                    previous,
                    timestamp = sample.timestamp_ns,
                    "Gyro timestamp went backwards, treating as zero interval"
                );
                0.0
            }
        };

        for axis in Axis::ALL {
            let rate = self.filter.suppress(axis.of(sample.values));
            let angle = axis.component_mut(&mut self.state.angle);
            *angle += (rate * dt).to_degrees();

            if self.state.calibrated {
                *angle -= calibration.correction_for(axis, dt);
            }

            if self.normalize {
                *angle = math::normalize_to_360(*angle);
            }
        }

        self.state.previous_timestamp = Some(sample.timestamp_ns);
        self.state.angle
    }
}
