use crate::filter::NoiseFilter;
use crate::math;
use crate::types::{Axis, Sample};
use glam::DVec3;

/// Default per-axis difference (m/s^2) under which two gravity estimates count as settled.
pub const SETTLE_TOLERANCE: f64 = 0.1;

/// Default number of consecutive settled accelerometer samples required.
pub const SETTLE_SAMPLES: u32 = 10;

/// When the tracker considers the device calibrated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationPolicy {
    /// Calibrated as soon as one usable accelerometer sample arrives.
    FirstSample,
    /// Calibrated once `samples` consecutive gravity estimates each differ
    /// from the previous one by less than `tolerance` on every axis.
    Settled { samples: u32, tolerance: f64 },
}

impl Default for CalibrationPolicy {
    fn default() -> Self {
        CalibrationPolicy::Settled {
            samples: SETTLE_SAMPLES,
            tolerance: SETTLE_TOLERANCE,
        }
    }
}

/// Tracks the gravity reference and the gyro drift rate used for correction.
///
/// While uncalibrated, the tracker averages the noise-filtered gyro rates it
/// is shown since the accelerometer last settled. Movement restarts the
/// average. When calibration completes it is frozen as the per-axis error
/// derivative (deg/s) and reused until [`reset`](Self::reset).
#[derive(Debug, Clone)]
pub struct CalibrationTracker {
    policy: CalibrationPolicy,
    filter: NoiseFilter,
    /// Latest accelerometer-derived gravity estimate.
    gravity: Option<DVec3>,
    /// Gravity at the moment calibration completed.
    reference: Option<DVec3>,
    stable_count: u32,
    drift_sum: DVec3,
    drift_count: u64,
    error_derivative: DVec3,
    calibrated: bool,
}

impl CalibrationTracker {
    pub fn new(policy: CalibrationPolicy, filter: NoiseFilter) -> Self {
        Self {
            policy,
            filter,
            gravity: None,
            reference: None,
            stable_count: 0,
            drift_sum: DVec3::ZERO,
            drift_count: 0,
            error_derivative: DVec3::ZERO,
            calibrated: false,
        }
    }

    /// Store an accelerometer sample as the current gravity estimate.
    ///
    /// Returns `true` if this sample completed calibration.
    pub fn update_gravity(&mut self, sample: &Sample) -> bool {
        let current = sample.values;
        if math::magnitude(current) == 0.0 {
            // A zero vector has no direction; it cannot serve as "down".
            self.restart_settling();
            return false;
        }

        let previous = self.gravity.replace(current);
        if self.calibrated {
            return false;
        }

        let settled = match self.policy {
            CalibrationPolicy::FirstSample => true,
            CalibrationPolicy::Settled { samples, tolerance } => {
                match previous {
                    Some(prev) if within_tolerance(prev, current, tolerance) => {
                        self.stable_count += 1;
                    }
                    _ => self.restart_settling(),
                }
                self.stable_count >= samples
            }
        };

        if settled {
            self.complete(current);
        }
        settled
    }

    /// Record a raw gyro rate (rad/s) seen while the device is calibrating.
    pub fn observe_drift(&mut self, rate: DVec3) {
        if self.calibrated {
            return;
        }
        let filtered = self.filter.apply(rate);
        self.drift_sum += DVec3::new(
            filtered.x.to_degrees(),
            filtered.y.to_degrees(),
            filtered.z.to_degrees(),
        );
        self.drift_count += 1;
    }

    /// Angle (degrees) to remove from `axis` over an interval of `dt` seconds.
    ///
    /// Zero until calibration completes.
    pub fn correction_for(&self, axis: Axis, dt: f64) -> f64 {
        if !self.calibrated {
            return 0.0;
        }
        axis.of(self.error_derivative) * dt
    }

    /// Deviation of `accel` from the calibration gravity, rotated into the
    /// gravity-referenced frame. `None` until calibrated.
    pub fn earth_frame_deviation(&self, accel: DVec3) -> Option<DVec3> {
        let reference = self.reference?;
        Some(math::earth_frame_rotate(
            math::difference(accel, reference),
            reference,
        ))
    }

    /// Forget gravity and drift history and start calibrating again.
    pub fn reset(&mut self) {
        *self = Self::new(self.policy, self.filter);
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    pub fn gravity(&self) -> Option<DVec3> {
        self.gravity
    }

    pub fn reference(&self) -> Option<DVec3> {
        self.reference
    }

    /// Cached drift rate in deg/s per axis.
    pub fn error_derivative(&self) -> DVec3 {
        self.error_derivative
    }

    /// The device moved: only gyro rates seen from here on describe drift.
    fn restart_settling(&mut self) {
        self.stable_count = 0;
        self.drift_sum = DVec3::ZERO;
        self.drift_count = 0;
    }

    fn complete(&mut self, gravity: DVec3) {
        self.reference = Some(gravity);
        if self.drift_count > 0 {
            self.error_derivative = self.drift_sum / self.drift_count as f64;
        }
        self.calibrated = true;
        tracing::info!(
            gravity = math::magnitude(gravity),
            drift_x = self.error_derivative.x,
            drift_y = self.error_derivative.y,
            drift_z = self.error_derivative.z,
            drift_samples = self.drift_count,
            "Calibration complete"
        );
    }
}

fn within_tolerance(a: DVec3, b: DVec3, tolerance: f64) -> bool {
    let diff = math::difference(a, b).abs();
    diff.x < tolerance && diff.y < tolerance && diff.z < tolerance
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accel(t: u64, x: f64, y: f64, z: f64) -> Sample {
        Sample::accel(t, DVec3::new(x, y, z))
    }

    fn settled(samples: u32) -> CalibrationTracker {
        CalibrationTracker::new(
            CalibrationPolicy::Settled {
                samples,
                tolerance: SETTLE_TOLERANCE,
            },
            NoiseFilter::default(),
        )
    }

    #[test]
    fn first_sample_policy_calibrates_immediately() {
        let mut tracker =
            CalibrationTracker::new(CalibrationPolicy::FirstSample, NoiseFilter::default());
        assert!(tracker.update_gravity(&accel(0, 0.0, 0.0, 9.8)));
        assert!(tracker.is_calibrated());
        assert_eq!(tracker.reference(), Some(DVec3::new(0.0, 0.0, 9.8)));
    }

    #[test]
    fn settled_policy_waits_for_consecutive_stable_samples() {
        let mut tracker = settled(3);
        assert!(!tracker.update_gravity(&accel(0, 0.0, 0.0, 9.80)));
        assert!(!tracker.update_gravity(&accel(1, 0.0, 0.0, 9.82)));
        assert!(!tracker.update_gravity(&accel(2, 0.0, 0.05, 9.81)));
        assert!(tracker.update_gravity(&accel(3, 0.01, 0.05, 9.81)));
        assert!(tracker.is_calibrated());
    }

    #[test]
    fn movement_restarts_settling() {
        let mut tracker = settled(2);
        tracker.update_gravity(&accel(0, 0.0, 0.0, 9.8));
        tracker.update_gravity(&accel(1, 0.0, 0.0, 9.8));
        // Jolt: exceeds the per-axis limit.
        assert!(!tracker.update_gravity(&accel(2, 0.5, 0.0, 9.8)));
        assert!(!tracker.update_gravity(&accel(3, 0.5, 0.0, 9.8)));
        assert!(tracker.update_gravity(&accel(4, 0.5, 0.0, 9.8)));
    }

    #[test]
    fn movement_discards_drift_seen_so_far() {
        let mut tracker = CalibrationTracker::new(
            CalibrationPolicy::Settled {
                samples: 2,
                tolerance: SETTLE_TOLERANCE,
            },
            NoiseFilter::new(0.0),
        );
        tracker.update_gravity(&accel(0, 0.0, 0.0, 9.8));
        // Turned by hand while the accelerometer jumps around.
        tracker.observe_drift(DVec3::new(0.0, 0.0, 1.0));
        tracker.update_gravity(&accel(1, 0.0, 1.0, 9.8));
        tracker.observe_drift(DVec3::new(0.0, 0.0, 1.0));
        tracker.update_gravity(&accel(2, 0.0, 0.0, 9.8));

        // At rest from here on.
        tracker.observe_drift(DVec3::new(0.0, 0.0, 0.002));
        tracker.update_gravity(&accel(3, 0.0, 0.0, 9.8));
        tracker.observe_drift(DVec3::new(0.0, 0.0, 0.004));
        assert!(tracker.update_gravity(&accel(4, 0.0, 0.0, 9.8)));

        let expected_z = 0.003_f64.to_degrees();
        assert!((tracker.error_derivative().z - expected_z).abs() < 1e-9);
        assert_eq!(tracker.error_derivative().x, 0.0);
    }

    #[test]
    fn zero_vectors_are_not_gravity() {
        let mut tracker =
            CalibrationTracker::new(CalibrationPolicy::FirstSample, NoiseFilter::default());
        assert!(!tracker.update_gravity(&accel(0, 0.0, 0.0, 0.0)));
        assert!(tracker.gravity().is_none());
    }

    #[test]
    fn drift_average_becomes_the_correction() {
        let mut tracker =
            CalibrationTracker::new(CalibrationPolicy::FirstSample, NoiseFilter::new(0.0));
        tracker.observe_drift(DVec3::new(0.1, 0.0, -0.2));
        tracker.observe_drift(DVec3::new(0.3, 0.0, -0.2));
        assert_eq!(tracker.correction_for(Axis::X, 1.0), 0.0);

        tracker.update_gravity(&accel(0, 0.0, 0.0, 9.8));
        let expected_x = 0.2_f64.to_degrees();
        assert!((tracker.correction_for(Axis::X, 1.0) - expected_x).abs() < 1e-9);
        assert!((tracker.correction_for(Axis::X, 0.5) - expected_x * 0.5).abs() < 1e-9);
        assert_eq!(tracker.correction_for(Axis::Y, 1.0), 0.0);
        assert!((tracker.correction_for(Axis::Z, 2.0) + 0.4_f64.to_degrees()).abs() < 1e-9);
    }

    #[test]
    fn drift_is_frozen_after_calibration() {
        let mut tracker =
            CalibrationTracker::new(CalibrationPolicy::FirstSample, NoiseFilter::new(0.0));
        tracker.update_gravity(&accel(0, 0.0, 0.0, 9.8));
        tracker.observe_drift(DVec3::new(5.0, 5.0, 5.0));
        assert_eq!(tracker.error_derivative(), DVec3::ZERO);
    }

    #[test]
    fn reset_forgets_calibration() {
        let mut tracker =
            CalibrationTracker::new(CalibrationPolicy::FirstSample, NoiseFilter::default());
        tracker.update_gravity(&accel(0, 0.0, 0.0, 9.8));
        tracker.reset();
        assert!(!tracker.is_calibrated());
        assert!(tracker.reference().is_none());
        assert!(tracker.earth_frame_deviation(DVec3::Z).is_none());
    }

    #[test]
    fn earth_frame_deviation_is_relative_to_reference() {
        let mut tracker =
            CalibrationTracker::new(CalibrationPolicy::FirstSample, NoiseFilter::default());
        tracker.update_gravity(&accel(0, 0.0, 0.0, 9.8));
        let dev = tracker
            .earth_frame_deviation(DVec3::new(1.0, 0.0, 9.8))
            .unwrap();
        assert!((dev - DVec3::X).length() < 1e-9);
    }
}
