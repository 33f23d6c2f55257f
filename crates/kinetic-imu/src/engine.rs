use crate::calibration::{CalibrationPolicy, CalibrationTracker};
use crate::filter::{NoiseFilter, GYRO_NOISE_LIMIT};
use crate::integrator::{OrientationIntegrator, OrientationState};
use crate::logger::SampleLogger;
use crate::types::{EngineState, Sample, SensorKind, SessionSummary, Snapshot};
use glam::DVec3;

/// Tuning for one orientation engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Gyro readings (rad/s) below this are zeroed. `0.0` disables filtering.
    pub noise_threshold: f64,
    /// Wrap each angle into `[0, 360)` after every update.
    pub normalize_angles: bool,
    pub calibration: CalibrationPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            noise_threshold: GYRO_NOISE_LIMIT,
            normalize_angles: true,
            calibration: CalibrationPolicy::default(),
        }
    }
}

/// Routes samples through calibration, integration and logging.
///
/// Gyro samples are integrated in both `Calibrating` and `Measuring`; drift
/// correction only kicks in once calibration completes.
pub struct OrientationEngine {
    state: EngineState,
    integrator: OrientationIntegrator,
    calibration: CalibrationTracker,
    logger: Option<SampleLogger>,
    latest_accel: DVec3,
    gyro_samples: u64,
    accel_samples: u64,
    ignored_samples: u64,
}

impl OrientationEngine {
    pub fn new(config: &EngineConfig) -> Self {
        let filter = NoiseFilter::new(config.noise_threshold);
        Self {
            state: EngineState::Idle,
            integrator: OrientationIntegrator::new(filter, config.normalize_angles),
            calibration: CalibrationTracker::new(config.calibration, filter),
            logger: None,
            latest_accel: DVec3::ZERO,
            gyro_samples: 0,
            accel_samples: 0,
            ignored_samples: 0,
        }
    }

    /// Record every integrated angle to `logger`.
    pub fn with_logger(mut self, logger: SampleLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Leave `Idle` and start calibrating. No-op once running.
    pub fn begin(&mut self) {
        if self.state == EngineState::Idle {
            self.state = EngineState::Calibrating;
            tracing::debug!("Engine calibrating");
        }
    }

    /// Drop the cached drift correction and calibrate again.
    pub fn recalibrate(&mut self) {
        if self.state == EngineState::Idle {
            return;
        }
        self.calibration.reset();
        self.integrator.set_calibrated(false);
        self.state = EngineState::Calibrating;
        tracing::info!("Recalibration started");
    }

    /// Process one validated sample.
    ///
    /// Returns the updated angle for gyroscope samples, `None` otherwise.
    pub fn process(&mut self, sample: &Sample) -> Option<DVec3> {
        if self.state == EngineState::Idle {
            return None;
        }

        match sample.kind {
            SensorKind::Gyroscope => Some(self.process_gyro(sample)),
            SensorKind::Accelerometer => {
                self.process_accel(sample);
                None
            }
            SensorKind::Unknown => {
                self.ignored_samples += 1;
                None
            }
        }
    }

    fn process_gyro(&mut self, sample: &Sample) -> DVec3 {
        if self.state == EngineState::Calibrating {
            self.calibration.observe_drift(sample.values);
        }

        let angle = self.integrator.integrate(sample, &self.calibration);
        self.gyro_samples += 1;
        if self.gyro_samples % 1000 == 0 {
            tracing::debug!(gyro_samples = self.gyro_samples, "Gyro samples processed");
        }

        if let Some(logger) = self.logger.as_mut() {
            if let Err(e) = logger.append(sample.timestamp_ns, angle) {
                tracing::warn!(%e, "Disabling orientation log for this session");
                self.logger = None;
            }
        }

        angle
    }

    fn process_accel(&mut self, sample: &Sample) {
        self.latest_accel = sample.values;
        self.accel_samples += 1;

        let completed = self.calibration.update_gravity(sample);
        if completed && self.state == EngineState::Calibrating {
            self.integrator.set_calibrated(true);
            self.state = EngineState::Measuring;
            tracing::info!(accel_samples = self.accel_samples, "Engine measuring");
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn orientation(&self) -> OrientationState {
        self.integrator.state()
    }

    pub fn calibration(&self) -> &CalibrationTracker {
        &self.calibration
    }

    pub fn is_logging(&self) -> bool {
        self.logger.as_ref().is_some_and(SampleLogger::is_open)
    }

    pub fn snapshot(&self) -> Snapshot {
        let orientation = self.integrator.state();
        Snapshot {
            angle: orientation.angle(),
            accel: self.latest_accel,
            earth_accel: self.calibration.earth_frame_deviation(self.latest_accel),
            state: self.state,
            calibrated: orientation.is_calibrated(),
            gyro_samples: self.gyro_samples,
        }
    }

    /// Close the log and report session totals.
    pub fn finish(mut self) -> SessionSummary {
        let log_records = match self.logger.take() {
            Some(mut logger) => {
                if let Err(e) = logger.close() {
                    tracing::warn!(%e, "Failed to close orientation log");
                }
                logger.records()
            }
            None => 0,
        };

        SessionSummary {
            gyro_samples: self.gyro_samples,
            accel_samples: self.accel_samples,
            ignored_samples: self.ignored_samples,
            rejected_samples: 0,
            log_records,
            final_angle: self.integrator.angle(),
        }
    }
}
