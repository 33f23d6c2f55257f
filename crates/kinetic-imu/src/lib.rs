pub mod calibration;
pub mod engine;
pub mod error;
pub mod filter;
pub mod integrator;
pub mod logger;
pub mod math;
pub mod replay;
pub mod types;

pub use error::{KineticError, Result};

use engine::{EngineConfig, OrientationEngine};
use logger::SampleLogger;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, watch};
use types::{Sample, SensorEvent, SensorKind, SessionSummary, Snapshot};

/// Sensors the session needs before it will start.
const REQUIRED_SENSORS: [SensorKind; 2] = [SensorKind::Accelerometer, SensorKind::Gyroscope];

/// What the device can deliver. Implemented by whatever owns the sensor feed.
pub trait SensorProvider {
    fn has_sensor(&self, kind: SensorKind) -> bool;
}

/// Settings for one recording session.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub engine: EngineConfig,
    /// CSV destination. `None` disables logging.
    pub log_path: Option<PathBuf>,
}

/// Commands sent to the session task.
enum SessionCommand {
    Recalibrate,
}

struct ActiveSession {
    sample_tx: mpsc::UnboundedSender<Sample>,
    command_tx: mpsc::UnboundedSender<SessionCommand>,
    snapshot_rx: watch::Receiver<Snapshot>,
    rejected: AtomicU64,
    task: tokio::task::JoinHandle<SessionSummary>,
}

/// One start-to-stop interval of sensor recording.
///
/// Samples pushed by the feed are processed in order on a background task,
/// which publishes a fresh [`Snapshot`] after each one. Dropping a running
/// session closes its sample channel; the task then drains and closes the log.
pub struct RecordingSession {
    config: SessionConfig,
    active: Option<ActiveSession>,
}

impl RecordingSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            active: None,
        }
    }

    /// Start recording. Must be called from within a Tokio runtime.
    ///
    /// Fails with [`KineticError::SensorUnavailable`] before anything is
    /// created if a required sensor is missing. A log file that cannot be
    /// opened only disables logging. Starting a running session is a no-op.
    pub fn start(&mut self, sensors: &dyn SensorProvider) -> Result<()> {
        if self.active.is_some() {
            tracing::debug!("Session already running");
            return Ok(());
        }

        if let Some(kind) = REQUIRED_SENSORS.into_iter().find(|&k| !sensors.has_sensor(k)) {
            tracing::error!(%kind, "Cannot start session");
            return Err(KineticError::SensorUnavailable(kind));
        }

        let mut engine = OrientationEngine::new(&self.config.engine);
        if let Some(path) = &self.config.log_path {
            match SampleLogger::open(path) {
                Ok(logger) => engine = engine.with_logger(logger),
                Err(e) => tracing::warn!(%e, "Orientation logging disabled"),
            }
        }
        engine.begin();

        let (snapshot_tx, snapshot_rx) = watch::channel(engine.snapshot());
        let (sample_tx, sample_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(session_loop(engine, sample_rx, command_rx, snapshot_tx));

        self.active = Some(ActiveSession {
            sample_tx,
            command_tx,
            snapshot_rx,
            rejected: AtomicU64::new(0),
            task,
        });
        tracing::info!("Recording session started");
        Ok(())
    }

    /// Deliver one event from the sensor feed.
    ///
    /// Events with fewer than three components are rejected with
    /// [`KineticError::MalformedSample`], and events with a NaN or infinite
    /// component with [`KineticError::NonFiniteSample`]. Either leaves all
    /// state untouched.
    /// Events arriving while stopped are dropped.
    pub fn push(&self, event: &SensorEvent) -> Result<()> {
        let Some(active) = &self.active else {
            tracing::trace!(kind = %event.kind, "Session not running, event dropped");
            return Ok(());
        };

        let sample = Sample::try_from(event).inspect_err(|_| {
            active.rejected.fetch_add(1, Ordering::Relaxed);
        })?;

        if active.sample_tx.send(sample).is_err() {
            tracing::warn!("Session task exited, sample dropped");
        }
        Ok(())
    }

    /// Latest published state, `None` while stopped.
    pub fn snapshot(&self) -> Option<Snapshot> {
        self.active.as_ref().map(|a| *a.snapshot_rx.borrow())
    }

    /// Receiver that observes every published snapshot.
    pub fn subscribe(&self) -> Option<watch::Receiver<Snapshot>> {
        self.active.as_ref().map(|a| a.snapshot_rx.clone())
    }

    /// Discard the drift correction and calibrate again.
    pub fn recalibrate(&self) {
        if let Some(active) = &self.active {
            let _ = active.command_tx.send(SessionCommand::Recalibrate);
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Stop recording, process everything already pushed, and close the log.
    ///
    /// Returns `None` if the session was not running.
    pub async fn stop(&mut self) -> Option<SessionSummary> {
        let ActiveSession {
            sample_tx,
            command_tx,
            rejected,
            task,
            ..
        } = self.active.take()?;

        // Closing the channels ends the task once the queue is drained.
        drop(sample_tx);
        drop(command_tx);

        match task.await {
            Ok(mut summary) => {
                summary.rejected_samples = rejected.into_inner();
                tracing::info!(
                    gyro_samples = summary.gyro_samples,
                    accel_samples = summary.accel_samples,
                    rejected_samples = summary.rejected_samples,
                    log_records = summary.log_records,
                    "Recording session stopped"
                );
                Some(summary)
            }
            Err(e) => {
                tracing::error!(?e, "Session task failed");
                None
            }
        }
    }
}

/// Background task: apply samples and commands, publish snapshots.
async fn session_loop(
    mut engine: OrientationEngine,
    mut sample_rx: mpsc::UnboundedReceiver<Sample>,
    mut command_rx: mpsc::UnboundedReceiver<SessionCommand>,
    snapshot_tx: watch::Sender<Snapshot>,
) -> SessionSummary {
    loop {
        tokio::select! {
            biased;
            Some(cmd) = command_rx.recv() => {
                match cmd {
                    SessionCommand::Recalibrate => engine.recalibrate(),
                }
                let _ = snapshot_tx.send(engine.snapshot());
            }
            sample = sample_rx.recv() => {
                match sample {
                    Some(sample) => {
                        engine.process(&sample);
                        let _ = snapshot_tx.send(engine.snapshot());
                    }
                    None => break,
                }
            }
        }
    }

    engine.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationPolicy;
    use crate::types::EngineState;
    use std::f64::consts::PI;

    struct Device(&'static [SensorKind]);

    impl SensorProvider for Device {
        fn has_sensor(&self, kind: SensorKind) -> bool {
            self.0.contains(&kind)
        }
    }

    const FULL: Device = Device(&[SensorKind::Accelerometer, SensorKind::Gyroscope]);

    fn gyro(t: u64, x: f64, y: f64, z: f64) -> SensorEvent {
        SensorEvent::new(SensorKind::Gyroscope, t, vec![x, y, z])
    }

    fn accel(t: u64, x: f64, y: f64, z: f64) -> SensorEvent {
        SensorEvent::new(SensorKind::Accelerometer, t, vec![x, y, z])
    }

    #[tokio::test]
    async fn missing_gyroscope_blocks_start() {
        let mut session = RecordingSession::new(SessionConfig::default());
        let err = session
            .start(&Device(&[SensorKind::Accelerometer]))
            .unwrap_err();

        assert!(matches!(
            err,
            KineticError::SensorUnavailable(SensorKind::Gyroscope)
        ));
        assert!(!session.is_running());
        assert!(session.snapshot().is_none());
    }

    #[tokio::test]
    async fn failed_start_creates_no_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orientation.csv");
        let mut session = RecordingSession::new(SessionConfig {
            log_path: Some(path.clone()),
            ..SessionConfig::default()
        });

        assert!(session.start(&Device(&[])).is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn stop_without_start_is_noop() {
        let mut session = RecordingSession::new(SessionConfig::default());
        assert!(session.stop().await.is_none());
        assert!(session.stop().await.is_none());
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let mut session = RecordingSession::new(SessionConfig::default());
        session.start(&FULL).unwrap();
        session.start(&FULL).unwrap();
        assert!(session.is_running());

        assert!(session.stop().await.is_some());
        assert!(session.stop().await.is_none());
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn records_orientation_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orientation.csv");
        let mut session = RecordingSession::new(SessionConfig {
            engine: EngineConfig {
                noise_threshold: 0.0,
                ..EngineConfig::default()
            },
            log_path: Some(path.clone()),
        });
        session.start(&FULL).unwrap();

        session.push(&accel(0, 0.0, 0.0, 9.8)).unwrap();
        session.push(&gyro(0, PI / 180.0, 0.0, 0.0)).unwrap();
        session
            .push(&gyro(1_000_000_000, PI / 180.0, 0.0, 0.0))
            .unwrap();

        let summary = session.stop().await.unwrap();
        assert_eq!(summary.gyro_samples, 2);
        assert_eq!(summary.accel_samples, 1);
        assert_eq!(summary.log_records, 2);
        assert!((summary.final_angle.x - 1.0).abs() < 1e-9);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "Time,Pitch (x),Yaw (y),Roll (z)");
        assert_eq!(lines[1], "0.0, 0.0, 0.0, 0.0");
        assert!(lines[2].starts_with("1.0, 1.0"));
    }

    #[tokio::test]
    async fn malformed_events_are_rejected() {
        let mut session = RecordingSession::new(SessionConfig::default());
        session.start(&FULL).unwrap();

        let short = SensorEvent::new(SensorKind::Gyroscope, 5, vec![1.0, 2.0]);
        assert!(matches!(
            session.push(&short),
            Err(KineticError::MalformedSample { components: 2, .. })
        ));

        session.push(&gyro(0, 0.0, 0.0, 0.0)).unwrap();
        assert!(matches!(
            session.push(&gyro(500_000_000, f64::NAN, 0.0, 0.0)),
            Err(KineticError::NonFiniteSample { .. })
        ));
        session.push(&gyro(1_000_000_000, 1.0, 0.0, 0.0)).unwrap();

        let summary = session.stop().await.unwrap();
        assert_eq!(summary.rejected_samples, 2);
        assert_eq!(summary.gyro_samples, 2);
        let pitch = summary.final_angle.x;
        assert!((0.0..360.0).contains(&pitch));
        assert!((pitch - 1.0_f64.to_degrees()).abs() < 1e-9);
    }

    #[tokio::test]
    async fn events_while_stopped_are_dropped() {
        let session = RecordingSession::new(SessionConfig::default());
        assert!(session.push(&gyro(0, 1.0, 0.0, 0.0)).is_ok());
        assert!(session.snapshot().is_none());
    }

    #[tokio::test]
    async fn unwritable_log_keeps_tracking() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"").unwrap();

        let mut session = RecordingSession::new(SessionConfig {
            log_path: Some(blocker.join("orientation.csv")),
            ..SessionConfig::default()
        });
        session.start(&FULL).unwrap();
        session.push(&gyro(0, 1.0, 0.0, 0.0)).unwrap();
        session.push(&gyro(1_000_000_000, 1.0, 0.0, 0.0)).unwrap();

        let summary = session.stop().await.unwrap();
        assert_eq!(summary.log_records, 0);
        assert!(summary.final_angle.x > 57.0);
    }

    #[tokio::test]
    async fn subscribers_see_whole_snapshots() {
        let mut session = RecordingSession::new(SessionConfig {
            engine: EngineConfig {
                calibration: CalibrationPolicy::FirstSample,
                ..EngineConfig::default()
            },
            log_path: None,
        });
        session.start(&FULL).unwrap();
        let mut rx = session.subscribe().unwrap();
        assert_eq!(rx.borrow().state, EngineState::Calibrating);

        session.push(&accel(0, 0.0, 0.0, 9.8)).unwrap();
        let snapshot = *rx.wait_for(|s| s.accel.z > 0.0).await.unwrap();
        assert_eq!(snapshot.state, EngineState::Measuring);
        assert!(snapshot.calibrated);

        session.recalibrate();
        let snapshot = *rx
            .wait_for(|s| s.state == EngineState::Calibrating)
            .await
            .unwrap();
        assert!(!snapshot.calibrated);

        session.stop().await.unwrap();
    }
}
