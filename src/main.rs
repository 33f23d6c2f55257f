use anyhow::{anyhow, Context, Result};
use clap::Parser;
use kinetic_config::{AppConfig, CalibrationMode, ImuConfig};
use kinetic_imu::calibration::CalibrationPolicy;
use kinetic_imu::engine::EngineConfig;
use kinetic_imu::replay::ReplayFeed;
use kinetic_imu::types::{SensorEvent, Snapshot};
use kinetic_imu::{RecordingSession, SessionConfig};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Recorded sensor feed, one `kind,timestamp_ns,x,y,z` event per line
    replay: Option<PathBuf>,

    /// Configuration file path (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Orientation CSV destination, overrides the config file
    #[arg(short, long)]
    log: Option<PathBuf>,

    /// Do not write the orientation CSV
    #[arg(long, conflicts_with = "log")]
    no_log: bool,

    /// Pace the replay by event timestamps instead of as fast as possible
    #[arg(long)]
    realtime: bool,

    /// Write a default config file and exit
    #[arg(long)]
    write_default_config: bool,
}

fn engine_config(imu: &ImuConfig) -> EngineConfig {
    let calibration = match imu.calibration.policy {
        CalibrationMode::FirstSample => CalibrationPolicy::FirstSample,
        CalibrationMode::Settled => CalibrationPolicy::Settled {
            samples: imu.calibration.stable_samples,
            tolerance: imu.calibration.tolerance,
        },
    };
    EngineConfig {
        noise_threshold: imu.noise_threshold,
        normalize_angles: imu.normalize_angles,
        calibration,
    }
}

/// Deliver replayed events to the session, optionally at their recorded pace.
async fn replay(session: &RecordingSession, events: &[SensorEvent], realtime: bool) {
    let mut previous: Option<u64> = None;

    for (i, event) in events.iter().enumerate() {
        if realtime {
            if let Some(prev) = previous {
                let gap = event.timestamp_ns.saturating_sub(prev);
                if gap > 0 {
                    tokio::time::sleep(Duration::from_nanos(gap)).await;
                }
            }
            previous = Some(event.timestamp_ns);
        } else if i % 1000 == 0 {
            // Let the display task run between bursts.
            tokio::task::yield_now().await;
        }

        if let Err(e) = session.push(event) {
            warn!(%e, "Dropping sensor event");
        }
    }
}

/// Periodically show the latest orientation.
async fn display_loop(snapshots: watch::Receiver<Snapshot>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut shown: Option<Snapshot> = None;

    loop {
        ticker.tick().await;
        let snapshot = *snapshots.borrow();
        if shown == Some(snapshot) {
            continue;
        }

        let earth = snapshot.earth_accel.unwrap_or_default();
        info!(
            pitch = format!("{:.2}", snapshot.angle.x),
            yaw = format!("{:.2}", snapshot.angle.y),
            roll = format!("{:.2}", snapshot.angle.z),
            accel_x = format!("{:.3}", snapshot.accel.x),
            accel_y = format!("{:.3}", snapshot.accel.y),
            accel_z = format!("{:.3}", snapshot.accel.z),
            earth_z = format!("{:.3}", earth.z),
            state = ?snapshot.state,
            "Orientation"
        );
        shown = Some(snapshot);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "kinetic_sensors=info,kinetic_imu=info,kinetic_config=info".into()
            }),
        )
        .init();

    let args = Args::parse();

    if args.write_default_config {
        let defaults = AppConfig::default();
        let path = match &args.config {
            Some(path) => {
                kinetic_config::save_config_to(&defaults, path)?;
                path.clone()
            }
            None => kinetic_config::save_config(&defaults)?,
        };
        info!(?path, "Default config written");
        return Ok(());
    }

    // Load config. An explicit path must be readable; the default location may be absent or broken.
    let config = match &args.config {
        Some(path) => kinetic_config::load_config_from(path)?,
        None => kinetic_config::load_config().unwrap_or_else(|e| {
            warn!(?e, "Failed to load config, using defaults");
            AppConfig::default()
        }),
    };

    let replay_path = args
        .replay
        .as_ref()
        .ok_or_else(|| anyhow!("No replay file given (see --help)"))?;
    let data = tokio::fs::read(replay_path)
        .await
        .with_context(|| format!("Failed to read replay {}", replay_path.display()))?;
    let feed = ReplayFeed::from_bytes(&data);
    info!(path = ?replay_path, events = feed.len(), "Replay loaded");

    let log_path = if args.no_log {
        None
    } else if let Some(path) = &args.log {
        Some(path.clone())
    } else {
        config.log_path().unwrap_or_else(|e| {
            warn!(?e, "No log location available, logging disabled");
            None
        })
    };

    let mut session = RecordingSession::new(SessionConfig {
        engine: engine_config(&config.imu),
        log_path,
    });
    session.start(&feed)?;

    let snapshots = session
        .subscribe()
        .ok_or_else(|| anyhow!("Session stopped before display could attach"))?;
    let period = Duration::from_millis(config.display.refresh_interval_ms.max(1));
    let display = tokio::spawn(display_loop(snapshots, period));

    tokio::select! {
        _ = replay(&session, feed.events(), args.realtime) => info!("Replay finished"),
        _ = tokio::signal::ctrl_c() => info!("Interrupted, stopping session"),
    }

    let summary = session.stop().await;
    display.abort();

    if let Some(summary) = summary {
        info!(
            gyro_samples = summary.gyro_samples,
            accel_samples = summary.accel_samples,
            rejected_samples = summary.rejected_samples,
            log_records = summary.log_records,
            pitch = summary.final_angle.x,
            yaw = summary.final_angle.y,
            roll = summary.final_angle.z,
            "Final orientation"
        );
    }

    Ok(())
}
