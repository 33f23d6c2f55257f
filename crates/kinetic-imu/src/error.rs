use crate::types::SensorKind;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KineticError {
    /// Logging is disabled for the session; orientation tracking continues.
    #[error("Orientation log unavailable at {path:?}: {source}")]
    LogFileUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The event was dropped without touching any state.
    #[error("Malformed {kind} sample: expected 3 components, got {components}")]
    MalformedSample { kind: SensorKind, components: usize },
    /// A component was NaN or infinite; dropped like a malformed sample.
    #[error("Non-finite {kind} sample: {values:?}")]
    NonFiniteSample { kind: SensorKind, values: [f64; 3] },
    /// The session did not start.
    #[error("Required sensor not available: {0}")]
    SensorUnavailable(SensorKind),
}

pub type Result<T> = std::result::Result<T, KineticError>;
