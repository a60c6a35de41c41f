use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MonitorError {
    #[error("device is not calibrated")]
    NotCalibrated,
    #[error("probe produced no readings")]
    EmptySample,
    #[error("calibration bounds are degenerate: dry and wet both read {raw}")]
    DegenerateBounds { raw: u16 },
    #[error("dry raw {dry_raw} must exceed wet raw {wet_raw}")]
    BoundsReversed { dry_raw: u16, wet_raw: u16 },
    #[error("probe error: {0}")]
    Probe(String),
    #[error("probe fault: {0}")]
    ProbeFault(String),
    #[error("button error: {0}")]
    Button(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("calibration store error: {0}")]
    Store(String),
    #[error("moisture percentage {0} is out of range")]
    PercentOutOfRange(u8),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing probe")]
    MissingProbe,
    #[error("missing button")]
    MissingButton,
    #[error("missing indicator")]
    MissingIndicator,
    #[error("missing publisher")]
    MissingPublisher,
    #[error("missing calibration store")]
    MissingStore,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
