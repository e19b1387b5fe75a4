//! Error types shared by the physics, ingestion and inversion layers
//!
//! Failures inside the physics equations (degenerate wind, non-finite inputs)
//! are surfaced immediately. Failures of presentational collaborators such as
//! tile fetching are represented here too, but callers recover from them
//! locally instead of propagating them.

use std::path::PathBuf;
use thiserror::Error;

/// Crate-wide result alias
pub type PlumeResult<T> = Result<T, PlumeError>;

/// Errors produced by the dispersion core
#[derive(Debug, Error)]
pub enum PlumeError {
    /// A scenario or sampler parameter is non-finite or out of range
    #[error("invalid parameter `{name}` = {value}: {reason}")]
    InvalidParameter {
        /// Field name as it appears in the configuration
        name: &'static str,
        /// Offending value
        value: f64,
        /// Why the value was rejected
        reason: &'static str,
    },

    /// Wind speed is zero or not finite, so every `x / u` term is undefined
    #[error("degenerate wind: speed {speed} m/s (must be finite and > 0)")]
    DegenerateWind {
        /// Computed wind speed
        speed: f64,
    },

    /// A computed field contains NaN or infinite cells
    #[error("concentration field has {cells} non-finite cells")]
    NonFiniteField {
        /// Number of offending cells
        cells: usize,
    },

    /// The observation session holds no data
    #[error("no sensor data loaded")]
    NoObservationsLoaded,

    /// A dataset was read but none of its rows were usable
    #[error("no valid rows parsed from {path:?} ({rows_seen} data rows seen)")]
    NoValidRows {
        /// Source of the dataset (`<memory>` for in-memory text)
        path: PathBuf,
        /// Number of non-header, non-comment rows examined
        rows_seen: usize,
    },

    /// A row could not be parsed in strict mode
    #[error("malformed sensor row at line {line}: {message}")]
    MalformedRow {
        /// One-based line number
        line: usize,
        /// Parse diagnostic
        message: String,
    },

    /// Underlying IO failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Scenario configuration could not be parsed
    #[error("failed to parse scenario config: {0}")]
    Config(#[from] serde_json::Error),

    /// An inversion run was cancelled before completion
    #[error("inversion run was cancelled")]
    Cancelled,

    /// The background inference thread panicked
    #[error("inversion worker panicked")]
    TaskPanicked,

    /// A basemap tile could not be retrieved
    #[error("tile fetch failed at ({x}, {y}) zoom {zoom}: {message}")]
    TileFetch {
        /// Tile column
        x: i64,
        /// Tile row
        y: i64,
        /// Zoom level
        zoom: u8,
        /// Provider diagnostic
        message: String,
    },
}

impl PlumeError {
    /// Shorthand for [`PlumeError::InvalidParameter`]
    pub(crate) fn invalid(name: &'static str, value: f64, reason: &'static str) -> Self {
        Self::InvalidParameter {
            name,
            value,
            reason,
        }
    }
}

/// Reject non-finite or negative values
pub(crate) fn ensure_non_negative(name: &'static str, value: f64) -> PlumeResult<f64> {
    if !value.is_finite() {
        return Err(PlumeError::invalid(name, value, "must be finite"));
    }
    if value < 0.0 {
        return Err(PlumeError::invalid(name, value, "must be >= 0"));
    }
    Ok(value)
}

/// Reject non-finite or non-positive values
pub(crate) fn ensure_positive(name: &'static str, value: f64) -> PlumeResult<f64> {
    if !value.is_finite() {
        return Err(PlumeError::invalid(name, value, "must be finite"));
    }
    if value <= 0.0 {
        return Err(PlumeError::invalid(name, value, "must be > 0"));
    }
    Ok(value)
}

/// Reject non-finite values
pub(crate) fn ensure_finite(name: &'static str, value: f64) -> PlumeResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(PlumeError::invalid(name, value, "must be finite"))
    }
}
