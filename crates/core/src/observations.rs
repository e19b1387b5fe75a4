//! Sensor observations and the session that owns them
//!
//! Datasets are delimited text: a header row, then
//! `latitude, longitude, concentration` per row. Extra columns are ignored.
//!
//! [`ObservationSession`] is the single writer of the current observation
//! set. Loads parse entirely outside the lock and swap the finished set in,
//! so a reader taking a [`snapshot`](ObservationSession::snapshot) sees either
//! the old set or the new one, never a partial load.

use crate::error::{PlumeError, PlumeResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// One measured concentration at a geographic point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorObservation {
    /// Latitude (degrees)
    pub latitude: f64,
    /// Longitude (degrees)
    pub longitude: f64,
    /// Measured concentration (g/m³)
    pub concentration: f64,
}

/// How a sensor dataset is split and how bad rows are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvOptions {
    /// Column delimiter
    pub delimiter: char,
    /// Lines starting with this (after trimming) are skipped
    pub comment_prefix: char,
    /// Fail on the first bad row instead of skipping it
    pub strict: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: ',',
            comment_prefix: '#',
            strict: false,
        }
    }
}

/// Parse a sensor dataset from text
///
/// The first line is always treated as a header. `source` only labels
/// diagnostics.
///
/// # Errors
///
/// - [`PlumeError::MalformedRow`] on the first bad row when `options.strict`
/// - [`PlumeError::NoValidRows`] when nothing usable remains
pub fn parse_observations(
    content: &str,
    options: &CsvOptions,
    source: &Path,
) -> PlumeResult<Vec<SensorObservation>> {
    let mut observations = Vec::new();
    let mut rows_seen = 0;
    let mut skipped = 0;

    for (index, line) in content.lines().enumerate().skip(1) {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with(options.comment_prefix) {
            continue;
        }
        rows_seen += 1;

        match parse_row(trimmed, options.delimiter) {
            Ok(obs) => observations.push(obs),
            Err(message) => {
                if options.strict {
                    return Err(PlumeError::MalformedRow {
                        line: index + 1,
                        message,
                    });
                }
                warn!("{}:{}: skipping row: {}", source.display(), index + 1, message);
                skipped += 1;
            }
        }
    }

    if observations.is_empty() {
        return Err(PlumeError::NoValidRows {
            path: source.to_path_buf(),
            rows_seen,
        });
    }
    if skipped > 0 {
        warn!(
            "{}: kept {} of {} rows ({} skipped)",
            source.display(),
            observations.len(),
            rows_seen,
            skipped
        );
    }
    Ok(observations)
}

fn parse_row(line: &str, delimiter: char) -> Result<SensorObservation, String> {
    let mut fields = line.split(delimiter).map(str::trim);
    let mut next = |name: &str| -> Result<f64, String> {
        let raw = fields
            .next()
            .ok_or_else(|| format!("missing {name} column"))?;
        let value: f64 = raw
            .parse()
            .map_err(|_| format!("{name} '{raw}' is not a number"))?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(format!("{name} '{raw}' is not finite"))
        }
    };

    Ok(SensorObservation {
        latitude: next("latitude")?,
        longitude: next("longitude")?,
        concentration: next("concentration")?,
    })
}

/// Owner of the current observation set
///
/// Cheap to share behind an `Arc`; snapshots are immutable and outlive any
/// later load or clear.
#[derive(Debug, Default)]
pub struct ObservationSession {
    current: RwLock<Option<Arc<[SensorObservation]>>>,
}

impl ObservationSession {
    /// Empty session
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current set with the contents of a CSV file
    ///
    /// On failure the previous set is left untouched.
    ///
    /// # Errors
    ///
    /// [`PlumeError::Io`] or any error from [`parse_observations`].
    pub fn load_csv<P: AsRef<Path>>(&self, path: P) -> PlumeResult<usize> {
        self.load_csv_with(path, &CsvOptions::default())
    }

    /// [`load_csv`](Self::load_csv) with explicit options
    ///
    /// # Errors
    ///
    /// See [`load_csv`](Self::load_csv).
    pub fn load_csv_with<P: AsRef<Path>>(
        &self,
        path: P,
        options: &CsvOptions,
    ) -> PlumeResult<usize> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let observations = parse_observations(&content, options, path)?;
        Ok(self.replace(observations))
    }

    /// Replace the current set with observations parsed from text
    ///
    /// # Errors
    ///
    /// See [`parse_observations`].
    pub fn load_str(&self, content: &str) -> PlumeResult<usize> {
        let observations =
            parse_observations(content, &CsvOptions::default(), &PathBuf::from("<memory>"))?;
        Ok(self.replace(observations))
    }

    /// Replace the current set with already-built observations
    ///
    /// An empty vector clears the session.
    pub fn replace(&self, observations: Vec<SensorObservation>) -> usize {
        let count = observations.len();
        let next = if observations.is_empty() {
            None
        } else {
            Some(Arc::from(observations))
        };
        *self.current.write() = next;
        info!("Observation session now holds {} sensors", count);
        count
    }

    /// Drop the current set
    pub fn clear(&self) {
        *self.current.write() = None;
    }

    /// Immutable view of the current set
    ///
    /// # Errors
    ///
    /// [`PlumeError::NoObservationsLoaded`] when the session is empty.
    pub fn snapshot(&self) -> PlumeResult<Arc<[SensorObservation]>> {
        self.current
            .read()
            .clone()
            .ok_or(PlumeError::NoObservationsLoaded)
    }

    /// Number of observations currently held
    pub fn len(&self) -> usize {
        self.current.read().as_ref().map_or(0, |set| set.len())
    }

    /// Whether the session holds no data
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
