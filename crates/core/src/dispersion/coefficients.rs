//! Pasquill-Gifford dispersion coefficients
//!
//! Spread parameters grow as a power law of downwind distance:
//!
//! ```text
//! σy = a_y · x^0.9
//! σz = a_z · x^0.9
//! ```
//!
//! The growth coefficients depend on the atmospheric stability class. Distance
//! is clamped to [`MIN_DISTANCE`] first so the source point itself never
//! produces a zero spread.
//!
//! # References
//!
//! - Pasquill, F. (1961). "The estimation of the dispersion of windborne material."
//!   Meteorological Magazine, 90, 33-49.
//! - Gifford, F.A. (1961). "Use of routine meteorological observations for
//!   estimating atmospheric dispersion." Nuclear Safety, 2(4), 47-51.

use serde::{Deserialize, Serialize};

/// Power-law exponent shared by both spread axes
pub const GROWTH_EXPONENT: f64 = 0.9;

/// Distance floor (m) applied before the power law
pub const MIN_DISTANCE: f64 = 1e-3;

/// Pasquill-Gifford atmospheric stability classes
///
/// Parsing is case-insensitive and deliberately lenient: any unrecognized
/// label resolves to [`StabilityClass::D`] (neutral) instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StabilityClass {
    /// A: Very unstable (strong solar heating, light winds)
    A,
    /// B: Moderately unstable
    B,
    /// C: Slightly unstable
    C,
    /// D: Neutral (overcast or high winds)
    #[default]
    D,
    /// E: Slightly stable
    E,
    /// F: Very stable (nighttime, light winds)
    F,
}

impl StabilityClass {
    /// All classes, most unstable first
    pub const ALL: [StabilityClass; 6] = [Self::A, Self::B, Self::C, Self::D, Self::E, Self::F];

    /// Parse a class label, falling back to D for anything unrecognized
    pub fn parse_or_default(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "A" => Self::A,
            "B" => Self::B,
            "C" => Self::C,
            "D" => Self::D,
            "E" => Self::E,
            "F" => Self::F,
            other => {
                tracing::debug!("Unknown stability class '{other}', using D");
                Self::D
            }
        }
    }

    /// Single-letter label
    pub const fn label(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::E => "E",
            Self::F => "F",
        }
    }

    /// Growth coefficients `(a_y, a_z)` for this class
    pub const fn growth_coefficients(self) -> (f64, f64) {
        match self {
            Self::A => (0.22, 0.20), // Very unstable - strong mixing
            Self::B => (0.16, 0.12),
            Self::C => (0.11, 0.08),
            Self::D => (0.08, 0.06), // Neutral
            Self::E => (0.06, 0.03),
            Self::F => (0.04, 0.016), // Very stable - suppressed vertical mixing
        }
    }

    /// Dispersion coefficients for this class
    pub const fn coefficients(self) -> DispersionCoefficients {
        let (a_y, a_z) = self.growth_coefficients();
        DispersionCoefficients { a_y, a_z }
    }
}

impl From<String> for StabilityClass {
    fn from(label: String) -> Self {
        Self::parse_or_default(&label)
    }
}

impl From<StabilityClass> for String {
    fn from(class: StabilityClass) -> Self {
        class.label().to_string()
    }
}

impl std::fmt::Display for StabilityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Crosswind and vertical spread at one downwind distance (m)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spread {
    /// Crosswind standard deviation σy
    pub sigma_y: f64,
    /// Vertical standard deviation σz
    pub sigma_z: f64,
    /// `dσ/dx / σ`, identical for both axes; zero inside the distance floor
    pub log_growth_rate: f64,
}

/// Power-law spread coefficients for one stability class
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispersionCoefficients {
    /// Crosswind growth coefficient
    pub a_y: f64,
    /// Vertical growth coefficient
    pub a_z: f64,
}

impl DispersionCoefficients {
    /// Spread at `distance` meters downwind
    ///
    /// Distances at or below [`MIN_DISTANCE`] (including negative, upwind
    /// values) are clamped to the floor.
    #[inline]
    pub fn spread(&self, distance: f64) -> Spread {
        let clamped = distance.max(MIN_DISTANCE);
        let growth = clamped.powf(GROWTH_EXPONENT);
        let log_growth_rate = if distance > MIN_DISTANCE {
            GROWTH_EXPONENT / distance
        } else {
            0.0
        };
        Spread {
            sigma_y: self.a_y * growth,
            sigma_z: self.a_z * growth,
            log_growth_rate,
        }
    }

    /// `(σy, σz)` for each distance in `distances`
    pub fn spread_many(&self, distances: &[f64]) -> Vec<(f64, f64)> {
        distances
            .iter()
            .map(|&d| {
                let s = self.spread(d);
                (s.sigma_y, s.sigma_z)
            })
            .collect()
    }
}
