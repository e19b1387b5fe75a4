//! Scenario configuration
//!
//! A scenario bundles every externally supplied input of one forward or
//! inverse run. It deserializes from JSON with defaults for any missing field
//! and is validated as a whole before any model is evaluated.
//!
//! Plume and puff releases are described by different quantities (a rate in
//! g/s versus a total mass in g), so [`ModelKind`] carries each one in its
//! own variant.

use crate::dispersion::{
    GridSpec, PlumeModel, PlumeParams, PuffModel, PuffParams, RemovalRates, SimulationGrid,
    StabilityClass, WindFrame, WindVector,
};
use crate::error::{
    ensure_finite, ensure_non_negative, ensure_positive, PlumeError, PlumeResult,
};
use crate::geo::validate_origin;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Largest accepted number of puff frames, including the release frame
pub const MAX_FRAMES: usize = 10_000;

/// Which dispersion model a forward run evaluates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ModelKind {
    /// Continuous release
    Plume {
        /// Emission rate Q (g/s)
        emission_rate: f64,
    },
    /// Instantaneous release animated over time
    Puff {
        /// Total released mass Q (g)
        release_mass: f64,
        /// Last frame time (s)
        duration: f64,
        /// Spacing between frames (s)
        time_step: f64,
    },
}

impl Default for ModelKind {
    fn default() -> Self {
        Self::Plume { emission_rate: 1.0 }
    }
}

impl ModelKind {
    /// Default puff: 1 g released, frames every 5 s up to 100 s
    pub const fn default_puff() -> Self {
        Self::Puff {
            release_mass: 1.0,
            duration: 100.0,
            time_step: 5.0,
        }
    }

    /// Frame times `0, dt, 2dt, …` up to and including `duration`
    ///
    /// Empty for a plume.
    ///
    /// # Errors
    ///
    /// Returns [`PlumeError::InvalidParameter`] when the puff timing is invalid
    /// or asks for more than [`MAX_FRAMES`] frames.
    pub fn frame_times(&self) -> PlumeResult<Vec<f64>> {
        match *self {
            Self::Plume { .. } => Ok(Vec::new()),
            Self::Puff {
                duration,
                time_step,
                ..
            } => {
                let steps = frame_steps(duration, time_step)?;
                Ok((0..=steps).map(|i| i as f64 * time_step).collect())
            }
        }
    }

    fn validate(&self) -> PlumeResult<()> {
        match *self {
            Self::Plume { emission_rate } => {
                ensure_non_negative("emission_rate", emission_rate)?;
            }
            Self::Puff {
                release_mass,
                duration,
                time_step,
            } => {
                ensure_non_negative("release_mass", release_mass)?;
                frame_steps(duration, time_step)?;
            }
        }
        Ok(())
    }
}

/// Number of intervals after the `t = 0` frame
fn frame_steps(duration: f64, time_step: f64) -> PlumeResult<usize> {
    ensure_non_negative("duration", duration)?;
    ensure_positive("time_step", time_step)?;
    let steps = (duration / time_step + 1e-9).floor();
    if !steps.is_finite() || steps >= MAX_FRAMES as f64 {
        return Err(PlumeError::invalid(
            "time_step",
            time_step,
            "must give at most 10000 puff frames",
        ));
    }
    Ok(steps as usize)
}

/// Every externally supplied input of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Reference origin latitude (degrees)
    pub latitude: f64,
    /// Reference origin longitude (degrees)
    pub longitude: f64,
    /// Map zoom level, used only for overlay geometry
    pub zoom: u8,
    /// Wind vector (m/s)
    pub wind: WindVector,
    /// Effective release height H (m)
    pub stack_height: f64,
    /// Stability class; unknown labels resolve to D
    pub stability: StabilityClass,
    /// Settling, deposition and decay
    pub removal: RemovalRates,
    /// Plume or puff, with the matching release quantity
    pub model: ModelKind,
    /// Grid geometry
    pub grid: GridSpec,
    /// Receptor height Z (m)
    pub receptor_height: f64,
    /// Scale of the half-normal prior on observation noise (g/m³)
    pub noise_scale: f64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            latitude: 26.208938,
            longitude: 78.183051,
            zoom: 16,
            wind: WindVector::new(2.0, -3.0),
            stack_height: 10.0,
            stability: StabilityClass::A,
            removal: RemovalRates {
                settling_velocity: 0.01,
                deposition_velocity: 0.005,
                decay_rate: 0.001,
            },
            model: ModelKind::default(),
            grid: GridSpec::default(),
            receptor_height: 0.0,
            noise_scale: 5.0,
        }
    }
}

impl ScenarioConfig {
    /// Parse a scenario from JSON text
    ///
    /// # Errors
    ///
    /// Returns [`PlumeError::Config`] on malformed JSON. The result is not validated.
    pub fn from_json_str(text: &str) -> PlumeResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load a scenario from a JSON file
    ///
    /// # Errors
    ///
    /// Returns [`PlumeError::Io`] or [`PlumeError::Config`].
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> PlumeResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Serialize to pretty JSON
    ///
    /// # Errors
    ///
    /// Returns [`PlumeError::Config`] if serialization fails.
    pub fn to_json_string(&self) -> PlumeResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every field before any model is evaluated
    ///
    /// # Errors
    ///
    /// Returns the first [`PlumeError::InvalidParameter`] or
    /// [`PlumeError::DegenerateWind`] found.
    pub fn validate(&self) -> PlumeResult<()> {
        validate_origin(self.latitude, self.longitude, self.zoom)?;
        ensure_finite("wind.east", self.wind.east)?;
        ensure_finite("wind.north", self.wind.north)?;
        WindFrame::new(self.wind)?;
        ensure_non_negative("stack_height", self.stack_height)?;
        self.removal.validate()?;
        self.model.validate()?;
        self.grid.validate()?;
        ensure_finite("receptor_height", self.receptor_height)?;
        ensure_positive("noise_scale", self.noise_scale)?;
        Ok(())
    }

    /// Wind-aligned frame for the current wind
    ///
    /// # Errors
    ///
    /// Returns [`PlumeError::DegenerateWind`] for calm or non-finite wind.
    pub fn wind_frame(&self) -> PlumeResult<WindFrame> {
        WindFrame::new(self.wind)
    }

    /// Fresh grid for the current geometry
    ///
    /// # Errors
    ///
    /// Propagates grid validation failures.
    pub fn build_grid(&self) -> PlumeResult<SimulationGrid> {
        SimulationGrid::new(self.grid, self.receptor_height)
    }

    /// Plume model for this scenario at a given emission rate
    ///
    /// # Errors
    ///
    /// See [`PlumeModel::new`].
    pub fn plume_model(&self, emission_rate: f64) -> PlumeResult<PlumeModel> {
        PlumeModel::new(PlumeParams {
            emission_rate,
            wind_speed: self.wind_frame()?.speed(),
            stack_height: self.stack_height,
            stability: self.stability,
            removal: self.removal,
        })
    }

    /// Puff model for this scenario with a given release mass
    ///
    /// # Errors
    ///
    /// See [`PuffModel::new`].
    pub fn puff_model(&self, release_mass: f64) -> PlumeResult<PuffModel> {
        PuffModel::new(PuffParams {
            release_mass,
            wind_speed: self.wind_frame()?.speed(),
            stack_height: self.stack_height,
            stability: self.stability,
            removal: self.removal,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ScenarioConfig::default();
        config.validate().unwrap();
        assert_eq!(config.stability, StabilityClass::A);
        assert_eq!(config.grid.points_per_axis(), 1000);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{
            "wind": { "east": 5.0, "north": 0.0 },
            "stability": "d",
            "model": { "kind": "Puff", "release_mass": 20.0, "duration": 10.0, "time_step": 2.5 }
        }"#;
        let config = ScenarioConfig::from_json_str(json).unwrap();
        config.validate().unwrap();
        assert_eq!(config.stability, StabilityClass::D);
        assert_eq!(config.stack_height, 10.0);
        assert_eq!(config.model.frame_times().unwrap(), vec![0.0, 2.5, 5.0, 7.5, 10.0]);
    }

    #[test]
    fn test_json_round_trip() {
        let config = ScenarioConfig {
            model: ModelKind::default_puff(),
            ..ScenarioConfig::default()
        };
        let text = config.to_json_string().unwrap();
        assert_eq!(ScenarioConfig::from_json_str(&text).unwrap(), config);
    }

    #[test]
    fn test_default_puff_frames() {
        let times = ModelKind::default_puff().frame_times().unwrap();
        assert_eq!(times.len(), 21);
        assert_eq!(times[20], 100.0);
        assert!(ModelKind::default().frame_times().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_fields_rejected_before_evaluation() {
        let calm = ScenarioConfig {
            wind: WindVector::new(0.0, 0.0),
            ..ScenarioConfig::default()
        };
        assert!(matches!(
            calm.validate(),
            Err(PlumeError::DegenerateWind { .. })
        ));

        let negative_decay = ScenarioConfig {
            removal: RemovalRates {
                decay_rate: -1.0,
                ..RemovalRates::default()
            },
            ..ScenarioConfig::default()
        };
        assert!(negative_decay.validate().is_err());

        let bad_step = ScenarioConfig {
            model: ModelKind::Puff {
                release_mass: 1.0,
                duration: 10.0,
                time_step: 0.0,
            },
            ..ScenarioConfig::default()
        };
        assert!(bad_step.validate().is_err());

        assert!(ScenarioConfig::from_json_str("{ not json").is_err());
    }

    #[test]
    fn test_oversized_puff_schedule_rejected() {
        let runaway = ModelKind::Puff {
            release_mass: 1.0,
            duration: 1e300,
            time_step: 1e-300,
        };
        assert!(matches!(
            runaway.frame_times(),
            Err(PlumeError::InvalidParameter {
                name: "time_step",
                ..
            })
        ));
        let config = ScenarioConfig {
            model: runaway,
            ..ScenarioConfig::default()
        };
        assert!(config.validate().is_err());

        let at_cap = ModelKind::Puff {
            release_mass: 1.0,
            duration: (MAX_FRAMES - 1) as f64,
            time_step: 1.0,
        };
        assert_eq!(at_cap.frame_times().unwrap().len(), MAX_FRAMES);
        let over_cap = ModelKind::Puff {
            release_mass: 1.0,
            duration: MAX_FRAMES as f64,
            time_step: 1.0,
        };
        assert!(over_cap.frame_times().is_err());
    }

    #[test]
    fn test_oversized_grid_rejected() {
        let config = ScenarioConfig {
            grid: GridSpec {
                extent: 1e300,
                resolution: 1e-300,
            },
            ..ScenarioConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(config.build_grid().is_err());
    }
}
