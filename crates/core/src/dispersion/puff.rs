//! Instantaneous-release Gaussian puff
//!
//! A puff of total mass `Q` is carried downwind at speed `u` and spreads with
//! the distance it has travelled, `u·t`:
//!
//! ```text
//! C = Q / ((2π)^1.5 σy² σz)
//!     · exp(-(x - u t)² / 2σy²) · exp(-y² / 2σy²)
//!     · [exp(-(z_eff - H)² / 2σz²) + exp(-(z_eff + H)² / 2σz²)]
//!     · exp(-λ t)
//!
//! z_eff = z - v_s t
//! ```
//!
//! Horizontal spread is isotropic, so σy is reused along the wind. Only decay
//! removes mass from the puff; deposition velocity does not enter.

use crate::dispersion::coefficients::{Spread, StabilityClass};
use crate::dispersion::grid::{ConcentrationField, SimulationGrid};
use crate::dispersion::plume::RemovalRates;
use crate::dispersion::wind::WindFrame;
use crate::error::{ensure_finite, ensure_non_negative, PlumeError, PlumeResult};
use std::f64::consts::PI;

/// Inputs for a puff evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PuffParams {
    /// Total released mass Q (g)
    pub release_mass: f64,
    /// Wind speed u (m/s), must be > 0
    pub wind_speed: f64,
    /// Effective release height H (m)
    pub stack_height: f64,
    /// Atmospheric stability class
    pub stability: StabilityClass,
    /// Settling, deposition and decay
    pub removal: RemovalRates,
}

/// Validated puff model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PuffModel {
    params: PuffParams,
}

impl PuffModel {
    /// Validate `params` and build the model
    ///
    /// # Errors
    ///
    /// - [`PlumeError::DegenerateWind`] when `wind_speed` is not finite and positive
    /// - [`PlumeError::InvalidParameter`] for negative or non-finite inputs
    pub fn new(params: PuffParams) -> PlumeResult<Self> {
        if !params.wind_speed.is_finite() || params.wind_speed <= f64::EPSILON {
            return Err(PlumeError::DegenerateWind {
                speed: params.wind_speed,
            });
        }
        ensure_non_negative("release_mass", params.release_mass)?;
        ensure_finite("stack_height", params.stack_height)?;
        ensure_non_negative("stack_height", params.stack_height)?;
        params.removal.validate()?;
        Ok(Self { params })
    }

    /// Parameters the model was built with
    pub fn params(&self) -> &PuffParams {
        &self.params
    }

    /// Freeze the puff at `t` seconds after release
    ///
    /// # Errors
    ///
    /// Returns [`PlumeError::InvalidParameter`] for negative or non-finite `t`.
    pub fn at_time(&self, t: f64) -> PlumeResult<PuffSnapshot> {
        ensure_non_negative("time", t)?;
        let p = &self.params;
        let spread = p.stability.coefficients().spread(p.wind_speed * t);
        Ok(PuffSnapshot {
            time: t,
            centre: p.wind_speed * t,
            settling_offset: p.removal.settling_velocity * t,
            amplitude: p.release_mass
                / ((2.0 * PI).powf(1.5) * spread.sigma_y * spread.sigma_y * spread.sigma_z)
                * (-p.removal.decay_rate * t).exp(),
            stack_height: p.stack_height,
            spread,
        })
    }

    /// Concentration (g/m³) at a point in the wind-aligned frame at time `t`
    ///
    /// # Errors
    ///
    /// See [`PuffModel::at_time`].
    pub fn concentration(&self, x: f64, y: f64, z: f64, t: f64) -> PlumeResult<f64> {
        Ok(self.at_time(t)?.concentration(x, y, z))
    }
}

/// A puff frozen at one instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PuffSnapshot {
    /// Seconds since release
    pub time: f64,
    /// Downwind position of the puff centre, `u·t`
    pub centre: f64,
    settling_offset: f64,
    amplitude: f64,
    stack_height: f64,
    /// Spread evaluated at the travelled distance
    pub spread: Spread,
}

impl PuffSnapshot {
    /// Concentration (g/m³) at a point in the wind-aligned frame
    #[inline]
    pub fn concentration(&self, x: f64, y: f64, z: f64) -> f64 {
        let sy2 = self.spread.sigma_y * self.spread.sigma_y;
        let sz2 = self.spread.sigma_z * self.spread.sigma_z;
        let along = x - self.centre;
        let z_eff = z - self.settling_offset;
        let direct = z_eff - self.stack_height;
        let reflected = z_eff + self.stack_height;

        let horizontal = (-(along * along + y * y) / (2.0 * sy2)).exp();
        let vertical = (-direct * direct / (2.0 * sz2)).exp()
            + (-reflected * reflected / (2.0 * sz2)).exp();

        self.amplitude * horizontal * vertical
    }

    /// Concentration field over `grid` rotated into `frame`
    pub fn field(&self, grid: &SimulationGrid, frame: &WindFrame) -> ConcentrationField {
        grid.evaluate(frame, |x, y, z| self.concentration(x, y, z))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn puff() -> PuffModel {
        PuffModel::new(PuffParams {
            release_mass: 100.0,
            wind_speed: 4.0,
            stack_height: 5.0,
            stability: StabilityClass::C,
            removal: RemovalRates::default(),
        })
        .unwrap()
    }

    #[test]
    fn test_puff_centre_moves_with_wind() {
        let model = puff();
        let snap = model.at_time(25.0).unwrap();
        assert_eq!(snap.centre, 100.0);
        let at_centre = snap.concentration(100.0, 0.0, 5.0);
        let behind = snap.concentration(60.0, 0.0, 5.0);
        let ahead = snap.concentration(140.0, 0.0, 5.0);
        assert!(at_centre > behind && at_centre > ahead);
        assert_relative_eq!(behind, ahead, max_relative = 1e-12);
    }

    #[test]
    fn test_release_instant_uses_distance_floor() {
        let snap = puff().at_time(0.0).unwrap();
        assert!(snap.spread.sigma_y > 0.0);
        let c = snap.concentration(0.0, 0.0, 5.0);
        assert!(c.is_finite() && c > 0.0);
        assert_eq!(snap.concentration(10.0, 0.0, 5.0), 0.0);
    }

    #[test]
    fn test_decay_uses_elapsed_time() {
        let base = puff();
        let decaying = PuffModel::new(PuffParams {
            removal: RemovalRates {
                decay_rate: 0.01,
                ..RemovalRates::default()
            },
            ..*base.params()
        })
        .unwrap();
        let t = 30.0;
        let c0 = base.concentration(120.0, 2.0, 0.0, t).unwrap();
        let c1 = decaying.concentration(120.0, 2.0, 0.0, t).unwrap();
        assert_relative_eq!(c1 / c0, (-0.01_f64 * t).exp(), max_relative = 1e-12);
    }

    #[test]
    fn test_settling_shifts_receptor_height() {
        let base = puff();
        let settling = PuffModel::new(PuffParams {
            removal: RemovalRates {
                settling_velocity: 0.1,
                ..RemovalRates::default()
            },
            ..*base.params()
        })
        .unwrap();
        let t = 20.0;
        let shifted = settling.concentration(80.0, 1.0, 6.0, t).unwrap();
        let reference = base.concentration(80.0, 1.0, 6.0 - 0.1 * t, t).unwrap();
        assert_relative_eq!(shifted, reference, max_relative = 1e-12);
    }

    #[test]
    fn test_crosswind_symmetry_and_positivity() {
        let snap = puff().at_time(12.0).unwrap();
        for &(x, y) in &[(40.0, 3.0), (55.0, 9.0), (10.0, 0.2)] {
            let c = snap.concentration(x, y, 0.0);
            assert!(c >= 0.0);
            assert_eq!(c, snap.concentration(x, -y, 0.0));
        }
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        assert!(puff().at_time(-1.0).is_err());
        let err = PuffModel::new(PuffParams {
            wind_speed: 0.0,
            ..*puff().params()
        })
        .unwrap_err();
        assert!(matches!(err, PlumeError::DegenerateWind { .. }));
    }
}
