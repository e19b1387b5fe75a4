//! Steady-state Gaussian plume with ground reflection and first-order losses
//!
//! # Theory
//!
//! For a continuous point release of rate `Q` at effective height `H` in a
//! uniform wind `u`, the concentration at downwind distance `x`, crosswind
//! offset `y` and height `z` is:
//!
//! ```text
//! C = Q / (2π u σy σz)
//!     · exp(-y² / 2σy²)
//!     · [exp(-(z_eff - H)² / 2σz²) + exp(-(z_eff + H)² / 2σz²)]
//!     · exp(-λ x / u) · exp(-v_d x / u)
//!
//! z_eff = z - v_s x / u
//! ```
//!
//! The second vertical term is the image source below ground that makes the
//! ground a zero-flux boundary. Settling (`v_s`) enters as a shift of the
//! receptor height by `v_s` times the travel time `x / u`; decay (`λ`) and
//! deposition (`v_d`) remove mass over the same travel time.
//!
//! Upwind of the source (`x ≤ 0`) the model is not physical. The distance
//! floor in [`DispersionCoefficients::spread`] keeps it finite there, and the
//! removal terms use the downwind travel `max(x, 0)` so no factor can grow.
//!
//! # References
//!
//! - Turner, D.B. (1994). "Workbook of Atmospheric Dispersion Estimates", 2nd ed.
//! - Seinfeld, J.H. & Pandis, S.N. (2016). "Atmospheric Chemistry and Physics",
//!   ch. 18.

use crate::dispersion::coefficients::{DispersionCoefficients, StabilityClass};
use crate::dispersion::grid::{ConcentrationField, SimulationGrid};
use crate::dispersion::wind::WindFrame;
use crate::error::{ensure_finite, ensure_non_negative, PlumeError, PlumeResult};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Removal processes shared by the plume and puff models
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemovalRates {
    /// Gravitational settling velocity v_s (m/s)
    pub settling_velocity: f64,
    /// Dry deposition velocity v_d (m/s)
    pub deposition_velocity: f64,
    /// First-order decay constant λ (1/s)
    pub decay_rate: f64,
}

impl RemovalRates {
    /// Check all rates are finite and non-negative
    ///
    /// # Errors
    ///
    /// Returns [`PlumeError::InvalidParameter`] naming the first bad rate.
    pub fn validate(&self) -> PlumeResult<()> {
        ensure_non_negative("settling_velocity", self.settling_velocity)?;
        ensure_non_negative("deposition_velocity", self.deposition_velocity)?;
        ensure_non_negative("decay_rate", self.decay_rate)?;
        Ok(())
    }
}

/// Inputs for a steady-state plume evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlumeParams {
    /// Emission rate Q (g/s)
    pub emission_rate: f64,
    /// Wind speed u (m/s), must be > 0
    pub wind_speed: f64,
    /// Effective release height H (m)
    pub stack_height: f64,
    /// Atmospheric stability class
    pub stability: StabilityClass,
    /// Settling, deposition and decay
    pub removal: RemovalRates,
}

/// Concentration per unit emission rate and its spatial derivatives
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlumeResponse {
    /// `C / Q` (s/m³)
    pub value: f64,
    /// `∂(C/Q)/∂x` along the downwind axis
    pub d_dx: f64,
    /// `∂(C/Q)/∂y` along the crosswind axis
    pub d_dy: f64,
}

/// Validated steady-state plume
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlumeModel {
    params: PlumeParams,
    coefficients: DispersionCoefficients,
}

impl PlumeModel {
    /// Validate `params` and build the model
    ///
    /// # Errors
    ///
    /// - [`PlumeError::DegenerateWind`] when `wind_speed` is not finite and positive
    /// - [`PlumeError::InvalidParameter`] for negative or non-finite Q, H or removal rates
    pub fn new(params: PlumeParams) -> PlumeResult<Self> {
        if !params.wind_speed.is_finite() || params.wind_speed <= f64::EPSILON {
            return Err(PlumeError::DegenerateWind {
                speed: params.wind_speed,
            });
        }
        ensure_non_negative("emission_rate", params.emission_rate)?;
        ensure_finite("stack_height", params.stack_height)?;
        ensure_non_negative("stack_height", params.stack_height)?;
        params.removal.validate()?;
        Ok(Self {
            params,
            coefficients: params.stability.coefficients(),
        })
    }

    /// Parameters the model was built with
    pub fn params(&self) -> &PlumeParams {
        &self.params
    }

    /// Concentration (g/m³) at a point in the wind-aligned frame
    #[inline]
    pub fn concentration(&self, x: f64, y: f64, z: f64) -> f64 {
        self.params.emission_rate * self.unit_response(x, y, z).value
    }

    /// Concentration per unit Q, with derivatives along x and y
    ///
    /// The derivative with respect to Q itself is just `value`.
    pub fn unit_response(&self, x: f64, y: f64, z: f64) -> PlumeResponse {
        let p = &self.params;
        let u = p.wind_speed;
        let h = p.stack_height;
        let spread = self.coefficients.spread(x);
        let (sy, sz, g) = (spread.sigma_y, spread.sigma_z, spread.log_growth_rate);
        let sy2 = sy * sy;
        let sz2 = sz * sz;

        // Mass is lost and settles only over downwind travel
        let travel = x.max(0.0);
        let d_travel = if x > 0.0 { 1.0 } else { 0.0 };

        let amplitude = 1.0 / (2.0 * PI * u * sy * sz);
        let loss_rate = (p.removal.decay_rate + p.removal.deposition_velocity) / u;
        let dz_eff = -p.removal.settling_velocity / u * d_travel;
        let z_eff = z - p.removal.settling_velocity / u * travel;
        let direct = z_eff - h;
        let reflected = z_eff + h;

        // One exponent per image; every term is <= 0
        let log_envelope = -y * y / (2.0 * sy2) - loss_rate * travel;
        let e_direct = (log_envelope - direct * direct / (2.0 * sz2)).exp();
        let e_reflected = (log_envelope - reflected * reflected / (2.0 * sz2)).exp();
        let value = amplitude * (e_direct + e_reflected);

        // d(ln)/dx of the amplitude, crosswind and loss factors
        let d_ln_dx = -2.0 * g + (y * y / sy2) * g - loss_rate * d_travel;
        let d_direct = -direct * dz_eff / sz2 + direct * direct / sz2 * g;
        let d_reflected = -reflected * dz_eff / sz2 + reflected * reflected / sz2 * g;

        PlumeResponse {
            value,
            d_dx: amplitude
                * (e_direct * (d_ln_dx + d_direct) + e_reflected * (d_ln_dx + d_reflected)),
            d_dy: value * (-y / sy2),
        }
    }

    /// Concentration field over `grid` rotated into `frame`
    ///
    /// The frame's speed is used for rotation only; the model's own wind speed
    /// drives the physics.
    pub fn field(&self, grid: &SimulationGrid, frame: &WindFrame) -> ConcentrationField {
        grid.evaluate(frame, |x, y, z| self.concentration(x, y, z))
    }
}
