//! Log-posterior of the source parameters and its gradient
//!
//! The sampler works on `θ = (a, b, c, d)` with
//!
//! ```text
//! x_src = x_lo + (x_hi - x_lo)·sigmoid(a)     uniform prior
//! y_src = y_lo + (y_hi - y_lo)·sigmoid(b)     uniform prior
//! Q     = exp(c)                              LogNormal(μ_Q, s_Q)
//! σ_obs = exp(d)                              HalfNormal(s_σ)
//! ```
//!
//! and the likelihood `obs_i ~ Normal(Q·f(R·(X_i - x_src, Y_i - y_src)), σ_obs)`
//! where `f` is the unit-rate plume and `R` the wind rotation. Constant terms
//! are dropped throughout.

use super::nuts::LogDensity;
use super::transform::BoundedTransform;
use crate::dispersion::{PlumeModel, WindFrame};
use crate::error::{ensure_finite, ensure_positive, PlumeError, PlumeResult};
use crate::geo::GridCell;
use nalgebra::Vector4;
use serde::{Deserialize, Serialize};

/// Index of `x_src` in the parameter vector
pub const X_SRC: usize = 0;
/// Index of `y_src`
pub const Y_SRC: usize = 1;
/// Index of `Q`
pub const EMISSION: usize = 2;
/// Index of `σ_obs`
pub const SIGMA_OBS: usize = 3;

/// One observation pinned to its grid cell
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocatedObservation {
    /// Cell the sensor snapped to
    pub cell: GridCell,
    /// Unrotated grid x of that cell (m)
    pub x: f64,
    /// Unrotated grid y of that cell (m)
    pub y: f64,
    /// Measured concentration (g/m³)
    pub observed: f64,
}

/// Log-normal prior in terms of `ln Q`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogNormalPrior {
    /// Mean of `ln Q`
    pub log_mean: f64,
    /// Standard deviation of `ln Q`
    pub log_sd: f64,
}

impl Default for LogNormalPrior {
    fn default() -> Self {
        Self {
            log_mean: 50.0_f64.ln(),
            log_sd: 1.0,
        }
    }
}

/// Constrained view of one point in parameter space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceSample {
    /// Source easting in grid coordinates (m)
    pub x_src: f64,
    /// Source northing in grid (image) coordinates (m)
    pub y_src: f64,
    /// Emission rate (g/s)
    pub emission_rate: f64,
    /// Observation noise scale (g/m³)
    pub sigma_obs: f64,
}

/// Posterior over the source location, rate and noise for a fixed scenario
#[derive(Debug, Clone)]
pub struct SourceModel {
    observations: Vec<LocatedObservation>,
    unit_plume: PlumeModel,
    frame: WindFrame,
    receptor_height: f64,
    x_bounds: BoundedTransform,
    y_bounds: BoundedTransform,
    q_prior: LogNormalPrior,
    noise_scale: f64,
}

impl SourceModel {
    /// Assemble the posterior
    ///
    /// `unit_plume` must have an emission rate of 1; it supplies the
    /// per-unit-rate response the likelihood scales by `Q`.
    ///
    /// # Errors
    ///
    /// - [`PlumeError::NoObservationsLoaded`] for an empty observation set
    /// - [`PlumeError::InvalidParameter`] for a non-unit plume, bad priors or
    ///   non-finite observations
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        observations: Vec<LocatedObservation>,
        unit_plume: PlumeModel,
        frame: WindFrame,
        receptor_height: f64,
        x_bounds: BoundedTransform,
        y_bounds: BoundedTransform,
        q_prior: LogNormalPrior,
        noise_scale: f64,
    ) -> PlumeResult<Self> {
        if observations.is_empty() {
            return Err(PlumeError::NoObservationsLoaded);
        }
        let rate = unit_plume.params().emission_rate;
        if rate != 1.0 {
            return Err(PlumeError::invalid(
                "emission_rate",
                rate,
                "likelihood plume must have unit rate",
            ));
        }
        for obs in &observations {
            ensure_finite("observed concentration", obs.observed)?;
        }
        ensure_finite("receptor_height", receptor_height)?;
        ensure_finite("q_prior.log_mean", q_prior.log_mean)?;
        ensure_positive("q_prior.log_sd", q_prior.log_sd)?;
        ensure_positive("noise_scale", noise_scale)?;

        Ok(Self {
            observations,
            unit_plume,
            frame,
            receptor_height,
            x_bounds,
            y_bounds,
            q_prior,
            noise_scale,
        })
    }

    /// Observations in likelihood order
    pub fn observations(&self) -> &[LocatedObservation] {
        &self.observations
    }

    /// Map an unconstrained vector to source parameters
    pub fn constrain(&self, theta: &Vector4<f64>) -> SourceSample {
        SourceSample {
            x_src: self.x_bounds.constrain(theta[X_SRC]),
            y_src: self.y_bounds.constrain(theta[Y_SRC]),
            emission_rate: theta[EMISSION].exp(),
            sigma_obs: theta[SIGMA_OBS].exp(),
        }
    }

    /// Inverse of [`constrain`](Self::constrain); coordinates must be strictly inside their bounds
    pub fn unconstrain(&self, sample: &SourceSample) -> Vector4<f64> {
        Vector4::new(
            self.x_bounds.unconstrain(sample.x_src),
            self.y_bounds.unconstrain(sample.y_src),
            sample.emission_rate.ln(),
            sample.sigma_obs.ln(),
        )
    }

    /// Centre of the source box, prior median rate, noise at half its prior scale
    pub fn initial_point(&self) -> Vector4<f64> {
        Vector4::new(
            0.0,
            0.0,
            self.q_prior.log_mean,
            (0.5 * self.noise_scale).ln(),
        )
    }

    /// Predicted concentration at every sensor for a candidate source
    pub fn predict(&self, sample: &SourceSample) -> Vec<f64> {
        self.observations
            .iter()
            .map(|obs| {
                let (xr, yr) = self.frame.rotate(obs.x - sample.x_src, obs.y - sample.y_src);
                let response = self.unit_plume.unit_response(xr, yr, self.receptor_height);
                sample.emission_rate * response.value
            })
            .collect()
    }
}

impl LogDensity for SourceModel {
    fn log_density_and_gradient(&self, theta: &Vector4<f64>) -> (f64, Vector4<f64>) {
        let (a, b, c, d) = (theta[X_SRC], theta[Y_SRC], theta[EMISSION], theta[SIGMA_OBS]);
        let x_src = self.x_bounds.constrain(a);
        let y_src = self.y_bounds.constrain(b);
        let q = c.exp();
        let sigma = d.exp();
        let inv_var = 1.0 / (sigma * sigma);
        let jac = self.frame.source_jacobian();

        let mut sum_sq = 0.0;
        let mut d_q = 0.0;
        let mut d_xs = 0.0;
        let mut d_ys = 0.0;
        for obs in &self.observations {
            let (xr, yr) = self.frame.rotate(obs.x - x_src, obs.y - y_src);
            let response = self.unit_plume.unit_response(xr, yr, self.receptor_height);
            let residual = obs.observed - q * response.value;
            sum_sq += residual * residual;

            let weight = residual * inv_var;
            d_q += weight * response.value;
            d_xs += weight * q * (response.d_dx * jac[0][0] + response.d_dy * jac[1][0]);
            d_ys += weight * q * (response.d_dx * jac[0][1] + response.d_dy * jac[1][1]);
        }
        let n = self.observations.len() as f64;
        let log_lik = -n * d - 0.5 * sum_sq * inv_var;

        let z_q = (c - self.q_prior.log_mean) / self.q_prior.log_sd;
        let s2 = self.noise_scale * self.noise_scale;
        // exp(c) and exp(d) Jacobians cancel the 1/Q of the log-normal and add d
        let log_prior = -0.5 * z_q * z_q - 0.5 * sigma * sigma / s2 + d
            + self.x_bounds.log_jacobian(a)
            + self.y_bounds.log_jacobian(b);

        let grad = Vector4::new(
            d_xs * self.x_bounds.derivative(a) + self.x_bounds.log_jacobian_gradient(a),
            d_ys * self.y_bounds.derivative(b) + self.y_bounds.log_jacobian_gradient(b),
            -z_q / self.q_prior.log_sd + q * d_q,
            -sigma * sigma / s2 + 1.0 + (-n + sum_sq * inv_var),
        );
        (log_lik + log_prior, grad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispersion::{PlumeParams, RemovalRates, StabilityClass, WindVector};
    use approx::assert_relative_eq;

    fn model(wind: WindVector) -> SourceModel {
        let frame = WindFrame::new(wind).unwrap();
        let plume = PlumeModel::new(PlumeParams {
            emission_rate: 1.0,
            wind_speed: frame.speed(),
            stack_height: 10.0,
            stability: StabilityClass::D,
            removal: RemovalRates {
                settling_velocity: 0.01,
                deposition_velocity: 0.005,
                decay_rate: 0.001,
            },
        })
        .unwrap();
        let observations = [(150.0, 30.0, 0.004), (200.0, 55.0, 0.002), (260.0, 42.0, 0.006)]
            .iter()
            .enumerate()
            .map(|(i, &(x, y, observed))| LocatedObservation {
                cell: GridCell { row: i, col: i },
                x,
                y,
                observed,
            })
            .collect();
        SourceModel::new(
            observations,
            plume,
            frame,
            0.0,
            BoundedTransform::new("x_src", 0.0, 100.0).unwrap(),
            BoundedTransform::new("y_src", 0.0, 100.0).unwrap(),
            LogNormalPrior::default(),
            0.01,
        )
        .unwrap()
    }

    fn finite_difference(m: &SourceModel, theta: &Vector4<f64>) -> Vector4<f64> {
        let h = 1e-6;
        Vector4::from_fn(|i, _| {
            let mut up = *theta;
            let mut down = *theta;
            up[i] += h;
            down[i] -= h;
            (m.log_density(&up) - m.log_density(&down)) / (2.0 * h)
        })
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        for wind in [WindVector::new(5.0, 0.0), WindVector::new(2.0, -3.0)] {
            let m = model(wind);
            let theta = Vector4::new(-0.4, 0.2, 3.5, -5.0);
            let (_, grad) = m.log_density_and_gradient(&theta);
            let numeric = finite_difference(&m, &theta);
            for i in 0..4 {
                assert_relative_eq!(grad[i], numeric[i], max_relative = 1e-4, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn test_constrain_round_trip() {
        let m = model(WindVector::new(5.0, 0.0));
        let sample = SourceSample {
            x_src: 30.0,
            y_src: 40.0,
            emission_rate: 50.0,
            sigma_obs: 0.002,
        };
        let back = m.constrain(&m.unconstrain(&sample));
        assert_relative_eq!(back.x_src, 30.0, epsilon = 1e-9);
        assert_relative_eq!(back.y_src, 40.0, epsilon = 1e-9);
        assert_relative_eq!(back.emission_rate, 50.0, epsilon = 1e-9);
        assert_relative_eq!(back.sigma_obs, 0.002, epsilon = 1e-12);
    }

    #[test]
    fn test_predictions_use_candidate_source() {
        let m = model(WindVector::new(5.0, 0.0));
        let near = SourceSample {
            x_src: 50.0,
            y_src: 42.0,
            emission_rate: 10.0,
            sigma_obs: 1.0,
        };
        let off_axis = SourceSample {
            y_src: 90.0,
            ..near
        };
        let p_near = m.predict(&near);
        let p_off = m.predict(&off_axis);
        // third sensor sits on the centreline of the near source
        assert!(p_near[2] > 10.0 * p_off[2]);
    }

    #[test]
    fn test_empty_observations_rejected() {
        let m = model(WindVector::new(5.0, 0.0));
        let err = SourceModel::new(
            Vec::new(),
            m.unit_plume,
            m.frame,
            0.0,
            m.x_bounds,
            m.y_bounds,
            m.q_prior,
            0.01,
        )
        .unwrap_err();
        assert!(matches!(err, PlumeError::NoObservationsLoaded));
    }
}
