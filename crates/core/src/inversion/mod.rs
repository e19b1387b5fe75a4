//! Bayesian source inversion
//!
//! Given a fixed scenario and a snapshot of sensor observations, estimate the
//! joint posterior of the source position, emission rate and observation
//! noise. Chains are independent, each with its own seeded RNG, and run in
//! parallel. The result is a [`SourcePosterior`]; choosing a point estimate
//! is left to the caller.

pub mod adaptation;
mod chain;
pub mod model;
pub mod nuts;
pub mod posterior;
pub mod task;
pub mod transform;

pub use model::{LocatedObservation, LogNormalPrior, SourceModel, SourceSample};
pub use nuts::{DrawStats, LogDensity};
pub use posterior::{
    ChainTrace, Histogram, Parameter, ParameterSummary, SamplerDiagnostics, SourcePosterior,
};
pub use task::{InversionHandle, RunControl, TaskStatus};
pub use transform::BoundedTransform;

use crate::error::{ensure_finite, ensure_positive, PlumeError, PlumeResult};
use crate::geo::SensorLocator;
use crate::observations::SensorObservation;
use crate::scenario::ScenarioConfig;
use chain::{run_chain, ChainSettings};
use nalgebra::Vector4;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Sampler and prior settings for one inversion run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InversionConfig {
    /// Retained draws per chain
    pub draws: usize,
    /// Warmup iterations per chain, discarded
    pub tune: usize,
    /// Independent chains
    pub chains: usize,
    /// Target mean acceptance statistic for step-size adaptation
    pub target_accept: f64,
    /// Maximum NUTS tree depth
    pub max_tree_depth: usize,
    /// Base seed; chain `k` uses `seed + k`
    pub seed: u64,
    /// Uniform prior bounds on `x_src` (m)
    pub x_bounds: (f64, f64),
    /// Uniform prior bounds on `y_src` (m)
    pub y_bounds: (f64, f64),
    /// Log-normal prior on `Q`
    pub q_prior: LogNormalPrior,
}

impl Default for InversionConfig {
    fn default() -> Self {
        Self {
            draws: 1000,
            tune: 1000,
            chains: 4,
            target_accept: 0.95,
            max_tree_depth: 10,
            seed: 42,
            x_bounds: (0.0, 100.0),
            y_bounds: (0.0, 100.0),
            q_prior: LogNormalPrior::default(),
        }
    }
}

impl InversionConfig {
    /// Check sampler settings and priors
    ///
    /// # Errors
    ///
    /// [`PlumeError::InvalidParameter`] for zero draws or chains, a target
    /// acceptance outside `(0, 1)`, a zero tree depth or bad prior settings.
    pub fn validate(&self) -> PlumeResult<()> {
        if self.draws == 0 {
            return Err(PlumeError::invalid("draws", 0.0, "must be at least 1"));
        }
        if self.chains == 0 {
            return Err(PlumeError::invalid("chains", 0.0, "must be at least 1"));
        }
        if !(self.target_accept > 0.0 && self.target_accept < 1.0) {
            return Err(PlumeError::invalid(
                "target_accept",
                self.target_accept,
                "must lie in (0, 1)",
            ));
        }
        if self.max_tree_depth == 0 {
            return Err(PlumeError::invalid("max_tree_depth", 0.0, "must be at least 1"));
        }
        BoundedTransform::new("x_bounds", self.x_bounds.0, self.x_bounds.1)?;
        BoundedTransform::new("y_bounds", self.y_bounds.0, self.y_bounds.1)?;
        ensure_finite("q_prior.log_mean", self.q_prior.log_mean)?;
        ensure_positive("q_prior.log_sd", self.q_prior.log_sd)?;
        Ok(())
    }

    /// Sampler iterations across all chains
    pub fn total_iterations(&self) -> usize {
        self.chains * (self.tune + self.draws)
    }
}

/// A fully assembled inversion: posterior model plus sampler settings
#[derive(Debug, Clone)]
pub struct InversionProblem {
    model: SourceModel,
    config: InversionConfig,
}

impl InversionProblem {
    /// Build the posterior from a scenario and an observation snapshot
    ///
    /// The grid and wind frame are rebuilt from `scenario`; sensors are placed
    /// relative to the scenario's origin. The likelihood uses the scenario's
    /// stack height, receptor height, stability and removal rates with a unit
    /// emission rate, so it predicts exactly what a forward run renders.
    ///
    /// # Errors
    ///
    /// - [`PlumeError::NoObservationsLoaded`] when `observations` is empty
    /// - any scenario or config validation failure
    pub fn from_scenario(
        scenario: &ScenarioConfig,
        observations: &[SensorObservation],
        config: InversionConfig,
    ) -> PlumeResult<Self> {
        if observations.is_empty() {
            return Err(PlumeError::NoObservationsLoaded);
        }
        scenario.validate()?;
        config.validate()?;

        let frame = scenario.wind_frame()?;
        let grid = scenario.build_grid()?;
        let locator = SensorLocator::new(scenario.latitude, scenario.longitude)?;
        let cells = locator.locate_all(
            observations.iter().map(|o| (o.latitude, o.longitude)),
            &grid,
        );
        let located = cells
            .into_iter()
            .zip(observations)
            .map(|(cell, obs)| {
                let (x, y) = grid.point(cell.row, cell.col);
                LocatedObservation {
                    cell,
                    x,
                    y,
                    observed: obs.concentration,
                }
            })
            .collect();

        let model = SourceModel::new(
            located,
            scenario.plume_model(1.0)?,
            frame,
            grid.z(),
            BoundedTransform::new("x_bounds", config.x_bounds.0, config.x_bounds.1)?,
            BoundedTransform::new("y_bounds", config.y_bounds.0, config.y_bounds.1)?,
            config.q_prior,
            scenario.noise_scale,
        )?;
        Ok(Self { model, config })
    }

    /// Use an already assembled model
    ///
    /// # Errors
    ///
    /// Propagates [`InversionConfig::validate`].
    pub fn from_model(model: SourceModel, config: InversionConfig) -> PlumeResult<Self> {
        config.validate()?;
        Ok(Self { model, config })
    }

    /// The posterior being sampled
    pub fn model(&self) -> &SourceModel {
        &self.model
    }

    /// Sampler settings
    pub fn config(&self) -> &InversionConfig {
        &self.config
    }
}

/// Runs the sampler for one [`InversionProblem`]
#[derive(Debug, Clone)]
pub struct InversionEngine {
    problem: Arc<InversionProblem>,
}

impl InversionEngine {
    /// Wrap a problem
    pub fn new(problem: InversionProblem) -> Self {
        Self {
            problem: Arc::new(problem),
        }
    }

    /// The problem this engine samples
    pub fn problem(&self) -> &InversionProblem {
        &self.problem
    }

    /// Sample on the calling thread (chains fan out over rayon)
    ///
    /// # Errors
    ///
    /// - [`PlumeError::Cancelled`] if `control` is cancelled before every chain finishes
    /// - [`PlumeError::InvalidParameter`] if a chain's starting point has a non-finite density
    pub fn run(&self, control: &RunControl) -> PlumeResult<SourcePosterior> {
        let config = &self.problem.config;
        let model = &self.problem.model;
        let settings = ChainSettings {
            tune: config.tune,
            draws: config.draws,
            target_accept: config.target_accept,
            max_tree_depth: config.max_tree_depth,
        };
        info!(
            "Inversion started: {} sensors, {} chains x ({} tune + {} draws), target accept {}",
            model.observations().len(),
            config.chains,
            config.tune,
            config.draws,
            config.target_accept
        );
        let started = Instant::now();

        let outputs = (0..config.chains)
            .into_par_iter()
            .map(|k| {
                let mut rng = ChaCha8Rng::seed_from_u64(config.seed.wrapping_add(k as u64));
                let jitter = Vector4::from_fn(|_, _| rng.random_range(-0.5..0.5));
                let initial = model.initial_point() + jitter;
                run_chain(model, initial, settings, &mut rng, control, k)
            })
            .collect::<PlumeResult<Vec<_>>>()?;

        if control.is_cancelled() {
            return Err(PlumeError::Cancelled);
        }

        let chains = outputs
            .into_iter()
            .map(|out| ChainTrace {
                draws: out.positions.iter().map(|theta| model.constrain(theta)).collect(),
                stats: out.stats,
                step_size: out.step_size,
                inv_metric: [
                    out.inv_metric[0],
                    out.inv_metric[1],
                    out.inv_metric[2],
                    out.inv_metric[3],
                ],
            })
            .collect();
        let posterior = SourcePosterior::new(chains, config.max_tree_depth);

        let diagnostics = posterior.diagnostics();
        if diagnostics.divergences > 0 {
            warn!(
                "Inversion finished with {} divergent transitions of {}",
                diagnostics.divergences, diagnostics.total_draws
            );
        }
        info!(
            "Inversion finished in {:.2?}: {} draws, mean accept {:.3}",
            started.elapsed(),
            diagnostics.total_draws,
            diagnostics.mean_accept_stat
        );
        Ok(posterior)
    }

    /// Sample on a background thread
    ///
    /// # Errors
    ///
    /// [`PlumeError::Io`] if the worker thread cannot be spawned.
    pub fn submit(&self) -> PlumeResult<InversionHandle> {
        let engine = self.clone();
        let total = self.problem.config.total_iterations();
        InversionHandle::spawn(RunControl::new(), total, move |control| engine.run(&control))
    }
}
