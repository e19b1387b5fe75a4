//! One chain: warmup with adaptation, then retained draws

use super::adaptation::{DualAveraging, WelfordVariance, WindowSchedule};
use super::nuts::{DrawStats, LogDensity, NutsSampler};
use super::task::RunControl;
use crate::error::{PlumeError, PlumeResult};
use nalgebra::Vector4;
use rand::Rng;
use tracing::{debug, warn};

/// Iteration counts and sampler limits for a single chain
#[derive(Debug, Clone, Copy)]
pub(crate) struct ChainSettings {
    pub tune: usize,
    pub draws: usize,
    pub target_accept: f64,
    pub max_tree_depth: usize,
}

/// Retained draws in unconstrained space plus the adapted sampler state
#[derive(Debug, Clone)]
pub(crate) struct ChainOutput {
    pub positions: Vec<Vector4<f64>>,
    pub stats: Vec<DrawStats>,
    pub step_size: f64,
    pub inv_metric: Vector4<f64>,
}

pub(crate) fn run_chain<M, R>(
    model: &M,
    initial: Vector4<f64>,
    settings: ChainSettings,
    rng: &mut R,
    control: &RunControl,
    chain: usize,
) -> PlumeResult<ChainOutput>
where
    M: LogDensity,
    R: Rng + ?Sized,
{
    let mut sampler = NutsSampler::new(model, initial, 1.0, settings.max_tree_depth);
    if !sampler.log_density().is_finite() {
        return Err(PlumeError::invalid(
            "initial point",
            sampler.log_density(),
            "log density must be finite",
        ));
    }

    let mut adapt = DualAveraging::new(
        sampler.find_reasonable_step_size(rng),
        settings.target_accept,
    );
    let schedule = WindowSchedule::new(settings.tune);
    let mut variance = WelfordVariance::default();

    for i in 0..settings.tune {
        if control.is_cancelled() {
            return Err(PlumeError::Cancelled);
        }
        let stats = sampler.transition(rng);
        sampler.set_step_size(adapt.update(stats.accept_stat));

        if schedule.in_slow_window(i) {
            variance.add(sampler.position());
        }
        if schedule.ends_window(i) {
            let metric = variance.regularized_variance();
            debug!(
                "Chain {chain}: metric window closed at {i} with {} samples, inv metric {:?}",
                variance.count(),
                metric.as_slice()
            );
            sampler.set_inv_metric(metric);
            variance.reset();
            let restart = sampler.find_reasonable_step_size(rng);
            adapt.restart(restart);
        }
        control.record_iteration();
    }
    if settings.tune > 0 {
        sampler.set_step_size(adapt.final_step_size());
    }
    debug!("Chain {chain}: warmup done, step size {:.4}", sampler.step_size());

    let mut positions = Vec::with_capacity(settings.draws);
    let mut stats = Vec::with_capacity(settings.draws);
    for _ in 0..settings.draws {
        if control.is_cancelled() {
            return Err(PlumeError::Cancelled);
        }
        stats.push(sampler.transition(rng));
        positions.push(*sampler.position());
        control.record_iteration();
    }

    let divergent = stats.iter().filter(|s| s.divergent).count();
    if divergent > 0 {
        warn!("Chain {chain}: {divergent} of {} draws diverged", settings.draws);
    }

    Ok(ChainOutput {
        positions,
        stats,
        step_size: sampler.step_size(),
        inv_metric: *sampler.inv_metric(),
    })
}
