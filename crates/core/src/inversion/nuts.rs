//! No-U-Turn sampler with slice-based tree building and a diagonal metric
//!
//! Follows the efficient NUTS of Hoffman & Gelman (2014, Alg. 6): a slice
//! variable bounds the admissible states, the trajectory doubles in a random
//! direction until it turns back on itself, and the proposal is drawn
//! uniformly from the admissible states with the progressive subtree bias.
//! The U-turn criterion uses velocities `M⁻¹p` so it respects the metric.

use nalgebra::Vector4;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

/// Energy error above which a trajectory is marked divergent
pub const MAX_ENERGY_ERROR: f64 = 1000.0;

/// A differentiable log density over four unconstrained parameters
pub trait LogDensity {
    /// Log density (up to a constant) and its gradient
    fn log_density_and_gradient(&self, theta: &Vector4<f64>) -> (f64, Vector4<f64>);

    /// Log density alone
    fn log_density(&self, theta: &Vector4<f64>) -> f64 {
        self.log_density_and_gradient(theta).0
    }
}

/// Per-draw sampler statistics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrawStats {
    /// Mean Metropolis acceptance over the final tree
    pub accept_stat: f64,
    /// Depth reached
    pub tree_depth: usize,
    /// Leapfrog steps taken
    pub n_leapfrog: usize,
    /// Whether any leaf exceeded [`MAX_ENERGY_ERROR`]
    pub divergent: bool,
    /// Hamiltonian at the selected state
    pub energy: f64,
    /// Step size used
    pub step_size: f64,
}

#[derive(Debug, Clone)]
struct PhasePoint {
    q: Vector4<f64>,
    p: Vector4<f64>,
    grad: Vector4<f64>,
    log_density: f64,
}

impl PhasePoint {
    fn kinetic(&self, inv_metric: &Vector4<f64>) -> f64 {
        0.5 * self.p.component_mul(inv_metric).dot(&self.p)
    }

    /// `log π(q) - K(p)`; NaN is mapped to -∞
    fn joint(&self, inv_metric: &Vector4<f64>) -> f64 {
        let h = self.log_density - self.kinetic(inv_metric);
        if h.is_nan() {
            f64::NEG_INFINITY
        } else {
            h
        }
    }
}

struct Subtree {
    minus: PhasePoint,
    plus: PhasePoint,
    proposal: PhasePoint,
    n_valid: usize,
    keep_going: bool,
    sum_accept: f64,
    n_steps: usize,
    divergent: bool,
}

/// Sampler state for one chain
pub struct NutsSampler<'a, M: LogDensity> {
    model: &'a M,
    current: PhasePoint,
    inv_metric: Vector4<f64>,
    step_size: f64,
    max_tree_depth: usize,
}

impl<'a, M: LogDensity> NutsSampler<'a, M> {
    /// Start at `initial` with a unit metric
    pub fn new(model: &'a M, initial: Vector4<f64>, step_size: f64, max_tree_depth: usize) -> Self {
        let (log_density, grad) = model.log_density_and_gradient(&initial);
        Self {
            model,
            current: PhasePoint {
                q: initial,
                p: Vector4::zeros(),
                grad,
                log_density,
            },
            inv_metric: Vector4::repeat(1.0),
            step_size,
            max_tree_depth,
        }
    }

    /// Current position
    pub fn position(&self) -> &Vector4<f64> {
        &self.current.q
    }

    /// Log density at the current position
    pub fn log_density(&self) -> f64 {
        self.current.log_density
    }

    /// Current step size
    pub fn step_size(&self) -> f64 {
        self.step_size
    }

    /// Replace the step size
    pub fn set_step_size(&mut self, step_size: f64) {
        self.step_size = step_size;
    }

    /// Current diagonal inverse metric
    pub fn inv_metric(&self) -> &Vector4<f64> {
        &self.inv_metric
    }

    /// Replace the diagonal inverse metric
    pub fn set_inv_metric(&mut self, inv_metric: Vector4<f64>) {
        self.inv_metric = inv_metric;
    }

    fn sample_momentum<R: Rng + ?Sized>(&self, rng: &mut R) -> Vector4<f64> {
        Vector4::from_fn(|i, _| {
            let z: f64 = rng.sample(StandardNormal);
            z / self.inv_metric[i].sqrt()
        })
    }

    fn leapfrog(&self, point: &PhasePoint, eps: f64) -> PhasePoint {
        let p_half = point.p + point.grad * (0.5 * eps);
        let q = point.q + p_half.component_mul(&self.inv_metric) * eps;
        let (log_density, grad) = self.model.log_density_and_gradient(&q);
        let p = p_half + grad * (0.5 * eps);
        PhasePoint {
            q,
            p,
            grad,
            log_density,
        }
    }

    fn no_u_turn(&self, minus: &PhasePoint, plus: &PhasePoint) -> bool {
        let span = plus.q - minus.q;
        span.dot(&minus.p.component_mul(&self.inv_metric)) >= 0.0
            && span.dot(&plus.p.component_mul(&self.inv_metric)) >= 0.0
    }

    /// Heuristic initial step size: double or halve until a single leapfrog
    /// step crosses an acceptance probability of one half
    pub fn find_reasonable_step_size<R: Rng + ?Sized>(&mut self, rng: &mut R) -> f64 {
        let mut eps = self.step_size;
        let mut start = self.current.clone();
        start.p = self.sample_momentum(rng);
        let joint0 = start.joint(&self.inv_metric);

        let log_ratio = |eps: f64| {
            let next = self.leapfrog(&start, eps);
            let delta = next.joint(&self.inv_metric) - joint0;
            if delta.is_finite() {
                delta
            } else {
                f64::NEG_INFINITY
            }
        };

        let direction = if log_ratio(eps) > 0.5_f64.ln() { 1.0 } else { -1.0 };
        for _ in 0..100 {
            if direction * log_ratio(eps) <= -direction * 2.0_f64.ln() {
                break;
            }
            let next = eps * 2.0_f64.powf(direction);
            if !(1e-10..=1e7).contains(&next) {
                break;
            }
            eps = next;
        }
        self.step_size = eps;
        eps
    }

    /// One NUTS transition from the current state
    pub fn transition<R: Rng + ?Sized>(&mut self, rng: &mut R) -> DrawStats {
        let mut start = self.current.clone();
        start.p = self.sample_momentum(rng);
        let joint0 = start.joint(&self.inv_metric);
        let u: f64 = rng.random();
        let log_slice = joint0 + (1.0 - u).ln();

        let mut minus = start.clone();
        let mut plus = start.clone();
        let mut selected = start;
        let mut n_valid = 1_usize;
        let mut depth = 0;
        let mut sum_accept = 0.0;
        let mut n_steps = 0;
        let mut divergent = false;

        while depth < self.max_tree_depth {
            let backward = rng.random::<bool>();
            let tree = if backward {
                let t = self.build_tree(&minus, log_slice, -1.0, depth, joint0, rng);
                minus = t.minus.clone();
                t
            } else {
                let t = self.build_tree(&plus, log_slice, 1.0, depth, joint0, rng);
                plus = t.plus.clone();
                t
            };
            depth += 1;
            sum_accept += tree.sum_accept;
            n_steps += tree.n_steps;
            divergent |= tree.divergent;

            if !tree.keep_going {
                break;
            }
            if tree.n_valid > 0 && rng.random::<f64>() < tree.n_valid as f64 / n_valid as f64 {
                selected = tree.proposal;
            }
            n_valid += tree.n_valid;
            if !self.no_u_turn(&minus, &plus) {
                break;
            }
        }

        let energy = -selected.joint(&self.inv_metric);
        self.current = selected;
        DrawStats {
            accept_stat: if n_steps > 0 { sum_accept / n_steps as f64 } else { 0.0 },
            tree_depth: depth,
            n_leapfrog: n_steps,
            divergent,
            energy,
            step_size: self.step_size,
        }
    }

    fn build_tree<R: Rng + ?Sized>(
        &self,
        edge: &PhasePoint,
        log_slice: f64,
        direction: f64,
        depth: usize,
        joint0: f64,
        rng: &mut R,
    ) -> Subtree {
        if depth == 0 {
            let next = self.leapfrog(edge, direction * self.step_size);
            let joint = next.joint(&self.inv_metric);
            let divergent = joint + MAX_ENERGY_ERROR <= log_slice;
            let accept = if joint.is_finite() {
                (joint - joint0).exp().min(1.0)
            } else {
                0.0
            };
            return Subtree {
                minus: next.clone(),
                plus: next.clone(),
                proposal: next,
                n_valid: usize::from(log_slice <= joint),
                keep_going: !divergent,
                sum_accept: accept,
                n_steps: 1,
                divergent,
            };
        }

        let mut tree = self.build_tree(edge, log_slice, direction, depth - 1, joint0, rng);
        if !tree.keep_going {
            return tree;
        }

        let outer = if direction < 0.0 {
            let t = self.build_tree(&tree.minus, log_slice, direction, depth - 1, joint0, rng);
            tree.minus = t.minus.clone();
            t
        } else {
            let t = self.build_tree(&tree.plus, log_slice, direction, depth - 1, joint0, rng);
            tree.plus = t.plus.clone();
            t
        };

        let total = tree.n_valid + outer.n_valid;
        if total > 0 && rng.random::<f64>() < outer.n_valid as f64 / total as f64 {
            tree.proposal = outer.proposal;
        }
        tree.n_valid = total;
        tree.sum_accept += outer.sum_accept;
        tree.n_steps += outer.n_steps;
        tree.divergent |= outer.divergent;
        tree.keep_going = outer.keep_going && self.no_u_turn(&tree.minus, &tree.plus);
        tree
    }
}
