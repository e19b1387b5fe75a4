//! Posterior draws, marginal summaries and convergence diagnostics
//!
//! Draws are kept per chain in chain order so that between-chain diagnostics
//! (split R-hat, effective sample size) stay computable. Nothing here feeds
//! back into a model; the posterior is summarized and handed to a sink.

use super::model::SourceSample;
use super::nuts::DrawStats;
use serde::{Deserialize, Serialize};

/// Default mass of the equal-tailed credible interval
pub const DEFAULT_CI_MASS: f64 = 0.95;
/// Default mass of the highest-density interval
pub const DEFAULT_HDI_MASS: f64 = 0.94;
/// Default histogram bin count
pub const DEFAULT_BINS: usize = 30;

/// A latent parameter of the source model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Parameter {
    /// Source x
    XSource,
    /// Source y
    YSource,
    /// Emission rate Q
    EmissionRate,
    /// Observation noise
    SigmaObs,
}

impl Parameter {
    /// All parameters in reporting order
    pub const ALL: [Parameter; 4] = [
        Self::XSource,
        Self::YSource,
        Self::EmissionRate,
        Self::SigmaObs,
    ];

    /// Short name used in logs and tables
    pub const fn name(self) -> &'static str {
        match self {
            Self::XSource => "x_src",
            Self::YSource => "y_src",
            Self::EmissionRate => "Q",
            Self::SigmaObs => "sigma_obs",
        }
    }

    /// Value of this parameter in a draw
    #[inline]
    pub fn of(self, sample: &SourceSample) -> f64 {
        match self {
            Self::XSource => sample.x_src,
            Self::YSource => sample.y_src,
            Self::EmissionRate => sample.emission_rate,
            Self::SigmaObs => sample.sigma_obs,
        }
    }
}

/// Retained draws of one chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainTrace {
    /// Draws in sampling order
    pub draws: Vec<SourceSample>,
    /// Sampler statistics aligned with `draws`
    pub stats: Vec<DrawStats>,
    /// Adapted step size
    pub step_size: f64,
    /// Adapted diagonal inverse metric in unconstrained space
    pub inv_metric: [f64; 4],
}

/// Equal-width histogram of one marginal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    /// `bins + 1` edges, ascending
    pub edges: Vec<f64>,
    /// Draw count per bin
    pub counts: Vec<usize>,
}

/// Marginal summary of one parameter across all chains
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSummary {
    /// Which parameter
    pub parameter: Parameter,
    /// Posterior mean
    pub mean: f64,
    /// Posterior standard deviation
    pub sd: f64,
    /// Equal-tailed credible interval
    pub ci: (f64, f64),
    /// Highest-density interval
    pub hdi: (f64, f64),
    /// Marginal histogram
    pub histogram: Histogram,
    /// Split potential scale reduction; NaN with fewer than two draws per half-chain
    pub r_hat: f64,
    /// Effective sample size
    pub ess: f64,
}

/// Run-level sampler health
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerDiagnostics {
    /// Divergent transitions among retained draws
    pub divergences: usize,
    /// Retained draws across chains
    pub total_draws: usize,
    /// Mean acceptance statistic across retained draws
    pub mean_accept_stat: f64,
    /// Adapted step size per chain
    pub step_sizes: Vec<f64>,
    /// Draws that stopped at the maximum tree depth
    pub max_depth_hits: usize,
}

/// Joint posterior draws of `(x_src, y_src, Q, σ_obs)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcePosterior {
    chains: Vec<ChainTrace>,
    max_tree_depth: usize,
}

impl SourcePosterior {
    pub(crate) fn new(chains: Vec<ChainTrace>, max_tree_depth: usize) -> Self {
        Self {
            chains,
            max_tree_depth,
        }
    }

    /// Per-chain traces in chain order
    pub fn chains(&self) -> &[ChainTrace] {
        &self.chains
    }

    /// Number of chains
    pub fn num_chains(&self) -> usize {
        self.chains.len()
    }

    /// All draws, chain by chain
    pub fn samples(&self) -> impl Iterator<Item = &SourceSample> + '_ {
        self.chains.iter().flat_map(|c| c.draws.iter())
    }

    /// Total retained draws
    pub fn len(&self) -> usize {
        self.chains.iter().map(|c| c.draws.len()).sum()
    }

    /// Whether no draws were retained
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pooled values of one parameter
    pub fn values(&self, parameter: Parameter) -> Vec<f64> {
        self.samples().map(|s| parameter.of(s)).collect()
    }

    fn chain_values(&self, parameter: Parameter) -> Vec<Vec<f64>> {
        self.chains
            .iter()
            .map(|c| c.draws.iter().map(|s| parameter.of(s)).collect())
            .collect()
    }

    /// Posterior mean of every parameter
    pub fn mean(&self) -> SourceSample {
        let m = |p| mean(&self.values(p));
        SourceSample {
            x_src: m(Parameter::XSource),
            y_src: m(Parameter::YSource),
            emission_rate: m(Parameter::EmissionRate),
            sigma_obs: m(Parameter::SigmaObs),
        }
    }

    /// Summary of one parameter with explicit interval masses and bin count
    pub fn summarize(
        &self,
        parameter: Parameter,
        ci_mass: f64,
        hdi_mass: f64,
        bins: usize,
    ) -> ParameterSummary {
        let values = self.values(parameter);
        let mut sorted = values.clone();
        sorted.sort_by(f64::total_cmp);
        let tail = 0.5 * (1.0 - ci_mass);
        let per_chain = self.chain_values(parameter);

        ParameterSummary {
            parameter,
            mean: mean(&values),
            sd: std_dev(&values),
            ci: (quantile(&sorted, tail), quantile(&sorted, 1.0 - tail)),
            hdi: hdi(&sorted, hdi_mass),
            histogram: histogram(&sorted, bins),
            r_hat: split_r_hat(&per_chain),
            ess: effective_sample_size(&per_chain),
        }
    }

    /// Default summaries for every parameter
    pub fn summaries(&self) -> Vec<ParameterSummary> {
        Parameter::ALL
            .iter()
            .map(|&p| self.summarize(p, DEFAULT_CI_MASS, DEFAULT_HDI_MASS, DEFAULT_BINS))
            .collect()
    }

    /// Divergences, acceptance and adaptation outcome
    pub fn diagnostics(&self) -> SamplerDiagnostics {
        let stats: Vec<&DrawStats> = self.chains.iter().flat_map(|c| c.stats.iter()).collect();
        let total = stats.len();
        SamplerDiagnostics {
            divergences: stats.iter().filter(|s| s.divergent).count(),
            total_draws: total,
            mean_accept_stat: if total > 0 {
                stats.iter().map(|s| s.accept_stat).sum::<f64>() / total as f64
            } else {
                f64::NAN
            },
            step_sizes: self.chains.iter().map(|c| c.step_size).collect(),
            max_depth_hits: stats
                .iter()
                .filter(|s| s.tree_depth >= self.max_tree_depth)
                .count(),
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (values.len() - 1) as f64
}

fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Linear-interpolated quantile of sorted values
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            let frac = pos - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

/// Narrowest interval holding `mass` of the sorted draws
pub fn hdi(sorted: &[f64], mass: f64) -> (f64, f64) {
    let n = sorted.len();
    if n == 0 {
        return (f64::NAN, f64::NAN);
    }
    let span = ((mass.clamp(0.0, 1.0) * n as f64).floor() as usize).min(n - 1);
    (0..n - span)
        .map(|i| (sorted[i], sorted[i + span]))
        .min_by(|a, b| (a.1 - a.0).total_cmp(&(b.1 - b.0)))
        .unwrap_or((sorted[0], sorted[n - 1]))
}

/// Equal-width histogram of sorted draws
pub fn histogram(sorted: &[f64], bins: usize) -> Histogram {
    let bins = bins.max(1);
    let (Some(&lo), Some(&hi)) = (sorted.first(), sorted.last()) else {
        return Histogram {
            edges: Vec::new(),
            counts: Vec::new(),
        };
    };
    let width = if hi > lo { (hi - lo) / bins as f64 } else { 1.0 };
    let edges = (0..=bins).map(|i| lo + width * i as f64).collect();
    let mut counts = vec![0; bins];
    for &v in sorted {
        let idx = (((v - lo) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }
    Histogram { edges, counts }
}

/// Gelman-Rubin statistic over chains split in half
pub fn split_r_hat(chains: &[Vec<f64>]) -> f64 {
    let n = chains.iter().map(Vec::len).min().unwrap_or(0);
    let half = n / 2;
    if chains.is_empty() || half < 2 {
        return f64::NAN;
    }
    let splits: Vec<&[f64]> = chains
        .iter()
        .flat_map(|c| [&c[..half], &c[n - half..n]])
        .collect();

    let means: Vec<f64> = splits.iter().map(|s| mean(s)).collect();
    let within = mean(&splits.iter().map(|s| variance(s)).collect::<Vec<_>>());
    let between = half as f64 * variance(&means);
    if within <= 0.0 {
        return if between > 0.0 { f64::INFINITY } else { 1.0 };
    }
    let var_plus = (half as f64 - 1.0) / half as f64 * within + between / half as f64;
    (var_plus / within).sqrt()
}

/// Effective sample size from Geyer's initial monotone sequence
pub fn effective_sample_size(chains: &[Vec<f64>]) -> f64 {
    let m = chains.len();
    let n = chains.iter().map(Vec::len).min().unwrap_or(0);
    if m == 0 || n < 4 {
        return f64::NAN;
    }
    let chains: Vec<&[f64]> = chains.iter().map(|c| &c[..n]).collect();
    let means: Vec<f64> = chains.iter().map(|c| mean(c)).collect();
    let within = mean(&chains.iter().map(|c| variance(c)).collect::<Vec<_>>());
    let between = if m > 1 { variance(&means) } else { 0.0 };
    let var_plus = within * (n as f64 - 1.0) / n as f64 + between;
    if var_plus.is_nan() || var_plus <= 0.0 {
        return f64::NAN;
    }

    let autocov = |lag: usize| -> f64 {
        chains
            .iter()
            .zip(&means)
            .map(|(c, &mu)| {
                (0..n - lag).map(|i| (c[i] - mu) * (c[i + lag] - mu)).sum::<f64>() / n as f64
            })
            .sum::<f64>()
            / m as f64
    };
    let rho = |lag: usize| 1.0 - (within - autocov(lag)) / var_plus;

    let mut sum = 0.0;
    let mut previous = f64::INFINITY;
    let mut lag = 0;
    while lag + 1 < n {
        let pair = rho(lag) + rho(lag + 1);
        if pair <= 0.0 {
            break;
        }
        let pair = pair.min(previous);
        sum += pair;
        previous = pair;
        lag += 2;
    }
    let total = (m * n) as f64;
    let tau = (2.0 * sum - 1.0).max(1.0 / total.log10());
    total / tau
}
