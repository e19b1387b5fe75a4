//! Warmup adaptation: dual-averaging step size and windowed diagonal metric
//!
//! The window layout follows Stan: a fast initial buffer where only the step
//! size adapts, a run of slow windows doubling in length where the metric is
//! estimated, and a fast terminal buffer. The last slow window absorbs any
//! remainder too short to hold another doubling.

use nalgebra::Vector4;

/// Dual averaging of the log step size toward a target acceptance statistic
#[derive(Debug, Clone)]
pub struct DualAveraging {
    target: f64,
    mu: f64,
    log_step: f64,
    log_step_bar: f64,
    h_bar: f64,
    iteration: f64,
}

impl DualAveraging {
    const GAMMA: f64 = 0.05;
    const T0: f64 = 10.0;
    const KAPPA: f64 = 0.75;

    /// Start adapting from `step_size`
    pub fn new(step_size: f64, target: f64) -> Self {
        let mut da = Self {
            target,
            mu: 0.0,
            log_step: 0.0,
            log_step_bar: 0.0,
            h_bar: 0.0,
            iteration: 0.0,
        };
        da.restart(step_size);
        da
    }

    /// Forget history and re-centre on `step_size`
    pub fn restart(&mut self, step_size: f64) {
        self.mu = (10.0 * step_size).ln();
        self.log_step = step_size.ln();
        self.log_step_bar = 0.0;
        self.h_bar = 0.0;
        self.iteration = 0.0;
    }

    /// Feed one acceptance statistic; returns the next step size to try
    pub fn update(&mut self, accept_stat: f64) -> f64 {
        let accept_stat = if accept_stat.is_finite() { accept_stat.clamp(0.0, 1.0) } else { 0.0 };
        self.iteration += 1.0;
        let t = self.iteration;
        let eta = 1.0 / (t + Self::T0);
        self.h_bar = (1.0 - eta) * self.h_bar + eta * (self.target - accept_stat);
        self.log_step = self.mu - t.sqrt() / Self::GAMMA * self.h_bar;
        let weight = t.powf(-Self::KAPPA);
        self.log_step_bar = weight * self.log_step + (1.0 - weight) * self.log_step_bar;
        self.log_step.exp()
    }

    /// Averaged step size to use once warmup ends
    pub fn final_step_size(&self) -> f64 {
        self.log_step_bar.exp()
    }
}

/// Running variance by Welford's algorithm
#[derive(Debug, Clone, Default)]
pub struct WelfordVariance {
    n: usize,
    mean: Vector4<f64>,
    m2: Vector4<f64>,
}

impl WelfordVariance {
    /// Add one sample
    pub fn add(&mut self, x: &Vector4<f64>) {
        self.n += 1;
        let delta = x - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta.component_mul(&(x - self.mean));
    }

    /// Samples seen
    pub fn count(&self) -> usize {
        self.n
    }

    /// Sample variance shrunk toward `1e-3`
    pub fn regularized_variance(&self) -> Vector4<f64> {
        let n = self.n as f64;
        if self.n < 2 {
            return Vector4::repeat(1.0);
        }
        let var = self.m2 / (n - 1.0);
        var * (n / (n + 5.0)) + Vector4::repeat(1e-3 * (5.0 / (n + 5.0)))
    }

    /// Drop all samples
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Where each warmup iteration falls in the adaptation schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSchedule {
    warmup: usize,
    init_buffer: usize,
    term_buffer: usize,
    window_ends: Vec<usize>,
}

impl WindowSchedule {
    const INIT_BUFFER: usize = 75;
    const TERM_BUFFER: usize = 50;
    const BASE_WINDOW: usize = 25;

    /// Layout for `warmup` iterations
    pub fn new(warmup: usize) -> Self {
        if warmup < 20 {
            return Self {
                warmup,
                init_buffer: warmup,
                term_buffer: 0,
                window_ends: Vec::new(),
            };
        }

        let (init_buffer, term_buffer, base) =
            if Self::INIT_BUFFER + Self::BASE_WINDOW + Self::TERM_BUFFER > warmup {
                let init = (0.15 * warmup as f64) as usize;
                let term = (0.1 * warmup as f64) as usize;
                (init, term, warmup - init - term)
            } else {
                (Self::INIT_BUFFER, Self::TERM_BUFFER, Self::BASE_WINDOW)
            };

        let slow_end = warmup - term_buffer;
        let mut window_ends = Vec::new();
        let mut start = init_buffer;
        let mut size = base;
        while start < slow_end {
            let mut end = start + size;
            if end + 2 * size > slow_end {
                end = slow_end;
            }
            window_ends.push(end - 1);
            start = end;
            size *= 2;
        }

        Self {
            warmup,
            init_buffer,
            term_buffer,
            window_ends,
        }
    }

    /// Whether iteration `i` contributes to the metric estimate
    pub fn in_slow_window(&self, i: usize) -> bool {
        !self.window_ends.is_empty() && i >= self.init_buffer && i < self.warmup - self.term_buffer
    }

    /// Whether the metric is re-estimated after iteration `i`
    pub fn ends_window(&self, i: usize) -> bool {
        self.window_ends.binary_search(&i).is_ok()
    }

    /// Last iteration of each slow window
    pub fn window_ends(&self) -> &[usize] {
        &self.window_ends
    }
}
