//! Maps between constrained source parameters and the sampler's unconstrained space
//!
//! Bounded coordinates use a scaled logistic map; positive quantities use `exp`.
//! Each map carries the log-Jacobian term the density needs and its derivative.

use crate::error::{PlumeError, PlumeResult};
use serde::{Deserialize, Serialize};

/// Numerically stable logistic function
#[inline]
pub fn sigmoid(a: f64) -> f64 {
    if a >= 0.0 {
        1.0 / (1.0 + (-a).exp())
    } else {
        let e = a.exp();
        e / (1.0 + e)
    }
}

/// `ln(1 + e^a)` without overflow for large `a` or underflow for small `a`
#[inline]
pub fn softplus(a: f64) -> f64 {
    if a > 0.0 {
        a + (-a).exp().ln_1p()
    } else {
        a.exp().ln_1p()
    }
}

/// Inverse of [`sigmoid`]
#[inline]
pub fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

/// `x = lo + (hi - lo) · sigmoid(a)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundedTransform {
    /// Lower bound
    pub lo: f64,
    /// Upper bound
    pub hi: f64,
}

impl BoundedTransform {
    /// Interval `[lo, hi]`
    ///
    /// # Errors
    ///
    /// Rejects non-finite bounds and empty intervals.
    pub fn new(name: &'static str, lo: f64, hi: f64) -> PlumeResult<Self> {
        if !lo.is_finite() || !hi.is_finite() {
            let bad = if lo.is_finite() { hi } else { lo };
            return Err(PlumeError::invalid(name, bad, "bounds must be finite"));
        }
        if hi <= lo {
            return Err(PlumeError::invalid(name, hi, "upper bound must exceed lower bound"));
        }
        Ok(Self { lo, hi })
    }

    /// Interval width
    #[inline]
    pub fn width(&self) -> f64 {
        self.hi - self.lo
    }

    /// Unconstrained → constrained
    #[inline]
    pub fn constrain(&self, a: f64) -> f64 {
        self.lo + self.width() * sigmoid(a)
    }

    /// Constrained → unconstrained; interior points only
    #[inline]
    pub fn unconstrain(&self, x: f64) -> f64 {
        logit((x - self.lo) / self.width())
    }

    /// `ln |dx/da|`, using `ln σ(a) = -softplus(-a)` and `ln(1 - σ(a)) = -softplus(a)`
    #[inline]
    pub fn log_jacobian(&self, a: f64) -> f64 {
        self.width().ln() - softplus(-a) - softplus(a)
    }

    /// `dx/da`
    #[inline]
    pub fn derivative(&self, a: f64) -> f64 {
        let s = sigmoid(a);
        self.width() * s * (1.0 - s)
    }

    /// `d/da ln |dx/da|`
    #[inline]
    pub fn log_jacobian_gradient(&self, a: f64) -> f64 {
        1.0 - 2.0 * sigmoid(a)
    }
}
