//! Simulation grid and concentration fields
//!
//! The grid is square and centered on the source. Both axes share the same
//! 1-D coordinate array, built like `linspace(-extent, extent, 2·extent/res)`,
//! so `X[iy][ix] = axis[ix]` and `Y[iy][ix] = axis[iy]`. Rows follow image
//! orientation (row 0 at `-extent`, the northern edge).

use crate::dispersion::wind::WindFrame;
use crate::error::{ensure_finite, ensure_positive, PlumeError, PlumeResult};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Largest accepted number of points along one grid axis
pub const MAX_POINTS_PER_AXIS: usize = 10_000;

/// Grid geometry as it appears in configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSpec {
    /// Half-width of the square domain (m)
    pub extent: f64,
    /// Nominal spacing between points (m)
    pub resolution: f64,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            extent: 500.0,
            resolution: 1.0,
        }
    }
}

impl GridSpec {
    /// Number of points per axis, `⌊2·extent / resolution⌋`
    pub fn points_per_axis(&self) -> usize {
        (2.0 * self.extent / self.resolution) as usize
    }

    /// Check that the geometry produces a usable grid
    ///
    /// # Errors
    ///
    /// Returns [`PlumeError::InvalidParameter`] for non-positive sizes or a grid
    /// with fewer than two or more than [`MAX_POINTS_PER_AXIS`] points per axis.
    pub fn validate(&self) -> PlumeResult<()> {
        ensure_positive("grid.extent", self.extent)?;
        ensure_positive("grid.resolution", self.resolution)?;
        let ratio = 2.0 * self.extent / self.resolution;
        if !ratio.is_finite() || ratio >= (MAX_POINTS_PER_AXIS + 1) as f64 {
            return Err(PlumeError::invalid(
                "grid.resolution",
                self.resolution,
                "must give at most 10000 points per axis",
            ));
        }
        if self.points_per_axis() < 2 {
            return Err(PlumeError::invalid(
                "grid.resolution",
                self.resolution,
                "must give at least two points per axis",
            ));
        }
        Ok(())
    }
}

/// Immutable Cartesian grid for one scenario
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationGrid {
    axis: Vec<f64>,
    z: f64,
}

impl SimulationGrid {
    /// Build the grid described by `spec` at receptor height `z`
    ///
    /// # Errors
    ///
    /// Propagates [`GridSpec::validate`] failures and rejects non-finite `z`.
    pub fn new(spec: GridSpec, z: f64) -> PlumeResult<Self> {
        spec.validate()?;
        ensure_finite("grid.z", z)?;
        Ok(Self {
            axis: linspace(-spec.extent, spec.extent, spec.points_per_axis()),
            z,
        })
    }

    /// Shared 1-D coordinate array
    pub fn axis(&self) -> &[f64] {
        &self.axis
    }

    /// Points per axis
    pub fn len(&self) -> usize {
        self.axis.len()
    }

    /// Always false; a validated grid has at least two points
    pub fn is_empty(&self) -> bool {
        self.axis.is_empty()
    }

    /// `(rows, cols)`
    pub fn shape(&self) -> (usize, usize) {
        (self.axis.len(), self.axis.len())
    }

    /// Receptor height
    pub fn z(&self) -> f64 {
        self.z
    }

    /// Unrotated `(X, Y)` at a cell
    #[inline]
    pub fn point(&self, row: usize, col: usize) -> (f64, f64) {
        (self.axis[col], self.axis[row])
    }

    /// Index of the axis value closest to `coordinate`
    pub fn nearest_index(&self, coordinate: f64) -> usize {
        self.axis
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                (*a - coordinate)
                    .abs()
                    .total_cmp(&(*b - coordinate).abs())
            })
            .map_or(0, |(i, _)| i)
    }

    /// Evaluate `f(x_downwind, y_crosswind, z)` at every cell, rows in parallel
    pub fn evaluate<F>(&self, frame: &WindFrame, f: F) -> ConcentrationField
    where
        F: Fn(f64, f64, f64) -> f64 + Sync,
    {
        let (rows, cols) = self.shape();
        let mut values = vec![0.0; rows * cols];
        values
            .par_chunks_mut(cols)
            .enumerate()
            .for_each(|(row, out)| {
                let y = self.axis[row];
                for (col, cell) in out.iter_mut().enumerate() {
                    let (xr, yr) = frame.rotate(self.axis[col], y);
                    *cell = f(xr, yr, self.z);
                }
            });
        ConcentrationField { rows, cols, values }
    }
}

/// `n` evenly spaced values from `start` to `stop` inclusive
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { stop } else { start + step * i as f64 })
                .collect()
        }
    }
}

/// Row-major 2-D concentration array (g/m³), same shape as its grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcentrationField {
    /// Number of rows
    pub rows: usize,
    /// Number of columns
    pub cols: usize,
    /// Values in row-major order
    pub values: Vec<f64>,
}

impl ConcentrationField {
    /// Value at `(row, col)`
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.cols + col]
    }

    /// Largest value, 0 for an empty field
    pub fn max(&self) -> f64 {
        self.values.iter().copied().fold(0.0, f64::max)
    }

    /// Number of NaN or infinite cells
    pub fn non_finite_cells(&self) -> usize {
        self.values.iter().filter(|v| !v.is_finite()).count()
    }

    /// Reject fields with any NaN or infinite cell
    ///
    /// [`ConcentrationField::max`] skips NaN, so this is the check to run
    /// before trusting a field.
    ///
    /// # Errors
    ///
    /// Returns [`PlumeError::NonFiniteField`] with the offending cell count.
    pub fn ensure_finite(&self) -> PlumeResult<()> {
        match self.non_finite_cells() {
            0 => Ok(()),
            cells => Err(PlumeError::NonFiniteField { cells }),
        }
    }

    /// Copy scaled to `[0, 1]` by the maximum; unchanged when the max is 0
    pub fn normalized(&self) -> Self {
        let max = self.max();
        if max > 0.0 {
            Self {
                rows: self.rows,
                cols: self.cols,
                values: self.values.iter().map(|v| v / max).collect(),
            }
        } else {
            self.clone()
        }
    }

    /// `(row, col)` of the maximum value
    pub fn argmax(&self) -> (usize, usize) {
        let idx = self
            .values
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map_or(0, |(i, _)| i);
        (idx / self.cols, idx % self.cols)
    }
}
