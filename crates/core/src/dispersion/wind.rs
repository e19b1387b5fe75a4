//! Wind vector and the downwind/crosswind frame
//!
//! The simulation grid follows image orientation: rows increase downward, so
//! the grid's `y` axis points south. The north wind component is therefore
//! negated before it is used anywhere:
//!
//! ```text
//! v_img = -v_north
//! u     = hypot(u_east, v_img)
//! θ     = atan2(v_img, u_east)
//! ```
//!
//! Grid points are rotated by `-θ` so that `x` runs downwind and `y` crosswind:
//!
//! ```text
//! x_rot =  x·cos θ + y·sin θ
//! y_rot = -x·sin θ + y·cos θ
//! ```

use crate::error::{PlumeError, PlumeResult};
use nalgebra::{Rotation2, Vector2};
use serde::{Deserialize, Serialize};

/// Horizontal wind as (east, north) components in m/s
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindVector {
    /// Eastward component (m/s)
    pub east: f64,
    /// Northward component (m/s)
    pub north: f64,
}

impl WindVector {
    /// Create a wind vector from east/north components
    pub const fn new(east: f64, north: f64) -> Self {
        Self { east, north }
    }

    /// North component expressed in image-row orientation
    #[inline]
    pub fn north_image(&self) -> f64 {
        -self.north
    }

    /// Wind speed `u` (m/s); may be zero
    pub fn speed(&self) -> f64 {
        self.east.hypot(self.north_image())
    }

    /// Direction `θ` (radians) in image orientation
    pub fn direction(&self) -> f64 {
        self.north_image().atan2(self.east)
    }
}

/// Rotation from grid coordinates into the wind-aligned frame
///
/// Construction fails for zero or non-finite wind speed so that no
/// downstream `x / u` term can ever divide by zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindFrame {
    speed: f64,
    theta: f64,
    to_downwind: Rotation2<f64>,
}

impl WindFrame {
    /// Build the frame for `wind`
    ///
    /// # Errors
    ///
    /// Returns [`PlumeError::DegenerateWind`] when the speed is zero or not finite.
    pub fn new(wind: WindVector) -> PlumeResult<Self> {
        let speed = wind.speed();
        if !speed.is_finite() || speed <= f64::EPSILON {
            return Err(PlumeError::DegenerateWind { speed });
        }
        let theta = wind.direction();
        Ok(Self {
            speed,
            theta,
            to_downwind: Rotation2::new(-theta),
        })
    }

    /// Wind speed `u` (m/s), always > 0
    #[inline]
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Wind direction `θ` (radians)
    #[inline]
    pub fn theta(&self) -> f64 {
        self.theta
    }

    /// Rotate a grid point into (downwind, crosswind)
    #[inline]
    pub fn rotate(&self, x: f64, y: f64) -> (f64, f64) {
        let r = self.to_downwind * Vector2::new(x, y);
        (r.x, r.y)
    }

    /// Partial derivatives of the rotated coordinates with respect to the
    /// source position, for a point at `(x - x_src, y - y_src)`
    ///
    /// Returns `[[∂x_rot/∂x_src, ∂x_rot/∂y_src], [∂y_rot/∂x_src, ∂y_rot/∂y_src]]`.
    #[inline]
    pub fn source_jacobian(&self) -> [[f64; 2]; 2] {
        let (sin, cos) = self.theta.sin_cos();
        [[-cos, -sin], [sin, -cos]]
    }
}
