//! Gaussian dispersion physics
//!
//! Leaves first: stability-dependent spread coefficients, the wind-aligned
//! frame, the simulation grid, then the steady plume and instantaneous puff
//! models built on top of them.

pub mod coefficients;
pub mod grid;
pub mod plume;
pub mod puff;
pub mod wind;

// Re-export main types
pub use coefficients::{DispersionCoefficients, Spread, StabilityClass, MIN_DISTANCE};
pub use grid::{linspace, ConcentrationField, GridSpec, SimulationGrid, MAX_POINTS_PER_AXIS};
pub use plume::{PlumeModel, PlumeParams, PlumeResponse, RemovalRates};
pub use puff::{PuffModel, PuffParams, PuffSnapshot};
pub use wind::{WindFrame, WindVector};
