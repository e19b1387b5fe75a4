//! Gaussian Dispersion Core Library
//!
//! Forward and inverse modelling of pollutant releases over a flat domain
//! centred on a geographic origin.
//!
//! ## Forward mode
//!
//! - Steady-state Gaussian plume with ground reflection, gravitational
//!   settling, dry deposition and first-order decay
//! - Instantaneous Gaussian puff animated over elapsed time
//! - Pasquill-Gifford spread for stability classes A–F
//! - Web-Mercator overlay geometry and a tile-provider seam for basemaps
//!
//! ## Inverse mode
//!
//! - Sensor CSV ingestion into an [`ObservationSession`]
//! - Bayesian estimation of source position, emission rate and noise with a
//!   No-U-Turn sampler over parallel chains
//! - Background execution with polling, progress and cancellation
//!
//! The library logs through `tracing` and never installs a subscriber.

// Physics
pub mod dispersion;

// Geography
pub mod geo;

// Inputs and orchestration
pub mod error;
pub mod forward;
pub mod observations;
pub mod scenario;

// Inference
pub mod inversion;

// Re-export physics types
pub use dispersion::{
    ConcentrationField, GridSpec, PlumeModel, PlumeParams, PuffModel, PuffParams, RemovalRates,
    SimulationGrid, StabilityClass, WindFrame, WindVector,
};

// Re-export inputs and forward mode
pub use error::{PlumeError, PlumeResult};
pub use forward::{run_forward, ForwardFields, ForwardResult, TimedField, VisualizationSink};
pub use geo::{MapView, SensorLocator, TileProvider};
pub use observations::{ObservationSession, SensorObservation};
pub use scenario::{ModelKind, ScenarioConfig, MAX_FRAMES};

// Re-export inference types
pub use inversion::{
    InversionConfig, InversionEngine, InversionHandle, InversionProblem, Parameter,
    ParameterSummary, RunControl, SamplerDiagnostics, SourcePosterior, SourceSample, TaskStatus,
};
