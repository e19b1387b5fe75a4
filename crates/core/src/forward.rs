//! Forward mode: render concentration fields from known source parameters
//!
//! Every call rebuilds the wind frame and grid from the scenario it is given;
//! nothing is cached between runs. Puff frames are independent of each other
//! and are computed in parallel, then returned in time order.

use crate::dispersion::{ConcentrationField, SimulationGrid, WindFrame};
use crate::error::PlumeResult;
use crate::geo::MapView;
use crate::inversion::SourcePosterior;
use crate::scenario::{ModelKind, ScenarioConfig};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// One puff frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedField {
    /// Seconds since release
    pub time: f64,
    /// Concentration at that instant
    pub field: ConcentrationField,
}

/// Fields produced by a forward run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ForwardFields {
    /// Steady-state plume
    Plume(ConcentrationField),
    /// Puff frames in time order
    Puff(Vec<TimedField>),
}

/// Result of a forward run, ready for a visualization sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardResult {
    /// Overlay geometry for the map
    pub view: MapView,
    /// Wind speed used (m/s)
    pub wind_speed: f64,
    /// Wind direction used (radians, image orientation)
    pub wind_direction: f64,
    /// Rendered fields
    pub fields: ForwardFields,
}

impl ForwardResult {
    /// Hand the result to a sink
    pub fn emit<S: VisualizationSink + ?Sized>(&self, sink: &mut S) {
        match &self.fields {
            ForwardFields::Plume(field) => sink.plume(field, &self.view),
            ForwardFields::Puff(frames) => sink.puff(frames, &self.view),
        }
    }

    /// Largest concentration across all fields
    pub fn peak(&self) -> f64 {
        match &self.fields {
            ForwardFields::Plume(field) => field.max(),
            ForwardFields::Puff(frames) => frames
                .iter()
                .map(|f| f.field.max())
                .fold(0.0, f64::max),
        }
    }
}

/// Receiver of rendered output (plots, animations, files)
pub trait VisualizationSink {
    /// A steady-state concentration grid and its overlay geometry
    fn plume(&mut self, field: &ConcentrationField, view: &MapView);

    /// Time-ordered puff frames and their overlay geometry
    fn puff(&mut self, frames: &[TimedField], view: &MapView);

    /// Posterior samples and summaries from an inversion
    fn posterior(&mut self, posterior: &SourcePosterior);
}

/// Evaluate the scenario's model over its grid
///
/// # Errors
///
/// Fails on any invalid scenario field, including calm wind, before a single
/// concentration is computed, and with [`crate::PlumeError::NonFiniteField`] if a
/// computed field is not finite everywhere.
pub fn run_forward(config: &ScenarioConfig) -> PlumeResult<ForwardResult> {
    config.validate()?;
    let frame = config.wind_frame()?;
    let grid = config.build_grid()?;
    let view = MapView::new(config.latitude, config.longitude, config.zoom, grid.shape())?;

    info!(
        "Forward run: {:?}, u={:.2} m/s, θ={:.3} rad, stability {}, {}x{} grid",
        config.model,
        frame.speed(),
        frame.theta(),
        config.stability,
        grid.len(),
        grid.len()
    );

    let fields = match config.model {
        ModelKind::Plume { emission_rate } => {
            let model = config.plume_model(emission_rate)?;
            ForwardFields::Plume(model.field(&grid, &frame))
        }
        ModelKind::Puff { release_mass, .. } => {
            ForwardFields::Puff(puff_series(config, release_mass, &grid, &frame)?)
        }
    };

    match &fields {
        ForwardFields::Plume(field) => field.ensure_finite()?,
        ForwardFields::Puff(frames) => {
            for frame in frames {
                frame.field.ensure_finite()?;
            }
        }
    }

    let result = ForwardResult {
        view,
        wind_speed: frame.speed(),
        wind_direction: frame.theta(),
        fields,
    };
    debug!("Forward run peak concentration {:.4e} g/m³", result.peak());
    Ok(result)
}

fn puff_series(
    config: &ScenarioConfig,
    release_mass: f64,
    grid: &SimulationGrid,
    frame: &WindFrame,
) -> PlumeResult<Vec<TimedField>> {
    let model = config.puff_model(release_mass)?;
    let snapshots = config
        .model
        .frame_times()?
        .into_iter()
        .map(|t| model.at_time(t))
        .collect::<PlumeResult<Vec<_>>>()?;

    Ok(snapshots
        .par_iter()
        .map(|snap| TimedField {
            time: snap.time,
            field: snap.field(grid, frame),
        })
        .collect())
}
