use clap::{Args as ClapArgs, Parser, Subcommand};
use plume_core::{
    run_forward, ConcentrationField, ForwardFields, InversionConfig, InversionEngine,
    InversionProblem, MapView, ModelKind, ObservationSession, PlumeResult, ScenarioConfig,
    SourcePosterior, StabilityClass, TaskStatus, TimedField, VisualizationSink, WindVector,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Gaussian plume/puff dispersion and source inversion
#[derive(Parser, Debug)]
#[command(name = "plume-demo")]
#[command(about = "Forward dispersion and Bayesian source inversion", long_about = None)]
struct Args {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Evaluate a plume or puff from known source parameters
    Forward {
        #[command(flatten)]
        scenario: ScenarioArgs,

        /// Evaluate a puff instead of a plume
        #[arg(long)]
        puff: bool,

        /// Emission rate (g/s) for a plume, released mass (g) for a puff
        #[arg(short, long)]
        q: Option<f64>,

        /// Write the full result as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Estimate the source from sensor observations
    Inverse {
        #[command(flatten)]
        scenario: ScenarioArgs,

        /// Sensor CSV: header, then latitude,longitude,concentration
        #[arg(short, long)]
        sensors: PathBuf,

        /// Inversion settings as JSON (defaults otherwise)
        #[arg(long)]
        inversion: Option<PathBuf>,

        /// Retained draws per chain
        #[arg(long)]
        draws: Option<usize>,

        /// Warmup iterations per chain
        #[arg(long)]
        tune: Option<usize>,

        /// Number of chains
        #[arg(long)]
        chains: Option<usize>,

        /// Base RNG seed
        #[arg(long)]
        seed: Option<u64>,

        /// Write the posterior draws and summaries as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Scenario overrides applied on top of an optional JSON file
#[derive(ClapArgs, Debug)]
struct ScenarioArgs {
    /// Scenario JSON; missing fields take defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Origin latitude (degrees)
    #[arg(long)]
    lat: Option<f64>,

    /// Origin longitude (degrees)
    #[arg(long)]
    lon: Option<f64>,

    /// Eastward wind (m/s)
    #[arg(long)]
    wind_east: Option<f64>,

    /// Northward wind (m/s)
    #[arg(long)]
    wind_north: Option<f64>,

    /// Effective stack height (m)
    #[arg(long)]
    height: Option<f64>,

    /// Stability class A-F; unknown letters fall back to D
    #[arg(long)]
    stability: Option<String>,

    /// Noise prior scale for the inversion (g/m³)
    #[arg(long)]
    noise: Option<f64>,
}

impl ScenarioArgs {
    fn load(&self) -> PlumeResult<ScenarioConfig> {
        let mut config = match &self.config {
            Some(path) => ScenarioConfig::from_json_file(path)?,
            None => ScenarioConfig::default(),
        };
        if let Some(lat) = self.lat {
            config.latitude = lat;
        }
        if let Some(lon) = self.lon {
            config.longitude = lon;
        }
        config.wind = WindVector::new(
            self.wind_east.unwrap_or(config.wind.east),
            self.wind_north.unwrap_or(config.wind.north),
        );
        if let Some(h) = self.height {
            config.stack_height = h;
        }
        if let Some(label) = &self.stability {
            config.stability = StabilityClass::parse_or_default(label);
        }
        if let Some(noise) = self.noise {
            config.noise_scale = noise;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Prints what a plotting frontend would draw
struct ConsoleSink;

impl VisualizationSink for ConsoleSink {
    fn plume(&mut self, field: &ConcentrationField, view: &MapView) {
        let (row, col) = field.argmax();
        println!("Plume field: {}x{} cells", field.rows, field.cols);
        println!("  Peak: {:.4e} g/m³ at cell ({row}, {col})", field.max());
        print_view(view);
    }

    fn puff(&mut self, frames: &[TimedField], view: &MapView) {
        println!("Puff frames: {}", frames.len());
        println!("Time(s) | Peak (g/m³) | Peak cell");
        println!("--------|-------------|----------");
        for frame in frames {
            let (row, col) = frame.field.argmax();
            println!("{:7.1} | {:11.4e} | ({row}, {col})", frame.time, frame.field.max());
        }
        print_view(view);
    }

    fn posterior(&mut self, posterior: &SourcePosterior) {
        println!(
            "Parameter |       Mean |         SD |          95% CI          \
             |          94% HDI         | R-hat |   ESS"
        );
        println!(
            "----------|------------|------------|--------------------------\
             |--------------------------|-------|------"
        );
        for s in posterior.summaries() {
            println!(
                "{:9} | {:10.4} | {:10.4} | [{:10.4}, {:10.4}] \
                 | [{:10.4}, {:10.4}] | {:5.3} | {:5.0}",
                s.parameter.name(),
                s.mean,
                s.sd,
                s.ci.0,
                s.ci.1,
                s.hdi.0,
                s.hdi.1,
                s.r_hat,
                s.ess
            );
        }
        let d = posterior.diagnostics();
        println!(
            "\nDraws: {}, divergences: {}, mean accept: {:.3}, max-depth hits: {}",
            d.total_draws, d.divergences, d.mean_accept_stat, d.max_depth_hits
        );
        println!("Step sizes: {:?}", d.step_sizes);
    }
}

fn print_view(view: &MapView) {
    let b = &view.bounds;
    println!(
        "  Map: zoom {}, tiles around ({}, {}), bounds lon [{:.6}, {:.6}] lat [{:.6}, {:.6}]",
        view.zoom,
        view.center_tile_x,
        view.center_tile_y,
        b.min_lon,
        b.max_lon,
        b.min_lat,
        b.max_lat
    );
    println!("  Overlay offset: ({}, {})", view.overlay_x, view.overlay_y);
}

fn forward(
    scenario: &ScenarioArgs,
    puff: bool,
    q: Option<f64>,
    output: Option<&Path>,
) -> PlumeResult<()> {
    let mut config = scenario.load()?;
    config.model = match (puff, config.model) {
        (true, ModelKind::Puff { .. }) | (false, ModelKind::Plume { .. }) => config.model,
        (true, ModelKind::Plume { .. }) => ModelKind::default_puff(),
        (false, ModelKind::Puff { .. }) => ModelKind::default(),
    };
    if let Some(q) = q {
        match &mut config.model {
            ModelKind::Plume { emission_rate } => *emission_rate = q,
            ModelKind::Puff { release_mass, .. } => *release_mass = q,
        }
    }

    println!("=== Forward Dispersion ===\n");
    println!(
        "Origin: ({:.6}, {:.6}), wind ({:.2}, {:.2}) m/s, H = {:.1} m, stability {}",
        config.latitude,
        config.longitude,
        config.wind.east,
        config.wind.north,
        config.stack_height,
        config.stability
    );

    let result = run_forward(&config)?;
    println!(
        "Wind speed {:.2} m/s, direction {:.3} rad\n",
        result.wind_speed, result.wind_direction
    );
    result.emit(&mut ConsoleSink);

    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string(&result)?)?;
        println!("\nWrote {}", path.display());
    }
    if let ForwardFields::Puff(frames) = &result.fields {
        if frames.iter().all(|f| f.field.max() == 0.0) {
            println!("\nNote: every frame is zero; the puff may have left the grid");
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn inverse(
    scenario: &ScenarioArgs,
    sensors: &Path,
    inversion: Option<&Path>,
    draws: Option<usize>,
    tune: Option<usize>,
    chains: Option<usize>,
    seed: Option<u64>,
    output: Option<&Path>,
) -> PlumeResult<()> {
    let config = scenario.load()?;
    let mut settings = match inversion {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => InversionConfig::default(),
    };
    settings.draws = draws.unwrap_or(settings.draws);
    settings.tune = tune.unwrap_or(settings.tune);
    settings.chains = chains.unwrap_or(settings.chains);
    settings.seed = seed.unwrap_or(settings.seed);

    println!("=== Source Inversion ===\n");
    let session = ObservationSession::new();
    let loaded = session.load_csv(sensors)?;
    println!("Loaded {loaded} sensors from {}", sensors.display());

    let problem = InversionProblem::from_scenario(&config, &session.snapshot()?, settings)?;
    let handle = InversionEngine::new(problem).submit()?;
    while handle.poll() == TaskStatus::Running {
        std::thread::sleep(Duration::from_millis(500));
        let (done, total) = handle.progress();
        println!(
            "  {done:>7} / {total} iterations ({:.0}%)",
            100.0 * handle.fraction_complete()
        );
    }
    let posterior = handle.wait()?;
    println!();
    ConsoleSink.posterior(&posterior);

    if let Some(path) = output {
        let report = serde_json::json!({
            "summaries": posterior.summaries(),
            "diagnostics": posterior.diagnostics(),
            "posterior": posterior,
        });
        std::fs::write(path, serde_json::to_string(&report)?)?;
        println!("\nWrote {}", path.display());
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let outcome = match &args.mode {
        Mode::Forward {
            scenario,
            puff,
            q,
            output,
        } => forward(scenario, *puff, *q, output.as_deref()),
        Mode::Inverse {
            scenario,
            sensors,
            inversion,
            draws,
            tune,
            chains,
            seed,
            output,
        } => inverse(
            scenario,
            sensors,
            inversion.as_deref(),
            *draws,
            *tune,
            *chains,
            *seed,
            output.as_deref(),
        ),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
