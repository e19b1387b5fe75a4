//! Inversion Recovery Test Suite
//!
//! Generates synthetic sensor data from a plume with a known source, loads it
//! through the observation session as CSV, and checks that the sampler
//! recovers the source and reports sane diagnostics.
//!
//! The repeated-trial coverage check is slow and `#[ignore]`d:
//! `cargo test --test inversion_recovery -- --ignored`

use plume_core::{
    geo::METERS_PER_DEGREE, InversionConfig, InversionEngine, InversionProblem, ObservationSession,
    Parameter, PlumeError, RunControl, ScenarioConfig, SourcePosterior, StabilityClass, TaskStatus,
    WindVector,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use std::fmt::Write as _;

#[ctor::ctor]
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const TRUE_X: f64 = 30.0;
const TRUE_Y: f64 = 40.0;
const TRUE_Q: f64 = 50.0;

fn scenario() -> ScenarioConfig {
    ScenarioConfig {
        wind: WindVector::new(5.0, 0.0),
        stability: StabilityClass::D,
        stack_height: 10.0,
        noise_scale: 1e-3,
        ..ScenarioConfig::default()
    }
}

fn quick_config(seed: u64) -> InversionConfig {
    InversionConfig {
        draws: 300,
        tune: 400,
        chains: 2,
        target_accept: 0.9,
        max_tree_depth: 8,
        seed,
        ..InversionConfig::default()
    }
}

/// CSV of sensors on a downwind lattice, values from the true source plus noise
fn synthetic_csv(scenario: &ScenarioConfig, noise_sd: f64, seed: u64) -> String {
    let grid = scenario.build_grid().unwrap();
    let frame = scenario.wind_frame().unwrap();
    let plume = scenario.plume_model(TRUE_Q).unwrap();
    let locator = plume_core::SensorLocator::new(scenario.latitude, scenario.longitude).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let mut csv = String::from("latitude,longitude,concentration\n");
    for x in [150.0, 250.0, 350.0, 450.0] {
        for y in [-10.0, 10.0, 30.0, 50.0, 70.0, 90.0] {
            // grid rows run south, so a sensor at +y sits south of the origin
            let lat = scenario.latitude - y / METERS_PER_DEGREE;
            let lon = scenario.longitude + x / METERS_PER_DEGREE;
            let cell = locator.locate(lat, lon, &grid);
            let (gx, gy) = grid.point(cell.row, cell.col);
            let (xr, yr) = frame.rotate(gx - TRUE_X, gy - TRUE_Y);
            let noise: f64 = rng.sample(StandardNormal);
            let c = plume.concentration(xr, yr, grid.z()) + noise_sd * noise;
            writeln!(csv, "{lat:.12},{lon:.12},{c:.12e}").unwrap();
        }
    }
    csv
}

fn run(seed: u64, noise_sd: f64, config: InversionConfig) -> SourcePosterior {
    let scenario = scenario();
    let session = ObservationSession::new();
    assert_eq!(session.load_str(&synthetic_csv(&scenario, noise_sd, seed)).unwrap(), 24);
    let snapshot = session.snapshot().unwrap();
    let problem = InversionProblem::from_scenario(&scenario, &snapshot, config).unwrap();
    InversionEngine::new(problem).run(&RunControl::new()).unwrap()
}

/// The posterior concentrates on the true source
#[test]
fn test_recovers_known_source() {
    let posterior = run(11, 5e-5, quick_config(2024));
    assert_eq!(posterior.num_chains(), 2);
    assert_eq!(posterior.len(), 600);

    let truth = [
        (Parameter::XSource, TRUE_X, 5.0),
        (Parameter::YSource, TRUE_Y, 5.0),
        (Parameter::EmissionRate, TRUE_Q, 0.1 * TRUE_Q),
    ];
    let summaries = posterior.summaries();
    for (parameter, value, tolerance) in truth {
        let s = summaries
            .iter()
            .find(|s| s.parameter == parameter)
            .unwrap();
        assert!(
            s.ci.0 <= s.mean && s.mean <= s.ci.1,
            "{}: mean {} outside its own CI {:?}",
            parameter.name(),
            s.mean,
            s.ci
        );
        assert!(
            (s.mean - value).abs() < tolerance,
            "{}: mean {} vs true {}",
            parameter.name(),
            s.mean,
            value
        );
        assert!(s.r_hat < 1.2, "{}: r_hat {}", parameter.name(), s.r_hat);
        assert!(s.hdi.0 <= s.hdi.1);
    }

    let diagnostics = posterior.diagnostics();
    assert_eq!(diagnostics.total_draws, 600);
    assert!(diagnostics.divergences < 60, "{} divergences", diagnostics.divergences);
    assert!(diagnostics.step_sizes.iter().all(|&e| e > 0.0 && e.is_finite()));
}

/// Same seed, same draws
#[test]
fn test_seeded_runs_are_reproducible() {
    let config = InversionConfig {
        draws: 40,
        tune: 40,
        ..quick_config(5)
    };
    let a = run(3, 5e-5, config.clone());
    let b = run(3, 5e-5, config);
    assert_eq!(a, b);
}

/// Background run: poll until finished, progress reaches the total
#[test]
fn test_submit_and_wait() {
    let scenario = scenario();
    let session = ObservationSession::new();
    session.load_str(&synthetic_csv(&scenario, 5e-5, 1)).unwrap();
    let config = InversionConfig {
        draws: 30,
        tune: 30,
        ..quick_config(7)
    };
    let problem =
        InversionProblem::from_scenario(&scenario, &session.snapshot().unwrap(), config).unwrap();

    let handle = InversionEngine::new(problem).submit().unwrap();
    while handle.poll() == TaskStatus::Running {
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    assert_eq!(handle.progress(), (120, 120));
    let posterior = handle.wait().unwrap();
    assert_eq!(posterior.len(), 60);
}

/// A cancelled run yields no posterior, and a fresh run afterwards is unaffected
#[test]
fn test_cancel_discards_run() {
    let scenario = scenario();
    let session = ObservationSession::new();
    session.load_str(&synthetic_csv(&scenario, 5e-5, 2)).unwrap();
    let snapshot = session.snapshot().unwrap();

    let long = InversionConfig {
        draws: 1_000_000,
        ..quick_config(1)
    };
    let problem = InversionProblem::from_scenario(&scenario, &snapshot, long).unwrap();
    let handle = InversionEngine::new(problem).submit().unwrap();
    handle.cancel();
    assert!(matches!(handle.wait(), Err(PlumeError::Cancelled)));

    let short = InversionConfig {
        draws: 20,
        tune: 20,
        ..quick_config(1)
    };
    let problem = InversionProblem::from_scenario(&scenario, &snapshot, short).unwrap();
    let posterior = InversionEngine::new(problem).run(&RunControl::new()).unwrap();
    assert_eq!(posterior.len(), 40);
}

/// An empty session is rejected before sampling with its own error
#[test]
fn test_empty_session_rejected() {
    let session = ObservationSession::new();
    assert!(matches!(session.snapshot(), Err(PlumeError::NoObservationsLoaded)));
    assert!(matches!(
        InversionProblem::from_scenario(&scenario(), &[], quick_config(0)),
        Err(PlumeError::NoObservationsLoaded)
    ));
}

/// Across repeated synthetic trials the 95% interval covers the truth most of the time
#[test]
#[ignore = "runs twenty full inversions"]
fn test_credible_interval_coverage() {
    let trials = 20;
    let mut covered = [0_usize; 3];
    for trial in 0..trials {
        let posterior = run(100 + trial, 5e-5, quick_config(500 + trial));
        for (k, (parameter, value)) in [
            (Parameter::XSource, TRUE_X),
            (Parameter::YSource, TRUE_Y),
            (Parameter::EmissionRate, TRUE_Q),
        ]
        .into_iter()
        .enumerate()
        {
            let s = posterior.summarize(parameter, 0.95, 0.94, 10);
            if s.ci.0 <= value && value <= s.ci.1 {
                covered[k] += 1;
            }
        }
    }
    for (k, &hits) in covered.iter().enumerate() {
        assert!(hits >= 15, "parameter {k}: covered {hits} of {trials}");
    }
}
