//! Physics Validation Test Suite
//!
//! Checks the dispersion equations against closed-form expectations and the
//! structural properties every valid scenario must satisfy.
//!
//! # Test Categories
//! 1. Pasquill-Gifford spread
//! 2. Plume reference values and symmetry
//! 3. Removal processes
//! 4. Puff transport
//! 5. Degenerate input
//!
//! Run tests with: `cargo test --test physics_validation`

use plume_core::{
    dispersion::{DispersionCoefficients, PuffParams},
    run_forward, ForwardFields, GridSpec, ModelKind, PlumeError, PlumeModel, PlumeParams,
    PuffModel, RemovalRates, ScenarioConfig, StabilityClass, WindFrame, WindVector,
};

#[ctor::ctor]
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn plume(stability: StabilityClass, removal: RemovalRates) -> PlumeModel {
    PlumeModel::new(PlumeParams {
        emission_rate: 1.0,
        wind_speed: 5.0,
        stack_height: 10.0,
        stability,
        removal,
    })
    .unwrap()
}

// ═══════════════════════════════════════════════════════════════════════════════
// SECTION 1: PASQUILL-GIFFORD SPREAD
// ═══════════════════════════════════════════════════════════════════════════════

/// σ_y and σ_z are positive and non-decreasing downwind for every class
#[test]
fn test_spread_positive_and_monotonic_all_classes() {
    let distances: Vec<f64> = (0..400).map(|i| 0.5 + f64::from(i) * 2.5).collect();
    for class in StabilityClass::ALL {
        let spreads = class.coefficients().spread_many(&distances);
        for pair in spreads.windows(2) {
            let ((sy0, sz0), (sy1, sz1)) = (pair[0], pair[1]);
            assert!(sy0 > 0.0 && sz0 > 0.0, "class {class}: non-positive spread");
            assert!(sy1 >= sy0 && sz1 >= sz0, "class {class}: spread decreased downwind");
        }
    }
}

/// Unstable air spreads faster than stable air at the same distance
#[test]
fn test_spread_ordering_by_stability() {
    let at_500: Vec<f64> = StabilityClass::ALL
        .iter()
        .map(|c| c.coefficients().spread(500.0).sigma_y)
        .collect();
    for pair in at_500.windows(2) {
        assert!(pair[0] > pair[1], "σ_y should shrink from A to F: {at_500:?}");
    }
}

/// Unknown labels fall back to class D
#[test]
fn test_unknown_class_uses_neutral_coefficients() {
    let fallback = StabilityClass::parse_or_default("Z").coefficients();
    let neutral: DispersionCoefficients = StabilityClass::D.coefficients();
    assert_eq!(fallback, neutral);
}

// ═══════════════════════════════════════════════════════════════════════════════
// SECTION 2: PLUME REFERENCE VALUES AND SYMMETRY
// ═══════════════════════════════════════════════════════════════════════════════

/// x = 100 m, Q = 1 g/s, u = 5 m/s, H = 10 m, class D, no removal
/// Expected: σ_y ≈ 5.048, σ_z ≈ 3.786, C ≈ 1.02e-4 g/m³
#[test]
fn test_reference_scenario() {
    let spread = StabilityClass::D.coefficients().spread(100.0);
    assert!((spread.sigma_y - 5.048).abs() < 5e-3, "σ_y = {}", spread.sigma_y);
    assert!((spread.sigma_z - 3.786).abs() < 5e-3, "σ_z = {}", spread.sigma_z);

    let c = plume(StabilityClass::D, RemovalRates::default()).concentration(100.0, 0.0, 0.0);
    let relative_error = (c - 1.02e-4).abs() / 1.02e-4;
    assert!(relative_error < 0.01, "C = {c:e}, relative error {relative_error}");
}

/// C is an even function of the crosswind offset and never negative
#[test]
fn test_crosswind_symmetry_and_positivity() {
    let removal = RemovalRates {
        settling_velocity: 0.01,
        deposition_velocity: 0.005,
        decay_rate: 0.001,
    };
    for class in StabilityClass::ALL {
        let model = plume(class, removal);
        for x in [-50.0, 0.0, 1.0, 30.0, 200.0, 900.0] {
            for y in [0.0, 3.0, 17.0, 120.0] {
                for z in [0.0, 2.0, 10.0] {
                    let left = model.concentration(x, y, z);
                    let right = model.concentration(x, -y, z);
                    assert!(left >= 0.0 && left.is_finite(), "C({x},{y},{z}) = {left}");
                    assert_eq!(left, right, "asymmetry at ({x}, {y}, {z}) class {class}");
                }
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SECTION 3: REMOVAL PROCESSES
// ═══════════════════════════════════════════════════════════════════════════════

/// Increasing decay strictly lowers concentration at every downwind point
#[test]
fn test_decay_monotonicity() {
    let rates = [0.0, 1e-4, 1e-3, 1e-2];
    for x in [10.0, 100.0, 500.0] {
        let values: Vec<f64> = rates
            .iter()
            .map(|&decay_rate| {
                plume(
                    StabilityClass::C,
                    RemovalRates {
                        decay_rate,
                        ..RemovalRates::default()
                    },
                )
                .concentration(x, 2.0, 0.0)
            })
            .collect();
        for pair in values.windows(2) {
            assert!(pair[1] < pair[0], "decay did not lower C at x={x}: {values:?}");
        }
    }
}

/// Deposition acts like decay in the plume: more removal, less concentration
#[test]
fn test_deposition_lowers_concentration() {
    let clean = plume(StabilityClass::B, RemovalRates::default()).concentration(300.0, 0.0, 0.0);
    let deposited = plume(
        StabilityClass::B,
        RemovalRates {
            deposition_velocity: 0.01,
            ..RemovalRates::default()
        },
    )
    .concentration(300.0, 0.0, 0.0);
    assert!(deposited < clean);
}

// ═══════════════════════════════════════════════════════════════════════════════
// SECTION 4: PUFF TRANSPORT
// ═══════════════════════════════════════════════════════════════════════════════

/// The puff centre advects downwind at u·t
#[test]
fn test_puff_peak_moves_with_wind() {
    let config = ScenarioConfig {
        wind: WindVector::new(3.0, 0.0),
        stability: StabilityClass::D,
        removal: RemovalRates::default(),
        grid: GridSpec {
            extent: 200.0,
            resolution: 2.0,
        },
        model: ModelKind::Puff {
            release_mass: 100.0,
            duration: 40.0,
            time_step: 20.0,
        },
        ..ScenarioConfig::default()
    };
    let result = run_forward(&config).unwrap();
    let ForwardFields::Puff(frames) = result.fields else {
        panic!("expected puff frames");
    };
    assert_eq!(frames.len(), 3);

    let grid = config.build_grid().unwrap();
    for frame in frames.iter().skip(1) {
        let (row, col) = frame.field.argmax();
        let (x, y) = grid.point(row, col);
        let expected = 3.0 * frame.time;
        assert!((x - expected).abs() < 6.0, "t={}: peak at x={x}, expected {expected}", frame.time);
        assert!(y.abs() < 3.0, "t={}: peak off axis at y={y}", frame.time);
    }
}

/// Decay reduces the puff by exactly exp(-k·t) relative to no decay
#[test]
fn test_puff_decay_factor() {
    let params = |decay_rate| PuffParams {
        release_mass: 5.0,
        wind_speed: 4.0,
        stack_height: 10.0,
        stability: StabilityClass::D,
        removal: RemovalRates {
            decay_rate,
            ..RemovalRates::default()
        },
    };
    let t = 30.0;
    let base = PuffModel::new(params(0.0)).unwrap().concentration(120.0, 0.0, 0.0, t).unwrap();
    let decayed = PuffModel::new(params(0.01)).unwrap().concentration(120.0, 0.0, 0.0, t).unwrap();
    let ratio = decayed / base;
    assert!((ratio - (-0.01_f64 * t).exp()).abs() < 1e-12, "ratio {ratio}");
}

// ═══════════════════════════════════════════════════════════════════════════════
// SECTION 5: DEGENERATE INPUT
// ═══════════════════════════════════════════════════════════════════════════════

/// Calm wind is a defined rejection, never a NaN field
#[test]
fn test_zero_wind_rejected() {
    assert!(matches!(
        WindFrame::new(WindVector::new(0.0, 0.0)),
        Err(PlumeError::DegenerateWind { .. })
    ));
    let config = ScenarioConfig {
        wind: WindVector::new(0.0, -0.0),
        ..ScenarioConfig::default()
    };
    assert!(matches!(
        run_forward(&config),
        Err(PlumeError::DegenerateWind { .. })
    ));
}

/// A near-calm but valid wind with removal enabled renders a finite,
/// non-negative field over the whole default grid, including upwind cells
#[test]
fn test_near_calm_wind_with_removal_is_finite_everywhere() {
    let config = ScenarioConfig {
        wind: WindVector::new(0.004, 0.0),
        ..ScenarioConfig::default()
    };
    assert!(config.removal.decay_rate > 0.0 && config.removal.settling_velocity > 0.0);
    config.validate().unwrap();

    let result = run_forward(&config).unwrap();
    let ForwardFields::Plume(field) = &result.fields else {
        panic!("expected plume output");
    };
    assert_eq!(field.values.len(), 1_000_000);
    let bad = field
        .values
        .iter()
        .filter(|c| !c.is_finite() || **c < 0.0)
        .count();
    assert_eq!(bad, 0, "{bad} cells are negative or non-finite");
    assert_eq!(field.non_finite_cells(), 0);
    assert!(result.peak() > 0.0);
}

/// Negative puff time is rejected
#[test]
fn test_negative_time_rejected() {
    let model = PuffModel::new(PuffParams {
        release_mass: 1.0,
        wind_speed: 2.0,
        stack_height: 5.0,
        stability: StabilityClass::A,
        removal: RemovalRates::default(),
    })
    .unwrap();
    assert!(model.at_time(-1.0).is_err());
}
