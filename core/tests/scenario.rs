//! End-to-end scenario runs through the engine.

use rstar_scenario_core::{
    types::{Bounds, DEBT_GDP, EMBI},
    CalibrationConfig, CancelToken, EngineError, NormalSource, ParameterError, ScenarioEngine,
    SeededRng, SimulationRequest,
};

fn engine() -> ScenarioEngine {
    let _ = env_logger::builder().is_test(true).try_init();
    ScenarioEngine::new(CalibrationConfig::reference()).expect("reference calibration")
}

fn invalid_parameter(result: Result<impl std::fmt::Debug, EngineError>) -> ParameterError {
    match result {
        Err(EngineError::InvalidParameter(e)) => e,
        other => panic!("expected InvalidParameter, got {other:?}"),
    }
}

/// Reference inputs, 10k draws: mean within [4.0, 5.5], P(>6%) within [0, 0.30].
#[test]
fn worked_scenario_stays_within_regression_bounds() {
    let result = engine()
        .run_seeded(&SimulationRequest::reference(), 20_240_601)
        .unwrap();

    assert_eq!(result.simulations, 10_000);
    assert_eq!(result.requested, 10_000);
    assert!((4.0..=5.5).contains(&result.mean), "mean {}", result.mean);
    assert!((0.0..=0.30).contains(&result.prob_above_6), "P(>6) {}", result.prob_above_6);
    assert!(result.p5 <= result.median && result.median <= result.p95);
    assert_eq!(result.histogram.iter().map(|b| b.count).sum::<usize>(), 10_000);
}

#[test]
fn worked_scenario_baseline_matches_hand_calculation() {
    let result = engine()
        .run_seeded(&SimulationRequest::reference().with_num_sims(10), 1)
        .unwrap();

    // debt 0.4*1.44 + deficit 0.3*0.25 + cds 0.3*0.525
    let fiscal = 4.0 + 0.576 + 0.075 + 0.1575;
    let composite = 4.75 + (fiscal - 6.42) * 0.15;
    assert!((result.baseline.fiscal_rstar - fiscal).abs() < 1e-12);
    assert!((result.baseline.composite_rstar - composite).abs() < 1e-12);
    assert!((result.baseline.policy_rate - (composite + 5.0 + 0.5)).abs() < 1e-12);
}

#[test]
fn policy_rate_tracks_composite_plus_inflation_and_term_premium() {
    let result = engine()
        .run_seeded(&SimulationRequest::reference().with_num_sims(3_000), 5)
        .unwrap();
    let expected = result.raw_results.iter().sum::<f64>() / 3_000.0 + 5.0 + 0.5;
    assert!((result.mean_derived_policy_rate - expected).abs() < 0.011);
    assert!(result.policy_p5 <= result.mean_derived_policy_rate);
    assert!(result.mean_derived_policy_rate <= result.policy_p95);
}

#[test]
fn zero_simulations_rejected() {
    let err = invalid_parameter(engine().run_seeded(&SimulationRequest::reference().with_num_sims(0), 1));
    assert_eq!(err, ParameterError::ZeroSimulations(0));
}

#[test]
fn missing_center_rejected() {
    let mut request = SimulationRequest::reference();
    request.centers.remove(EMBI);
    let err = invalid_parameter(engine().run_seeded(&request, 1));
    assert_eq!(err, ParameterError::MissingCenter { key: EMBI.into() });
}

#[test]
fn missing_bounds_rejected() {
    let mut request = SimulationRequest::reference();
    request.bounds.remove(DEBT_GDP);
    let err = invalid_parameter(engine().run_seeded(&request, 1));
    assert_eq!(err, ParameterError::MissingBounds { key: DEBT_GDP.into() });
}

#[test]
fn inverted_bounds_rejected() {
    let mut request = SimulationRequest::reference();
    request.bounds.insert(DEBT_GDP.into(), Bounds::new(130.0, 40.0));
    let err = invalid_parameter(engine().run_seeded(&request, 1));
    assert!(matches!(err, ParameterError::InvertedBounds { .. }), "{err:?}");
}

#[test]
fn center_outside_bounds_rejected() {
    let request = SimulationRequest::reference().with_center(DEBT_GDP, 140.0);
    let err = invalid_parameter(engine().run_seeded(&request, 1));
    assert_eq!(
        err,
        ParameterError::CenterOutOfBounds { key: DEBT_GDP.into(), center: 140.0, min: 40.0, max: 130.0 }
    );
}

#[test]
fn fiscal_weight_outside_unit_interval_rejected() {
    let mut request = SimulationRequest::reference();
    request.fiscal_weight = 1.5;
    let err = invalid_parameter(engine().run_seeded(&request, 1));
    assert_eq!(err, ParameterError::FiscalWeightOutOfRange(1.5));
}

#[test]
fn error_messages_are_user_readable() {
    let request = SimulationRequest::reference().with_center(DEBT_GDP, 140.0);
    let err = engine().run_seeded(&request, 1).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Invalid parameter: Center 140 for 'debt_gdp' lies outside bounds [40, 130]"
    );
}

/// Every normal comes out the same, so every draw is the same scenario.
struct ConstantSource;

impl NormalSource for ConstantSource {
    fn next_uniform(&mut self) -> f64 {
        0.5
    }
}

#[test]
fn injected_source_drives_every_draw() {
    let result = engine()
        .run_with_source(&SimulationRequest::reference().with_num_sims(50), &mut ConstantSource)
        .unwrap();

    let first = result.raw_results[0];
    assert!(result.raw_results.iter().all(|v| *v == first));
    assert_eq!(result.std, 0.0);
    // z = sqrt(2 ln 2) * cos(pi) < 0 on every variable; lower debt and CDS outweigh
    // the wider deficit, so r* falls.
    assert!(first < result.baseline.composite_rstar);
}

#[test]
fn pre_cancelled_run_reports_cancellation() {
    let token = CancelToken::new();
    token.cancel();
    let err = engine()
        .run_with_cancel(&SimulationRequest::reference(), 1, &token)
        .unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));
}

#[test]
fn uncancelled_token_matches_plain_seeded_run() {
    let request = SimulationRequest::reference().with_num_sims(3_000);
    let engine = engine();
    let token = CancelToken::new();

    let a = engine.run_with_cancel(&request, 8, &token).unwrap();
    let b = engine.run_seeded(&request, 8).unwrap();
    assert_eq!(a, b);
}

/// Seeded source that trips `token` once `after` draws have been taken.
struct CancelAfter {
    inner:   SeededRng,
    token:   CancelToken,
    normals: usize,
    limit:   usize,
}

impl CancelAfter {
    fn new(seed: u64, token: CancelToken, after: usize, dim: usize) -> Self {
        Self { inner: SeededRng::new(seed), token, normals: 0, limit: after * dim }
    }
}

impl NormalSource for CancelAfter {
    fn next_uniform(&mut self) -> f64 {
        self.inner.next_uniform()
    }

    fn next_standard_normal(&mut self) -> f64 {
        self.normals += 1;
        if self.normals == self.limit {
            self.token.cancel();
        }
        self.inner.next_standard_normal()
    }
}

#[test]
fn cancellation_mid_run_summarises_completed_draws() {
    let request = SimulationRequest::reference().with_num_sims(5_000);
    let engine = engine();
    let dim = engine.calibration().dim();
    let token = CancelToken::new();

    let mut source = CancelAfter::new(21, token.clone(), 1_234, dim);
    let partial = engine.run_with_source_cancel(&request, &mut source, &token).unwrap();
    let full = engine.run_with_source(&request, &mut SeededRng::new(21)).unwrap();

    assert!(token.is_cancelled());
    assert_eq!(partial.simulations, 1_234);
    assert_eq!(partial.requested, 5_000);
    assert_eq!(full.simulations, 5_000);
    assert_eq!(partial.raw_results, full.raw_results[..1_234].to_vec());
    assert_eq!(partial.histogram.iter().map(|b| b.count).sum::<usize>(), 1_234);
}

#[test]
fn source_run_cancelled_before_first_draw_reports_cancellation() {
    let token = CancelToken::new();
    token.cancel();
    let err = engine()
        .run_with_source_cancel(&SimulationRequest::reference(), &mut SeededRng::new(3), &token)
        .unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));
}

#[test]
fn request_round_trips_through_camel_case_json() {
    let json = r#"{
        "numSims": 100,
        "centers": {"debt_gdp": 78, "primary_balance": -0.5, "cds_5y": 150, "embi": 140, "ipca_exp": 5},
        "bounds": {
            "debt_gdp": {"min": 40, "max": 130},
            "primary_balance": {"min": -6, "max": 6},
            "cds_5y": {"min": 20, "max": 600},
            "embi": {"min": 20, "max": 700},
            "ipca_exp": {"min": 0, "max": 15}
        },
        "currentComposite": 4.75,
        "currentFiscalRstar": 6.42,
        "fiscalWeight": 0.15,
        "ipcaExp": 5.0,
        "termPremium": 0.5,
        "seed": 42
    }"#;
    let request = SimulationRequest::from_json(json).unwrap();
    assert_eq!(request, SimulationRequest::reference().with_num_sims(100).with_seed(42));

    let result = engine().run_simulation(&request).unwrap();
    let exported: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
    for field in ["mean", "median", "std", "p5", "p95", "probAbove6", "probBelow3", "meanDerivedPolicyRate", "histogram", "rawResults"] {
        assert!(exported.get(field).is_some(), "missing field {field}");
    }
}
