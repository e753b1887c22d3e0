//! The scenario engine: validates a request and drives the pipeline.
//!
//! PIPELINE (single pass, no state kept between calls):
//!   1. Validate the request against the calibration
//!   2. Decompose the correlation matrix once
//!   3. For each draw: shock -> fiscal r* -> composite r* -> policy rate
//!   4. Aggregate into one `SimulationResult`
//!
//! RULES:
//!   - Invalid input fails fast; nothing is retried.
//!   - Seeded runs are split into fixed-size chunks, chunk `i` drawing
//!     from stream `i`. Output is bit-identical across thread counts and
//!     with or without the `parallel` feature.
//!   - The factor and generator are read-only once built and shared by
//!     every worker.

use crate::{
    aggregate::{summarize, OutcomeAccumulator, SimulationResult},
    config::CalibrationConfig,
    correlation::CorrelationModel,
    error::{EngineError, EngineResult, ParameterError},
    rng::{entropy_seed, NormalSource, StreamBank},
    shocks::ShockGenerator,
    structural::{recalculate, FiscalLayout, StructuralAnchors, StructuralOutcome},
    types::{Bounds, VariableKey, CDS_5Y, DEBT_GDP, EMBI, IPCA_EXP, PRIMARY_BALANCE},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Draws per chunk. Part of the seeded-output contract: changing it
/// changes every seeded result.
pub const CHUNK_SIZE: usize = 1024;

/// One what-if scenario, as built by the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationRequest {
    pub num_sims:             usize,
    pub centers:              HashMap<VariableKey, f64>,
    pub bounds:               HashMap<VariableKey, Bounds>,
    pub current_composite:    f64,
    pub current_fiscal_rstar: f64,
    pub fiscal_weight:        f64,
    pub ipca_exp:             f64,
    pub term_premium:         f64,
    /// Fixed master seed. `None` draws one from OS entropy.
    #[serde(default)]
    pub seed:                 Option<u64>,
}

impl SimulationRequest {
    /// The reference scenario: current point estimates and default bounds.
    pub fn reference() -> Self {
        let centers = HashMap::from([
            (DEBT_GDP.to_string(),        78.0),
            (PRIMARY_BALANCE.to_string(), -0.5),
            (CDS_5Y.to_string(),          150.0),
            (EMBI.to_string(),            140.0),
            (IPCA_EXP.to_string(),        5.0),
        ]);
        let bounds = HashMap::from([
            (DEBT_GDP.to_string(),        Bounds::new(40.0, 130.0)),
            (PRIMARY_BALANCE.to_string(), Bounds::new(-6.0, 6.0)),
            (CDS_5Y.to_string(),          Bounds::new(20.0, 600.0)),
            (EMBI.to_string(),            Bounds::new(20.0, 700.0)),
            (IPCA_EXP.to_string(),        Bounds::new(0.0, 15.0)),
        ]);
        Self {
            num_sims:             10_000,
            centers,
            bounds,
            current_composite:    4.75,
            current_fiscal_rstar: 6.42,
            fiscal_weight:        0.15,
            ipca_exp:             5.0,
            term_premium:         0.5,
            seed:                 None,
        }
    }

    pub fn from_json(json: &str) -> EngineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_num_sims(mut self, n: usize) -> Self {
        self.num_sims = n;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_center(mut self, key: &str, value: f64) -> Self {
        self.centers.insert(key.to_string(), value);
        self
    }

    pub fn anchors(&self) -> StructuralAnchors {
        StructuralAnchors {
            current_composite:    self.current_composite,
            current_fiscal_rstar: self.current_fiscal_rstar,
            fiscal_weight:        self.fiscal_weight,
            ipca_exp:             self.ipca_exp,
            term_premium:         self.term_premium,
        }
    }
}

/// Cooperative cancellation flag, cheap to clone and share across threads.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Everything a worker needs, resolved once per run. Read-only.
struct PreparedRun {
    generator: ShockGenerator,
    layout:    FiscalLayout,
    anchors:   StructuralAnchors,
    baseline:  StructuralOutcome,
}

struct ChunkOutcome {
    composites: Vec<f64>,
    policies:   Vec<f64>,
    acc:        OutcomeAccumulator,
}

impl PreparedRun {
    fn simulate<R: NormalSource + ?Sized>(
        &self,
        rng: &mut R,
        draws: usize,
        cancel: Option<&CancelToken>,
    ) -> ChunkOutcome {
        let dim = self.generator.dim();
        let mut z = vec![0.0; dim];
        let mut values = vec![0.0; dim];
        let mut out = ChunkOutcome {
            composites: Vec::with_capacity(draws),
            policies:   Vec::with_capacity(draws),
            acc:        OutcomeAccumulator::new(),
        };

        for _ in 0..draws {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                break;
            }
            self.generator.draw_into(rng, &mut z, &mut values);
            let outcome = recalculate(&self.layout.extract(&values), &self.anchors);
            out.composites.push(outcome.composite_rstar);
            out.policies.push(outcome.policy_rate);
            out.acc.push(outcome.composite_rstar, outcome.policy_rate);
        }
        out
    }
}

pub struct ScenarioEngine {
    calibration: CalibrationConfig,
    model:       CorrelationModel,
    layout:      FiscalLayout,
    parallel:    bool,
}

impl ScenarioEngine {
    /// Validate the calibration once. Requests are validated per run.
    pub fn new(calibration: CalibrationConfig) -> EngineResult<Self> {
        calibration.validate()?;
        let layout = FiscalLayout::resolve(&calibration)?;
        let model = CorrelationModel::from_calibration(&calibration);
        Ok(Self { calibration, model, layout, parallel: true })
    }

    /// Enable or disable worker threads. Seeded output is identical either
    /// way; without the `parallel` feature this has no effect.
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn calibration(&self) -> &CalibrationConfig {
        &self.calibration
    }

    /// Run with `request.seed`, or a fresh entropy seed when absent.
    pub fn run_simulation(&self, request: &SimulationRequest) -> EngineResult<SimulationResult> {
        let seed = request.seed.unwrap_or_else(entropy_seed);
        self.run_seeded(request, seed)
    }

    pub fn run_seeded(&self, request: &SimulationRequest, seed: u64) -> EngineResult<SimulationResult> {
        self.run_chunked(request, seed, None)
    }

    /// Like `run_seeded`, but stops early once `token` is cancelled and
    /// summarises the draws completed so far.
    pub fn run_with_cancel(
        &self,
        request: &SimulationRequest,
        seed: u64,
        token: &CancelToken,
    ) -> EngineResult<SimulationResult> {
        self.run_chunked(request, seed, Some(token))
    }

    /// Sequential run drawing every variate from one injected source.
    pub fn run_with_source<R: NormalSource + ?Sized>(
        &self,
        request: &SimulationRequest,
        rng: &mut R,
    ) -> EngineResult<SimulationResult> {
        self.run_sequential(request, rng, None)
    }

    /// `run_with_source` that checks `token` before every draw.
    pub fn run_with_source_cancel<R: NormalSource + ?Sized>(
        &self,
        request: &SimulationRequest,
        rng: &mut R,
        token: &CancelToken,
    ) -> EngineResult<SimulationResult> {
        self.run_sequential(request, rng, Some(token))
    }

    fn run_sequential<R: NormalSource + ?Sized>(
        &self,
        request: &SimulationRequest,
        rng: &mut R,
        cancel: Option<&CancelToken>,
    ) -> EngineResult<SimulationResult> {
        let prepared = self.prepare(request)?;
        log::debug!("scenario: sims={} source=injected", request.num_sims);
        let chunk = prepared.simulate(rng, request.num_sims, cancel);
        finish(vec![chunk], request.num_sims, prepared.baseline)
    }

    fn run_chunked(
        &self,
        request: &SimulationRequest,
        seed: u64,
        cancel: Option<&CancelToken>,
    ) -> EngineResult<SimulationResult> {
        let prepared = self.prepare(request)?;
        let bank = StreamBank::new(seed);
        let n = request.num_sims;
        log::debug!("scenario: sims={n} seed={seed} parallel={}", self.parallel);

        let chunks = self.simulate_chunks(&prepared, bank, n, cancel);
        finish(chunks, n, prepared.baseline)
    }

    fn simulate_chunks(
        &self,
        prepared: &PreparedRun,
        bank: StreamBank,
        n: usize,
        cancel: Option<&CancelToken>,
    ) -> Vec<ChunkOutcome> {
        let chunk_count = n.div_ceil(CHUNK_SIZE);
        let run_chunk = |i: usize| {
            let draws = CHUNK_SIZE.min(n - i * CHUNK_SIZE);
            let mut rng = bank.stream(i as u64);
            prepared.simulate(&mut rng, draws, cancel)
        };

        map_chunks(self.parallel && chunk_count > 1, chunk_count, run_chunk)
    }

    /// Validate the request and resolve it into calibration order.
    fn prepare(&self, request: &SimulationRequest) -> EngineResult<PreparedRun> {
        self.validate_request(request)?;

        let decomposition = self.model.decompose(self.calibration.psd_policy)?;

        let mut centers = Vec::with_capacity(self.calibration.dim());
        let mut bounds = Vec::with_capacity(self.calibration.dim());
        for key in self.calibration.keys() {
            centers.push(request.centers[key]);
            bounds.push(request.bounds[key]);
        }

        let anchors = request.anchors();
        let baseline = recalculate(&self.layout.extract(&centers), &anchors);
        let generator = ShockGenerator::new(
            decomposition.factor,
            centers,
            self.model.volatilities().to_vec(),
            bounds,
        );

        Ok(PreparedRun { generator, layout: self.layout, anchors, baseline })
    }

    fn validate_request(&self, request: &SimulationRequest) -> Result<(), ParameterError> {
        if request.num_sims == 0 {
            return Err(ParameterError::ZeroSimulations(request.num_sims));
        }

        let scalars = [
            ("currentComposite",   request.current_composite),
            ("currentFiscalRstar", request.current_fiscal_rstar),
            ("fiscalWeight",       request.fiscal_weight),
            ("ipcaExp",            request.ipca_exp),
            ("termPremium",        request.term_premium),
        ];
        for (field, value) in scalars {
            if !value.is_finite() {
                return Err(ParameterError::NonFinite { field: field.into(), value });
            }
        }
        if !(0.0..=1.0).contains(&request.fiscal_weight) {
            return Err(ParameterError::FiscalWeightOutOfRange(request.fiscal_weight));
        }

        for key in self.calibration.keys() {
            let center = *request
                .centers
                .get(key)
                .ok_or_else(|| ParameterError::MissingCenter { key: key.into() })?;
            let b = *request
                .bounds
                .get(key)
                .ok_or_else(|| ParameterError::MissingBounds { key: key.into() })?;

            if !center.is_finite() {
                return Err(ParameterError::NonFinite { field: key.into(), value: center });
            }
            if !b.min.is_finite() || !b.max.is_finite() {
                let value = if b.min.is_finite() { b.max } else { b.min };
                return Err(ParameterError::NonFinite { field: format!("{key}.bounds"), value });
            }
            if b.min > b.max {
                return Err(ParameterError::InvertedBounds { key: key.into(), min: b.min, max: b.max });
            }
            if !b.contains(center) {
                return Err(ParameterError::CenterOutOfBounds {
                    key: key.into(),
                    center,
                    min: b.min,
                    max: b.max,
                });
            }
        }
        Ok(())
    }
}

/// Merge chunk partials in chunk order and summarise them. A run that
/// processed no draws at all was cancelled before it started.
fn finish(
    chunks: Vec<ChunkOutcome>,
    requested: usize,
    baseline: StructuralOutcome,
) -> EngineResult<SimulationResult> {
    let processed: usize = chunks.iter().map(|c| c.acc.count).sum();
    if processed == 0 {
        return Err(EngineError::Cancelled);
    }
    if processed < requested {
        log::info!("scenario cancelled after {processed}/{requested} draws");
    }

    let mut composites = Vec::with_capacity(processed);
    let mut policies = Vec::with_capacity(processed);
    let mut acc = OutcomeAccumulator::new();
    for chunk in chunks {
        composites.extend(chunk.composites);
        policies.extend(chunk.policies);
        acc = acc.merge(chunk.acc);
    }

    Ok(summarize(composites, &policies, &acc, requested, baseline))
}

#[cfg(feature = "parallel")]
fn map_chunks<F>(parallel: bool, count: usize, run_chunk: F) -> Vec<ChunkOutcome>
where
    F: Fn(usize) -> ChunkOutcome + Sync + Send,
{
    use rayon::prelude::*;
    if parallel {
        // Indexed collect keeps chunk order.
        (0..count).into_par_iter().map(run_chunk).collect()
    } else {
        (0..count).map(run_chunk).collect()
    }
}

#[cfg(not(feature = "parallel"))]
fn map_chunks<F>(_parallel: bool, count: usize, run_chunk: F) -> Vec<ChunkOutcome>
where
    F: Fn(usize) -> ChunkOutcome,
{
    (0..count).map(run_chunk).collect()
}
