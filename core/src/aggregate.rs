//! Result aggregation: statistics over the simulated composite r*.
//!
//! Moments and tail counts come from `OutcomeAccumulator`, which merges
//! associatively so per-chunk partials from parallel workers combine
//! without rescanning. Percentiles and the histogram need the full sorted
//! outcome vector, which the result keeps anyway.
//!
//! Percentiles use floor-based nearest rank, `sorted[min(floor(p*N), N-1)]`,
//! with no interpolation. This has small-sample bias but matches existing
//! published reports exactly; do not switch to linear interpolation.

use crate::structural::StructuralOutcome;
use serde::{Deserialize, Serialize};

pub const UPPER_TAIL_THRESHOLD: f64 = 6.0;
pub const LOWER_TAIL_THRESHOLD: f64 = 3.0;
pub const HISTOGRAM_BINS: usize = 20;

/// Running statistics over (composite, policy) outcome pairs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutcomeAccumulator {
    pub count:      usize,
    mean:           f64,
    /// Sum of squared deviations from the running mean.
    m2:             f64,
    pub min:        f64,
    pub max:        f64,
    pub above:      usize,
    pub below:      usize,
    pub policy_sum: f64,
}

impl Default for OutcomeAccumulator {
    fn default() -> Self { Self::new() }
}

impl OutcomeAccumulator {
    pub fn new() -> Self {
        Self {
            count:      0,
            mean:       0.0,
            m2:         0.0,
            min:        f64::INFINITY,
            max:        f64::NEG_INFINITY,
            above:      0,
            below:      0,
            policy_sum: 0.0,
        }
    }

    pub fn push(&mut self, composite: f64, policy: f64) {
        self.count += 1;
        let delta = composite - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (composite - self.mean);
        self.min = self.min.min(composite);
        self.max = self.max.max(composite);
        if composite > UPPER_TAIL_THRESHOLD {
            self.above += 1;
        }
        if composite < LOWER_TAIL_THRESHOLD {
            self.below += 1;
        }
        self.policy_sum += policy;
    }

    /// Combine two partials (Chan et al. pairwise update).
    pub fn merge(self, other: Self) -> Self {
        if self.count == 0 {
            return other;
        }
        if other.count == 0 {
            return self;
        }
        let count = self.count + other.count;
        let delta = other.mean - self.mean;
        let weight = other.count as f64 / count as f64;
        Self {
            count,
            mean:       self.mean + delta * weight,
            m2:         self.m2 + other.m2 + delta * delta * self.count as f64 * weight,
            min:        self.min.min(other.min),
            max:        self.max.max(other.max),
            above:      self.above + other.above,
            below:      self.below + other.below,
            policy_sum: self.policy_sum + other.policy_sum,
        }
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Population standard deviation (divides by N).
    pub fn std(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        (self.m2 / self.count as f64).max(0.0).sqrt()
    }

    pub fn policy_mean(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.policy_sum / self.count as f64 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub start:     f64,
    pub end:       f64,
    pub count:     usize,
    pub frequency: f64,
}

/// Scenario distribution summary. Scalars are rounded for presentation;
/// `raw_results` keeps the unrounded composite outcomes in draw order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    /// Draws actually processed.
    pub simulations:              usize,
    pub requested:                usize,
    pub mean:                     f64,
    pub median:                   f64,
    pub std:                      f64,
    pub p5:                       f64,
    pub p10:                      f64,
    pub p25:                      f64,
    pub p75:                      f64,
    pub p90:                      f64,
    pub p95:                      f64,
    pub prob_above_6:             f64,
    pub prob_below_3:             f64,
    /// Mass of the (3, 6] band.
    pub prob_neutral:             f64,
    pub mean_derived_policy_rate: f64,
    pub policy_p5:                f64,
    pub policy_p95:               f64,
    pub histogram:                Vec<HistogramBin>,
    /// Shock-free recalculation at the request's centers.
    pub baseline:                 StructuralOutcome,
    pub raw_results:              Vec<f64>,
}

impl SimulationResult {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn round2(value: f64) -> f64 {
    round_to(value, 2)
}

/// Nearest-rank percentile of an ascending slice. `p` in [0, 1].
///
/// # Panics
///
/// Panics on an empty slice.
pub fn nearest_rank(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    let idx = ((p * n as f64).floor() as usize).min(n - 1);
    sorted[idx]
}

/// `HISTOGRAM_BINS` equal-width bins over `[min, max]`. A value lands in
/// bin `b` when `start_b <= v < end_b`; the last bin is closed on both
/// ends. When every value is equal the width is zero and all counts go
/// to the last bin.
///
/// Edges are rounded to 2 dp for presentation unless that would merge
/// neighbouring edges, in which case they stay unrounded so every bin
/// keeps a distinct label.
pub fn histogram(values: &[f64], min: f64, max: f64) -> Vec<HistogramBin> {
    let n = values.len();
    let width = (max - min) / HISTOGRAM_BINS as f64;
    let mut counts = [0usize; HISTOGRAM_BINS];

    for &v in values {
        let idx = if width > 0.0 {
            (((v - min) / width).floor() as usize).min(HISTOGRAM_BINS - 1)
        } else {
            HISTOGRAM_BINS - 1
        };
        counts[idx] += 1;
    }

    let edges: Vec<f64> = (0..=HISTOGRAM_BINS)
        .map(|b| if b == HISTOGRAM_BINS { max } else { min + b as f64 * width })
        .collect();
    let rounded: Vec<f64> = edges.iter().map(|&e| round2(e)).collect();
    let edges = if width > 0.0 && rounded.windows(2).any(|w| w[0] >= w[1]) {
        edges
    } else {
        rounded
    };

    counts
        .iter()
        .enumerate()
        .map(|(b, &count)| HistogramBin {
            start:     edges[b],
            end:       edges[b + 1],
            count,
            frequency: if n == 0 { 0.0 } else { round_to(count as f64 / n as f64, 4) },
        })
        .collect()
}

/// Reduce a finished batch into a `SimulationResult`.
///
/// `composites` and `policies` are parallel vectors; `acc` must have been
/// fed exactly those pairs.
///
/// # Panics
///
/// Panics if `composites` is empty.
pub fn summarize(
    composites: Vec<f64>,
    policies: &[f64],
    acc: &OutcomeAccumulator,
    requested: usize,
    baseline: StructuralOutcome,
) -> SimulationResult {
    let n = composites.len();
    assert!(n > 0, "cannot summarize an empty batch");
    debug_assert_eq!(n, acc.count);
    debug_assert_eq!(n, policies.len());

    let mut sorted = composites.clone();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mut sorted_policy = policies.to_vec();
    sorted_policy.sort_by(|a, b| a.total_cmp(b));

    let nf = n as f64;
    let neutral = n - acc.above - acc.below;

    SimulationResult {
        simulations:              n,
        requested,
        mean:                     round2(acc.mean()),
        median:                   round2(nearest_rank(&sorted, 0.50)),
        std:                      round2(acc.std()),
        p5:                       round2(nearest_rank(&sorted, 0.05)),
        p10:                      round2(nearest_rank(&sorted, 0.10)),
        p25:                      round2(nearest_rank(&sorted, 0.25)),
        p75:                      round2(nearest_rank(&sorted, 0.75)),
        p90:                      round2(nearest_rank(&sorted, 0.90)),
        p95:                      round2(nearest_rank(&sorted, 0.95)),
        prob_above_6:             round2(acc.above as f64 / nf),
        prob_below_3:             round2(acc.below as f64 / nf),
        prob_neutral:             round2(neutral as f64 / nf),
        mean_derived_policy_rate: round2(acc.policy_mean()),
        policy_p5:                round2(nearest_rank(&sorted_policy, 0.05)),
        policy_p95:               round2(nearest_rank(&sorted_policy, 0.95)),
        histogram:                histogram(&composites, acc.min, acc.max),
        baseline,
        raw_results:              composites,
    }
}
