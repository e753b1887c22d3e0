//! Shock generator: correlated, volatility-scaled, bounded draws.
//!
//! Per draw:
//!   1. z_k ~ N(0, 1) independently, one per variable
//!   2. c = L * z
//!   3. x_k = clamp(center_k + c_k * vol_k, min_k, max_k)
//!
//! Draws are independent. The generator is read-only after construction,
//! so one instance can be shared by every worker; each worker brings its
//! own `NormalSource`.

use crate::{correlation::CholeskyFactor, rng::NormalSource, types::Bounds};

#[derive(Debug, Clone)]
pub struct ShockGenerator {
    factor:       CholeskyFactor,
    centers:      Vec<f64>,
    volatilities: Vec<f64>,
    bounds:       Vec<Bounds>,
}

impl ShockGenerator {
    /// All vectors are in calibration order and must match the factor's dimension.
    pub fn new(
        factor: CholeskyFactor,
        centers: Vec<f64>,
        volatilities: Vec<f64>,
        bounds: Vec<Bounds>,
    ) -> Self {
        let n = factor.dim();
        assert!(
            centers.len() == n && volatilities.len() == n && bounds.len() == n,
            "shock inputs must all have dimension {n}"
        );
        Self { factor, centers, volatilities, bounds }
    }

    pub fn dim(&self) -> usize {
        self.factor.dim()
    }

    /// One draw into `out`, using `z` as scratch. Both must hold `dim()` slots.
    pub fn draw_into<R: NormalSource + ?Sized>(&self, rng: &mut R, z: &mut [f64], out: &mut [f64]) {
        for slot in z.iter_mut().take(self.dim()) {
            *slot = rng.next_standard_normal();
        }
        self.factor.transform_into(z, out);
        for k in 0..self.dim() {
            let shocked = self.centers[k] + out[k] * self.volatilities[k];
            out[k] = self.bounds[k].clamp(shocked);
        }
    }

    pub fn draw<R: NormalSource + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        let mut z = vec![0.0; self.dim()];
        let mut out = vec![0.0; self.dim()];
        self.draw_into(rng, &mut z, &mut out);
        out
    }
}
