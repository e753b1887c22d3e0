//! Correlation model: Cholesky factor of the calibrated correlation matrix.
//!
//! The factor is computed row by row:
//!   L[i][j] = (C[i][j] - sum_{k<j} L[i][k] L[j][k]) / L[j][j]   for j < i
//!   L[i][i] = sqrt(C[i][i] - sum_{k<i} L[i][k]^2)
//!
//! A negative residual under the square root means the matrix is not PSD.
//! `PsdPolicy` decides whether that clamps to zero, fails, or triggers a
//! nearest-PSD projection before factoring.

use crate::{
    config::{CalibrationConfig, PsdPolicy},
    error::{EngineError, EngineResult},
};

/// Pivots smaller than this are floored before dividing.
pub const PIVOT_FLOOR: f64 = 1e-10;

/// Residuals above `-ROUNDING_SLACK` are rounding noise, not a PSD breach.
const ROUNDING_SLACK: f64 = 1e-12;

/// Smallest eigenvalue kept by the nearest-PSD projection.
const EIGEN_FLOOR: f64 = 1e-8;

const MAX_JACOBI_SWEEPS: usize = 100;

/// Lower-triangular Cholesky factor, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct CholeskyFactor {
    data: Vec<f64>,
    dim:  usize,
}

impl CholeskyFactor {
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Element (i, j). Zero above the diagonal.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        if j > i { 0.0 } else { self.data[i * self.dim + j] }
    }

    /// Correlate independent normals: `out = L * z`.
    ///
    /// # Panics
    ///
    /// Panics if `z` or `out` is shorter than `dim()`.
    pub fn transform_into(&self, z: &[f64], out: &mut [f64]) {
        assert!(
            z.len() >= self.dim && out.len() >= self.dim,
            "vector length below factor dimension {}",
            self.dim
        );
        for i in 0..self.dim {
            let row = &self.data[i * self.dim..i * self.dim + i + 1];
            out[i] = row.iter().zip(z).map(|(l, z)| l * z).sum();
        }
    }

    pub fn transform(&self, z: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; self.dim];
        self.transform_into(z, &mut out);
        out
    }

    /// `L * L^T`, for checking the factorisation.
    pub fn reconstruct(&self) -> Vec<Vec<f64>> {
        let n = self.dim;
        let mut out = vec![vec![0.0; n]; n];
        for (i, row) in out.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = (0..=i.min(j)).map(|k| self.get(i, k) * self.get(j, k)).sum();
            }
        }
        out
    }
}

/// Outcome of a decomposition, including any repair that was applied.
#[derive(Debug, Clone)]
pub struct Decomposition {
    pub factor:         CholeskyFactor,
    /// Diagonal indices whose negative residual was clamped to zero.
    pub clamped_pivots: Vec<usize>,
    /// True when the matrix was replaced by its nearest PSD neighbour.
    pub projected:      bool,
}

/// Correlation matrix plus per-variable volatilities, in calibration order.
#[derive(Debug, Clone)]
pub struct CorrelationModel {
    matrix:       Vec<Vec<f64>>,
    volatilities: Vec<f64>,
}

impl CorrelationModel {
    /// Caller must have run `CalibrationConfig::validate`.
    pub fn from_calibration(config: &CalibrationConfig) -> Self {
        Self {
            matrix:       config.correlation.clone(),
            volatilities: config.variables.iter().map(|v| v.volatility).collect(),
        }
    }

    pub fn volatilities(&self) -> &[f64] {
        &self.volatilities
    }

    pub fn decompose(&self, policy: PsdPolicy) -> EngineResult<Decomposition> {
        match policy {
            PsdPolicy::Clamp => {
                let (factor, clamped_pivots) = cholesky(&self.matrix, true)?;
                if !clamped_pivots.is_empty() {
                    log::warn!(
                        "correlation matrix is not PSD; clamped Cholesky pivots {clamped_pivots:?} to zero"
                    );
                }
                Ok(Decomposition { factor, clamped_pivots, projected: false })
            }
            PsdPolicy::Reject => {
                let (factor, _) = cholesky(&self.matrix, false)?;
                Ok(Decomposition { factor, clamped_pivots: vec![], projected: false })
            }
            PsdPolicy::Project => match cholesky(&self.matrix, false) {
                Ok((factor, _)) => Ok(Decomposition { factor, clamped_pivots: vec![], projected: false }),
                Err(EngineError::IllConditionedCorrelation { index, residual }) => {
                    log::warn!(
                        "correlation matrix is not PSD (pivot {index}, residual {residual:.3e}); projecting to nearest PSD"
                    );
                    let repaired = nearest_psd_correlation(&self.matrix);
                    let (factor, clamped_pivots) = cholesky(&repaired, true)?;
                    Ok(Decomposition { factor, clamped_pivots, projected: true })
                }
                Err(e) => Err(e),
            },
        }
    }
}

/// Plain Cholesky. With `clamp` a negative residual becomes zero and its
/// index is reported; without it the first one is an error.
pub fn cholesky(matrix: &[Vec<f64>], clamp: bool) -> EngineResult<(CholeskyFactor, Vec<usize>)> {
    let n = matrix.len();
    let mut lower = vec![0.0; n * n];
    let mut clamped = Vec::new();

    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| lower[i * n + k] * lower[j * n + k]).sum();
            if i == j {
                let mut residual = matrix[i][i] - sum;
                if residual < 0.0 {
                    if residual < -ROUNDING_SLACK {
                        if !clamp {
                            return Err(EngineError::IllConditionedCorrelation { index: i, residual });
                        }
                        clamped.push(i);
                    }
                    residual = 0.0;
                }
                lower[i * n + i] = residual.sqrt();
            } else {
                let mut pivot = lower[j * n + j];
                if pivot.abs() < PIVOT_FLOOR {
                    pivot = PIVOT_FLOOR;
                }
                lower[i * n + j] = (matrix[i][j] - sum) / pivot;
            }
        }
    }

    Ok((CholeskyFactor { data: lower, dim: n }, clamped))
}

/// Nearest PSD correlation matrix by eigenvalue flooring.
///
/// Eigen-decompose, floor eigenvalues at `EIGEN_FLOOR`, rebuild, then
/// rescale so the diagonal is exactly one again.
pub fn nearest_psd_correlation(matrix: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = matrix.len();
    let (values, vectors) = symmetric_eigen(matrix);
    let floored: Vec<f64> = values.iter().map(|v| v.max(EIGEN_FLOOR)).collect();

    let mut rebuilt = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..n {
            rebuilt[i][j] = (0..n).map(|k| vectors[i][k] * floored[k] * vectors[j][k]).sum();
        }
    }

    let scale: Vec<f64> = (0..n).map(|i| rebuilt[i][i].sqrt()).collect();
    for i in 0..n {
        for j in 0..n {
            rebuilt[i][j] = if i == j { 1.0 } else { rebuilt[i][j] / (scale[i] * scale[j]) };
        }
    }
    rebuilt
}

/// Cyclic Jacobi eigen-decomposition of a symmetric matrix.
/// Returns (eigenvalues, eigenvectors-as-columns).
fn symmetric_eigen(matrix: &[Vec<f64>]) -> (Vec<f64>, Vec<Vec<f64>>) {
    let n = matrix.len();
    let mut a = matrix.to_vec();
    let mut v = vec![vec![0.0; n]; n];
    for (i, row) in v.iter_mut().enumerate() {
        row[i] = 1.0;
    }

    for _ in 0..MAX_JACOBI_SWEEPS {
        let off: f64 = (0..n)
            .flat_map(|p| ((p + 1)..n).map(move |q| (p, q)))
            .map(|(p, q)| a[p][q] * a[p][q])
            .sum();
        if off < 1e-24 {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[p][q];
                if apq == 0.0 {
                    continue;
                }
                let theta = (a[q][q] - a[p][p]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for row in a.iter_mut() {
                    let (kp, kq) = (row[p], row[q]);
                    row[p] = c * kp - s * kq;
                    row[q] = s * kp + c * kq;
                }
                for k in 0..n {
                    let (pk, qk) = (a[p][k], a[q][k]);
                    a[p][k] = c * pk - s * qk;
                    a[q][k] = s * pk + c * qk;
                }
                for row in v.iter_mut() {
                    let (kp, kq) = (row[p], row[q]);
                    row[p] = c * kp - s * kq;
                    row[q] = s * kp + c * kq;
                }
            }
        }
    }

    ((0..n).map(|i| a[i][i]).collect(), v)
}
