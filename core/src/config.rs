//! Calibration: the static domain configuration of the engine.
//!
//! RULE: The correlation matrix, volatilities and variable ordering are
//! never module constants. They arrive as a `CalibrationConfig` value so
//! several calibrations can coexist and tests stay hermetic.

use crate::{
    error::{EngineError, EngineResult},
    types::{VariableKey, CDS_5Y, DEBT_GDP, EMBI, IPCA_EXP, PRIMARY_BALANCE},
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Tolerance for the unit-diagonal and symmetry checks.
const MATRIX_TOLERANCE: f64 = 1e-9;

/// Keys the fiscal rule reads. A calibration without them cannot drive
/// the structural recalculation.
pub const REQUIRED_KEYS: [&str; 3] = [DEBT_GDP, PRIMARY_BALANCE, CDS_5Y];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSpec {
    pub key: VariableKey,
    /// One-period standard deviation, in the variable's own units.
    pub volatility: f64,
}

/// What to do when the Cholesky diagonal residual goes negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PsdPolicy {
    /// Clamp the residual to zero and keep going (reference behavior).
    #[default]
    Clamp,
    /// Fail the run with `IllConditionedCorrelation`.
    Reject,
    /// Replace the matrix with its nearest PSD correlation matrix first.
    Project,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Ordered variable set. Row/column `i` of `correlation` is `variables[i]`.
    pub variables: Vec<VariableSpec>,
    pub correlation: Vec<Vec<f64>>,
    #[serde(default)]
    pub psd_policy: PsdPolicy,
}

impl CalibrationConfig {
    /// Load a calibration from a JSON file and validate it.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: CalibrationConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    /// The built-in five-variable calibration.
    pub fn reference() -> Self {
        let variables = vec![
            VariableSpec { key: DEBT_GDP.into(),        volatility: 3.0 },
            VariableSpec { key: PRIMARY_BALANCE.into(), volatility: 0.8 },
            VariableSpec { key: CDS_5Y.into(),          volatility: 40.0 },
            VariableSpec { key: EMBI.into(),            volatility: 45.0 },
            VariableSpec { key: IPCA_EXP.into(),        volatility: 0.6 },
        ];
        //                  debt    pb     cds    embi   ipca
        let correlation = vec![
            vec![ 1.00, -0.40,  0.50,  0.45,  0.30],
            vec![-0.40,  1.00, -0.35, -0.30, -0.20],
            vec![ 0.50, -0.35,  1.00,  0.85,  0.40],
            vec![ 0.45, -0.30,  0.85,  1.00,  0.35],
            vec![ 0.30, -0.20,  0.40,  0.35,  1.00],
        ];
        Self { variables, correlation, psd_policy: PsdPolicy::Clamp }
    }

    pub fn with_psd_policy(mut self, policy: PsdPolicy) -> Self {
        self.psd_policy = policy;
        self
    }

    /// Same calibration with every volatility set to `vol`.
    pub fn with_uniform_volatility(mut self, vol: f64) -> Self {
        for v in &mut self.variables {
            v.volatility = vol;
        }
        self
    }

    pub fn dim(&self) -> usize {
        self.variables.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(|v| v.key.as_str())
    }

    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.variables.iter().position(|v| v.key == key)
    }

    /// Structural checks. Positive semi-definiteness is NOT checked here;
    /// that is the decomposition's job and is governed by `psd_policy`.
    pub fn validate(&self) -> EngineResult<()> {
        let n = self.dim();
        if n == 0 {
            return Err(EngineError::calibration("no variables configured"));
        }

        let mut seen = HashSet::new();
        for v in &self.variables {
            if !seen.insert(v.key.as_str()) {
                return Err(EngineError::calibration(format!("duplicate variable '{}'", v.key)));
            }
            if !v.volatility.is_finite() || v.volatility < 0.0 {
                return Err(EngineError::calibration(format!(
                    "volatility for '{}' must be finite and non-negative, got {}",
                    v.key, v.volatility
                )));
            }
        }

        for key in REQUIRED_KEYS {
            if !seen.contains(key) {
                return Err(EngineError::calibration(format!(
                    "variable '{key}' is required by the fiscal rule"
                )));
            }
        }

        if self.correlation.len() != n {
            return Err(EngineError::calibration(format!(
                "correlation matrix has {} rows, expected {n}",
                self.correlation.len()
            )));
        }
        for (i, row) in self.correlation.iter().enumerate() {
            if row.len() != n {
                return Err(EngineError::calibration(format!(
                    "correlation row {i} has {} columns, expected {n}",
                    row.len()
                )));
            }
        }

        for i in 0..n {
            let diag = self.correlation[i][i];
            if !diag.is_finite() || (diag - 1.0).abs() > MATRIX_TOLERANCE {
                return Err(EngineError::calibration(format!(
                    "diagonal entry {i} must be 1, got {diag}"
                )));
            }
            for j in (i + 1)..n {
                let a = self.correlation[i][j];
                let b = self.correlation[j][i];
                if !a.is_finite() || !(-1.0..=1.0).contains(&a) {
                    return Err(EngineError::calibration(format!(
                        "entry ({i}, {j}) must lie in [-1, 1], got {a}"
                    )));
                }
                if (a - b).abs() > MATRIX_TOLERANCE {
                    return Err(EngineError::calibration(format!(
                        "matrix is not symmetric at ({i}, {j}): {a} vs {b}"
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self { Self::reference() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_calibration_is_valid() {
        CalibrationConfig::reference().validate().expect("reference must validate");
    }

    #[test]
    fn asymmetric_matrix_rejected() {
        let mut cfg = CalibrationConfig::reference();
        cfg.correlation[0][1] = 0.2;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("not symmetric"), "{err}");
    }

    #[test]
    fn missing_fiscal_key_rejected() {
        let mut cfg = CalibrationConfig::reference();
        cfg.variables[2].key = "cds_10y".into();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("cds_5y"), "{err}");
    }

    #[test]
    fn psd_policy_defaults_to_clamp_when_omitted() {
        let json = r#"{
            "variables": [
                {"key": "debt_gdp", "volatility": 1.0},
                {"key": "primary_balance", "volatility": 1.0},
                {"key": "cds_5y", "volatility": 1.0}
            ],
            "correlation": [[1,0,0],[0,1,0],[0,0,1]]
        }"#;
        let cfg: CalibrationConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.psd_policy, PsdPolicy::Clamp);
        cfg.validate().unwrap();
    }
}
