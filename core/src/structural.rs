//! Structural recalculation: from a shocked variable vector to rates.
//!
//! Pure functions only. No state, no randomness, no I/O. All quantities
//! are percentages as plain floats (`4.75` means 4.75%).
//!
//! Only the fiscal sub-model is re-evaluated under a shock. Every other
//! sub-model of the composite r* (parity, market-implied, state-space,
//! regime) is held at its current value, so the composite moves by the
//! fiscal change times the fiscal model's weight.

use crate::{
    config::CalibrationConfig,
    error::{EngineError, EngineResult},
    types::{Percent, CDS_5Y, DEBT_GDP, PRIMARY_BALANCE},
};
use serde::{Deserialize, Serialize};

pub const FISCAL_BASE_RATE:   Percent = 4.0;
/// Debt-to-GDP level above which the debt premium kicks in.
pub const DEBT_THRESHOLD:     f64 = 60.0;
/// Premium per pp of debt above threshold.
pub const DEBT_SENSITIVITY:   f64 = 0.08;
/// Premium per pp of primary deficit.
pub const DEFICIT_SENSITIVITY: f64 = 0.50;
/// Premium per 100 bp of CDS.
pub const CDS_SENSITIVITY:    f64 = 0.35;

pub const DEBT_PREMIUM_WEIGHT:   f64 = 0.4;
pub const FISCAL_PREMIUM_WEIGHT: f64 = 0.3;
pub const CDS_PREMIUM_WEIGHT:    f64 = 0.3;

/// The three variables the fiscal rule reads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FiscalInputs {
    pub debt_gdp:        f64,
    pub primary_balance: f64,
    pub cds_5y:          f64,
}

/// Positions of the fiscal variables inside a calibration-ordered vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiscalLayout {
    debt_gdp:        usize,
    primary_balance: usize,
    cds_5y:          usize,
}

impl FiscalLayout {
    pub fn resolve(config: &CalibrationConfig) -> EngineResult<Self> {
        let find = |key: &str| {
            config.index_of(key).ok_or_else(|| {
                EngineError::calibration(format!("variable '{key}' is required by the fiscal rule"))
            })
        };
        Ok(Self {
            debt_gdp:        find(DEBT_GDP)?,
            primary_balance: find(PRIMARY_BALANCE)?,
            cds_5y:          find(CDS_5Y)?,
        })
    }

    pub fn extract(&self, values: &[f64]) -> FiscalInputs {
        FiscalInputs {
            debt_gdp:        values[self.debt_gdp],
            primary_balance: values[self.primary_balance],
            cds_5y:          values[self.cds_5y],
        }
    }
}

/// Scalars from the upstream structural model, held fixed across draws.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuralAnchors {
    pub current_composite:    Percent,
    pub current_fiscal_rstar: Percent,
    /// Weight of the fiscal sub-model inside the composite, in [0, 1].
    pub fiscal_weight:        f64,
    pub ipca_exp:             Percent,
    pub term_premium:         Percent,
}

/// Derived rates for one set of variable values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuralOutcome {
    pub fiscal_rstar:    Percent,
    pub composite_rstar: Percent,
    pub policy_rate:     Percent,
}

pub fn debt_premium(debt_gdp: f64) -> f64 {
    (debt_gdp - DEBT_THRESHOLD).max(0.0) * DEBT_SENSITIVITY
}

pub fn fiscal_premium(primary_balance: f64) -> f64 {
    (-primary_balance).max(0.0) * DEFICIT_SENSITIVITY
}

pub fn cds_premium(cds_5y: f64) -> f64 {
    (cds_5y / 100.0) * CDS_SENSITIVITY
}

/// Fiscal-model r*: base rate plus weighted debt, deficit and credit premia.
pub fn fiscal_rstar(inputs: &FiscalInputs) -> Percent {
    FISCAL_BASE_RATE
        + DEBT_PREMIUM_WEIGHT * debt_premium(inputs.debt_gdp)
        + FISCAL_PREMIUM_WEIGHT * fiscal_premium(inputs.primary_balance)
        + CDS_PREMIUM_WEIGHT * cds_premium(inputs.cds_5y)
}

pub fn composite_rstar(
    current_composite: Percent,
    current_fiscal_rstar: Percent,
    new_fiscal_rstar: Percent,
    fiscal_weight: f64,
) -> Percent {
    current_composite + (new_fiscal_rstar - current_fiscal_rstar) * fiscal_weight
}

/// Nominal policy-equilibrium rate: real r* + expected inflation + term premium.
pub fn policy_rate(composite_rstar: Percent, ipca_exp: Percent, term_premium: Percent) -> Percent {
    composite_rstar + ipca_exp + term_premium
}

pub fn recalculate(inputs: &FiscalInputs, anchors: &StructuralAnchors) -> StructuralOutcome {
    let fiscal = fiscal_rstar(inputs);
    let composite = composite_rstar(
        anchors.current_composite,
        anchors.current_fiscal_rstar,
        fiscal,
        anchors.fiscal_weight,
    );
    StructuralOutcome {
        fiscal_rstar:    fiscal,
        composite_rstar: composite,
        policy_rate:     policy_rate(composite, anchors.ipca_exp, anchors.term_premium),
    }
}
