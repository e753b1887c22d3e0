//! Shared primitive types used across the scenario engine.

use serde::{Deserialize, Serialize};

/// Stable key identifying a macro variable, e.g. `debt_gdp` or `cds_5y`.
pub type VariableKey = String;

/// A rate expressed in percent as a plain float (`4.75` means 4.75%).
pub type Percent = f64;

pub const DEBT_GDP:        &str = "debt_gdp";
pub const PRIMARY_BALANCE: &str = "primary_balance";
pub const CDS_5Y:          &str = "cds_5y";
pub const EMBI:            &str = "embi";
pub const IPCA_EXP:        &str = "ipca_exp";

/// Inclusive admissible range for a shocked variable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }

    /// Clamp into `[min, max]`. Callers must have validated `min <= max`.
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}
