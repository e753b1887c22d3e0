//! Correlated scenario engine for the equilibrium-rate (r*) model.
//!
//! Given point estimates of correlated fiscal and risk variables, the engine
//! draws correlated shocks, re-derives the fiscal r*, the composite r* and
//! the policy-equilibrium rate for each draw, and summarises the resulting
//! distribution.
//!
//! ```ignore
//! use rstar_scenario_core::{CalibrationConfig, ScenarioEngine, SimulationRequest};
//!
//! let engine = ScenarioEngine::new(CalibrationConfig::reference())?;
//! let result = engine.run_simulation(&SimulationRequest::reference().with_seed(42))?;
//! println!("mean r* {:.2}, P(>6%) {:.2}", result.mean, result.prob_above_6);
//! ```

pub mod aggregate;
pub mod config;
pub mod correlation;
pub mod engine;
pub mod error;
pub mod rng;
pub mod shocks;
pub mod structural;
pub mod types;

pub use aggregate::{HistogramBin, SimulationResult};
pub use config::{CalibrationConfig, PsdPolicy, VariableSpec};
pub use engine::{CancelToken, ScenarioEngine, SimulationRequest};
pub use error::{EngineError, EngineResult, ParameterError};
pub use rng::{NormalSource, SeededRng};
pub use types::Bounds;
