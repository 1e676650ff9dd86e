//! Run configuration.
//!
//! Loaded from an optional TOML file; every section and field has a default,
//! so an empty file (or none) is a valid configuration:
//!
//! ```toml
//! [wfa]
//! years = 5
//! train_months = 12
//! oos_months = 3
//!
//! [selection]
//! min_pos_window_rate = 0.7
//!
//! [basin.rules]
//! rsi_period = { values = [2, 3, 4, 5] }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backtest::CostConfig;
use crate::basin::BasinConfig;
use crate::gates::{GateConfig, WfaGateConfig};
use crate::scorecard::ScoreWeights;
use crate::selection::SelectionRule;
use crate::walkforward::{RetuneObjective, SweepConfig, WindowConfig};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Full configuration of a freeze (or retune) run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FreezeConfig {
    /// Split and walk-forward window sizes.
    pub wfa: WindowConfig,
    /// Candidate eligibility rule.
    pub selection: SelectionRule,
    /// Hard gate thresholds.
    pub gate: GateConfig,
    /// Per-window gate pass rate floor.
    pub wfa_gate: WfaGateConfig,
    /// Parameter neighbourhood settings.
    pub basin: BasinConfig,
    /// Commission, slippage and starting cash.
    pub cost: CostConfig,
    /// Parallelism, timeouts and progress display.
    pub sweep: SweepConfig,
    /// Scorecard category weights.
    pub scorecard: ScoreWeights,
    /// Objective of the retune diagnostic.
    pub retune: RetuneObjective,
}

impl FreezeConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Reject values no run could use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let rate = self.selection.min_pos_window_rate;
        if !(0.0..=1.0).contains(&rate) {
            return Err(ConfigError::Invalid(format!(
                "selection.min_pos_window_rate must be in [0, 1], got {}",
                rate
            )));
        }
        if !(0.0..=1.0).contains(&self.wfa_gate.min_pass_rate) {
            return Err(ConfigError::Invalid(format!(
                "wfa_gate.min_pass_rate must be in [0, 1], got {}",
                self.wfa_gate.min_pass_rate
            )));
        }
        let weights = &self.scorecard;
        if [weights.robustness, weights.risk, weights.return_quality, weights.implementability]
            .iter()
            .any(|w| *w < 0.0 || !w.is_finite())
        {
            return Err(ConfigError::Invalid("scorecard weights must be finite and non-negative".into()));
        }
        if self.cost.allocation <= 0.0 || self.cost.allocation > 1.0 {
            return Err(ConfigError::Invalid(format!(
                "cost.allocation must be in (0, 1], got {}",
                self.cost.allocation
            )));
        }
        Ok(())
    }
}
