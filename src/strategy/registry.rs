//! Explicit strategy catalog.
//!
//! Built once at startup and handed to the pipeline; the pipeline only ever
//! sees [`StrategySpec`] values and never branches on a strategy id.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::params::{ParamError, ParameterGrid, ParameterSet};

use super::bollinger::BollingerMr;
use super::pairs::PairsMr;
use super::rsi2::Rsi2;
use super::signal::Strategy;
use super::vwap::VwapMr;
use super::zscore::ZScoreMr;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    #[error("Unknown strategy {id}; available: {available:?}")]
    UnknownStrategy { id: String, available: Vec<String> },

    #[error("Strategy {id} needs {expected} symbol(s), got {got}")]
    LegMismatch {
        id: String,
        expected: usize,
        got: usize,
    },
}

type BuildFn = fn(&ParameterSet) -> Result<Box<dyn Strategy>, ParamError>;

/// Declarative description of one strategy.
#[derive(Clone)]
pub struct StrategySpec {
    /// Stable identifier used on the command line and in artifacts.
    pub id: &'static str,
    /// Human-readable name.
    pub name: &'static str,
    /// Symbols the strategy trades.
    pub n_legs: usize,
    grid: fn() -> ParameterGrid,
    build: BuildFn,
}

impl StrategySpec {
    pub fn new(
        id: &'static str,
        name: &'static str,
        n_legs: usize,
        grid: fn() -> ParameterGrid,
        build: BuildFn,
    ) -> Self {
        Self {
            id,
            name,
            n_legs,
            grid,
            build,
        }
    }

    pub fn default_parameter_grid(&self) -> ParameterGrid {
        (self.grid)()
    }

    /// Bind parameters, validating them.
    pub fn build(&self, params: &ParameterSet) -> Result<Box<dyn Strategy>, ParamError> {
        (self.build)(params)
    }

    pub fn check_legs(&self, symbols: &[String]) -> Result<(), CatalogError> {
        if symbols.len() != self.n_legs {
            return Err(CatalogError::LegMismatch {
                id: self.id.to_string(),
                expected: self.n_legs,
                got: symbols.len(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for StrategySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategySpec")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("n_legs", &self.n_legs)
            .finish()
    }
}

/// Registry of available strategies keyed by id.
#[derive(Debug, Clone, Default)]
pub struct StrategyCatalog {
    specs: BTreeMap<&'static str, StrategySpec>,
}

impl StrategyCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the built-in mean-reversion strategies.
    pub fn with_builtins() -> Self {
        Self::new()
            .register(StrategySpec::new(
                "rsi2",
                "RSI2 Mean Reversion",
                1,
                Rsi2::default_grid,
                |p| Ok(Box::new(Rsi2::from_params(p)?)),
            ))
            .register(StrategySpec::new(
                "bollinger_mr",
                "Bollinger Mean Reversion",
                1,
                BollingerMr::default_grid,
                |p| Ok(Box::new(BollingerMr::from_params(p)?)),
            ))
            .register(StrategySpec::new(
                "zscore_mr",
                "Z-Score Mean Reversion",
                1,
                ZScoreMr::default_grid,
                |p| Ok(Box::new(ZScoreMr::from_params(p)?)),
            ))
            .register(StrategySpec::new(
                "vwap_mr",
                "VWAP Deviation Mean Reversion",
                1,
                VwapMr::default_grid,
                |p| Ok(Box::new(VwapMr::from_params(p)?)),
            ))
            .register(StrategySpec::new(
                "pairs_mr",
                "Pairs Z-Score Mean Reversion",
                2,
                PairsMr::default_grid,
                |p| Ok(Box::new(PairsMr::from_params(p)?)),
            ))
    }

    pub fn register(mut self, spec: StrategySpec) -> Self {
        self.specs.insert(spec.id, spec);
        self
    }

    pub fn get(&self, id: &str) -> Result<&StrategySpec, CatalogError> {
        self.specs.get(id).ok_or_else(|| CatalogError::UnknownStrategy {
            id: id.to_string(),
            available: self.ids().into_iter().map(String::from).collect(),
        })
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.specs.keys().copied().collect()
    }
}
