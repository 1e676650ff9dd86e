//! Parameter-neighbourhood robustness.
//!
//! A frozen parameter set is only trusted if small perturbations of it still
//! pass the hard gates. The basin is the cartesian grid of per-parameter
//! perturbations, base point included.

pub mod evaluator;
pub mod grid;

pub use evaluator::{BasinEvaluator, BasinPoint, BasinReport, BasinWindow, BasinWindowsReport};
pub use grid::{BasinConfig, Perturbation};
