//! Strategy parameters: values, sets, grids and candidate spaces.

pub mod grid;
pub mod value;

pub use grid::{CandidateSpace, ParameterGrid};
pub use value::{ParamError, ParamValue, ParameterSet};
