//! Parameter values and parameter sets.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParamError {
    #[error("Missing parameter: {0}")]
    Missing(String),

    #[error("Parameter {name} is not {expected}")]
    WrongType { name: String, expected: &'static str },

    #[error("Invalid parameter {name}: {reason}")]
    Invalid { name: String, reason: String },
}

/// A single parameter value, numeric or discrete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl ParamValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view; integers widen to floats.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }

    /// Canonical text form. Floats keep their decimal point so `5` and `5.0`
    /// stay distinct.
    pub fn key(&self) -> String {
        match self {
            Self::Int(v) => v.to_string(),
            Self::Float(v) => format!("{:?}", v),
            Self::Bool(v) => v.to_string(),
            Self::Text(v) => format!("{:?}", v),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(v) => write!(f, "{}", v),
            other => write!(f, "{}", other.key()),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// Ordered mapping from parameter name to value.
///
/// Identity is value equality of the whole mapping; [`ParameterSet::key`]
/// gives a canonical string for hashing and deduplication.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet {
    values: BTreeMap<String, ParamValue>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.values.insert(name.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, name: &str, value: ParamValue) {
        self.values.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Required integer parameter.
    pub fn int(&self, name: &str) -> Result<i64, ParamError> {
        let value = self.get(name).ok_or_else(|| ParamError::Missing(name.to_string()))?;
        match value {
            ParamValue::Int(v) => Ok(*v),
            // Grids written as JSON may carry whole floats for integer knobs
            ParamValue::Float(v) if v.fract() == 0.0 => Ok(*v as i64),
            _ => Err(ParamError::WrongType {
                name: name.to_string(),
                expected: "an integer",
            }),
        }
    }

    /// Required integer parameter that must be at least `min`.
    pub fn int_at_least(&self, name: &str, min: i64) -> Result<i64, ParamError> {
        let v = self.int(name)?;
        if v < min {
            return Err(ParamError::Invalid {
                name: name.to_string(),
                reason: format!("{} is below {}", v, min),
            });
        }
        Ok(v)
    }

    /// Required numeric parameter.
    pub fn float(&self, name: &str) -> Result<f64, ParamError> {
        self.get(name)
            .ok_or_else(|| ParamError::Missing(name.to_string()))?
            .as_float()
            .ok_or_else(|| ParamError::WrongType {
                name: name.to_string(),
                expected: "numeric",
            })
    }

    /// Canonical key: `name=value` pairs in name order.
    pub fn key(&self) -> String {
        self.values
            .iter()
            .map(|(k, v)| format!("{}={}", k, v.key()))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.key())
    }
}

impl FromIterator<(String, ParamValue)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
