//! Perturbation grid around a base parameter set.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::params::{ParamValue, ParameterGrid, ParameterSet};

/// How one parameter is varied around its base value.
///
/// In TOML: `stop_pct = { percent = [0.05, 0.1] }`,
/// `max_bars_hold = { absolute = [1, 2] }`, `rsi_period = { values = [2, 3, 4] }`
/// or `flag = "fixed"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Perturbation {
    /// Relative steps, each applied as `base * (1 - p)` and `base * (1 + p)`.
    Percent(Vec<f64>),
    /// Additive steps `base - d` and `base + d`; integers are clamped at 1.
    Absolute(Vec<i64>),
    /// An explicit list of values, for parameters that are not smooth in small steps.
    Values(Vec<ParamValue>),
    /// Held at the base value.
    Fixed,
}

impl Perturbation {
    /// Candidate values for `base`, base included, deduplicated and sorted.
    pub fn values(&self, base: &ParamValue) -> Vec<ParamValue> {
        let mut values = vec![base.clone()];
        match (self, base) {
            (Self::Percent(steps), ParamValue::Int(v)) => {
                for p in steps {
                    for factor in [1.0 - p, 1.0 + p] {
                        values.push(ParamValue::Int(((*v as f64 * factor).round() as i64).max(1)));
                    }
                }
            }
            (Self::Percent(steps), ParamValue::Float(v)) => {
                for p in steps {
                    values.push(ParamValue::Float(v * (1.0 - p)));
                    values.push(ParamValue::Float(v * (1.0 + p)));
                }
            }
            (Self::Absolute(steps), ParamValue::Int(v)) => {
                for d in steps {
                    values.push(ParamValue::Int((v - d).max(1)));
                    values.push(ParamValue::Int((v + d).max(1)));
                }
            }
            (Self::Absolute(steps), ParamValue::Float(v)) => {
                for d in steps {
                    values.push(ParamValue::Float(v - *d as f64));
                    values.push(ParamValue::Float(v + *d as f64));
                }
            }
            (Self::Values(list), _) => values.extend(list.iter().cloned()),
            _ => {}
        }

        let mut seen = HashSet::new();
        values.retain(|v| seen.insert(v.key()));
        if values.iter().all(ParamValue::is_numeric) {
            values.sort_by(|a, b| {
                let a = a.as_float().unwrap_or(0.0);
                let b = b.as_float().unwrap_or(0.0);
                a.total_cmp(&b)
            });
        }
        values
    }
}

/// Neighbourhood definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BasinConfig {
    /// Default relative steps for float parameters.
    pub pct_steps: Vec<f64>,
    /// Default absolute steps for integer parameters.
    pub int_steps: Vec<i64>,
    /// Per-parameter rules overriding the defaults.
    pub rules: BTreeMap<String, Perturbation>,
    /// Minimum profit factor for a point to qualify.
    pub min_profit_factor: f64,
}

impl Default for BasinConfig {
    fn default() -> Self {
        Self {
            pct_steps: vec![0.05, 0.10, 0.20],
            int_steps: vec![1, 2, 4],
            rules: BTreeMap::new(),
            min_profit_factor: 1.0,
        }
    }
}

impl BasinConfig {
    pub fn with_rule(mut self, name: &str, rule: Perturbation) -> Self {
        self.rules.insert(name.to_string(), rule);
        self
    }

    /// The rule applied to a parameter: an explicit rule, else a default by type.
    pub fn rule_for(&self, name: &str, base: &ParamValue) -> Perturbation {
        if let Some(rule) = self.rules.get(name) {
            return rule.clone();
        }
        match base {
            ParamValue::Int(_) => Perturbation::Absolute(self.int_steps.clone()),
            ParamValue::Float(_) => Perturbation::Percent(self.pct_steps.clone()),
            ParamValue::Bool(_) | ParamValue::Text(_) => Perturbation::Fixed,
        }
    }

    /// Cartesian neighbourhood of `base`; the base point is always a member.
    pub fn grid(&self, base: &ParameterSet) -> Vec<ParameterSet> {
        if base.is_empty() {
            return vec![base.clone()];
        }
        base.iter()
            .fold(ParameterGrid::new(), |grid, (name, value)| {
                grid.param(name, self.rule_for(name, value).values(value))
            })
            .combinations()
    }
}
