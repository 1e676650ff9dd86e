//! Parameter grids and candidate spaces.

use std::collections::HashSet;
use std::fmt;

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};

use super::value::{ParamValue, ParameterSet};

/// Ordered axes of parameter values for grid search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterGrid {
    axes: Vec<(String, Vec<ParamValue>)>,
}

impl ParameterGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an integer axis.
    pub fn int_param(self, name: &str, values: &[i64]) -> Self {
        self.param(name, values.iter().copied().map(ParamValue::Int).collect())
    }

    /// Add a float axis.
    pub fn float_param(self, name: &str, values: &[f64]) -> Self {
        self.param(name, values.iter().copied().map(ParamValue::Float).collect())
    }

    /// Add an axis; a repeated name replaces the earlier axis in place.
    pub fn param(mut self, name: &str, values: Vec<ParamValue>) -> Self {
        if let Some(axis) = self.axes.iter_mut().find(|(n, _)| n == name) {
            axis.1 = values;
        } else {
            self.axes.push((name.to_string(), values));
        }
        self
    }

    /// Parse a JSON object of `name -> [values]`.
    ///
    /// Axes keep the document's key order, which fixes candidate enumeration.
    /// A repeated key replaces the earlier axis in place.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let JsonAxes(axes) = serde_json::from_str(json)?;
        Ok(axes
            .into_iter()
            .fold(Self::new(), |grid, (name, values)| grid.param(&name, values)))
    }

    pub fn axes(&self) -> &[(String, Vec<ParamValue>)] {
        &self.axes
    }

    /// Number of combinations before deduplication.
    pub fn total_combinations(&self) -> usize {
        if self.axes.is_empty() {
            return 0;
        }
        self.axes.iter().map(|(_, v)| v.len()).product()
    }

    pub fn is_empty(&self) -> bool {
        self.total_combinations() == 0
    }

    /// Cartesian product, last axis varying fastest.
    pub fn combinations(&self) -> Vec<ParameterSet> {
        if self.is_empty() {
            return Vec::new();
        }

        let mut result = vec![ParameterSet::new()];
        for (name, values) in &self.axes {
            let mut next = Vec::with_capacity(result.len() * values.len());
            for combo in &result {
                for value in values {
                    let mut combo = combo.clone();
                    combo.insert(name, value.clone());
                    next.push(combo);
                }
            }
            result = next;
        }
        result
    }
}

/// Map entries in the order they appear in the input.
struct JsonAxes(Vec<(String, Vec<ParamValue>)>);

impl<'de> Deserialize<'de> for JsonAxes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct AxesVisitor;

        impl<'de> Visitor<'de> for AxesVisitor {
            type Value = JsonAxes;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("an object mapping parameter names to value lists")
            }

            fn visit_map<M>(self, mut map: M) -> Result<JsonAxes, M::Error>
            where
                M: MapAccess<'de>,
            {
                let mut axes = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<String, Vec<ParamValue>>()? {
                    axes.push(entry);
                }
                Ok(JsonAxes(axes))
            }
        }

        deserializer.deserialize_map(AxesVisitor)
    }
}

/// Finite, deduplicated set of candidate parameter sets.
///
/// Enumeration order is fixed at construction and serves as the final
/// tie-break during selection. `n_trials` is the number of distinct sets and
/// feeds the multiple-comparison correction in the scorecard.
#[derive(Debug, Clone, Default)]
pub struct CandidateSpace {
    candidates: Vec<ParameterSet>,
}

impl CandidateSpace {
    /// Build from any sequence, dropping duplicates after their first occurrence.
    pub fn new(sets: impl IntoIterator<Item = ParameterSet>) -> Self {
        let mut seen = HashSet::new();
        let candidates = sets
            .into_iter()
            .filter(|p| seen.insert(p.key()))
            .collect();
        Self { candidates }
    }

    pub fn from_grid(grid: &ParameterGrid) -> Self {
        Self::new(grid.combinations())
    }

    pub fn n_trials(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ParameterSet> {
        self.candidates.get(index)
    }

    /// Candidates with their enumeration index.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &ParameterSet)> {
        self.candidates.iter().enumerate()
    }

    pub fn as_slice(&self) -> &[ParameterSet] {
        &self.candidates
    }
}
