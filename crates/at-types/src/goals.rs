//! Metrics reported by a single evaluation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::{AtError, AtResult};

pub const VALIDATION_ERROR: &str = "validation_error";
pub const TEST_ERROR: &str = "test_error";
pub const FVAL: &str = "fval";

/// Named scalar metrics produced by one `evaluate` call (e.g. validation and
/// test error). Values are immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptimizationGoals {
    metrics: BTreeMap<String, f64>,
}

impl OptimizationGoals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Goals of a supervised model: validation and test error.
    pub fn errors(validation_error: f64, test_error: f64) -> Self {
        Self::new()
            .with(VALIDATION_ERROR, validation_error)
            .with(TEST_ERROR, test_error)
    }

    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    pub fn get(&self, goal: &str) -> AtResult<f64> {
        self.metrics
            .get(goal)
            .copied()
            .ok_or_else(|| AtError::GoalNotFound {
                goal: goal.to_string(),
                available: self.metrics.keys().cloned().collect(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.metrics.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}
