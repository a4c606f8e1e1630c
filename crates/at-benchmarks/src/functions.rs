//! Two-dimensional test functions with known global minima.

use at_types::{config_error, AtResult, Domain, Param};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

/// Benchmark function over the hyperparameters `x` and `y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnownFunction {
    /// Three global minima of 0.397887, e.g. at (π, 2.275).
    Branin,
    /// Two global minima of -1.0316 at (±0.0898, ∓0.7126).
    SixHumpCamel,
    /// Narrow curved valley, minimum 0 at (1, 1).
    Rosenbrock,
}

impl KnownFunction {
    pub const ALL: [KnownFunction; 3] = [Self::Branin, Self::SixHumpCamel, Self::Rosenbrock];

    pub fn from_name(name: &str) -> AtResult<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "branin" => Ok(Self::Branin),
            "camel" | "six_hump_camel" | "sixhumpcamel" => Ok(Self::SixHumpCamel),
            "rosenbrock" => Ok(Self::Rosenbrock),
            other => Err(config_error!(
                "unknown function '{}', expected one of branin, six_hump_camel, rosenbrock",
                other
            )),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Branin => "branin",
            Self::SixHumpCamel => "six_hump_camel",
            Self::Rosenbrock => "rosenbrock",
        }
    }

    /// `(x bounds, y bounds)` of the search box.
    pub fn bounds(&self) -> ((f64, f64), (f64, f64)) {
        match self {
            Self::Branin => ((-5.0, 10.0), (0.0, 15.0)),
            Self::SixHumpCamel => ((-3.0, 3.0), (-2.0, 2.0)),
            Self::Rosenbrock => ((-2.0, 2.0), (-2.0, 2.0)),
        }
    }

    pub fn domain(&self) -> AtResult<Domain> {
        let ((x_min, x_max), (y_min, y_max)) = self.bounds();
        Ok(Domain::new(vec![
            Param::uniform("x", x_min, x_max),
            Param::uniform("y", y_min, y_max),
        ])?)
    }

    /// Global minimum value.
    pub fn optimum(&self) -> f64 {
        match self {
            Self::Branin => 0.397887,
            Self::SixHumpCamel => -1.0316,
            Self::Rosenbrock => 0.0,
        }
    }

    pub fn evaluate(&self, x: f64, y: f64) -> f64 {
        match self {
            Self::Branin => {
                let b = 5.1 / (4.0 * PI * PI);
                let c = 5.0 / PI;
                let t = 1.0 / (8.0 * PI);
                (y - b * x * x + c * x - 6.0).powi(2) + 10.0 * (1.0 - t) * x.cos() + 10.0
            }
            Self::SixHumpCamel => {
                let x2 = x * x;
                (4.0 - 2.1 * x2 + x2 * x2 / 3.0) * x2 + x * y + (-4.0 + 4.0 * y * y) * y * y
            }
            Self::Rosenbrock => 100.0 * (y - x * x).powi(2) + (1.0 - x).powi(2),
        }
    }
}

impl fmt::Display for KnownFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
