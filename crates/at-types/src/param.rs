//! Hyperparameter definitions: bounds, scale, distribution and quantization.

use rand::Rng;
use rand_distr::{Distribution as _, Normal};
use serde::{Deserialize, Serialize};

use crate::errors::ParamError;

/// Slack, in grid steps, for bounds that sit on the grid up to rounding.
const GRID_TOLERANCE: f64 = 1e-9;

/// How values are drawn inside the scale-space range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Distribution {
    /// Uniform over `[min_val, max_val]`.
    #[default]
    Uniform,
    /// Normal centred on the midpoint with a quarter of the range as standard
    /// deviation, clipped to the bounds.
    Normal,
}

/// Space in which the bounds of a [`Param`] are expressed.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Scale {
    #[default]
    Linear,
    /// Bounds are exponents: a drawn `x` becomes `base^x`.
    Log { base: f64 },
}

impl Scale {
    /// Natural-log scale.
    pub fn log() -> Self {
        Self::Log {
            base: std::f64::consts::E,
        }
    }

    /// Map a scale-space coordinate to a concrete value.
    pub fn to_value(&self, x: f64) -> f64 {
        match self {
            Self::Linear => x,
            Self::Log { base } => base.powf(x),
        }
    }

    /// Map a concrete value back to scale space.
    pub fn to_scale(&self, value: f64) -> f64 {
        match self {
            Self::Linear => value,
            Self::Log { base } => value.log(*base),
        }
    }
}

/// A single tunable hyperparameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    /// Hyperparameter name (e.g. "learning_rate").
    pub name: String,
    /// Lower bound, in scale space.
    pub min_val: f64,
    /// Upper bound, in scale space.
    pub max_val: f64,
    /// Value used when the parameter is not being optimized.
    pub init_val: Option<f64>,
    pub distribution: Distribution,
    pub scale: Scale,
    /// Quantization step applied to concrete values (e.g. 1.0 for batch sizes).
    pub interval: Option<f64>,
}

impl Param {
    pub fn uniform(name: impl Into<String>, min_val: f64, max_val: f64) -> Self {
        Self {
            name: name.into(),
            min_val,
            max_val,
            init_val: None,
            distribution: Distribution::Uniform,
            scale: Scale::Linear,
            interval: None,
        }
    }

    pub fn normal(name: impl Into<String>, min_val: f64, max_val: f64) -> Self {
        Self {
            distribution: Distribution::Normal,
            ..Self::uniform(name, min_val, max_val)
        }
    }

    /// Interpret the bounds as natural-log exponents.
    pub fn log_scale(mut self) -> Self {
        self.scale = Scale::log();
        self
    }

    pub fn with_log_base(mut self, base: f64) -> Self {
        self.scale = Scale::Log { base };
        self
    }

    pub fn with_interval(mut self, interval: f64) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn with_default(mut self, init_val: f64) -> Self {
        self.init_val = Some(init_val);
        self
    }

    pub fn validate(&self) -> Result<(), ParamError> {
        if !self.min_val.is_finite() || !self.max_val.is_finite() {
            return Err(ParamError::NonFiniteBounds {
                name: self.name.clone(),
                min: self.min_val,
                max: self.max_val,
            });
        }
        if self.min_val > self.max_val {
            return Err(ParamError::InvalidBounds {
                name: self.name.clone(),
                min: self.min_val,
                max: self.max_val,
            });
        }
        if let Some(interval) = self.interval {
            if !(interval.is_finite() && interval > 0.0) {
                return Err(ParamError::InvalidInterval {
                    name: self.name.clone(),
                    interval,
                });
            }
        }
        if let Scale::Log { base } = self.scale {
            if !(base.is_finite() && base > 1.0) {
                return Err(ParamError::InvalidLogBase {
                    name: self.name.clone(),
                    base,
                });
            }
        }
        Ok(())
    }

    /// Bounds of concrete values, i.e. the scale-space bounds mapped through
    /// the scale.
    pub fn value_bounds(&self) -> (f64, f64) {
        (
            self.scale.to_value(self.min_val),
            self.scale.to_value(self.max_val),
        )
    }

    pub fn contains(&self, value: f64) -> bool {
        let (low, high) = self.value_bounds();
        value >= low && value <= high
    }

    /// Draw `n` values. With `stochastic == false` the result is the
    /// deterministic [`Param::grid`] and `rng` is not touched.
    pub fn sample<R: Rng + ?Sized>(&self, n: usize, stochastic: bool, rng: &mut R) -> Vec<f64> {
        if !stochastic {
            return self.grid(n);
        }
        (0..n)
            .map(|_| {
                let x = self.draw_scaled(rng);
                self.finish(x)
            })
            .collect()
    }

    /// `n` evenly spaced values across the range (the midpoint for `n == 1`).
    pub fn grid(&self, n: usize) -> Vec<f64> {
        let span = self.max_val - self.min_val;
        match n {
            0 => Vec::new(),
            1 => vec![self.finish(self.min_val + span / 2.0)],
            _ => (0..n)
                .map(|i| {
                    let t = i as f64 / (n - 1) as f64;
                    self.finish(self.min_val + t * span)
                })
                .collect(),
        }
    }

    /// Position of a concrete value inside the range, in `[0, 1]` for values
    /// within bounds.
    pub fn normalize(&self, value: f64) -> Result<f64, ParamError> {
        let span = self.max_val - self.min_val;
        if span == 0.0 {
            return Err(ParamError::DegenerateRange {
                name: self.name.clone(),
                value: self.min_val,
            });
        }
        Ok((self.scale.to_scale(value) - self.min_val) / span)
    }

    fn draw_scaled<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self.distribution {
            Distribution::Uniform => rng.random_range(self.min_val..=self.max_val),
            Distribution::Normal => {
                let mean = self.min_val + (self.max_val - self.min_val) / 2.0;
                let std_dev = (self.max_val - self.min_val) / 4.0;
                match Normal::new(mean, std_dev) {
                    Ok(normal) => normal.sample(rng),
                    Err(_) => mean,
                }
            }
        }
    }

    fn finish(&self, x: f64) -> f64 {
        let value = self.scale.to_value(x);
        let (low, high) = self.value_bounds();
        let Some(q) = self.interval else {
            return value.clamp(low, high);
        };
        // Snap to the grid, then to the nearest grid point inside the bounds.
        let first = (low / q - GRID_TOLERANCE).ceil();
        let last = (high / q + GRID_TOLERANCE).floor();
        if first > last {
            return value.clamp(low, high);
        }
        ((value / q).round().clamp(first, last) * q).clamp(low, high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn learning_rate() -> Param {
        Param::uniform("learning_rate", (1e-6f64).ln(), 0.0).log_scale()
    }

    #[test]
    fn uniform_samples_stay_in_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let momentum = Param::uniform("momentum", 0.3, 0.999);
        for v in momentum.sample(200, true, &mut rng) {
            assert!((0.3..=0.999).contains(&v), "momentum out of bounds: {v}");
        }
    }

    #[test]
    fn log_scale_samples_are_exponentiated() {
        let mut rng = StdRng::seed_from_u64(7);
        let lr = learning_rate();
        let (low, high) = lr.value_bounds();
        assert!((low - 1e-6).abs() < 1e-12);
        assert!((high - 1.0).abs() < 1e-12);
        for v in lr.sample(200, true, &mut rng) {
            assert!(v >= low && v <= high, "lr out of bounds: {v}");
        }
    }

    #[test]
    fn quantized_samples_are_integral() {
        let mut rng = StdRng::seed_from_u64(3);
        let batch = Param::uniform("batch_size", 20.0, 2000.0).with_interval(1.0);
        for v in batch.sample(100, true, &mut rng) {
            assert_eq!(v, v.round());
            assert!((20.0..=2000.0).contains(&v));
        }
    }

    #[test]
    fn quantized_values_stay_on_grid_near_offset_bounds() {
        let mut rng = StdRng::seed_from_u64(5);
        let p = Param::uniform("layers", 0.5, 10.3).with_interval(1.0);
        for v in p.sample(300, true, &mut rng) {
            assert_eq!(v, v.round(), "off grid: {v}");
            assert!((1.0..=10.0).contains(&v), "out of bounds: {v}");
        }
        assert_eq!(p.grid(2), vec![1.0, 10.0]);
    }

    #[test]
    fn normal_samples_are_clipped() {
        let mut rng = StdRng::seed_from_u64(11);
        let p = Param::normal("dropout", 0.0, 0.5);
        for v in p.sample(500, true, &mut rng) {
            assert!((0.0..=0.5).contains(&v));
        }
    }

    #[test]
    fn deterministic_sampling_is_repeatable() {
        let mut rng_a = StdRng::seed_from_u64(1);
        let mut rng_b = StdRng::seed_from_u64(2);
        let p = Param::uniform("x", -5.0, 10.0);
        let first = p.sample(4, false, &mut rng_a);
        let second = p.sample(4, false, &mut rng_b);
        assert_eq!(first, second);
        for (got, want) in first.iter().zip([-5.0, 0.0, 5.0, 10.0]) {
            assert!((got - want).abs() < 1e-9, "{got} != {want}");
        }
        assert_eq!(p.sample(1, false, &mut rng_a), vec![2.5]);
    }

    #[test]
    fn validate_rejects_bad_definitions() {
        let inverted = Param::uniform("x", 1.0, 0.0);
        assert!(matches!(
            inverted.validate(),
            Err(ParamError::InvalidBounds { .. })
        ));

        let bad_interval = Param::uniform("x", 0.0, 1.0).with_interval(0.0);
        assert!(matches!(
            bad_interval.validate(),
            Err(ParamError::InvalidInterval { .. })
        ));

        let bad_base = Param::uniform("x", 0.0, 1.0).with_log_base(1.0);
        assert!(matches!(
            bad_base.validate(),
            Err(ParamError::InvalidLogBase { .. })
        ));

        let infinite = Param::uniform("x", f64::NEG_INFINITY, 1.0);
        assert!(matches!(
            infinite.validate(),
            Err(ParamError::NonFiniteBounds { .. })
        ));

        assert!(learning_rate().validate().is_ok());
    }

    #[test]
    fn normalize_works_in_scale_space() {
        let lr = learning_rate();
        let mid = lr.normalize((-3.0 * 10f64.ln()).exp()).unwrap();
        assert!((mid - 0.5).abs() < 1e-9);

        let fixed = Param::uniform("fixed", 1.0, 1.0);
        assert!(matches!(
            fixed.normalize(1.0),
            Err(ParamError::DegenerateRange { .. })
        ));
    }

    #[test]
    fn param_json_round_trip() {
        let p = Param::uniform("batch_size", 20.0, 2000.0)
            .with_interval(1.0)
            .with_default(100.0);
        let json = serde_json::to_string(&p).unwrap();
        let back: Param = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
    }
}
