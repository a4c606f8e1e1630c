//! Concrete hyperparameter configurations.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::Domain;
use crate::errors::ParamError;

/// One concrete hyperparameter configuration: name → value.
///
/// Arms are built once (drawn from a [`Domain`] or supplied explicitly by an
/// informed search method) and never mutated afterwards; [`Arm::normalize`]
/// returns a new arm.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Arm {
    values: BTreeMap<String, f64>,
}

impl Arm {
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            values: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Draw a random arm: hyperparameters outside `hyperparams_to_opt` take
    /// their domain default, the others one stochastic sample each.
    ///
    /// Every default is checked before anything is sampled, so a missing
    /// default fails without consuming randomness.
    pub fn draw<S, R>(domain: &Domain, hyperparams_to_opt: &[S], rng: &mut R) -> Result<Self, ParamError>
    where
        S: AsRef<str>,
        R: Rng + ?Sized,
    {
        let is_optimized = |name: &str| hyperparams_to_opt.iter().any(|h| h.as_ref() == name);

        let mut values = BTreeMap::new();
        for param in domain {
            if is_optimized(&param.name) {
                continue;
            }
            let default = param.init_val.ok_or_else(|| ParamError::MissingDefault {
                name: param.name.clone(),
            })?;
            values.insert(param.name.clone(), default);
        }

        for name in hyperparams_to_opt {
            let param = domain.get(name.as_ref())?;
            let value = param.sample(1, true, rng)[0];
            values.insert(param.name.clone(), value);
        }

        Ok(Self { values })
    }

    /// Rescale every value shared with `domain` to `[0, 1]` in the parameter's
    /// scale space. Values unknown to the domain are dropped.
    pub fn normalize(&self, domain: &Domain) -> Result<Arm, ParamError> {
        let mut values = BTreeMap::new();
        for (name, value) in &self.values {
            if let Ok(param) = domain.get(name) {
                values.insert(name.clone(), param.normalize(*value)?);
            }
        }
        Ok(Arm { values })
    }

    pub fn get(&self, name: &str) -> Result<f64, ParamError> {
        self.values
            .get(name)
            .copied()
            .ok_or_else(|| ParamError::NotFound {
                name: name.to_string(),
            })
    }

    /// Integer view of a (typically quantized) value.
    pub fn get_int(&self, name: &str) -> Result<i64, ParamError> {
        self.get(name).map(|v| v.round() as i64)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for Arm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let longest = self.values.keys().map(String::len).max().unwrap_or(0);
        let mut first = true;
        for (name, value) in &self.values {
            if !first {
                writeln!(f)?;
            }
            first = false;
            write!(f, "   - {name}:{:pad$}{value}", "", pad = longest - name.len() + 1)?;
        }
        Ok(())
    }
}
