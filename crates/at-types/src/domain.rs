//! Named, ordered collections of hyperparameters.

use serde::{Deserialize, Serialize};

use crate::errors::ParamError;
use crate::param::Param;

/// The hyperparameter domain of a problem: every tunable parameter with its
/// range, scale and default, in definition order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Param>", into = "Vec<Param>")]
pub struct Domain {
    params: Vec<Param>,
}

impl Domain {
    /// Build a domain, validating every parameter and rejecting duplicate
    /// names.
    pub fn new(params: Vec<Param>) -> Result<Self, ParamError> {
        for (idx, param) in params.iter().enumerate() {
            param.validate()?;
            if params[..idx].iter().any(|p| p.name == param.name) {
                return Err(ParamError::DuplicateName {
                    name: param.name.clone(),
                });
            }
        }
        Ok(Self { params })
    }

    /// Hyperparameter names in definition order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.params.iter().map(|p| p.name.as_str())
    }

    pub fn get(&self, name: &str) -> Result<&Param, ParamError> {
        self.params
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| ParamError::NotFound {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.params.iter().any(|p| p.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Param> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Resolve the set of hyperparameters to optimize.
    ///
    /// An empty selection means every hyperparameter of the domain. Otherwise
    /// each name must exist; the result follows domain order without
    /// duplicates.
    pub fn resolve_hyperparams_to_opt<S: AsRef<str>>(
        &self,
        selection: &[S],
    ) -> Result<Vec<String>, ParamError> {
        if selection.is_empty() {
            return Ok(self.names().map(str::to_string).collect());
        }
        for name in selection {
            self.get(name.as_ref())?;
        }
        Ok(self
            .names()
            .filter(|name| selection.iter().any(|s| s.as_ref() == *name))
            .map(str::to_string)
            .collect())
    }
}

impl TryFrom<Vec<Param>> for Domain {
    type Error = ParamError;

    fn try_from(params: Vec<Param>) -> Result<Self, Self::Error> {
        Self::new(params)
    }
}

impl From<Domain> for Vec<Param> {
    fn from(domain: Domain) -> Self {
        domain.params
    }
}

impl<'a> IntoIterator for &'a Domain {
    type Item = &'a Param;
    type IntoIter = std::slice::Iter<'a, Param>;

    fn into_iter(self) -> Self::IntoIter {
        self.params.iter()
    }
}
