//! Search space definition for hyperparameters

use crate::error::{ForestShieldError, Result};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Type of parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    /// Integer parameter, inclusive bounds. Random search draws uniformly
    /// from `low..=high`; grid search walks the range by `step`.
    Int { low: i64, high: i64, step: i64 },
    /// Categorical parameter
    Categorical { choices: Vec<String> },
}

/// A single hyperparameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub param_type: ParameterType,
}

impl Parameter {
    /// Create an integer parameter
    pub fn int(name: impl Into<String>, low: i64, high: i64) -> Self {
        Self::int_step(name, low, high, 1)
    }

    /// Create an integer parameter with a grid step
    pub fn int_step(name: impl Into<String>, low: i64, high: i64, step: i64) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Int { low, high, step },
        }
    }

    /// Create a categorical parameter
    pub fn categorical(name: impl Into<String>, choices: Vec<&str>) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Categorical {
                choices: choices.into_iter().map(String::from).collect(),
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| ForestShieldError::InvalidParameter {
            name: self.name.clone(),
            value: format!("{:?}", self.param_type),
            reason: reason.to_string(),
        };
        match &self.param_type {
            ParameterType::Int { low, high, step } => {
                if low > high {
                    return Err(invalid("low must not exceed high"));
                }
                if *step < 1 {
                    return Err(invalid("step must be at least 1"));
                }
            }
            ParameterType::Categorical { choices } => {
                if choices.is_empty() {
                    return Err(invalid("needs at least one choice"));
                }
            }
        }
        Ok(())
    }

    /// Sample a random value
    pub fn sample(&self, rng: &mut impl Rng) -> ParameterValue {
        match &self.param_type {
            ParameterType::Int { low, high, .. } => ParameterValue::Int(rng.gen_range(*low..=*high)),
            ParameterType::Categorical { choices } => {
                let idx = rng.gen_range(0..choices.len());
                ParameterValue::String(choices[idx].clone())
            }
        }
    }

    /// Every value visited by grid search, in order
    pub fn grid_values(&self) -> Vec<ParameterValue> {
        match &self.param_type {
            ParameterType::Int { low, high, step } => {
                let mut values: Vec<ParameterValue> = (*low..=*high)
                    .step_by((*step).max(1) as usize)
                    .map(ParameterValue::Int)
                    .collect();
                if values.last() != Some(&ParameterValue::Int(*high)) {
                    values.push(ParameterValue::Int(*high));
                }
                values
            }
            ParameterType::Categorical { choices } => {
                choices.iter().cloned().map(ParameterValue::String).collect()
            }
        }
    }
}

/// Sampled parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    String(String),
}

impl ParameterValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParameterValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            ParameterValue::String(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Int(v) => write!(f, "{}", v),
            ParameterValue::String(v) => f.write_str(v),
        }
    }
}

/// Search space for hyperparameter optimization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    parameters: Vec<Parameter>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self { parameters: Vec::new() }
    }

    /// Add a parameter, replacing any parameter with the same name
    pub fn add(mut self, param: Parameter) -> Self {
        self.parameters.retain(|p| p.name != param.name);
        self.parameters.push(param);
        self
    }

    pub fn int(self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.add(Parameter::int(name, low, high))
    }

    pub fn int_step(self, name: impl Into<String>, low: i64, high: i64, step: i64) -> Self {
        self.add(Parameter::int_step(name, low, high, step))
    }

    pub fn categorical(self, name: impl Into<String>, choices: Vec<&str>) -> Self {
        self.add(Parameter::categorical(name, choices))
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn validate(&self) -> Result<()> {
        self.parameters.iter().try_for_each(Parameter::validate)
    }

    /// Sample a random configuration
    pub fn sample(&self, rng: &mut impl Rng) -> TrialParams {
        self.parameters
            .iter()
            .map(|p| (p.name.clone(), p.sample(rng)))
            .collect()
    }

    /// Cartesian product of every parameter's grid values. The first
    /// parameter varies slowest.
    pub fn grid(&self) -> Vec<TrialParams> {
        let mut grid: Vec<TrialParams> = vec![TrialParams::new()];
        for param in &self.parameters {
            let values = param.grid_values();
            grid = grid
                .into_iter()
                .flat_map(|partial| {
                    values.iter().map(move |v| {
                        let mut next = partial.clone();
                        next.insert(param.name.clone(), v.clone());
                        next
                    })
                })
                .collect();
        }
        grid
    }

    /// Number of grid points
    pub fn grid_size(&self) -> usize {
        self.parameters.iter().map(|p| p.grid_values().len()).product()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn param_names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }
}

impl Default for SearchSpace {
    /// Random forest space: tree count, depth, split/leaf sizes, feature
    /// subsampling and class weighting. Integer ranges stop one short of
    /// the round numbers (300 to 800 trees draws at most 799).
    fn default() -> Self {
        Self::new()
            .int_step("n_estimators", 300, 799, 250)
            .int_step("max_depth", 8, 29, 11)
            .int_step("min_samples_split", 2, 9, 4)
            .int_step("min_samples_leaf", 1, 4, 2)
            .categorical("max_features", vec!["sqrt", "log2"])
            .categorical("class_weight", vec!["balanced"])
    }
}

/// Alias for sampled configuration
pub type TrialParams = BTreeMap<String, ParameterValue>;

#[cfg(test)]
mod tests {
    use super::*;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn test_search_space_builder() {
        let space = SearchSpace::new()
            .int("n_estimators", 10, 1000)
            .categorical("max_features", vec!["sqrt", "log2"])
            .int("n_estimators", 10, 20);

        assert_eq!(space.len(), 2);
        assert!(space.validate().is_ok());
    }

    #[test]
    fn test_int_sampling_in_bounds() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        let param = Parameter::int("max_depth", 8, 30);
        for _ in 0..100 {
            let v = param.sample(&mut rng).as_int().unwrap();
            assert!((8..=30).contains(&v));
        }
    }

    #[test]
    fn test_default_space_stays_below_round_upper_bounds() {
        let space = SearchSpace::default();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        let limits = [
            ("n_estimators", 300, 800),
            ("max_depth", 8, 30),
            ("min_samples_split", 2, 10),
            ("min_samples_leaf", 1, 5),
        ];
        for _ in 0..500 {
            let params = space.sample(&mut rng);
            for (name, low, high) in limits {
                let v = params[name].as_int().unwrap();
                assert!((low..high).contains(&v), "{} = {}", name, v);
            }
        }
        for params in space.grid() {
            for (name, low, high) in limits {
                assert!((low..high).contains(&params[name].as_int().unwrap()));
            }
        }
    }

    #[test]
    fn test_categorical_sampling() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        let param = Parameter::categorical("max_features", vec!["a", "b", "c"]);
        let val = param.sample(&mut rng);
        assert!(["a", "b", "c"].contains(&val.as_string().unwrap()));
    }

    #[test]
    fn test_grid_values_include_upper_bound() {
        let values = Parameter::int_step("max_depth", 8, 30, 10).grid_values();
        assert_eq!(
            values,
            vec![ParameterValue::Int(8), ParameterValue::Int(18), ParameterValue::Int(28), ParameterValue::Int(30)]
        );
    }

    #[test]
    fn test_default_grid() {
        let space = SearchSpace::default();
        assert_eq!(space.grid_size(), 3 * 3 * 3 * 3 * 2);
        let grid = space.grid();
        assert_eq!(grid.len(), space.grid_size());
        assert_eq!(grid[0]["n_estimators"], ParameterValue::Int(300));
        assert_eq!(grid[0]["max_features"], ParameterValue::String("sqrt".into()));
        assert_eq!(grid[1]["max_features"], ParameterValue::String("log2".into()));
    }

    #[test]
    fn test_invalid_parameter() {
        assert!(Parameter::int("x", 5, 1).validate().is_err());
        assert!(Parameter::categorical("y", vec![]).validate().is_err());
    }
}
