//! Named, ordered feature contract

use super::Feature;
use crate::error::{ForestShieldError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Ordered feature names fixed when features are derived.
///
/// The same schema is persisted with the scaler and checked on every
/// inference call, so a reordered or incomplete record fails instead of
/// silently misaligning columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SchemaRepr")]
pub struct FeatureSchema {
    names: Vec<String>,
}

/// Unvalidated wire form; deserialization goes through [`FeatureSchema::new`].
#[derive(Deserialize)]
struct SchemaRepr {
    names: Vec<String>,
}

impl TryFrom<SchemaRepr> for FeatureSchema {
    type Error = ForestShieldError;

    fn try_from(repr: SchemaRepr) -> Result<Self> {
        Self::new(repr.names)
    }
}

impl FeatureSchema {
    pub fn new(names: Vec<String>) -> Result<Self> {
        if names.is_empty() {
            return Err(ForestShieldError::InvalidInput("feature schema is empty".to_string()));
        }
        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(ForestShieldError::InvalidInput(format!(
                    "duplicate feature name: {}",
                    name
                )));
            }
        }
        Ok(Self { names })
    }

    pub fn from_features(features: &[Feature]) -> Self {
        Self {
            names: features.iter().map(|f| f.name().to_string()).collect(),
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Arrange a named record into schema order.
    ///
    /// A record with the wrong number of fields is a `ScalingError`; the
    /// right number with different names is a `SchemaMismatch`. Values must
    /// be finite and inside the feature's plausible range.
    pub fn order_record(&self, record: &BTreeMap<String, f64>) -> Result<Array1<f64>> {
        if record.len() != self.names.len() {
            return Err(ForestShieldError::ScalingError {
                expected: self.names.len(),
                actual: record.len(),
            });
        }

        let missing: Vec<String> = self
            .names
            .iter()
            .filter(|n| !record.contains_key(n.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            let unexpected = record
                .keys()
                .filter(|k| self.position(k).is_none())
                .cloned()
                .collect();
            return Err(ForestShieldError::SchemaMismatch { missing, unexpected });
        }

        let mut row = Array1::zeros(self.names.len());
        for (i, name) in self.names.iter().enumerate() {
            let value = record[name.as_str()];
            if !value.is_finite() {
                return Err(ForestShieldError::InvalidInput(format!(
                    "{} must be a finite number",
                    name
                )));
            }
            if let Some((lo, hi)) = Feature::from_name(name).and_then(|f| f.valid_range()) {
                if value < lo || value > hi {
                    return Err(ForestShieldError::InvalidInput(format!(
                        "{} = {} is outside [{}, {}]",
                        name, value, lo, hi
                    )));
                }
            }
            row[i] = value;
        }
        Ok(row)
    }

    /// Check that `other` has exactly the same names in the same order.
    pub fn validate(&self, other: &FeatureSchema) -> Result<()> {
        if self == other {
            return Ok(());
        }
        if self.len() != other.len() {
            return Err(ForestShieldError::ScalingError {
                expected: self.len(),
                actual: other.len(),
            });
        }
        let missing: Vec<String> = self
            .names
            .iter()
            .filter(|n| other.position(n).is_none())
            .cloned()
            .collect();
        let unexpected: Vec<String> = other
            .names
            .iter()
            .filter(|n| self.position(n).is_none())
            .cloned()
            .collect();
        if missing.is_empty() && unexpected.is_empty() {
            // same names, different order
            return Err(ForestShieldError::SchemaMismatch {
                missing: self.names.clone(),
                unexpected: other.names.clone(),
            });
        }
        Err(ForestShieldError::SchemaMismatch { missing, unexpected })
    }
}
