//! Standard (z-score) scaling

use crate::error::{ForestShieldError, Result};
use crate::feature_engineering::FeatureSchema;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Parameters for one fitted feature
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalerParams {
    /// Mean
    pub center: f64,
    /// Population standard deviation, 1.0 for constant features
    pub scale: f64,
}

/// Standard scaler: `(x - mean) / std` per feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    schema: FeatureSchema,
    params: Option<Vec<ScalerParams>>,
}

impl StandardScaler {
    pub fn new(schema: FeatureSchema) -> Self {
        Self { schema, params: None }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn params(&self) -> Option<&[ScalerParams]> {
        self.params.as_deref()
    }

    pub fn is_fitted(&self) -> bool {
        self.params.is_some()
    }

    pub fn n_features(&self) -> usize {
        self.schema.len()
    }

    /// Learn per-feature mean/std from `x`, whose columns follow the schema.
    pub fn fit(&mut self, x: &Array2<f64>) -> Result<&mut Self> {
        self.check_width(x.ncols())?;
        if x.nrows() == 0 {
            return Err(ForestShieldError::DataError("cannot fit scaler on zero rows".to_string()));
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(ForestShieldError::DataError(
                "scaler input contains missing or non-finite values".to_string(),
            ));
        }

        let means = x.mean_axis(Axis(0)).ok_or_else(|| {
            ForestShieldError::DataError("cannot fit scaler on zero rows".to_string())
        })?;
        let stds = x.std_axis(Axis(0), 0.0);
        let params = means
            .iter()
            .zip(stds.iter())
            .map(|(&center, &std)| ScalerParams {
                center,
                scale: if std == 0.0 { 1.0 } else { std },
            })
            .collect();

        info!(rows = x.nrows(), features = x.ncols(), "Fitted scaler");
        self.params = Some(params);
        Ok(self)
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let params = self.params.as_ref().ok_or(ForestShieldError::ModelNotFitted)?;
        self.check_width(x.ncols())?;

        let mut result = x.clone();
        for (mut column, p) in result.columns_mut().into_iter().zip(params) {
            column.mapv_inplace(|v| (v - p.center) / p.scale);
        }
        Ok(result)
    }

    pub fn fit_transform(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit(x)?;
        self.transform(x)
    }

    /// Scale a single feature vector already in schema order.
    pub fn transform_row(&self, row: ArrayView1<f64>) -> Result<Array1<f64>> {
        let params = self.params.as_ref().ok_or(ForestShieldError::ModelNotFitted)?;
        self.check_width(row.len())?;
        Ok(row
            .iter()
            .zip(params)
            .map(|(&v, p)| (v - p.center) / p.scale)
            .collect())
    }

    /// Validate a named record against the schema and scale it.
    pub fn transform_record(&self, record: &BTreeMap<String, f64>) -> Result<Array1<f64>> {
        let row = self.schema.order_record(record)?;
        self.transform_row(row.view())
    }

    pub fn inverse_transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let params = self.params.as_ref().ok_or(ForestShieldError::ModelNotFitted)?;
        self.check_width(x.ncols())?;

        let mut result = x.clone();
        for (mut column, p) in result.columns_mut().into_iter().zip(params) {
            column.mapv_inplace(|v| v * p.scale + p.center);
        }
        Ok(result)
    }

    fn check_width(&self, actual: usize) -> Result<()> {
        if actual != self.schema.len() {
            return Err(ForestShieldError::ScalingError {
                expected: self.schema.len(),
                actual,
            });
        }
        Ok(())
    }
}
