//! Column-mean imputation

use crate::error::{ForestShieldError, Result};
use crate::imputation::{is_missing, Imputer};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Replaces missing values with the mean of the observed values of the
/// same column, as seen during `fit`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeanImputer {
    means: Option<Array1<f64>>,
}

impl MeanImputer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fitted column means
    pub fn means(&self) -> Option<&Array1<f64>> {
        self.means.as_ref()
    }
}

impl Imputer for MeanImputer {
    fn fit(&mut self, x: &Array2<f64>) -> Result<()> {
        let mut means = Array1::zeros(x.ncols());
        for (j, col) in x.columns().into_iter().enumerate() {
            let (sum, count) = col
                .iter()
                .filter(|v| !is_missing(**v))
                .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
            if count == 0 {
                return Err(ForestShieldError::DataError(format!(
                    "column {} has no observed values to impute from",
                    j
                )));
            }
            means[j] = sum / count as f64;
        }
        self.means = Some(means);
        Ok(())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let means = self.means.as_ref().ok_or(ForestShieldError::ModelNotFitted)?;
        if x.ncols() != means.len() {
            return Err(ForestShieldError::ShapeError {
                expected: format!("{} columns", means.len()),
                actual: format!("{} columns", x.ncols()),
            });
        }

        let mut result = x.clone();
        for ((_, j), v) in result.indexed_iter_mut() {
            if is_missing(*v) {
                *v = means[j];
            }
        }
        Ok(result)
    }
}
