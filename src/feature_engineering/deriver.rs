//! Derived features, quantile thresholds and labels

use super::{Feature, FeatureSchema, FeatureSet};
use crate::data::{LabelSource, RawColumn, RawDataset};
use crate::error::{ForestShieldError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Which rows the quantile thresholds are fitted on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdScope {
    /// Thresholds come from the training partition only
    #[default]
    TrainOnly,
    /// Thresholds come from every row before splitting (leaks test rows)
    FullDataset,
}

/// Fitted quantile cutoffs
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Thresholds {
    /// Fire size at `label_quantile`; set only when labels come from fire size
    pub label: Option<f64>,
    /// 25th percentile of RH2M
    pub low_humidity: Option<f64>,
    /// 75th percentile of T2M
    pub high_temp: Option<f64>,
    /// 75th percentile of ALLSKY_SFC_SW_DWN
    pub high_solar: Option<f64>,
}

/// Quantile with linear interpolation between order statistics. `NaN`s are ignored.
pub fn quantile<'a>(values: impl IntoIterator<Item = &'a f64>, q: f64) -> Result<f64> {
    if !(0.0..=1.0).contains(&q) {
        return Err(ForestShieldError::InvalidParameter {
            name: "quantile".to_string(),
            value: q.to_string(),
            reason: "must be in [0, 1]".to_string(),
        });
    }
    let mut sorted: Vec<f64> = values.into_iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return Err(ForestShieldError::DataError(
            "cannot compute a quantile of an empty column".to_string(),
        ));
    }
    sorted.sort_by(f64::total_cmp);

    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Ok(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

/// Derives the ordered feature matrix and binary labels from raw data.
///
/// `fit` fixes the feature order for the columns the dataset exposes and
/// learns every quantile threshold; `transform` and `labels` then apply
/// those thresholds unchanged to any partition.
#[derive(Debug, Clone)]
pub struct FeatureDeriver {
    feature_set: FeatureSet,
    label_quantile: f64,
    features: Option<Vec<Feature>>,
    thresholds: Option<Thresholds>,
}

impl FeatureDeriver {
    pub fn new(feature_set: FeatureSet) -> Self {
        Self {
            feature_set,
            label_quantile: 0.60,
            features: None,
            thresholds: None,
        }
    }

    pub fn with_label_quantile(mut self, q: f64) -> Self {
        self.label_quantile = q;
        self
    }

    pub fn feature_set(&self) -> FeatureSet {
        self.feature_set
    }

    pub fn thresholds(&self) -> Option<&Thresholds> {
        self.thresholds.as_ref()
    }

    pub fn features(&self) -> Option<&[Feature]> {
        self.features.as_deref()
    }

    pub fn is_fitted(&self) -> bool {
        self.features.is_some()
    }

    pub fn schema(&self) -> Result<FeatureSchema> {
        self.features
            .as_deref()
            .map(FeatureSchema::from_features)
            .ok_or(ForestShieldError::ModelNotFitted)
    }

    /// Fix the feature order and learn the thresholds from `data`.
    pub fn fit(&mut self, data: &RawDataset) -> Result<()> {
        if !(self.label_quantile > 0.0 && self.label_quantile < 1.0) {
            return Err(ForestShieldError::InvalidParameter {
                name: "label_quantile".to_string(),
                value: self.label_quantile.to_string(),
                reason: "must be in (0, 1)".to_string(),
            });
        }

        let features = self.feature_set.features(data.columns());
        let mut thresholds = Thresholds::default();

        if let LabelSource::FireSize(sizes) = data.labels() {
            thresholds.label = Some(quantile(sizes.iter(), self.label_quantile)?);
        }
        if self.feature_set.uses_indicators() {
            thresholds.low_humidity = Some(quantile(raw(data, RawColumn::Rh2m)?.iter(), 0.25)?);
            thresholds.high_temp = Some(quantile(raw(data, RawColumn::T2m)?.iter(), 0.75)?);
            thresholds.high_solar =
                Some(quantile(raw(data, RawColumn::AllskySfcSwDwn)?.iter(), 0.75)?);
        }

        info!(
            feature_set = ?self.feature_set,
            n_features = features.len(),
            rows = data.n_rows(),
            label_threshold = ?thresholds.label,
            "Fitted feature deriver"
        );
        debug!(features = ?features.iter().map(|f| f.name()).collect::<Vec<_>>(), thresholds = ?thresholds);

        self.features = Some(features);
        self.thresholds = Some(thresholds);
        Ok(())
    }

    /// Feature matrix in the fitted order.
    pub fn transform(&self, data: &RawDataset) -> Result<Array2<f64>> {
        let features = self.features.as_ref().ok_or(ForestShieldError::ModelNotFitted)?;
        let thresholds = self.thresholds.as_ref().ok_or(ForestShieldError::ModelNotFitted)?;

        let n = data.n_rows();
        let t2m = raw(data, RawColumn::T2m)?;
        let rh = raw(data, RawColumn::Rh2m)?;
        let allsky = raw(data, RawColumn::AllskySfcSwDwn)?;
        let precip = data.column(RawColumn::Precip);

        let heat_index: Array1<f64> = match data.column(RawColumn::HeatIndex) {
            Some(given) => Array1::from_shape_fn(n, |i| {
                if given[i].is_nan() { heat_index(t2m[i], rh[i]) } else { given[i] }
            }),
            None => Array1::from_shape_fn(n, |i| heat_index(t2m[i], rh[i])),
        };
        let solar_stress: Array1<f64> = match data.column(RawColumn::SolarStress) {
            Some(given) => Array1::from_shape_fn(n, |i| {
                if given[i].is_nan() { solar_stress(allsky[i], rh[i]) } else { given[i] }
            }),
            None => Array1::from_shape_fn(n, |i| solar_stress(allsky[i], rh[i])),
        };

        let indicator = |threshold: Option<f64>, name: &str| {
            threshold.ok_or_else(|| {
                ForestShieldError::DataError(format!("{} threshold was not fitted", name))
            })
        };

        let mut out = Array2::zeros((n, features.len()));
        for (j, feature) in features.iter().enumerate() {
            let column: Array1<f64> = match feature {
                Feature::HeatIndex => heat_index.clone(),
                Feature::SolarStress => solar_stress.clone(),
                Feature::TempHumidity => Array1::from_shape_fn(n, |i| t2m[i] * rh[i]),
                Feature::LowHumidity => {
                    let q = indicator(thresholds.low_humidity, "LOW_HUMIDITY")?;
                    rh.mapv(|v| flag(v <= q))
                }
                Feature::HighTemp => {
                    let q = indicator(thresholds.high_temp, "HIGH_TEMP")?;
                    t2m.mapv(|v| flag(v >= q))
                }
                Feature::HighSolar => {
                    let q = indicator(thresholds.high_solar, "HIGH_SOLAR")?;
                    allsky.mapv(|v| flag(v >= q))
                }
                Feature::FireRiskScore => {
                    let low_h = indicator(thresholds.low_humidity, "LOW_HUMIDITY")?;
                    let high_t = indicator(thresholds.high_temp, "HIGH_TEMP")?;
                    let high_s = indicator(thresholds.high_solar, "HIGH_SOLAR")?;
                    Array1::from_shape_fn(n, |i| {
                        let p = precip.as_ref().map_or(0.0, |p| p[i]);
                        heat_index[i] * solar_stress[i] / (1.0 + p)
                            + flag(rh[i] <= low_h)
                            + flag(t2m[i] >= high_t)
                            + flag(allsky[i] >= high_s)
                    })
                }
                other => {
                    let col = other.raw_column().ok_or_else(|| {
                        ForestShieldError::DataError(format!("no source for feature {}", other))
                    })?;
                    raw(data, col)?.to_owned()
                }
            };
            out.column_mut(j).assign(&column);
        }
        Ok(out)
    }

    /// Binary labels: the fire flag as-is, or fire size at or above the
    /// fitted quantile threshold.
    pub fn labels(&self, data: &RawDataset) -> Result<Array1<f64>> {
        let thresholds = self.thresholds.as_ref().ok_or(ForestShieldError::ModelNotFitted)?;
        match data.labels() {
            LabelSource::Occurred(flags) => Ok(flags.clone()),
            LabelSource::FireSize(sizes) => {
                let threshold = thresholds.label.ok_or_else(|| {
                    ForestShieldError::DataError("fire size threshold was not fitted".to_string())
                })?;
                Ok(sizes.mapv(|v| flag(v >= threshold)))
            }
        }
    }

    /// Features and labels in one pass.
    pub fn derive(&self, data: &RawDataset) -> Result<(Array2<f64>, Array1<f64>)> {
        Ok((self.transform(data)?, self.labels(data)?))
    }
}

/// Fit thresholds on `data` itself and derive its features and labels.
///
/// Thresholds see every row; use a [`FeatureDeriver`] fitted on a training
/// partition when the rows will later be split.
pub fn derive_features(
    data: &RawDataset,
    feature_set: FeatureSet,
    label_quantile: f64,
) -> Result<(Array2<f64>, Array1<f64>, FeatureSchema)> {
    let mut deriver = FeatureDeriver::new(feature_set).with_label_quantile(label_quantile);
    deriver.fit(data)?;
    let (x, y) = deriver.derive(data)?;
    Ok((x, y, deriver.schema()?))
}

fn raw(data: &RawDataset, column: RawColumn) -> Result<ArrayView1<'_, f64>> {
    data.column(column)
        .ok_or_else(|| ForestShieldError::DataError(format!("missing column {}", column.name())))
}

#[inline]
fn heat_index(t2m: f64, rh: f64) -> f64 {
    t2m * (1.0 - rh / 100.0)
}

#[inline]
fn solar_stress(allsky: f64, rh: f64) -> f64 {
    allsky / (rh + 1.0)
}

#[inline]
fn flag(condition: bool) -> f64 {
    if condition { 1.0 } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::RawRecord;

    fn record(t2m: f64, rh2m: f64, allsky: f64, fire_size: f64) -> RawRecord {
        RawRecord {
            doy: 100.0,
            t2m,
            allsky_sfc_sw_dwn: allsky,
            rh2m,
            latitude: 4.0,
            longitude: -74.0,
            fire_size: Some(fire_size),
            ..Default::default()
        }
    }

    fn dataset() -> RawDataset {
        RawDataset::from_records(&[
            record(20.0, 80.0, 100.0, 1.0),
            record(25.0, 60.0, 200.0, 2.0),
            record(30.0, 40.0, 300.0, 3.0),
            record(35.0, 20.0, 400.0, 4.0),
            record(40.0, 10.0, 500.0, 5.0),
        ])
        .unwrap()
    }

    #[test]
    fn test_quantile_linear_interpolation() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((quantile(v.iter(), 0.6).unwrap() - 3.4).abs() < 1e-12);
        assert_eq!(quantile(v.iter(), 0.0).unwrap(), 1.0);
        assert_eq!(quantile(v.iter(), 1.0).unwrap(), 5.0);
        assert_eq!(quantile([f64::NAN, 2.0].iter(), 0.5).unwrap(), 2.0);
        assert!(quantile([f64::NAN].iter(), 0.5).is_err());
    }

    #[test]
    fn test_core_formulas() {
        let (x, _, schema) = derive_features(&dataset(), FeatureSet::Core, 0.6).unwrap();
        assert_eq!(schema.len(), 8);
        let hi = schema.position("HEAT_INDEX").unwrap();
        let ss = schema.position("SOLAR_STRESS").unwrap();
        // T2M = 30, RH = 40, ALLSKY = 300
        assert!((x[[2, hi]] - 18.0).abs() < 1e-12);
        assert!((x[[2, ss]] - 300.0 / 41.0).abs() < 1e-12);
    }

    #[test]
    fn test_labels_from_fire_size_quantile() {
        let (_, y, _) = derive_features(&dataset(), FeatureSet::Core, 0.6).unwrap();
        // q60 of 1..5 is 3.4
        assert_eq!(y.to_vec(), vec![0.0, 0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_indicators_and_risk_score() {
        let (x, _, schema) =
            derive_features(&dataset(), FeatureSet::ExtendedWithIndicators, 0.6).unwrap();
        assert_eq!(schema.len(), 13);
        let low_h = schema.position("LOW_HUMIDITY").unwrap();
        let high_t = schema.position("HIGH_TEMP").unwrap();
        let score = schema.position("FIRE_RISK_SCORE").unwrap();

        // q25 RH = 20, q75 T2M = 35
        assert_eq!(x.column(low_h).to_vec(), vec![0.0, 0.0, 0.0, 1.0, 1.0]);
        assert_eq!(x.column(high_t).to_vec(), vec![0.0, 0.0, 0.0, 1.0, 1.0]);

        let base = 40.0 * 0.9 * (500.0 / 11.0);
        assert!((x[[4, score]] - (base + 3.0)).abs() < 1e-9);
    }

    #[test]
    fn test_thresholds_fitted_on_one_partition_apply_to_another() {
        let data = dataset();
        let train = data.select_rows(&[0, 1, 2]);
        let test = data.select_rows(&[3, 4]);

        let mut deriver = FeatureDeriver::new(FeatureSet::Core).with_label_quantile(0.5);
        deriver.fit(&train).unwrap();
        assert_eq!(deriver.thresholds().unwrap().label, Some(2.0));
        assert_eq!(deriver.labels(&test).unwrap().to_vec(), vec![1.0, 1.0]);
    }

    #[test]
    fn test_provided_heat_index_is_kept() {
        let mut rec = record(30.0, 40.0, 300.0, 1.0);
        rec.heat_index = Some(0.65);
        let data = RawDataset::from_records(&[rec, record(20.0, 50.0, 100.0, 2.0)]).unwrap();
        let (x, _, schema) = derive_features(&data, FeatureSet::Core, 0.6).unwrap();
        let hi = schema.position("HEAT_INDEX").unwrap();
        assert_eq!(x[[0, hi]], 0.65);
        assert_eq!(x[[1, hi]], 10.0);
    }

    #[test]
    fn test_transform_before_fit() {
        let deriver = FeatureDeriver::new(FeatureSet::Core);
        assert!(matches!(deriver.transform(&dataset()), Err(ForestShieldError::ModelNotFitted)));
    }
}
