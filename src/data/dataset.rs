//! Raw historical dataset

use crate::error::{ForestShieldError, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use polars::prelude::*;
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

/// Raw numeric input column, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum RawColumn {
    Doy,
    T2m,
    AllskySfcSwDwn,
    Rh2m,
    Latitude,
    Longitude,
    Precip,
    Wind,
    Elevation,
    /// Precomputed upstream; derived when absent
    HeatIndex,
    /// Precomputed upstream; derived when absent
    SolarStress,
}

impl RawColumn {
    pub const ALL: [RawColumn; 11] = [
        RawColumn::Doy,
        RawColumn::T2m,
        RawColumn::AllskySfcSwDwn,
        RawColumn::Rh2m,
        RawColumn::Latitude,
        RawColumn::Longitude,
        RawColumn::Precip,
        RawColumn::Wind,
        RawColumn::Elevation,
        RawColumn::HeatIndex,
        RawColumn::SolarStress,
    ];

    /// Column header in the source file
    pub fn name(&self) -> &'static str {
        match self {
            RawColumn::Doy => "DOY",
            RawColumn::T2m => "T2M",
            RawColumn::AllskySfcSwDwn => "ALLSKY_SFC_SW_DWN",
            RawColumn::Rh2m => "RH2M",
            RawColumn::Latitude => "LATITUDE",
            RawColumn::Longitude => "LONGITUDE",
            RawColumn::Precip => "PRECIP",
            RawColumn::Wind => "WIND",
            RawColumn::Elevation => "ELEVATION",
            RawColumn::HeatIndex => "HEAT_INDEX",
            RawColumn::SolarStress => "SOLAR_STRESS",
        }
    }

    pub fn is_required(&self) -> bool {
        matches!(
            self,
            RawColumn::Doy
                | RawColumn::T2m
                | RawColumn::AllskySfcSwDwn
                | RawColumn::Rh2m
                | RawColumn::Latitude
                | RawColumn::Longitude
        )
    }
}

pub const FIRE_OCCURRED: &str = "FIRE_OCCURRED";
pub const FIRE_SIZE: &str = "FIRE_SIZE";

/// Where the binary label comes from.
#[derive(Debug, Clone)]
pub enum LabelSource {
    /// Precomputed 0/1 flag
    Occurred(Array1<f64>),
    /// Continuous fire size, thresholded at a quantile
    FireSize(Array1<f64>),
}

impl LabelSource {
    pub fn values(&self) -> &Array1<f64> {
        match self {
            LabelSource::Occurred(v) | LabelSource::FireSize(v) => v,
        }
    }

    pub fn column_name(&self) -> &'static str {
        match self {
            LabelSource::Occurred(_) => FIRE_OCCURRED,
            LabelSource::FireSize(_) => FIRE_SIZE,
        }
    }

    fn select(&self, indices: &[usize]) -> Self {
        match self {
            LabelSource::Occurred(v) => LabelSource::Occurred(v.select(Axis(0), indices)),
            LabelSource::FireSize(v) => LabelSource::FireSize(v.select(Axis(0), indices)),
        }
    }
}

/// One historical observation. Optional fields model optional columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    pub doy: f64,
    pub t2m: f64,
    pub allsky_sfc_sw_dwn: f64,
    pub rh2m: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub precip: Option<f64>,
    pub wind: Option<f64>,
    pub elevation: Option<f64>,
    pub heat_index: Option<f64>,
    pub solar_stress: Option<f64>,
    pub fire_size: Option<f64>,
    pub fire_occurred: Option<f64>,
}

impl RawRecord {
    fn get(&self, column: RawColumn) -> Option<f64> {
        match column {
            RawColumn::Doy => Some(self.doy),
            RawColumn::T2m => Some(self.t2m),
            RawColumn::AllskySfcSwDwn => Some(self.allsky_sfc_sw_dwn),
            RawColumn::Rh2m => Some(self.rh2m),
            RawColumn::Latitude => Some(self.latitude),
            RawColumn::Longitude => Some(self.longitude),
            RawColumn::Precip => self.precip,
            RawColumn::Wind => self.wind,
            RawColumn::Elevation => self.elevation,
            RawColumn::HeatIndex => self.heat_index,
            RawColumn::SolarStress => self.solar_stress,
        }
    }
}

/// Raw numeric table. Missing values are `NaN`.
#[derive(Debug, Clone)]
pub struct RawDataset {
    columns: Vec<RawColumn>,
    values: Array2<f64>,
    labels: LabelSource,
}

impl RawDataset {
    /// Build a dataset, validating shape, required columns and label values.
    pub fn new(columns: Vec<RawColumn>, values: Array2<f64>, labels: LabelSource) -> Result<Self> {
        if values.ncols() != columns.len() {
            return Err(ForestShieldError::ShapeError {
                expected: format!("{} columns", columns.len()),
                actual: format!("{} columns", values.ncols()),
            });
        }
        if labels.values().len() != values.nrows() {
            return Err(ForestShieldError::ShapeError {
                expected: format!("{} labels", values.nrows()),
                actual: format!("{} labels", labels.values().len()),
            });
        }
        for required in RawColumn::ALL.iter().filter(|c| c.is_required()) {
            if !columns.contains(required) {
                return Err(ForestShieldError::DataError(format!(
                    "missing required column {}",
                    required.name()
                )));
            }
        }
        if let LabelSource::Occurred(flags) = &labels {
            if let Some(bad) = flags.iter().find(|v| !v.is_nan() && **v != 0.0 && **v != 1.0) {
                return Err(ForestShieldError::DataError(format!(
                    "{} must be 0 or 1, found {}",
                    FIRE_OCCURRED, bad
                )));
            }
        }

        let mut columns_sorted = columns.clone();
        columns_sorted.sort();
        columns_sorted.dedup();
        if columns_sorted.len() != columns.len() {
            return Err(ForestShieldError::DataError("duplicate column".to_string()));
        }

        Ok(Self { columns, values, labels })
    }

    /// Build a dataset from records. An optional column is present when any
    /// record carries it; the precomputed fire flag wins over fire size.
    pub fn from_records(records: &[RawRecord]) -> Result<Self> {
        let columns: Vec<RawColumn> = RawColumn::ALL
            .iter()
            .copied()
            .filter(|c| c.is_required() || records.iter().any(|r| r.get(*c).is_some()))
            .collect();

        let values = Array2::from_shape_fn((records.len(), columns.len()), |(i, j)| {
            records[i].get(columns[j]).unwrap_or(f64::NAN)
        });

        let labels = if records.iter().any(|r| r.fire_occurred.is_some()) {
            LabelSource::Occurred(records.iter().map(|r| r.fire_occurred.unwrap_or(f64::NAN)).collect())
        } else if records.iter().any(|r| r.fire_size.is_some()) {
            LabelSource::FireSize(records.iter().map(|r| r.fire_size.unwrap_or(f64::NAN)).collect())
        } else {
            return Err(ForestShieldError::DataError(format!(
                "records carry neither {} nor {}",
                FIRE_OCCURRED, FIRE_SIZE
            )));
        };

        Self::new(columns, values, labels)
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn columns(&self) -> &[RawColumn] {
        &self.columns
    }

    pub fn has_column(&self, column: RawColumn) -> bool {
        self.columns.contains(&column)
    }

    pub fn column(&self, column: RawColumn) -> Option<ArrayView1<'_, f64>> {
        self.columns
            .iter()
            .position(|c| *c == column)
            .map(|idx| self.values.column(idx))
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn labels(&self) -> &LabelSource {
        &self.labels
    }

    /// Subset of rows, in the given order
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            columns: self.columns.clone(),
            values: self.values.select(Axis(0), indices),
            labels: self.labels.select(indices),
        }
    }

    /// Same rows and labels with replaced values (e.g. after imputation)
    pub fn with_values(&self, values: Array2<f64>) -> Result<Self> {
        if values.dim() != self.values.dim() {
            return Err(ForestShieldError::ShapeError {
                expected: format!("{:?}", self.values.dim()),
                actual: format!("{:?}", values.dim()),
            });
        }
        Ok(Self {
            columns: self.columns.clone(),
            values,
            labels: self.labels.clone(),
        })
    }

    /// Drop rows whose label source is missing. Returns the number dropped.
    pub fn drop_unlabeled(self) -> (Self, usize) {
        let keep: Vec<usize> = self
            .labels
            .values()
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_nan())
            .map(|(i, _)| i)
            .collect();
        let dropped = self.n_rows() - keep.len();
        if dropped == 0 {
            return (self, 0);
        }
        (self.select_rows(&keep), dropped)
    }

    /// Remove exact duplicate rows, keeping the first occurrence.
    /// Returns the number removed.
    pub fn deduplicate(self) -> (Self, usize) {
        let mut seen: HashSet<Vec<u64>> = HashSet::with_capacity(self.n_rows());
        let label_values = self.labels.values();
        let keep: Vec<usize> = (0..self.n_rows())
            .filter(|&i| {
                let mut key: Vec<u64> = self.values.row(i).iter().map(|v| canonical_bits(*v)).collect();
                key.push(canonical_bits(label_values[i]));
                seen.insert(key)
            })
            .collect();
        let removed = self.n_rows() - keep.len();
        if removed == 0 {
            return (self, 0);
        }
        (self.select_rows(&keep), removed)
    }
}

/// Bit pattern with every NaN mapped to one value, so missing cells compare equal.
fn canonical_bits(v: f64) -> u64 {
    if v.is_nan() {
        f64::NAN.to_bits()
    } else if v == 0.0 {
        0.0f64.to_bits()
    } else {
        v.to_bits()
    }
}

/// Load the historical dataset from a CSV file.
///
/// Rows without a label source value are dropped, then exact duplicates.
pub fn load(path: impl AsRef<Path>) -> Result<RawDataset> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(ForestShieldError::DataError(format!(
            "dataset not found: {}",
            path.display()
        )));
    }

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(1000))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    let n_rows = df.height();
    let mut columns = Vec::new();
    let mut col_data: Vec<Vec<f64>> = Vec::new();
    for column in RawColumn::ALL {
        match column_values(&df, column.name())? {
            Some(values) if !column.is_required() && values.iter().all(|v| v.is_nan()) => {
                warn!(column = column.name(), "Ignoring optional column without values");
            }
            Some(values) => {
                columns.push(column);
                col_data.push(values);
            }
            None if column.is_required() => {
                return Err(ForestShieldError::DataError(format!(
                    "missing required column {}",
                    column.name()
                )));
            }
            None => {}
        }
    }

    let labels = if let Some(flags) = column_values(&df, FIRE_OCCURRED)? {
        LabelSource::Occurred(Array1::from_vec(flags))
    } else if let Some(sizes) = column_values(&df, FIRE_SIZE)? {
        LabelSource::FireSize(Array1::from_vec(sizes))
    } else {
        return Err(ForestShieldError::DataError(format!(
            "missing label column: need {} or {}",
            FIRE_OCCURRED, FIRE_SIZE
        )));
    };

    let values = Array2::from_shape_fn((n_rows, columns.len()), |(r, c)| col_data[c][r]);
    let dataset = RawDataset::new(columns, values, labels)?;

    let (dataset, unlabeled) = dataset.drop_unlabeled();
    if unlabeled > 0 {
        warn!(rows = unlabeled, label = dataset.labels().column_name(), "Dropped rows without a label value");
    }
    let (dataset, duplicates) = dataset.deduplicate();

    info!(
        path = %path.display(),
        rows = dataset.n_rows(),
        columns = dataset.columns().len(),
        duplicates_dropped = duplicates,
        label = dataset.labels().column_name(),
        "Loaded dataset"
    );

    if dataset.n_rows() == 0 {
        return Err(ForestShieldError::DataError("dataset has no labeled rows".to_string()));
    }

    Ok(dataset)
}

/// Extract a column as `f64`, nulls as `NaN`. `None` when the column is absent.
fn column_values(df: &DataFrame, name: &str) -> Result<Option<Vec<f64>>> {
    let column = match df.column(name) {
        Ok(column) => column,
        Err(_) => return Ok(None),
    };
    let original = column.as_materialized_series();
    let series = original
        .cast(&DataType::Float64)
        .map_err(|e| ForestShieldError::DataError(format!("column {}: {}", name, e)))?;
    let floats = series
        .f64()
        .map_err(|e| ForestShieldError::DataError(format!("column {}: {}", name, e)))?;

    // A non-strict cast turns unparsable cells into nulls
    if series.null_count() > original.null_count() {
        let nulls = original.is_null();
        let row = nulls
            .into_iter()
            .zip(floats.into_iter())
            .position(|(null, v)| null == Some(false) && v.is_none())
            .unwrap_or(0);
        let cell = original
            .get(row)
            .map(|v| v.to_string())
            .unwrap_or_default();
        return Err(ForestShieldError::DataError(format!(
            "column {} has a non-numeric value {} at data row {}",
            name,
            cell,
            row + 1
        )));
    }

    let values = floats.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect();
    Ok(Some(values))
}
