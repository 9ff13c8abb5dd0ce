//! Feature catalogue

use crate::data::RawColumn;
use crate::error::{ForestShieldError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single model input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    Doy,
    T2m,
    AllskySfcSwDwn,
    Rh2m,
    Latitude,
    Longitude,
    Precip,
    Wind,
    Elevation,
    /// T2M * (1 - RH2M / 100)
    HeatIndex,
    /// ALLSKY_SFC_SW_DWN / (RH2M + 1)
    SolarStress,
    /// T2M * RH2M
    TempHumidity,
    /// HEAT_INDEX * SOLAR_STRESS / (1 + PRECIP) + indicator count
    FireRiskScore,
    /// RH2M at or below the fitted 25th percentile
    LowHumidity,
    /// T2M at or above the fitted 75th percentile
    HighTemp,
    /// ALLSKY_SFC_SW_DWN at or above the fitted 75th percentile
    HighSolar,
}

impl Feature {
    pub const ALL: [Feature; 16] = [
        Feature::Doy,
        Feature::T2m,
        Feature::AllskySfcSwDwn,
        Feature::Rh2m,
        Feature::Latitude,
        Feature::Longitude,
        Feature::Precip,
        Feature::Wind,
        Feature::Elevation,
        Feature::HeatIndex,
        Feature::SolarStress,
        Feature::TempHumidity,
        Feature::FireRiskScore,
        Feature::LowHumidity,
        Feature::HighTemp,
        Feature::HighSolar,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Feature::Doy => "DOY",
            Feature::T2m => "T2M",
            Feature::AllskySfcSwDwn => "ALLSKY_SFC_SW_DWN",
            Feature::Rh2m => "RH2M",
            Feature::Latitude => "LATITUDE",
            Feature::Longitude => "LONGITUDE",
            Feature::Precip => "PRECIP",
            Feature::Wind => "WIND",
            Feature::Elevation => "ELEVATION",
            Feature::HeatIndex => "HEAT_INDEX",
            Feature::SolarStress => "SOLAR_STRESS",
            Feature::TempHumidity => "TEMP_HUMIDITY",
            Feature::FireRiskScore => "FIRE_RISK_SCORE",
            Feature::LowHumidity => "LOW_HUMIDITY",
            Feature::HighTemp => "HIGH_TEMP",
            Feature::HighSolar => "HIGH_SOLAR",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }

    /// Raw column the feature is read from directly, if any.
    /// `HEAT_INDEX` and `SOLAR_STRESS` are read when the dataset provides them.
    pub fn raw_column(&self) -> Option<RawColumn> {
        match self {
            Feature::Doy => Some(RawColumn::Doy),
            Feature::T2m => Some(RawColumn::T2m),
            Feature::AllskySfcSwDwn => Some(RawColumn::AllskySfcSwDwn),
            Feature::Rh2m => Some(RawColumn::Rh2m),
            Feature::Latitude => Some(RawColumn::Latitude),
            Feature::Longitude => Some(RawColumn::Longitude),
            Feature::Precip => Some(RawColumn::Precip),
            Feature::Wind => Some(RawColumn::Wind),
            Feature::Elevation => Some(RawColumn::Elevation),
            Feature::HeatIndex => Some(RawColumn::HeatIndex),
            Feature::SolarStress => Some(RawColumn::SolarStress),
            _ => None,
        }
    }

    /// Physically plausible input range, checked at inference time.
    pub fn valid_range(&self) -> Option<(f64, f64)> {
        match self {
            Feature::Doy => Some((1.0, 366.0)),
            Feature::Rh2m => Some((0.0, 100.0)),
            Feature::Latitude => Some((-90.0, 90.0)),
            Feature::Longitude => Some((-180.0, 180.0)),
            Feature::AllskySfcSwDwn | Feature::Precip | Feature::Wind => Some((0.0, f64::MAX)),
            Feature::LowHumidity | Feature::HighTemp | Feature::HighSolar => Some((0.0, 1.0)),
            _ => None,
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Supported feature sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSet {
    /// The eight non-leaking predictors
    #[default]
    Core,
    /// Core plus optional raw columns and the temperature/humidity interaction
    Extended,
    /// Extended plus the quantile indicators and the composite risk score
    ExtendedWithIndicators,
}

impl FeatureSet {
    /// Ordered features for a dataset exposing `available` raw columns.
    /// Optional raw columns that are absent are skipped.
    pub fn features(&self, available: &[RawColumn]) -> Vec<Feature> {
        let optional = [Feature::Precip, Feature::Wind, Feature::Elevation];
        let base = [
            Feature::Doy,
            Feature::T2m,
            Feature::AllskySfcSwDwn,
            Feature::Rh2m,
            Feature::Latitude,
            Feature::Longitude,
        ];

        let mut features: Vec<Feature> = base.to_vec();
        match self {
            FeatureSet::Core => {
                features.extend([Feature::HeatIndex, Feature::SolarStress]);
            }
            FeatureSet::Extended | FeatureSet::ExtendedWithIndicators => {
                features.extend(optional.iter().copied().filter(|f| {
                    f.raw_column().map_or(false, |c| available.contains(&c))
                }));
                features.extend([Feature::HeatIndex, Feature::SolarStress, Feature::TempHumidity]);
                if *self == FeatureSet::ExtendedWithIndicators {
                    features.extend([
                        Feature::FireRiskScore,
                        Feature::LowHumidity,
                        Feature::HighTemp,
                        Feature::HighSolar,
                    ]);
                }
            }
        }
        features
    }

    pub fn uses_indicators(&self) -> bool {
        matches!(self, FeatureSet::ExtendedWithIndicators)
    }
}

impl FromStr for FeatureSet {
    type Err = ForestShieldError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "core" => Ok(FeatureSet::Core),
            "extended" => Ok(FeatureSet::Extended),
            "extended_with_indicators" | "indicators" => Ok(FeatureSet::ExtendedWithIndicators),
            _ => Err(ForestShieldError::ConfigError(format!("unknown feature set: {}", s))),
        }
    }
}
