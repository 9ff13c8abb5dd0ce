//! Shared fixtures for the integration tests

#![allow(dead_code)]

use forestshield::optimizer::{SearchSpace, SearchStrategy};
use forestshield::training::TrainingConfig;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// One synthetic weather row
pub struct Row {
    pub doy: f64,
    pub t2m: f64,
    pub allsky: f64,
    pub rh2m: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub precip: f64,
    pub wind: f64,
}

impl Row {
    /// Hot and dry days burn
    pub fn fire(&self) -> bool {
        self.t2m > 28.0 && self.rh2m < 60.0
    }

    /// Fire size grows with heat and dryness
    pub fn fire_size(&self) -> f64 {
        (self.t2m - 15.0).max(0.0) * (100.0 - self.rh2m) / 10.0
    }
}

pub fn rows(n: usize, seed: u64) -> Vec<Row> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|_| Row {
            doy: rng.gen_range(1..=365) as f64,
            t2m: rng.gen_range(18.0..36.0),
            allsky: rng.gen_range(150.0..300.0),
            rh2m: rng.gen_range(30.0..95.0),
            latitude: rng.gen_range(1.0..10.0),
            longitude: rng.gen_range(-78.0..-70.0),
            precip: rng.gen_range(0.0..5.0),
            wind: rng.gen_range(0.0..8.0),
        })
        .collect()
}

/// CSV with the required columns and a precomputed FIRE_OCCURRED flag.
/// Row 3 has an empty T2M cell and the first row is repeated at the end.
pub fn write_occurred_csv(dir: &Path, n: usize) -> PathBuf {
    let path = dir.join("fires.csv");
    let data = rows(n, 7);
    let mut csv = String::from("DOY,T2M,ALLSKY_SFC_SW_DWN,RH2M,LATITUDE,LONGITUDE,FIRE_OCCURRED\n");
    for (i, r) in data.iter().enumerate() {
        let t2m = if i == 3 { String::new() } else { format!("{:.3}", r.t2m) };
        let _ = writeln!(
            csv,
            "{},{},{:.3},{:.3},{:.4},{:.4},{}",
            r.doy,
            t2m,
            r.allsky,
            r.rh2m,
            r.latitude,
            r.longitude,
            u8::from(r.fire())
        );
    }
    let first = &data[0];
    let _ = writeln!(
        csv,
        "{},{:.3},{:.3},{:.3},{:.4},{:.4},{}",
        first.doy,
        first.t2m,
        first.allsky,
        first.rh2m,
        first.latitude,
        first.longitude,
        u8::from(first.fire())
    );
    std::fs::write(&path, csv).unwrap();
    path
}

/// CSV with optional PRECIP/WIND columns and a continuous FIRE_SIZE label.
pub fn write_fire_size_csv(dir: &Path, n: usize) -> PathBuf {
    let path = dir.join("fire_sizes.csv");
    let mut csv =
        String::from("DOY,T2M,ALLSKY_SFC_SW_DWN,RH2M,LATITUDE,LONGITUDE,PRECIP,WIND,FIRE_SIZE\n");
    for r in rows(n, 11) {
        let _ = writeln!(
            csv,
            "{},{:.3},{:.3},{:.3},{:.4},{:.4},{:.3},{:.3},{:.3}",
            r.doy, r.t2m, r.allsky, r.rh2m, r.latitude, r.longitude, r.precip, r.wind, r.fire_size()
        );
    }
    std::fs::write(&path, csv).unwrap();
    path
}

/// Small search so the tests stay fast
pub fn quick_config(output_dir: &Path) -> TrainingConfig {
    TrainingConfig::default()
        .with_search(SearchStrategy::Randomized { n_iter: 3 })
        .with_search_space(
            SearchSpace::new()
                .int("n_estimators", 10, 20)
                .int("max_depth", 4, 8)
                .int("min_samples_split", 2, 4)
                .categorical("max_features", vec!["sqrt", "log2"])
                .categorical("class_weight", vec!["balanced"]),
        )
        .with_cv_folds(3)
        .with_output_dir(output_dir)
}

/// The record from the service contract example
pub fn example_request() -> serde_json::Value {
    serde_json::json!({
        "DOY": 150,
        "T2M": 25.3,
        "ALLSKY_SFC_SW_DWN": 250.1,
        "RH2M": 60.5,
        "LATITUDE": 5.6,
        "LONGITUDE": -73.2,
        "HEAT_INDEX": 0.65,
        "SOLAR_STRESS": 0.45
    })
}
