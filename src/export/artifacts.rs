//! Directory-based artifact store with a checksummed manifest

use crate::error::{ForestShieldError, Result};
use crate::feature_engineering::FeatureSchema;
use crate::preprocessing::StandardScaler;
use crate::training::{MetricsRecord, RandomForest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const MODEL_FILE: &str = "model.bin";
pub const SCALER_FILE: &str = "scaler.json";
pub const METRICS_FILE: &str = "metrics.json";
pub const MANIFEST_FILE: &str = "manifest.json";

/// One persisted file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub sha256: String,
    pub bytes: u64,
}

/// Index of a persisted classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Crate version that wrote the artifacts
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub schema: FeatureSchema,
    pub n_trees: usize,
    /// Keyed by file name
    pub artifacts: BTreeMap<String, ArtifactEntry>,
}

/// Model and scaler read back from disk
#[derive(Debug, Clone)]
pub struct LoadedArtifacts {
    pub model: RandomForest,
    pub scaler: StandardScaler,
    pub manifest: Manifest,
}

/// Reads and writes classifier artifacts in one directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// True when a manifest is present
    pub fn exists(&self) -> bool {
        self.dir.join(MANIFEST_FILE).is_file()
    }

    /// Write model, scaler and metrics, then the manifest.
    ///
    /// The previous manifest is removed first, so an interrupted write
    /// leaves a directory that `load` rejects.
    pub fn persist(
        &self,
        model: &RandomForest,
        scaler: &StandardScaler,
        metrics: &MetricsRecord,
    ) -> Result<Manifest> {
        if !model.is_fitted() || !scaler.is_fitted() {
            return Err(ForestShieldError::ModelNotFitted);
        }
        check_widths(model, scaler)?;

        fs::create_dir_all(&self.dir).map_err(|e| {
            ForestShieldError::PersistenceError(format!(
                "cannot create {}: {}",
                self.dir.display(),
                e
            ))
        })?;
        let manifest_path = self.dir.join(MANIFEST_FILE);
        if manifest_path.exists() {
            fs::remove_file(&manifest_path)?;
        }

        let mut artifacts = BTreeMap::new();
        let payloads = [
            (MODEL_FILE, bincode::serialize(model)?),
            (SCALER_FILE, serde_json::to_vec_pretty(scaler)?),
            (METRICS_FILE, serde_json::to_vec_pretty(metrics)?),
        ];
        for (name, bytes) in &payloads {
            self.write_atomic(name, bytes)?;
            debug!(file = name, bytes = bytes.len(), "Wrote artifact");
            artifacts.insert(
                name.to_string(),
                ArtifactEntry {
                    sha256: sha256_hex(bytes),
                    bytes: bytes.len() as u64,
                },
            );
        }

        let manifest = Manifest {
            version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: Utc::now(),
            schema: scaler.schema().clone(),
            n_trees: model.n_trees(),
            artifacts,
        };
        self.write_atomic(MANIFEST_FILE, &serde_json::to_vec_pretty(&manifest)?)?;

        info!(
            dir = %self.dir.display(),
            features = manifest.schema.len(),
            trees = manifest.n_trees,
            "Persisted model artifacts"
        );
        Ok(manifest)
    }

    /// Read and verify the manifest.
    pub fn manifest(&self) -> Result<Manifest> {
        let bytes = self.read(MANIFEST_FILE)?;
        serde_json::from_slice(&bytes).map_err(|e| {
            ForestShieldError::PersistenceError(format!("corrupt {}: {}", MANIFEST_FILE, e))
        })
    }

    /// Load model and scaler, verifying checksums and the feature schema.
    pub fn load(&self) -> Result<LoadedArtifacts> {
        let manifest = self.manifest()?;

        let model_bytes = self.read_verified(&manifest, MODEL_FILE)?;
        let scaler_bytes = self.read_verified(&manifest, SCALER_FILE)?;

        let model: RandomForest = bincode::deserialize(&model_bytes).map_err(|e| {
            ForestShieldError::PersistenceError(format!("corrupt {}: {}", MODEL_FILE, e))
        })?;
        let scaler: StandardScaler = serde_json::from_slice(&scaler_bytes).map_err(|e| {
            ForestShieldError::PersistenceError(format!("corrupt {}: {}", SCALER_FILE, e))
        })?;

        if !model.is_fitted() || !scaler.is_fitted() {
            return Err(ForestShieldError::PersistenceError(
                "persisted model or scaler is not fitted".to_string(),
            ));
        }
        if scaler.schema() != &manifest.schema {
            return Err(ForestShieldError::PersistenceError(format!(
                "scaler features {:?} differ from manifest features {:?}",
                scaler.schema().names(),
                manifest.schema.names()
            )));
        }
        check_widths(&model, &scaler)
            .map_err(|e| ForestShieldError::PersistenceError(e.to_string()))?;

        info!(
            dir = %self.dir.display(),
            features = scaler.n_features(),
            trees = model.n_trees(),
            version = %manifest.version,
            "Loaded model artifacts"
        );
        Ok(LoadedArtifacts {
            model,
            scaler,
            manifest,
        })
    }

    /// Read the metrics record
    pub fn load_metrics(&self) -> Result<MetricsRecord> {
        let manifest = self.manifest()?;
        let bytes = self.read_verified(&manifest, METRICS_FILE)?;
        serde_json::from_slice(&bytes).map_err(|e| {
            ForestShieldError::PersistenceError(format!("corrupt {}: {}", METRICS_FILE, e))
        })
    }

    fn read(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.dir.join(name);
        fs::read(&path).map_err(|e| {
            ForestShieldError::PersistenceError(format!("cannot read {}: {}", path.display(), e))
        })
    }

    fn read_verified(&self, manifest: &Manifest, name: &str) -> Result<Vec<u8>> {
        let entry = manifest.artifacts.get(name).ok_or_else(|| {
            ForestShieldError::PersistenceError(format!("{} is not listed in the manifest", name))
        })?;
        let bytes = self.read(name)?;
        let actual = sha256_hex(&bytes);
        if actual != entry.sha256 {
            return Err(ForestShieldError::PersistenceError(format!(
                "checksum mismatch for {}: expected {}, found {}",
                name, entry.sha256, actual
            )));
        }
        Ok(bytes)
    }

    fn write_atomic(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let tmp = self.dir.join(format!(".{}.tmp", name));
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, self.dir.join(name))?;
        Ok(())
    }
}

fn check_widths(model: &RandomForest, scaler: &StandardScaler) -> Result<()> {
    if model.n_features() != scaler.n_features() {
        return Err(ForestShieldError::ScalingError {
            expected: scaler.n_features(),
            actual: model.n_features(),
        });
    }
    Ok(())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
