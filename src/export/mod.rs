//! Artifact persistence
//!
//! A trained classifier is stored as a directory:
//! - `model.bin` - the random forest (bincode)
//! - `scaler.json` - the fitted scaler with its feature schema
//! - `metrics.json` - the read-only metrics record
//! - `manifest.json` - checksums and schema, written last
//!
//! A directory without a manifest, or whose files do not match it, is
//! rejected by [`ArtifactStore::load`].

mod artifacts;

pub use artifacts::{ArtifactEntry, ArtifactStore, LoadedArtifacts, Manifest};
pub use artifacts::{MANIFEST_FILE, METRICS_FILE, MODEL_FILE, SCALER_FILE};
