//! Required file sets for acoustic models and vocoders

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Group vocoder shared by languages without a dedicated one
pub const FALLBACK_VOCODER_GROUP: &str = "aryan";

/// Directory under the model root holding vocoders
pub const VOCODER_DIR: &str = "vocoder";

/// Acoustic model directory name under `<language>/<gender>/`
pub const MODEL_DIR: &str = "model";

/// Acoustic model config
pub const MODEL_CONFIG: &str = "config.yaml";
/// Acoustic model weights
pub const MODEL_WEIGHTS: &str = "model.pth";
/// Feature normalization statistics
pub const FEATURE_STATS: &str = "feats_stats.npz";
/// Pitch normalization statistics
pub const PITCH_STATS: &str = "pitch_stats.npz";
/// Energy normalization statistics
pub const ENERGY_STATS: &str = "energy_stats.npz";

/// Vocoder config
pub const VOCODER_CONFIG: &str = "config.json";
/// Vocoder generator weights
pub const VOCODER_GENERATOR: &str = "generator";

const MODEL_FILES: [&str; 5] = [
    MODEL_CONFIG,
    MODEL_WEIGHTS,
    FEATURE_STATS,
    PITCH_STATS,
    ENERGY_STATS,
];

const VOCODER_FILES: [&str; 2] = [VOCODER_CONFIG, VOCODER_GENERATOR];

/// Kind of downloadable artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Acoustic model (config, weights, normalization stats)
    Model,
    /// Vocoder (config, generator)
    Vocoder,
}

impl ArtifactKind {
    /// Files that must all exist for the artifact to be usable
    pub fn required_files(&self) -> &'static [&'static str] {
        match self {
            Self::Model => &MODEL_FILES,
            Self::Vocoder => &VOCODER_FILES,
        }
    }

    /// Check that every required file exists as a regular file under `dir`
    pub fn is_complete(&self, dir: &Path) -> bool {
        self.required_files()
            .iter()
            .all(|file| dir.join(file).is_file())
    }

    /// Required files absent from `dir`, in manifest order
    pub fn missing_files(&self, dir: &Path) -> Vec<&'static str> {
        self.required_files()
            .iter()
            .copied()
            .filter(|file| !dir.join(file).is_file())
            .collect()
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Model => f.write_str("model"),
            Self::Vocoder => f.write_str("vocoder"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"x").unwrap();
    }

    #[test]
    fn test_complete_model_manifest() {
        let dir = TempDir::new().unwrap();
        for file in ArtifactKind::Model.required_files() {
            touch(dir.path(), file);
        }
        assert!(ArtifactKind::Model.is_complete(dir.path()));
        assert!(ArtifactKind::Model.missing_files(dir.path()).is_empty());
    }

    #[test]
    fn test_single_missing_file_fails_manifest() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), VOCODER_CONFIG);
        assert!(!ArtifactKind::Vocoder.is_complete(dir.path()));
        assert_eq!(
            ArtifactKind::Vocoder.missing_files(dir.path()),
            vec![VOCODER_GENERATOR]
        );
    }

    #[test]
    fn test_directory_does_not_satisfy_file_entry() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), VOCODER_CONFIG);
        std::fs::create_dir(dir.path().join(VOCODER_GENERATOR)).unwrap();
        assert!(!ArtifactKind::Vocoder.is_complete(dir.path()));
    }

    #[test]
    fn test_missing_directory() {
        let dir = TempDir::new().unwrap();
        let absent = dir.path().join("nope");
        assert!(!ArtifactKind::Model.is_complete(&absent));
        assert_eq!(ArtifactKind::Model.missing_files(&absent).len(), 5);
    }
}
