//! Engine configuration: defaults, TOML files and environment variables.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{VaniError, VaniResult};
use crate::model::{ComputeDevice, Gender, ModelKey};

/// Settings for [`crate::TtsEngine`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Local artifact root
    pub models_dir: PathBuf,
    /// Remote store URL (`gs://bucket/prefix`, `s3://...`, `file:///...`) or bare bucket name
    pub remote_store: Option<String>,
    /// Requested compute device
    pub device: ComputeDevice,
    /// Models loaded when the engine starts
    pub preload_models: Vec<ModelKey>,
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Longest accepted input, in characters
    pub max_text_length: usize,
    /// Synthesis worker threads per request
    pub max_workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("/models"),
            remote_store: None,
            device: ComputeDevice::Cpu,
            preload_models: Vec::new(),
            sample_rate: crate::DEFAULT_SAMPLE_RATE,
            max_text_length: crate::MAX_TEXT_LENGTH,
            max_workers: num_cpus::get_physical().max(1),
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document; missing keys keep their defaults
    ///
    /// # Errors
    ///
    /// `ConfigurationError` for malformed TOML or invalid values.
    pub fn from_toml_str(source: &str) -> VaniResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    ///
    /// # Errors
    ///
    /// `FileError` if the file cannot be read, otherwise as [`Self::from_toml_str`].
    pub fn from_file(path: impl AsRef<Path>) -> VaniResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| VaniError::file(format!("Failed to read config {}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Build from process environment variables
    ///
    /// Reads `MODELS_DIR`, `REMOTE_STORE` (or `GCS_BUCKET`), `DEVICE`,
    /// `PRELOAD_MODELS`, `SAMPLING_RATE`, `MAX_TEXT_LENGTH` and `MAX_WORKERS`.
    ///
    /// # Errors
    ///
    /// `ConfigurationError` for unparseable values.
    pub fn from_env() -> VaniResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup, unset variables keep defaults
    ///
    /// # Errors
    ///
    /// `ConfigurationError` for unparseable values.
    pub fn from_lookup<F>(lookup: F) -> VaniResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(dir) = get("MODELS_DIR") {
            config.models_dir = PathBuf::from(dir);
        }
        config.remote_store = get("REMOTE_STORE").or_else(|| get("GCS_BUCKET"));
        if let Some(device) = get("DEVICE") {
            config.device = device.parse()?;
        }
        if let Some(preload) = get("PRELOAD_MODELS") {
            config.preload_models = parse_preload_list(&preload);
        }
        if let Some(rate) = get("SAMPLING_RATE") {
            config.sample_rate = parse_number("SAMPLING_RATE", &rate)?;
        }
        if let Some(length) = get("MAX_TEXT_LENGTH") {
            config.max_text_length = parse_number("MAX_TEXT_LENGTH", &length)?;
        }
        if let Some(workers) = get("MAX_WORKERS") {
            config.max_workers = parse_number("MAX_WORKERS", &workers)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// `ConfigurationError` for a zero sample rate, text limit or worker count,
    /// or a preload key whose language is not a plain directory name.
    pub fn validate(&self) -> VaniResult<()> {
        if self.sample_rate == 0 {
            return Err(VaniError::configuration("sample_rate must be positive"));
        }
        if self.max_text_length == 0 {
            return Err(VaniError::configuration("max_text_length must be positive"));
        }
        if self.max_workers == 0 {
            return Err(VaniError::configuration("max_workers must be positive"));
        }
        for key in &self.preload_models {
            key.validate()
                .map_err(|e| VaniError::configuration(format!("preload_models: {}", e.detail())))?;
        }
        Ok(())
    }
}

fn parse_number<T: FromStr>(name: &str, raw: &str) -> VaniResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| VaniError::configuration(format!("{name} must be a non-negative integer, got '{raw}'")))
}

/// Parse `"hindi:male,bengali:female"` into keys
///
/// Entries without exactly one `:`, with an empty side or an unknown gender
/// are skipped with a warning.
pub fn parse_preload_list(raw: &str) -> Vec<ModelKey> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .filter_map(|item| {
            let parsed = match item.split(':').collect::<Vec<_>>().as_slice() {
                [language, gender] => gender
                    .trim()
                    .parse::<Gender>()
                    .map(|gender| ModelKey::new(language.trim(), gender))
                    .ok()
                    .filter(|key| key.validate().is_ok()),
                _ => None,
            };
            if parsed.is_none() {
                warn!("Ignoring malformed preload entry '{}'", item);
            }
            parsed
        })
        .collect()
}
