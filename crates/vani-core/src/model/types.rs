// Model identity types shared by the artifact store and the registry

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path};
use std::str::FromStr;

use super::manifest::VOCODER_DIR;
use crate::error::{VaniError, VaniResult};

/// Voice gender of a trained model
///
/// Variant order matches the lowercase names so derived ordering sorts
/// `female` before `male`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    /// Female voice
    Female,
    /// Male voice
    Male,
}

impl Gender {
    /// Directory and wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Female => "female",
            Self::Male => "male",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = VaniError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "female" => Ok(Self::Female),
            "male" => Ok(Self::Male),
            other => Err(VaniError::invalid_input(format!(
                "Unknown gender '{other}', expected 'male' or 'female'"
            ))),
        }
    }
}

/// Cache and lock identity: exact, case-sensitive (language, gender) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelKey {
    /// Language directory name, e.g. `hindi`
    pub language: String,
    /// Voice gender
    pub gender: Gender,
}

impl ModelKey {
    /// Create a new model key
    pub fn new(language: impl Into<String>, gender: Gender) -> Self {
        Self {
            language: language.into(),
            gender,
        }
    }

    /// Check that the language names a single directory below the model root
    ///
    /// Deserialized keys skip this check; the registry and the artifact store
    /// call it before touching disk.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for empty names, separators, `.`/`..`, absolute paths and
    /// the reserved vocoder directory.
    pub fn validate(&self) -> VaniResult<()> {
        validate_language(&self.language)
    }
}

/// Reject language names that are not one plain path component
///
/// # Errors
///
/// `InvalidInput` describing the offending name.
pub fn validate_language(language: &str) -> VaniResult<()> {
    let invalid = |reason: &str| {
        Err(VaniError::invalid_input(format!(
            "Invalid language '{language}': {reason}"
        )))
    };

    if language.trim().is_empty() {
        return invalid("name is empty");
    }
    if language.contains(['/', '\\']) {
        return invalid("path separators are not allowed");
    }
    if language == VOCODER_DIR {
        return invalid("name is reserved for vocoders");
    }

    let mut components = Path::new(language).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => invalid("must be a single directory name"),
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.language, self.gender)
    }
}

/// Compute device requested from, and reported by, the model backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeDevice {
    /// Host CPU
    #[default]
    Cpu,
    /// CUDA GPU
    Cuda,
}

impl ComputeDevice {
    /// Lowercase device name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Cuda => "cuda",
        }
    }
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComputeDevice {
    type Err = VaniError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda),
            other => Err(VaniError::configuration(format!(
                "Unknown device '{other}', expected 'cpu' or 'cuda'"
            ))),
        }
    }
}
