//! Model backend seams and loaded model handles
//!
//! The acoustic model, the vocoder and the text preprocessors are supplied by
//! an external [`ModelBackend`]. This module only defines the interfaces the
//! orchestration core relies on and the immutable [`LoadedModel`] triple the
//! [`ModelRegistry`] hands out.
//!
//! # Concurrency requirement on backends
//!
//! A single [`LoadedModel`] is shared by every synthesis call for its key, and
//! the pipeline invokes `synthesize`/`vocode` on it from several worker
//! threads at once. Implementations of [`AcousticModel`] and [`Vocoder`] must
//! therefore be safe for concurrent read-only invocation, or serialize access
//! internally (e.g. behind a `Mutex`).

use std::fmt;
use std::sync::Arc;

use crate::model::{AcousticArtifacts, ComputeDevice, Gender, ModelKey, VocoderArtifacts};

pub mod preprocess;
pub mod registry;

pub use preprocess::{PlainPreprocessor, PreprocessorKind};
pub use registry::ModelRegistry;

/// Spectral frames produced by the acoustic model, one `Vec` per frame
pub type MelFrames = Vec<Vec<f32>>;

/// Text (normalized tokens) to spectral frames
pub trait AcousticModel: Send + Sync + fmt::Debug {
    /// Produce mel frames for `text`; `alpha` scales durations (>1 slower)
    ///
    /// # Errors
    ///
    /// Any inference failure; the whole synthesis request fails with it.
    fn synthesize(&self, text: &str, alpha: f32) -> anyhow::Result<MelFrames>;
}

/// Spectral frames to waveform
pub trait Vocoder: Send + Sync + fmt::Debug {
    /// Produce float samples in the nominal range `[-1.0, 1.0]`
    ///
    /// # Errors
    ///
    /// Any inference failure; the whole synthesis request fails with it.
    fn vocode(&self, mel: &MelFrames) -> anyhow::Result<Vec<f32>>;
}

/// Language-specific text normalization
pub trait TextPreprocessor: Send + Sync + fmt::Debug {
    /// Normalize `text` into tokens fed (space-joined) to the acoustic model
    ///
    /// # Errors
    ///
    /// Text the preprocessor cannot handle.
    fn preprocess(&self, text: &str, language: &str, gender: Gender) -> anyhow::Result<Vec<String>>;
}

/// Factory for model handles, implemented by the inference layer
pub trait ModelBackend: Send + Sync + fmt::Debug {
    /// Device actually used for a requested device
    ///
    /// Backends without GPU support keep the default, which always runs on CPU.
    fn select_device(&self, requested: ComputeDevice) -> ComputeDevice {
        let _ = requested;
        ComputeDevice::Cpu
    }

    /// Build an acoustic model from validated files
    ///
    /// Called on a blocking thread; may take seconds.
    ///
    /// # Errors
    ///
    /// Unreadable or incompatible artifacts.
    fn load_acoustic(
        &self,
        key: &ModelKey,
        artifacts: &AcousticArtifacts,
        device: ComputeDevice,
    ) -> anyhow::Result<Box<dyn AcousticModel>>;

    /// Build a vocoder from validated files
    ///
    /// # Errors
    ///
    /// Unreadable or incompatible artifacts.
    fn load_vocoder(
        &self,
        key: &ModelKey,
        artifacts: &VocoderArtifacts,
        device: ComputeDevice,
    ) -> anyhow::Result<Box<dyn Vocoder>>;

    /// Preprocessor implementing `kind`
    fn preprocessor(&self, kind: PreprocessorKind) -> Arc<dyn TextPreprocessor> {
        Arc::new(PlainPreprocessor::new(kind))
    }
}

/// Fully loaded (acoustic model, vocoder, preprocessor) triple for one key
///
/// Immutable once built; owned by the registry for the process lifetime.
#[derive(Debug)]
pub struct LoadedModel {
    key: ModelKey,
    acoustic: Box<dyn AcousticModel>,
    vocoder: Box<dyn Vocoder>,
    preprocessor: Arc<dyn TextPreprocessor>,
    preprocessor_kind: PreprocessorKind,
    vocoder_fallback: bool,
}

impl LoadedModel {
    /// Assemble a loaded model
    pub fn new(
        key: ModelKey,
        acoustic: Box<dyn AcousticModel>,
        vocoder: Box<dyn Vocoder>,
        preprocessor: Arc<dyn TextPreprocessor>,
        preprocessor_kind: PreprocessorKind,
        vocoder_fallback: bool,
    ) -> Self {
        Self {
            key,
            acoustic,
            vocoder,
            preprocessor,
            preprocessor_kind,
            vocoder_fallback,
        }
    }

    /// Key this model was loaded for
    pub fn key(&self) -> &ModelKey {
        &self.key
    }

    /// Acoustic model handle
    pub fn acoustic(&self) -> &dyn AcousticModel {
        self.acoustic.as_ref()
    }

    /// Vocoder handle
    pub fn vocoder(&self) -> &dyn Vocoder {
        self.vocoder.as_ref()
    }

    /// Preprocessor strategy
    pub fn preprocessor(&self) -> &dyn TextPreprocessor {
        self.preprocessor.as_ref()
    }

    /// Which preprocessor strategy was selected for the language
    pub fn preprocessor_kind(&self) -> PreprocessorKind {
        self.preprocessor_kind
    }

    /// Whether the vocoder came from the fallback group
    pub fn uses_fallback_vocoder(&self) -> bool {
        self.vocoder_fallback
    }
}
