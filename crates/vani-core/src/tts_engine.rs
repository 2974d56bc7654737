//! TTS engine facade.
//!
//! [`TtsEngine`] is constructed explicitly from an [`EngineConfig`] and a
//! [`ModelBackend`] and wires the artifact store, the model registry and the
//! synthesis pipeline together. It exposes the operations a front end needs:
//! health, the model catalog, synthesis (PCM or WAV) and batch preload.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::error::{VaniError, VaniResult};
use crate::model::{ArtifactStore, ComputeDevice, Gender, ModelKey};
use crate::models::{ModelBackend, ModelRegistry};
use crate::pipeline::SynthesisPipeline;
use crate::wav_writer::encode_wav;

fn default_speed() -> f32 {
    1.0
}

/// One synthesis request as received from a front end
///
/// Missing string fields deserialize as empty and are rejected by
/// [`SynthesisRequest::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    /// Text, optionally with `<alpha=..>` and `<sil=..>` tags
    #[serde(default)]
    pub text: String,
    /// Language directory name
    #[serde(default)]
    pub language: String,
    /// `male` or `female`
    #[serde(default)]
    pub gender: String,
    /// Speed factor before any `<alpha=..>` tag
    #[serde(default = "default_speed", alias = "alpha")]
    pub speed: f32,
}

impl SynthesisRequest {
    /// Create a request at normal speed
    pub fn new(text: impl Into<String>, language: impl Into<String>, gender: Gender) -> Self {
        Self {
            text: text.into(),
            language: language.into(),
            gender: gender.as_str().to_string(),
            speed: default_speed(),
        }
    }

    /// Set the default speed factor
    #[must_use]
    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    /// Check required fields and resolve the model key
    ///
    /// # Errors
    ///
    /// `InvalidInput` if `text`, `language` or `gender` is missing, the
    /// gender is unknown or the language is not a plain directory name.
    pub fn validate(&self) -> VaniResult<ModelKey> {
        if self.text.trim().is_empty() {
            return Err(VaniError::invalid_input("'text' field is required"));
        }
        if self.language.trim().is_empty() {
            return Err(VaniError::invalid_input("'language' field is required"));
        }
        if self.gender.trim().is_empty() {
            return Err(VaniError::invalid_input("'gender' field is required"));
        }
        let gender: Gender = self.gender.parse()?;
        let key = ModelKey::new(self.language.clone(), gender);
        key.validate()?;
        Ok(key)
    }
}

/// A key that failed to preload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreloadFailure {
    /// Requested key
    #[serde(flatten)]
    pub key: ModelKey,
    /// Failure description
    pub error: String,
}

/// Outcome of [`TtsEngine::preload`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreloadReport {
    /// Keys now in the cache, in request order
    pub loaded: Vec<ModelKey>,
    /// Keys that failed, in request order
    pub failed: Vec<PreloadFailure>,
    /// Cache size after the batch
    pub total_cached: usize,
}

/// Engine liveness summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Always `healthy` for a constructed engine
    pub status: String,
    /// Device models run on
    pub device: ComputeDevice,
    /// Number of cached models
    pub models_loaded: usize,
}

/// Locally available models
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCatalog {
    /// Language to available genders
    pub languages: BTreeMap<String, BTreeSet<Gender>>,
    /// Total number of (language, gender) pairs
    pub count: usize,
}

/// Text-to-speech engine
#[derive(Debug)]
pub struct TtsEngine {
    config: EngineConfig,
    device: ComputeDevice,
    registry: Arc<ModelRegistry>,
    pipeline: SynthesisPipeline,
}

impl TtsEngine {
    /// Create an engine, connecting to `config.remote_store` when set
    ///
    /// Models listed in `config.preload_models` are loaded before returning;
    /// preload failures are logged and do not fail construction.
    ///
    /// # Errors
    ///
    /// `ConfigurationError` if the configuration is invalid.
    pub async fn new(config: EngineConfig, backend: Arc<dyn ModelBackend>) -> VaniResult<Self> {
        config.validate()?;
        let store = ArtifactStore::connect(config.models_dir.clone(), config.remote_store.as_deref());
        Self::build(config, backend, store).await
    }

    /// Create an engine backed by an already constructed remote store
    ///
    /// `config.remote_store` is ignored.
    ///
    /// # Errors
    ///
    /// `ConfigurationError` if the configuration is invalid.
    pub async fn with_store(
        config: EngineConfig,
        backend: Arc<dyn ModelBackend>,
        remote: Arc<dyn ObjectStore>,
        base: ObjectPath,
    ) -> VaniResult<Self> {
        config.validate()?;
        let store = ArtifactStore::new(config.models_dir.clone()).with_remote(remote, base);
        Self::build(config, backend, store).await
    }

    async fn build(config: EngineConfig, backend: Arc<dyn ModelBackend>, store: ArtifactStore) -> VaniResult<Self> {
        let device = backend.select_device(config.device);
        if device != config.device {
            warn!("Requested device {} not available, using {}", config.device, device);
        }
        info!(
            "Creating TTS engine: models_dir={:?}, remote={}, device={}, workers={}",
            config.models_dir,
            store.has_remote(),
            device,
            config.max_workers
        );

        let registry = Arc::new(ModelRegistry::new(Arc::new(store), backend, device));
        let pipeline = SynthesisPipeline::new(
            Arc::clone(&registry),
            config.sample_rate,
            config.max_text_length,
            config.max_workers,
        );

        let engine = Self {
            config,
            device,
            registry,
            pipeline,
        };

        if !engine.config.preload_models.is_empty() {
            info!("Preloading {} models", engine.config.preload_models.len());
            let keys = engine.config.preload_models.clone();
            let report = engine.preload(&keys).await;
            if !report.failed.is_empty() {
                warn!(
                    "{} of {} startup models failed to preload",
                    report.failed.len(),
                    keys.len()
                );
            }
        }

        Ok(engine)
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Device models run on
    pub fn device(&self) -> ComputeDevice {
        self.device
    }

    /// Output sample rate
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    /// Model registry
    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Liveness summary
    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "healthy".to_string(),
            device: self.device,
            models_loaded: self.registry.len(),
        }
    }

    /// Models whose artifacts are complete on local disk
    pub fn available_models(&self) -> ModelCatalog {
        let languages = self.registry.store().list_available();
        let count = languages.values().map(BTreeSet::len).sum();
        ModelCatalog { languages, count }
    }

    /// Synthesize a request to 16-bit PCM at [`Self::sample_rate`]
    ///
    /// # Errors
    ///
    /// `InvalidInput` for bad requests; otherwise whatever
    /// [`SynthesisPipeline::synthesize`] returns.
    pub async fn synthesize(&self, request: &SynthesisRequest) -> VaniResult<Vec<i16>> {
        let key = request.validate()?;
        info!(
            "Synthesis request: {}, text_length={}, speed={}",
            key,
            request.text.chars().count(),
            request.speed
        );

        let audio = self
            .pipeline
            .synthesize(&request.text, &key, request.speed)
            .await
            .inspect_err(|e| {
                if e.is_user_error() {
                    warn!("Rejected synthesis request for {}: {}", key, e);
                } else {
                    error!("Synthesis failed for {}: {}", key, e);
                }
            })?;

        info!("Synthesis successful: {} samples generated", audio.len());
        Ok(audio)
    }

    /// Synthesize a request to an in-memory WAV file
    ///
    /// # Errors
    ///
    /// As [`Self::synthesize`], plus encoding failures.
    pub async fn synthesize_wav(&self, request: &SynthesisRequest) -> VaniResult<Vec<u8>> {
        let audio = self.synthesize(request).await?;
        encode_wav(&audio, self.config.sample_rate)
    }

    /// Load each key, isolating failures per key
    pub async fn preload(&self, keys: &[ModelKey]) -> PreloadReport {
        let mut report = PreloadReport::default();

        for key in keys {
            match self.registry.load(key).await {
                Ok(_) => {
                    info!("Preloaded: {}", key);
                    report.loaded.push(key.clone());
                }
                Err(e) => {
                    error!("Failed to preload {}: {}", key, e);
                    report.failed.push(PreloadFailure {
                        key: key.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        report.total_cached = self.registry.len();
        debug!(
            "Preload finished: {} loaded, {} failed, {} cached",
            report.loaded.len(),
            report.failed.len(),
            report.total_cached
        );
        report
    }
}
