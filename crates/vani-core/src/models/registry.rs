//! In-memory cache of loaded models keyed by (language, gender)

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::{LoadedModel, ModelBackend, PreprocessorKind};
use crate::error::{VaniError, VaniResult};
use crate::model::{ArtifactStore, ComputeDevice, KeyedLocks, ModelKey};

/// Registry of loaded models
///
/// Every miss goes through a per-key load lock covering the whole
/// check-cache, ensure-artifacts, build-handles, insert sequence, so at most
/// one load per key runs at a time and a failed load leaves no entry behind.
/// Cache entries are never evicted: memory grows with the number of distinct
/// loaded keys. Load locks of failed keys are pruned once no caller is
/// waiting on them.
#[derive(Debug)]
pub struct ModelRegistry {
    store: Arc<ArtifactStore>,
    backend: Arc<dyn ModelBackend>,
    device: ComputeDevice,
    cache: RwLock<HashMap<ModelKey, Arc<LoadedModel>>>,
    load_locks: KeyedLocks<ModelKey>,
}

impl ModelRegistry {
    /// Create an empty registry
    pub fn new(store: Arc<ArtifactStore>, backend: Arc<dyn ModelBackend>, device: ComputeDevice) -> Self {
        Self {
            store,
            backend,
            device,
            cache: RwLock::new(HashMap::new()),
            load_locks: KeyedLocks::new(),
        }
    }

    /// Artifact store backing this registry
    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Device handles are built for
    pub fn device(&self) -> ComputeDevice {
        self.device
    }

    /// Cached model for `key`, if loaded
    pub fn get(&self, key: &ModelKey) -> Option<Arc<LoadedModel>> {
        self.cache.read().get(key).cloned()
    }

    /// Load or retrieve the cached model for `key`
    ///
    /// # Errors
    ///
    /// Artifact errors from [`ArtifactStore::ensure_model`] and
    /// [`ArtifactStore::ensure_vocoder`] are returned unchanged; handle
    /// construction failures become `ModelError`. The cache is untouched on error.
    /// Keys whose language is not a plain directory name are `InvalidInput`.
    pub async fn load(&self, key: &ModelKey) -> VaniResult<Arc<LoadedModel>> {
        if let Some(model) = self.get(key) {
            debug!("Using cached model: {}", key);
            return Ok(model);
        }
        key.validate()?;

        let lock = self.load_locks.lock_for(key);
        let result = {
            let _guard = lock.lock().await;
            self.load_locked(key).await
        };
        drop(lock);

        if result.is_err() && self.load_locks.release_idle(key) {
            debug!("Released load lock for {}", key);
        }
        result
    }

    async fn load_locked(&self, key: &ModelKey) -> VaniResult<Arc<LoadedModel>> {
        if let Some(model) = self.get(key) {
            debug!("Model {} was loaded while waiting for load lock", key);
            return Ok(model);
        }

        info!("Loading model: {}", key);

        let model_source = self.store.ensure_model(key).await.inspect_err(|e| {
            warn!("Model not available for {}: {}", key, e);
        })?;
        let vocoder_source = self.store.ensure_vocoder(key).await.inspect_err(|e| {
            warn!("Vocoder not available for {}: {}", key, e);
        })?;
        debug!(
            "Artifacts ready for {}: model {}, vocoder {}",
            key, model_source, vocoder_source
        );

        let acoustic_artifacts = self.store.model_artifacts(key);
        let vocoder_artifacts = self.store.vocoder_artifacts(key)?;
        let vocoder_fallback = vocoder_artifacts.fallback;

        let backend = Arc::clone(&self.backend);
        let device = self.device;
        let load_key = key.clone();
        let (acoustic, vocoder) = tokio::task::spawn_blocking(move || {
            let acoustic = backend
                .load_acoustic(&load_key, &acoustic_artifacts, device)
                .map_err(|e| {
                    VaniError::model(format!(
                        "Failed to load acoustic model from {:?}: {e:#}",
                        acoustic_artifacts.dir
                    ))
                })?;
            info!("Loaded acoustic model: {:?}", acoustic_artifacts.dir);

            let vocoder = backend
                .load_vocoder(&load_key, &vocoder_artifacts, device)
                .map_err(|e| {
                    VaniError::model(format!(
                        "Failed to load vocoder from {:?}: {e:#}",
                        vocoder_artifacts.dir
                    ))
                })?;
            info!("Loaded vocoder: {:?}", vocoder_artifacts.dir);

            Ok::<_, VaniError>((acoustic, vocoder))
        })
        .await??;

        let kind = PreprocessorKind::for_language(&key.language);
        let model = Arc::new(LoadedModel::new(
            key.clone(),
            acoustic,
            vocoder,
            self.backend.preprocessor(kind),
            kind,
            vocoder_fallback,
        ));

        self.cache.write().insert(key.clone(), Arc::clone(&model));

        info!(
            "Model loaded and cached: {} (preprocessor: {}, fallback vocoder: {})",
            key, kind, vocoder_fallback
        );
        Ok(model)
    }

    /// Number of cached models
    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    /// Whether nothing has been loaded yet
    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }

    /// Whether `key` is cached
    pub fn contains(&self, key: &ModelKey) -> bool {
        self.cache.read().contains_key(key)
    }

    /// Number of per-key load locks currently held in the lock table
    pub fn load_lock_count(&self) -> usize {
        self.load_locks.len()
    }

    /// Cached keys, sorted
    pub fn cached_keys(&self) -> Vec<ModelKey> {
        let mut keys: Vec<_> = self.cache.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}
