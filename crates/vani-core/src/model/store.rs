// ArtifactStore: local model/vocoder files backed by a remote object store
// Downloads run under a per-(kind, language, gender) lock with a re-check after acquiring it;
// the shared group vocoder has its own lock and files land via rename

use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::TryStreamExt;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectMeta, ObjectStore};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::locks::KeyedLocks;
use super::manifest::{
    ArtifactKind, ENERGY_STATS, FALLBACK_VOCODER_GROUP, FEATURE_STATS, MODEL_CONFIG, MODEL_DIR,
    MODEL_WEIGHTS, PITCH_STATS, VOCODER_CONFIG, VOCODER_DIR, VOCODER_GENERATOR,
};
use super::types::{Gender, ModelKey};
use crate::error::{VaniError, VaniResult};

/// Where a usable artifact came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Already present on local storage
    Local,
    /// Downloaded from the language-specific remote prefix
    Downloaded,
    /// Downloaded from the fallback group prefix (vocoders only)
    DownloadedFallback,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("exists locally"),
            Self::Downloaded => f.write_str("downloaded from remote store"),
            Self::DownloadedFallback => write!(
                f,
                "downloaded from remote store ({FALLBACK_VOCODER_GROUP} group)"
            ),
        }
    }
}

/// Lock identity for one download
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DownloadKey {
    /// Artifact being downloaded
    pub kind: ArtifactKind,
    /// Language and gender it belongs to
    pub key: ModelKey,
}

/// Resolved local paths of a validated acoustic model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcousticArtifacts {
    /// Model directory
    pub dir: PathBuf,
    /// `config.yaml`
    pub config: PathBuf,
    /// `model.pth`
    pub weights: PathBuf,
    /// `feats_stats.npz`
    pub feature_stats: PathBuf,
    /// `pitch_stats.npz`
    pub pitch_stats: PathBuf,
    /// `energy_stats.npz`
    pub energy_stats: PathBuf,
}

/// Resolved local paths of a validated vocoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VocoderArtifacts {
    /// Vocoder directory
    pub dir: PathBuf,
    /// `config.json`
    pub config: PathBuf,
    /// `generator`
    pub generator: PathBuf,
    /// Whether the fallback group vocoder was selected
    pub fallback: bool,
}

/// Result of vocoder path resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VocoderLocation {
    /// Directory to load from, or the canonical download target when absent
    pub dir: PathBuf,
    /// Whether the vocoder manifest is satisfied at `dir`
    pub present: bool,
    /// Whether `dir` is the fallback group directory
    pub fallback: bool,
}

#[derive(Debug, Clone)]
struct RemoteStore {
    store: Arc<dyn ObjectStore>,
    base: ObjectPath,
}

impl RemoteStore {
    fn prefix<'a>(&self, parts: impl IntoIterator<Item = &'a str>) -> ObjectPath {
        parts
            .into_iter()
            .fold(self.base.clone(), |path, part| path.child(part))
    }
}

/// Build an object store from a URL such as `gs://bucket/prefix`
///
/// A bare bucket name (optionally `gs://`-less) is treated as a GCS bucket.
/// Credentials are taken from the environment.
pub fn remote_from_url(location: &str) -> VaniResult<(Arc<dyn ObjectStore>, ObjectPath)> {
    let location = location.trim();
    let with_scheme = if location.contains("://") {
        location.to_string()
    } else {
        format!("gs://{}", location.trim_matches('/'))
    };

    let url = url::Url::parse(&with_scheme).map_err(|e| {
        VaniError::configuration(format!("Invalid remote store URL '{with_scheme}': {e}"))
    })?;

    let options = std::env::vars().map(|(key, value)| (key.to_ascii_lowercase(), value));
    let (store, base) = object_store::parse_url_opts(&url, options).map_err(|e| {
        VaniError::configuration(format!("Unsupported remote store '{with_scheme}': {e}"))
    })?;

    Ok((Arc::from(store), base))
}

/// Local artifact cache with optional remote backing
#[derive(Debug)]
pub struct ArtifactStore {
    models_dir: PathBuf,
    remote: Option<RemoteStore>,
    locks: KeyedLocks<DownloadKey>,
}

impl ArtifactStore {
    /// Create a local-only store rooted at `models_dir`
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        let models_dir = models_dir.into();
        if let Err(e) = std::fs::create_dir_all(&models_dir) {
            warn!("Failed to create models directory {:?}: {}", models_dir, e);
        }

        Self {
            models_dir,
            remote: None,
            locks: KeyedLocks::new(),
        }
    }

    /// Create a store, connecting to `remote` when given
    ///
    /// A remote that cannot be set up is logged and the store runs local-only.
    pub fn connect(models_dir: impl Into<PathBuf>, remote: Option<&str>) -> Self {
        let store = Self::new(models_dir);
        match remote.map(remote_from_url) {
            None => store,
            Some(Ok((remote, base))) => {
                info!("Connected to remote store: {} (base prefix '{}')", remote, base);
                store.with_remote(remote, base)
            }
            Some(Err(e)) => {
                warn!("Failed to connect to remote store: {}. Using local models only.", e);
                store
            }
        }
    }

    /// Attach a remote object store; artifacts live under `base`
    #[must_use]
    pub fn with_remote(mut self, store: Arc<dyn ObjectStore>, base: ObjectPath) -> Self {
        self.remote = Some(RemoteStore { store, base });
        self
    }

    /// Local model root
    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Whether a remote store is configured
    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// `<root>/<language>/<gender>/model`
    pub fn model_dir(&self, key: &ModelKey) -> PathBuf {
        self.models_dir
            .join(&key.language)
            .join(key.gender.as_str())
            .join(MODEL_DIR)
    }

    /// `<root>/vocoder/<gender>/<group>`
    fn vocoder_dir(&self, gender: Gender, group: &str) -> PathBuf {
        self.models_dir
            .join(VOCODER_DIR)
            .join(gender.as_str())
            .join(group)
    }

    /// Whether the acoustic model manifest is satisfied locally
    pub fn model_exists_locally(&self, key: &ModelKey) -> bool {
        ArtifactKind::Model.is_complete(&self.model_dir(key))
    }

    /// Whether a usable vocoder (exact or fallback) exists locally
    pub fn vocoder_exists_locally(&self, key: &ModelKey) -> bool {
        self.vocoder_location(key).present
    }

    /// Resolve the vocoder directory: language first, then the fallback group
    pub fn vocoder_location(&self, key: &ModelKey) -> VocoderLocation {
        let exact = self.vocoder_dir(key.gender, &key.language);
        if ArtifactKind::Vocoder.is_complete(&exact) {
            return VocoderLocation {
                dir: exact,
                present: true,
                fallback: false,
            };
        }

        let group = self.vocoder_dir(key.gender, FALLBACK_VOCODER_GROUP);
        if ArtifactKind::Vocoder.is_complete(&group) {
            return VocoderLocation {
                dir: group,
                present: true,
                fallback: true,
            };
        }

        VocoderLocation {
            dir: exact,
            present: false,
            fallback: false,
        }
    }

    /// Paths of the acoustic model files for `key`
    pub fn model_artifacts(&self, key: &ModelKey) -> AcousticArtifacts {
        let dir = self.model_dir(key);
        AcousticArtifacts {
            config: dir.join(MODEL_CONFIG),
            weights: dir.join(MODEL_WEIGHTS),
            feature_stats: dir.join(FEATURE_STATS),
            pitch_stats: dir.join(PITCH_STATS),
            energy_stats: dir.join(ENERGY_STATS),
            dir,
        }
    }

    /// Paths of the resolved vocoder files for `key`
    ///
    /// # Errors
    ///
    /// Returns `ArtifactUnavailable` when neither the language nor the
    /// fallback vocoder is present.
    pub fn vocoder_artifacts(&self, key: &ModelKey) -> VaniResult<VocoderArtifacts> {
        let location = self.vocoder_location(key);
        if !location.present {
            return Err(VaniError::artifact_unavailable(format!(
                "Vocoder for {key} not found at {:?}",
                location.dir
            )));
        }

        Ok(VocoderArtifacts {
            config: location.dir.join(VOCODER_CONFIG),
            generator: location.dir.join(VOCODER_GENERATOR),
            fallback: location.fallback,
            dir: location.dir,
        })
    }

    /// Ensure acoustic model files are available locally, downloading if needed
    ///
    /// # Errors
    ///
    /// `InvalidInput` for a language that is not a plain directory name,
    /// `ArtifactUnavailable` when nothing is local and no remote is configured
    /// or the remote prefix is empty, `TransferFailure` on remote or copy
    /// failures, `ManifestIncomplete` when the download left files missing.
    pub async fn ensure_model(&self, key: &ModelKey) -> VaniResult<Provenance> {
        key.validate()?;
        if self.model_exists_locally(key) {
            debug!("Model {} already exists locally", key);
            return Ok(Provenance::Local);
        }

        let Some(remote) = &self.remote else {
            return Err(VaniError::artifact_unavailable(format!(
                "Model {key} not found locally and remote store not configured"
            )));
        };

        let download = DownloadKey {
            kind: ArtifactKind::Model,
            key: key.clone(),
        };
        self.locked(&download, self.download_model(remote, key)).await
    }

    async fn download_model(&self, remote: &RemoteStore, key: &ModelKey) -> VaniResult<Provenance> {
        // Another caller may have finished the download while we waited
        if self.model_exists_locally(key) {
            debug!("Model {} appeared locally while waiting for download lock", key);
            return Ok(Provenance::Local);
        }

        info!("Downloading model {} from remote store...", key);
        let prefix = remote.prefix([key.language.as_str(), key.gender.as_str(), MODEL_DIR]);
        self.fetch(remote, ArtifactKind::Model, &prefix, &self.model_dir(key))
            .await?;

        Ok(Provenance::Downloaded)
    }

    /// Ensure vocoder files are available locally, downloading if needed
    ///
    /// The language prefix is tried first; if it does not produce a complete
    /// manifest the fallback group prefix is tried. The group download holds
    /// its own lock, shared by every language that falls back to it.
    ///
    /// # Errors
    ///
    /// Same kinds as [`ArtifactStore::ensure_model`]; when both stages fail the
    /// error carries both details.
    pub async fn ensure_vocoder(&self, key: &ModelKey) -> VaniResult<Provenance> {
        key.validate()?;
        if self.vocoder_exists_locally(key) {
            debug!("Vocoder for {} already exists locally", key);
            return Ok(Provenance::Local);
        }

        let Some(remote) = &self.remote else {
            return Err(VaniError::artifact_unavailable(format!(
                "Vocoder for {key} not found locally and remote store not configured"
            )));
        };

        let download = DownloadKey {
            kind: ArtifactKind::Vocoder,
            key: key.clone(),
        };
        self.locked(&download, self.download_vocoder(remote, key)).await
    }

    async fn download_vocoder(&self, remote: &RemoteStore, key: &ModelKey) -> VaniResult<Provenance> {
        if self.vocoder_exists_locally(key) {
            debug!("Vocoder for {} appeared locally while waiting for download lock", key);
            return Ok(Provenance::Local);
        }

        info!("Downloading vocoder {} from remote store...", key);
        let exact_prefix = remote.prefix([VOCODER_DIR, key.gender.as_str(), key.language.as_str()]);
        let exact_err = match self
            .fetch(
                remote,
                ArtifactKind::Vocoder,
                &exact_prefix,
                &self.vocoder_dir(key.gender, &key.language),
            )
            .await
        {
            Ok(()) => return Ok(Provenance::Downloaded),
            Err(e) => e,
        };

        // The group's own language prefix is the group prefix
        if key.language == FALLBACK_VOCODER_GROUP {
            return Err(exact_err);
        }

        info!(
            "Trying {} group vocoder for {} ({})",
            FALLBACK_VOCODER_GROUP, key, exact_err
        );
        let group = DownloadKey {
            kind: ArtifactKind::Vocoder,
            key: ModelKey::new(FALLBACK_VOCODER_GROUP, key.gender),
        };
        match self
            .locked(&group, self.download_group_vocoder(remote, key.gender))
            .await
        {
            Ok(provenance) => Ok(provenance),
            Err(group_err) => {
                let message = format!(
                    "Failed to obtain vocoder for {key}: {}; {} group: {}",
                    exact_err.detail(),
                    FALLBACK_VOCODER_GROUP,
                    group_err.detail()
                );
                Err(match group_err {
                    VaniError::TransferFailure { .. } => VaniError::transfer(message),
                    VaniError::ManifestIncomplete { .. } => {
                        VaniError::manifest_incomplete(message)
                    }
                    _ => VaniError::artifact_unavailable(message),
                })
            }
        }
    }

    async fn download_group_vocoder(&self, remote: &RemoteStore, gender: Gender) -> VaniResult<Provenance> {
        let dir = self.vocoder_dir(gender, FALLBACK_VOCODER_GROUP);
        if ArtifactKind::Vocoder.is_complete(&dir) {
            debug!(
                "{} group vocoder for {} appeared locally while waiting for download lock",
                FALLBACK_VOCODER_GROUP, gender
            );
            return Ok(Provenance::Local);
        }

        let prefix = remote.prefix([VOCODER_DIR, gender.as_str(), FALLBACK_VOCODER_GROUP]);
        self.fetch(remote, ArtifactKind::Vocoder, &prefix, &dir).await?;
        Ok(Provenance::DownloadedFallback)
    }

    /// Run `work` under the download lock for `download`
    ///
    /// The lock entry is released again when the work fails and nobody else
    /// is waiting on it.
    async fn locked<T>(
        &self,
        download: &DownloadKey,
        work: impl Future<Output = VaniResult<T>>,
    ) -> VaniResult<T> {
        let lock = self.locks.lock_for(download);
        let result = {
            let _guard = lock.lock().await;
            work.await
        };
        drop(lock);

        if result.is_err() {
            self.locks.release_idle(download);
        }
        result
    }

    /// Number of download locks currently held in the lock table
    pub fn download_lock_count(&self) -> usize {
        self.locks.len()
    }

    /// List locally available (language, gender) pairs with a complete model manifest
    pub fn list_available(&self) -> BTreeMap<String, BTreeSet<Gender>> {
        let mut available = BTreeMap::new();

        let Ok(languages) = std::fs::read_dir(&self.models_dir) else {
            return available;
        };

        for entry in languages.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(language) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if language == VOCODER_DIR {
                continue;
            }
            let Ok(gender_dirs) = std::fs::read_dir(&path) else {
                warn!("Cannot read language directory {:?}", path);
                continue;
            };

            let genders: BTreeSet<Gender> = gender_dirs
                .flatten()
                .filter(|dir| dir.path().is_dir())
                .filter_map(|dir| dir.file_name().to_str()?.parse::<Gender>().ok())
                .filter(|gender| self.model_exists_locally(&ModelKey::new(language.clone(), *gender)))
                .collect();

            if !genders.is_empty() {
                available.insert(language, genders);
            }
        }

        available
    }

    /// Download `prefix` into `local_dir` and validate the manifest
    async fn fetch(
        &self,
        remote: &RemoteStore,
        kind: ArtifactKind,
        prefix: &ObjectPath,
        local_dir: &Path,
    ) -> VaniResult<()> {
        download_prefix(remote, prefix, local_dir).await?;

        let missing = kind.missing_files(local_dir);
        if !missing.is_empty() {
            warn!(
                "Downloaded {} into {:?} but required files are missing: {:?}",
                kind, local_dir, missing
            );
            return Err(VaniError::manifest_incomplete(format!(
                "Download completed but required files missing from {local_dir:?}: {}",
                missing.join(", ")
            )));
        }

        info!("Successfully downloaded {} to {:?}", kind, local_dir);
        Ok(())
    }
}

/// Copy every object under `prefix` into `local_dir`, returning the file count
async fn download_prefix(
    remote: &RemoteStore,
    prefix: &ObjectPath,
    local_dir: &Path,
) -> VaniResult<usize> {
    let objects: Vec<_> = remote
        .store
        .list(Some(prefix))
        .try_collect()
        .await
        .map_err(|e| VaniError::transfer(format!("Failed to list '{prefix}': {e}")))?;

    if objects.is_empty() {
        warn!("No files found in remote store with prefix: {}", prefix);
        return Err(VaniError::artifact_unavailable(format!(
            "No files found in remote store with prefix '{prefix}'"
        )));
    }

    info!(
        "Downloading {} files from {}/{}",
        objects.len(),
        remote.store,
        prefix
    );

    let mut copied = 0;
    for meta in &objects {
        if is_directory_marker(meta, &objects) {
            debug!("Skipping directory marker {}", meta.location);
            continue;
        }
        let Some(relative) = relative_path(prefix, &meta.location) else {
            continue;
        };
        let dest = local_dir.join(relative);
        debug!("Downloading {} -> {:?}", meta.location, dest);
        copy_object(remote.store.as_ref(), &meta.location, &dest).await?;
        copied += 1;
    }

    Ok(copied)
}

/// Empty object whose location is a parent of another listed object
///
/// Stores that emulate folders list `dir/` as a zero-byte object; the
/// trailing delimiter is gone once the location is parsed.
fn is_directory_marker(meta: &ObjectMeta, objects: &[ObjectMeta]) -> bool {
    meta.size == 0
        && objects
            .iter()
            .any(|other| other.location != meta.location && other.location.prefix_matches(&meta.location))
}

/// Path of `location` below `prefix`; `None` for the prefix itself and foreign locations
fn relative_path(prefix: &ObjectPath, location: &ObjectPath) -> Option<PathBuf> {
    let relative: PathBuf = location
        .prefix_match(prefix)?
        .map(|part| part.as_ref().to_string())
        .collect();

    if relative.as_os_str().is_empty() {
        None
    } else {
        Some(relative)
    }
}

/// Stream one object into `dest`, which only appears once fully written
async fn copy_object(store: &dyn ObjectStore, location: &ObjectPath, dest: &Path) -> VaniResult<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| VaniError::transfer(format!("Failed to create {parent:?}: {e}")))?;
    }

    let partial = partial_path(dest);
    if let Err(e) = stream_to_file(store, location, &partial).await {
        if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
            debug!("Could not remove {:?}: {}", partial, cleanup);
        }
        return Err(e);
    }

    tokio::fs::rename(&partial, dest)
        .await
        .map_err(|e| VaniError::transfer(format!("Failed to move {partial:?} to {dest:?}: {e}")))
}

async fn stream_to_file(store: &dyn ObjectStore, location: &ObjectPath, path: &Path) -> VaniResult<()> {
    let write_err =
        |e: std::io::Error| VaniError::transfer(format!("Failed to write {path:?}: {e}"));

    let mut body = store.get(location).await?.into_stream();
    let mut file = tokio::fs::File::create(path).await.map_err(write_err)?;
    while let Some(chunk) = body.try_next().await? {
        file.write_all(&chunk).await.map_err(write_err)?;
    }
    file.flush().await.map_err(write_err)?;

    Ok(())
}

/// Hidden sibling `.<name>.partial` a download is written to before the rename
fn partial_path(dest: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    if let Some(file_name) = dest.file_name() {
        name.push(file_name);
    }
    name.push(".partial");
    dest.with_file_name(name)
}
