//! Model artifacts on disk: identity types, manifests, locks and the
//! remote-backed artifact store

/// Keyed async locks
pub mod locks;
/// Required file sets for models and vocoders
pub mod manifest;
/// Artifact store with remote downloads
pub mod store;
/// Model identity types
pub mod types;

pub use locks::KeyedLocks;
pub use manifest::{ArtifactKind, FALLBACK_VOCODER_GROUP};
pub use store::{
    remote_from_url, AcousticArtifacts, ArtifactStore, DownloadKey, Provenance, VocoderArtifacts,
    VocoderLocation,
};
pub use types::{validate_language, ComputeDevice, Gender, ModelKey};
