//! # Vani Core
//!
//! Orchestration core for a two-stage neural text-to-speech service.
//!
//! ## Features
//!
//! - Per-(language, gender) model artifacts cached on local disk, fetched on
//!   demand from a remote object store with a shared vocoder fallback
//! - Single-flight model loading with an in-memory registry
//! - `<alpha=..>` speed and `<sil=..>` silence tags
//! - Bounded parallel chunk synthesis that preserves chunk order
//!
//! The acoustic model, vocoder and text preprocessors are supplied by a
//! [`ModelBackend`] implementation.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vani_core::{EngineConfig, Gender, ModelBackend, SynthesisRequest, TtsEngine};
//!
//! async fn run(backend: Arc<dyn ModelBackend>) -> anyhow::Result<()> {
//!     let engine = TtsEngine::new(EngineConfig::from_env()?, backend).await?;
//!     let request = SynthesisRequest::new("नमस्ते <sil=300ms> दुनिया", "hindi", Gender::Female);
//!     let wav = engine.synthesize_wav(&request).await?;
//!     std::fs::write("out.wav", wav)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod model;
pub mod models;
pub mod pipeline;
pub mod segmenter;
pub mod tts_engine;
pub mod wav_writer;

// Re-export main types for convenience
pub use config::EngineConfig;
pub use error::{VaniError, VaniResult};
pub use model::{ArtifactStore, ComputeDevice, Gender, ModelKey, Provenance};
pub use models::{AcousticModel, LoadedModel, MelFrames, ModelBackend, ModelRegistry, TextPreprocessor, Vocoder};
pub use pipeline::SynthesisPipeline;
pub use segmenter::{segment, ChunkKind, TextChunk};
pub use tts_engine::{HealthStatus, ModelCatalog, PreloadFailure, PreloadReport, SynthesisRequest, TtsEngine};
pub use wav_writer::encode_wav;

/// Version information for the vani-core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default output sample rate (22.05 kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 22_050;

/// Default maximum text length per request, in characters
pub const MAX_TEXT_LENGTH: usize = 5000;

/// Scale from nominal `[-1.0, 1.0]` float audio to 16-bit PCM
pub const MAX_WAV_VALUE: f32 = 32_768.0;
