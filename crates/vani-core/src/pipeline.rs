//! Ordered parallel synthesis of segmented text
//!
//! A request is validated, segmented, planned and resolved to a
//! [`LoadedModel`]. Speech chunks are then rendered on a bounded rayon pool;
//! silence never reaches the pool and is zero-filled while the rendered
//! chunks are reassembled in chunk order, no matter which worker finished
//! first.

use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{VaniError, VaniResult};
use crate::model::ModelKey;
use crate::models::{LoadedModel, ModelRegistry};
use crate::segmenter::{segment, ChunkKind, TextChunk};
use crate::MAX_WAV_VALUE;

/// Length of the silence returned when a request yields no audio at all
pub const EMPTY_AUDIO_SECONDS: f32 = 0.5;

/// Longest total silence all `<sil=..>` tags of one request may insert
pub const MAX_TOTAL_SILENCE_SECONDS: f32 = 300.0;

/// Number of samples in `seconds` of audio at `sample_rate`, rounded
pub fn silence_samples(seconds: f32, sample_rate: u32) -> usize {
    (f64::from(seconds) * f64::from(sample_rate)).round() as usize
}

/// Scale nominal `[-1.0, 1.0]` vocoder output to 16-bit PCM, saturating
pub fn to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s * MAX_WAV_VALUE).clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16)
        .collect()
}

/// Planned output piece, in chunk order
#[derive(Debug)]
enum Job {
    Silence { samples: usize },
    Speech(SpeechJob),
}

/// Unit of work handed to the worker pool
#[derive(Debug)]
struct SpeechJob {
    text: String,
    speed: f32,
    order: usize,
}

fn render_speech(model: &LoadedModel, job: &SpeechJob) -> VaniResult<Vec<i16>> {
    let order = job.order;
    let key = model.key();
    let tokens = model
        .preprocessor()
        .preprocess(&job.text, &key.language, key.gender)
        .map_err(|e| VaniError::synthesis(format!("Preprocessing failed for chunk {order}: {e:#}")))?;

    let input = tokens.join(" ");
    if input.trim().is_empty() {
        debug!("Chunk {} normalized to nothing, skipping", order);
        return Ok(Vec::new());
    }

    let mel = model
        .acoustic()
        .synthesize(&input, job.speed)
        .map_err(|e| VaniError::synthesis(format!("Acoustic model failed on chunk {order}: {e:#}")))?;
    let waveform = model
        .vocoder()
        .vocode(&mel)
        .map_err(|e| VaniError::synthesis(format!("Vocoder failed on chunk {order}: {e:#}")))?;

    debug!(
        "Chunk {} rendered: {} frames, {} samples",
        order,
        mel.len(),
        waveform.len()
    );
    Ok(to_pcm16(&waveform))
}

/// Synthesizes full requests against a [`ModelRegistry`]
#[derive(Debug, Clone)]
pub struct SynthesisPipeline {
    registry: Arc<ModelRegistry>,
    sample_rate: u32,
    max_text_length: usize,
    max_workers: usize,
}

impl SynthesisPipeline {
    /// Create a pipeline; `max_workers` is raised to at least one
    pub fn new(registry: Arc<ModelRegistry>, sample_rate: u32, max_text_length: usize, max_workers: usize) -> Self {
        Self {
            registry,
            sample_rate,
            max_text_length,
            max_workers: max_workers.max(1),
        }
    }

    /// Registry models are resolved through
    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Output sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Longest accepted input, in characters
    pub fn max_text_length(&self) -> usize {
        self.max_text_length
    }

    /// Worker pool size
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Synthesize `text` with the model for `key`
    ///
    /// Returns the concatenation of every chunk's samples in chunk order, or
    /// half a second of silence when nothing produced audio.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for oversized text, a bad speed, malformed tags or
    ///   more than [`MAX_TOTAL_SILENCE_SECONDS`] of tagged silence, raised
    ///   before any model is loaded
    /// - artifact and model errors from [`ModelRegistry::load`], unchanged
    /// - `SynthesisError` when any chunk fails; no partial audio is returned
    pub async fn synthesize(&self, text: &str, key: &ModelKey, default_speed: f32) -> VaniResult<Vec<i16>> {
        let length = text.chars().count();
        if length > self.max_text_length {
            return Err(VaniError::invalid_input(format!(
                "Text too long: {length} characters (maximum {})",
                self.max_text_length
            )));
        }

        let chunks = segment(text, default_speed)?;
        let jobs = self.plan(&chunks)?;
        let model = self.registry.load(key).await?;

        let speech_jobs = jobs.iter().filter(|j| matches!(j, Job::Speech(_))).count();
        debug!(
            "Synthesizing {} chunks ({} speech) for {} on {} workers",
            chunks.len(),
            speech_jobs,
            key,
            self.max_workers
        );

        let start = Instant::now();
        let workers = self.max_workers;
        let mut audio = tokio::task::spawn_blocking(move || render_all(&model, &jobs, workers)).await??;

        if audio.is_empty() {
            debug!("No audio produced for {}, returning silence", key);
            audio = vec![0; silence_samples(EMPTY_AUDIO_SECONDS, self.sample_rate)];
        }

        info!(
            "Synthesized {:.2}s of audio for {} in {:.2?}",
            audio.len() as f64 / f64::from(self.sample_rate),
            key,
            start.elapsed()
        );
        Ok(audio)
    }

    /// Turn chunks into jobs, bounding the total silence before anything is allocated
    fn plan(&self, chunks: &[TextChunk]) -> VaniResult<Vec<Job>> {
        let max_silence = silence_samples(MAX_TOTAL_SILENCE_SECONDS, self.sample_rate);
        let mut total_silence = 0usize;
        let mut jobs = Vec::with_capacity(chunks.len());

        for chunk in chunks {
            match chunk.kind {
                ChunkKind::Silence { seconds } => {
                    let samples = silence_samples(seconds, self.sample_rate);
                    total_silence = total_silence.saturating_add(samples);
                    if total_silence > max_silence {
                        return Err(VaniError::invalid_input(format!(
                            "Silence tags add up to more than {MAX_TOTAL_SILENCE_SECONDS}s"
                        )));
                    }
                    jobs.push(Job::Silence { samples });
                }
                ChunkKind::Speech if chunk.text.trim().is_empty() => {}
                ChunkKind::Speech => jobs.push(Job::Speech(SpeechJob {
                    text: chunk.text.clone(),
                    speed: chunk.speed,
                    order: chunk.order,
                })),
            }
        }

        Ok(jobs)
    }
}

/// Render speech jobs on a pool of `workers` threads and splice in silence, keeping job order
fn render_all(model: &LoadedModel, jobs: &[Job], workers: usize) -> VaniResult<Vec<i16>> {
    let speech: Vec<&SpeechJob> = jobs
        .iter()
        .filter_map(|job| match job {
            Job::Speech(speech) => Some(speech),
            Job::Silence { .. } => None,
        })
        .collect();

    let rendered: Vec<Vec<i16>> = if speech.is_empty() {
        Vec::new()
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("vani-synth-{i}"))
            .build()
            .map_err(|e| VaniError::concurrency(format!("Failed to build synthesis worker pool: {e}")))?;
        pool.install(|| speech.par_iter().map(|job| render_speech(model, job)).collect::<VaniResult<_>>())?
    };

    let total = rendered.iter().map(Vec::len).sum::<usize>()
        + jobs
            .iter()
            .map(|job| match job {
                Job::Silence { samples } => *samples,
                Job::Speech(_) => 0,
            })
            .sum::<usize>();
    let mut audio = Vec::with_capacity(total);
    let mut rendered = rendered.into_iter();
    for job in jobs {
        match job {
            Job::Silence { samples } => audio.resize(audio.len() + samples, 0),
            Job::Speech(_) => audio.extend(rendered.next().unwrap_or_default()),
        }
    }

    Ok(audio)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_samples() {
        assert_eq!(silence_samples(0.5, 22_050), 11_025);
        assert_eq!(silence_samples(2.0, 22_050), 44_100);
        assert_eq!(silence_samples(0.0, 22_050), 0);
        assert_eq!(silence_samples(0.001, 16_000), 16);
    }

    #[test]
    fn test_silence_cap_covers_per_tag_maximum() {
        let per_tag = silence_samples(crate::segmenter::MAX_SILENCE_SECONDS, 48_000);
        let total = silence_samples(MAX_TOTAL_SILENCE_SECONDS, 48_000);
        assert!(per_tag <= total);
        assert_eq!(total, 14_400_000);
    }

    #[test]
    fn test_to_pcm16_scales_and_saturates() {
        let pcm = to_pcm16(&[0.0, 0.5, -0.5, 1.0, -1.0, 2.0, -2.0]);
        assert_eq!(pcm, vec![0, 16_384, -16_384, i16::MAX, i16::MIN, i16::MAX, i16::MIN]);
    }

    #[test]
    fn test_to_pcm16_nan_is_silent() {
        assert_eq!(to_pcm16(&[f32::NAN]), vec![0]);
    }
}
