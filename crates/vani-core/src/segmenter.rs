//! Tag-aware text segmentation.
//!
//! Input text may carry two kinds of inline control tags:
//!
//! - `<alpha=1.2>` sets the speed factor for all following text, up to the next
//!   speed tag or the end of input. Tags do not nest; the latest one wins.
//! - `<sil=500ms>` / `<sil=2s>` inserts a silence of the given duration, at
//!   most [`MAX_SILENCE_SECONDS`] per tag.
//!
//! Within each speed-scoped block the text is split into sentences on `.` and
//! into words on whitespace. Words accumulate into one speech chunk until a
//! sentence end or a silence tag flushes them.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{VaniError, VaniResult};

static SPEED_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<alpha=([^>]*)>").expect("valid regex"));
static SILENCE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<sil=([^>]*)>").expect("valid regex"));

/// Longest silence one `<sil=..>` tag may insert
pub const MAX_SILENCE_SECONDS: f32 = 60.0;

/// What a chunk produces
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChunkKind {
    /// Text to synthesize
    Speech,
    /// Zero-valued samples for `seconds`
    Silence {
        /// Non-negative duration
        seconds: f32,
    },
}

/// One unit of segmented input
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    /// Space-joined words; empty for silence
    pub text: String,
    /// Speed factor active where the chunk appeared
    pub speed: f32,
    /// Speech or silence
    pub kind: ChunkKind,
    /// Position in emission order, contiguous from 0
    pub order: usize,
}

impl TextChunk {
    /// Whether this is a silence marker
    pub fn is_silence(&self) -> bool {
        matches!(self.kind, ChunkKind::Silence { .. })
    }

    /// Silence duration, `None` for speech chunks
    pub fn silence_seconds(&self) -> Option<f32> {
        match self.kind {
            ChunkKind::Silence { seconds } => Some(seconds),
            ChunkKind::Speech => None,
        }
    }
}

/// Check that a speed factor is finite and positive
///
/// # Errors
///
/// `InvalidInput` otherwise.
pub fn validate_speed(speed: f32) -> VaniResult<()> {
    if speed.is_finite() && speed > 0.0 {
        Ok(())
    } else {
        Err(VaniError::invalid_input(format!(
            "Speed must be a positive number, got {speed}"
        )))
    }
}

/// Split `text` into ordered chunks, starting at `default_speed`
///
/// # Errors
///
/// `InvalidInput` when `default_speed` is not positive or a tag carries a
/// malformed value; no chunks are returned in that case.
pub fn segment(text: &str, default_speed: f32) -> VaniResult<Vec<TextChunk>> {
    validate_speed(default_speed)?;

    let mut out = ChunkSink::default();
    let mut speed = default_speed;
    let mut cursor = 0;

    for tag in SPEED_TAG.captures_iter(text) {
        let Some(whole) = tag.get(0) else { continue };
        segment_block(&text[cursor..whole.start()], speed, &mut out)?;
        speed = parse_speed(&tag[1])?;
        cursor = whole.end();
    }
    segment_block(&text[cursor..], speed, &mut out)?;

    Ok(out.chunks)
}

fn segment_block(block: &str, speed: f32, out: &mut ChunkSink) -> VaniResult<()> {
    let mut words = Vec::new();
    let mut cursor = 0;

    for tag in SILENCE_TAG.captures_iter(block) {
        let Some(whole) = tag.get(0) else { continue };
        let seconds = parse_silence(&tag[1])?;
        collect_words(&block[cursor..whole.start()], speed, &mut words, out);
        out.flush(&mut words, speed);
        out.push(String::new(), speed, ChunkKind::Silence { seconds });
        cursor = whole.end();
    }
    collect_words(&block[cursor..], speed, &mut words, out);
    out.flush(&mut words, speed);

    Ok(())
}

/// Add words of `text` to `words`, flushing at every sentence boundary
fn collect_words<'a>(text: &'a str, speed: f32, words: &mut Vec<&'a str>, out: &mut ChunkSink) {
    for (i, sentence) in text.split('.').enumerate() {
        if i > 0 {
            out.flush(words, speed);
        }
        words.extend(sentence.split_whitespace());
    }
}

fn parse_number(raw: &str, tag: &str) -> VaniResult<f32> {
    let raw = raw.trim();
    let value: f32 = raw
        .parse()
        .map_err(|_| VaniError::invalid_input(format!("Malformed number '{raw}' in <{tag}=...> tag")))?;
    if !value.is_finite() || value < 0.0 {
        return Err(VaniError::invalid_input(format!(
            "Value in <{tag}=...> tag must be a non-negative number, got '{raw}'"
        )));
    }
    Ok(value)
}

fn parse_speed(raw: &str) -> VaniResult<f32> {
    let speed = parse_number(raw, "alpha")?;
    validate_speed(speed)?;
    Ok(speed)
}

fn parse_silence(raw: &str) -> VaniResult<f32> {
    let raw = raw.trim();
    let seconds = if let Some(ms) = raw.strip_suffix("ms") {
        parse_number(ms, "sil")? / 1000.0
    } else if let Some(s) = raw.strip_suffix('s') {
        parse_number(s, "sil")?
    } else {
        return Err(VaniError::invalid_input(format!(
            "Silence tag '<sil={raw}>' needs a 'ms' or 's' unit"
        )));
    };

    if seconds > MAX_SILENCE_SECONDS {
        return Err(VaniError::invalid_input(format!(
            "Silence tag '<sil={raw}>' exceeds the {MAX_SILENCE_SECONDS}s maximum"
        )));
    }
    Ok(seconds)
}

#[derive(Debug, Default)]
struct ChunkSink {
    chunks: Vec<TextChunk>,
}

impl ChunkSink {
    fn push(&mut self, text: String, speed: f32, kind: ChunkKind) {
        let order = self.chunks.len();
        self.chunks.push(TextChunk {
            text,
            speed,
            kind,
            order,
        });
    }

    fn flush(&mut self, words: &mut Vec<&str>, speed: f32) {
        if words.is_empty() {
            return;
        }
        let text = words.join(" ");
        words.clear();
        self.push(text, speed, ChunkKind::Speech);
    }
}
