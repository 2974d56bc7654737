//! WAV rendering of synthesized PCM
//!
//! Output is always 16-bit signed, mono, at the engine sample rate.

use std::io::{Cursor, Seek, Write};
use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::debug;

use crate::error::{VaniError, VaniResult};

/// Size of the canonical RIFF/WAVE header written by `hound` for PCM
pub const WAV_HEADER_LEN: usize = 44;

fn pcm16_spec(sample_rate: u32) -> VaniResult<WavSpec> {
    if sample_rate == 0 {
        return Err(VaniError::invalid_input("Sample rate must be positive"));
    }
    Ok(WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    })
}

/// Sample count as stored in the header; the data chunk size is a `u32` of bytes
fn wav_sample_count(len: usize) -> VaniResult<u32> {
    let max_data_bytes = u64::from(u32::MAX) - WAV_HEADER_LEN as u64;
    u32::try_from(len)
        .ok()
        .filter(|&count| u64::from(count) * 2 <= max_data_bytes)
        .ok_or_else(|| VaniError::invalid_input(format!("{len} samples do not fit in a WAV file")))
}

fn write_samples<W: Write + Seek>(writer: W, samples: &[i16], sample_rate: u32) -> VaniResult<()> {
    let count = wav_sample_count(samples.len())?;
    let mut wav = WavWriter::new(writer, pcm16_spec(sample_rate)?)?;
    let mut pcm = wav.get_i16_writer(count);
    for &sample in samples {
        pcm.write_sample(sample);
    }
    pcm.flush()?;
    wav.finalize()?;
    Ok(())
}

/// Encode samples as an in-memory WAV file
///
/// # Errors
///
/// `InvalidInput` for a zero sample rate or more samples than a WAV header
/// can describe, `FileError` if encoding fails.
pub fn encode_wav(samples: &[i16], sample_rate: u32) -> VaniResult<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::with_capacity(WAV_HEADER_LEN + samples.len() * 2));
    write_samples(&mut cursor, samples, sample_rate)?;
    let bytes = cursor.into_inner();
    debug!("Encoded {} samples into {} WAV bytes", samples.len(), bytes.len());
    Ok(bytes)
}

/// Write samples to a WAV file at `path`
///
/// # Errors
///
/// `FileError` if the file cannot be created or written.
pub fn write_wav(path: impl AsRef<Path>, samples: &[i16], sample_rate: u32) -> VaniResult<()> {
    let path = path.as_ref();
    let file = std::fs::File::create(path)
        .map_err(|e| VaniError::file(format!("Failed to create WAV file {}: {e}", path.display())))?;
    write_samples(std::io::BufWriter::new(file), samples, sample_rate)
}
