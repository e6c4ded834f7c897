//! Audio file I/O for Splice
//!
//! Decoding goes through `hound` (8/16/24/32-bit integer and 32-bit float WAV).
//! Encoding uses a fixed 16-bit PCM writer whose header layout and asymmetric
//! sample scaling must stay bit-identical for downstream compatibility.

use std::io::Cursor;
use std::path::Path;

use hound::{SampleFormat, WavReader};

use crate::engine::buffer::AudioBuffer;
use crate::error::{Result, SpliceError};

/// Size of the canonical RIFF/WAVE header written by [`encode_wav_16`]
pub const WAV_HEADER_SIZE: usize = 44;

const PCM_FORMAT_TAG: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;

/// Encode a buffer as a 16-bit PCM WAV file
///
/// Samples are clamped to [-1, 1]; negative values scale by 0x8000 and
/// non-negative values by 0x7fff, truncating toward zero.
pub fn encode_wav_16(buffer: &AudioBuffer) -> Result<Vec<u8>> {
    let num_channels = u16::try_from(buffer.num_channels())
        .map_err(|_| SpliceError::validation("too many channels for a WAV header"))?;
    let sample_rate = buffer.sample_rate();
    let block_align = num_channels
        .checked_mul(BITS_PER_SAMPLE / 8)
        .ok_or_else(|| SpliceError::validation("too many channels for a WAV header"))?;
    let byte_rate = sample_rate
        .checked_mul(u32::from(block_align))
        .ok_or_else(|| SpliceError::validation("byte rate does not fit a WAV header"))?;
    let data_size = wav_data_size(buffer.num_frames(), block_align)?;

    let mut out = Vec::with_capacity(WAV_HEADER_SIZE + data_size as usize);

    // RIFF header
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(data_size + WAV_HEADER_SIZE as u32 - 8).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    // fmt chunk
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&PCM_FORMAT_TAG.to_le_bytes());
    out.extend_from_slice(&num_channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    // data chunk
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_size.to_le_bytes());

    for frame in 0..buffer.num_frames() {
        for channel in buffer.channels() {
            out.extend_from_slice(&float_to_i16(channel[frame]).to_le_bytes());
        }
    }

    Ok(out)
}

/// Byte length of the data chunk, checked against the 32-bit RIFF size field
fn wav_data_size(num_frames: usize, block_align: u16) -> Result<u32> {
    num_frames
        .checked_mul(usize::from(block_align))
        .and_then(|bytes| u32::try_from(bytes).ok())
        .filter(|bytes| bytes.checked_add(WAV_HEADER_SIZE as u32).is_some())
        .ok_or_else(|| {
            SpliceError::validation(format!(
                "{} frames exceed the 4 GiB WAV size limit",
                num_frames
            ))
        })
}

/// Convert one float sample to the asymmetric 16-bit representation
#[inline]
pub fn float_to_i16(sample: f32) -> i16 {
    let s = if sample.is_nan() { 0.0 } else { sample.clamp(-1.0, 1.0) };
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Decode WAV bytes into an AudioBuffer
///
/// `media_id` names the source in the returned `Decode` error.
pub fn decode_wav(bytes: &[u8], media_id: &str) -> Result<AudioBuffer> {
    let reader = WavReader::new(Cursor::new(bytes)).map_err(|e| SpliceError::Decode {
        media_id: media_id.to_string(),
        reason: e.to_string(),
    })?;
    read_buffer(reader, media_id)
}

/// Import a WAV file from disk
pub fn import_wav(path: &Path) -> Result<AudioBuffer> {
    if !path.exists() {
        return Err(SpliceError::not_found("audio file", path.display().to_string()));
    }
    let media_id = path.display().to_string();
    let reader = WavReader::open(path).map_err(|e| SpliceError::Decode {
        media_id: media_id.clone(),
        reason: e.to_string(),
    })?;
    read_buffer(reader, &media_id)
}

/// Export a buffer to disk using the 16-bit encoder
pub fn export_wav(buffer: &AudioBuffer, path: &Path) -> Result<()> {
    std::fs::write(path, encode_wav_16(buffer)?)?;
    Ok(())
}

/// Resample every channel to `target_rate` with linear interpolation
pub fn resample(buffer: &AudioBuffer, target_rate: u32) -> AudioBuffer {
    if buffer.sample_rate() == target_rate || target_rate == 0 {
        return buffer.clone();
    }
    let ratio = target_rate as f64 / buffer.sample_rate() as f64;
    let channels = buffer
        .channels()
        .map(|channel| resample_linear(channel, ratio))
        .collect();
    // Every channel has the same source length, so the outputs agree too.
    AudioBuffer::from_channels(channels, target_rate).unwrap_or_else(|_| buffer.clone())
}

// ============================================================================
// Internal helper functions
// ============================================================================

fn read_buffer<R: std::io::Read>(reader: WavReader<R>, media_id: &str) -> Result<AudioBuffer> {
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        return Err(SpliceError::Decode {
            media_id: media_id.to_string(),
            reason: "WAV declares zero channels".to_string(),
        });
    }

    let samples = read_samples_as_f32(reader, spec.bits_per_sample, spec.sample_format)
        .map_err(|e| SpliceError::Decode {
            media_id: media_id.to_string(),
            reason: e.to_string(),
        })?;

    AudioBuffer::from_interleaved(&samples, channels, spec.sample_rate)
}

/// Read samples from a WAV reader and convert to f32
fn read_samples_as_f32<R: std::io::Read>(
    mut reader: WavReader<R>,
    bits_per_sample: u16,
    sample_format: SampleFormat,
) -> std::result::Result<Vec<f32>, hound::Error> {
    match sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect(),
        SampleFormat::Int => match bits_per_sample {
            8 => reader
                .samples::<i8>()
                .map(|s| s.map(|v| v as f32 / 128.0))
                .collect(),
            16 => reader
                .samples::<i16>()
                .map(|s| s.map(|v| v as f32 / 32768.0))
                .collect(),
            // 24-bit is stored as i32 in hound
            24 => reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / 8388608.0))
                .collect(),
            32 => reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / 2147483648.0))
                .collect(),
            _ => Err(hound::Error::Unsupported),
        },
    }
}

/// Linear interpolation resampling
fn resample_linear(samples: &[f32], ratio: f64) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }

    let source_len = samples.len();
    let target_len = ((source_len as f64) * ratio).round() as usize;
    let mut output = Vec::with_capacity(target_len);

    for i in 0..target_len {
        let src_pos = i as f64 / ratio;
        let src_idx = src_pos.floor() as usize;
        let frac = (src_pos - src_idx as f64) as f32;

        let sample = if src_idx + 1 < source_len {
            samples[src_idx] * (1.0 - frac) + samples[src_idx + 1] * frac
        } else if src_idx < source_len {
            samples[src_idx]
        } else {
            0.0
        };

        output.push(sample);
    }

    output
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn read_u32(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ])
    }

    fn read_u16(bytes: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
    }

    #[test]
    fn test_wav_header_for_silent_mono_second() {
        let buffer = AudioBuffer::new(1, 8000, 8000);
        let bytes = encode_wav_16(&buffer).unwrap();

        assert_eq!(bytes.len(), WAV_HEADER_SIZE + 16000);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(read_u32(&bytes, 4), 44 + 16000 - 8);
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[12..16], b"fmt ");
        assert_eq!(read_u32(&bytes, 16), 16);
        assert_eq!(read_u16(&bytes, 20), 1);
        assert_eq!(read_u16(&bytes, 22), 1);
        assert_eq!(read_u32(&bytes, 24), 8000);
        assert_eq!(read_u32(&bytes, 28), 16000);
        assert_eq!(read_u16(&bytes, 32), 2);
        assert_eq!(read_u16(&bytes, 34), 16);
        assert_eq!(&bytes[36..40], b"data");
        assert_eq!(read_u32(&bytes, 40), 16000);
        assert!(bytes[WAV_HEADER_SIZE..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_data_size_past_riff_limit_is_rejected() {
        assert_eq!(wav_data_size(1000, 4).unwrap(), 4000);
        let last_fit = (u32::MAX as usize - WAV_HEADER_SIZE) / 4;
        assert!(wav_data_size(last_fit, 4).is_ok());
        let err = wav_data_size(u32::MAX as usize / 2 + 1, 2).unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
        assert!(wav_data_size(usize::MAX, 2).is_err());
    }

    #[test]
    fn test_asymmetric_scaling() {
        assert_eq!(float_to_i16(1.0), 0x7fff);
        assert_eq!(float_to_i16(-1.0), -0x8000);
        assert_eq!(float_to_i16(0.5), 16383);
        assert_eq!(float_to_i16(-0.5), -16384);
        assert_eq!(float_to_i16(2.0), 0x7fff);
        assert_eq!(float_to_i16(-3.0), -0x8000);
        assert_eq!(float_to_i16(0.0), 0);
    }

    #[test]
    fn test_stereo_samples_interleave() {
        let buffer =
            AudioBuffer::from_channels(vec![vec![1.0, 0.0], vec![-1.0, 0.0]], 44100).unwrap();
        let bytes = encode_wav_16(&buffer).unwrap();
        let data = &bytes[WAV_HEADER_SIZE..];
        assert_eq!(i16::from_le_bytes([data[0], data[1]]), 0x7fff);
        assert_eq!(i16::from_le_bytes([data[2], data[3]]), -0x8000);
        assert_eq!(read_u32(&bytes, 28), 44100 * 4);
    }

    #[test]
    fn test_decode_encoded_bytes() {
        let samples: Vec<f32> = (0..441).map(|i| (i as f32 / 441.0) - 0.5).collect();
        let buffer = AudioBuffer::mono(samples.clone(), 44100);
        let decoded = decode_wav(&encode_wav_16(&buffer).unwrap(), "tone").unwrap();

        assert_eq!(decoded.num_frames(), 441);
        assert_eq!(decoded.sample_rate(), 44100);
        for (a, b) in samples.iter().zip(decoded.channel(0)) {
            assert!((a - b).abs() < 1e-3, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_decode_garbage_is_decode_error() {
        let err = decode_wav(b"definitely not a wav file", "junk").unwrap_err();
        assert!(matches!(err, SpliceError::Decode { ref media_id, .. } if media_id == "junk"));
    }

    #[test]
    fn test_export_import_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let buffer =
            AudioBuffer::from_channels(vec![vec![0.25; 100], vec![-0.25; 100]], 22050).unwrap();

        export_wav(&buffer, &path).unwrap();
        let imported = import_wav(&path).unwrap();

        assert_eq!(imported.num_channels(), 2);
        assert_eq!(imported.num_frames(), 100);
        assert!((imported.channel(1)[50] + 0.25).abs() < 1e-3);
    }

    #[test]
    fn test_import_missing_file() {
        let err = import_wav(Path::new("/nonexistent/nothing.wav")).unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");
    }

    #[test]
    fn test_resample_doubles_length() {
        let buffer = AudioBuffer::mono(vec![0.0, 1.0, 0.0, -1.0], 22050);
        let up = resample(&buffer, 44100);
        assert_eq!(up.sample_rate(), 44100);
        assert_eq!(up.num_frames(), 8);
        assert!((up.channel(0)[1] - 0.5).abs() < 1e-6);
    }
}
