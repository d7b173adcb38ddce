//! Downsampled amplitude envelopes for the UI scrubber.
//!
//! The processed MP3 is decoded to mono PCM and partitioned into a fixed
//! number of chunks; each chunk's RMS is rescaled against the loudest
//! chunk so the envelope always spans `[1, max_amplitude]`. The envelope
//! is cosmetic: a decode failure degrades to a flat placeholder instead
//! of failing the ingestion job.

use std::path::Path;
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;
use tracing::warn;

/// RMS values are computed on 16-bit full-scale magnitudes; the 1.0 floor
/// on the maximum keeps a silent clip from dividing by zero.
const I16_FULL_SCALE: f64 = 32768.0;

#[derive(Debug, Error)]
enum DecodeError {
    #[error("could not open audio file: {0}")]
    Open(String),

    #[error("could not decode audio: {0}")]
    Decode(String),

    #[error("no audio track found")]
    NoAudioTrack,
}

#[derive(Debug, Clone)]
pub struct WaveformSettings {
    /// Upper bound of the envelope scale; the loudest chunk maps here.
    pub max_amplitude: u32,
    /// Envelope resolution for duration-derived point counts.
    pub points_per_second: u32,
    /// Very short clips still get at least this many points.
    pub min_points: usize,
    /// When set, overrides the duration-derived point count entirely.
    pub fixed_points: Option<usize>,
}

impl Default for WaveformSettings {
    fn default() -> Self {
        Self {
            max_amplitude: 100,
            points_per_second: 4,
            min_points: 10,
            fixed_points: None,
        }
    }
}

impl WaveformSettings {
    fn point_count(&self, duration_seconds: u64) -> usize {
        match self.fixed_points {
            Some(n) => n,
            None => {
                let derived = (duration_seconds * self.points_per_second as u64) as usize;
                derived.max(self.min_points)
            }
        }
    }

    fn midpoint(&self) -> u32 {
        (self.max_amplitude / 2).max(1)
    }
}

/// Compute the amplitude envelope for an audio file.
///
/// Never fails: if the file cannot be decoded the envelope is a flat
/// line at the midpoint value of the requested length.
pub fn extract(path: &Path, duration_seconds: u64, settings: &WaveformSettings) -> Vec<u32> {
    let points = settings.point_count(duration_seconds).max(1);

    match decode_mono_samples(path) {
        Ok(samples) if !samples.is_empty() => {
            envelope(&samples, points, settings.max_amplitude)
        }
        Ok(_) => {
            warn!("Decoded zero samples from {:?}, using flat waveform", path);
            vec![settings.midpoint(); points]
        }
        Err(e) => {
            warn!("Waveform decode failed for {:?}: {}", path, e);
            vec![settings.midpoint(); points]
        }
    }
}

/// Two-pass RMS envelope over `points` equal-width chunks (the last chunk
/// absorbs the division remainder). Pass 1 finds the loudest chunk; pass 2
/// rescales every chunk into `[1, max_amplitude]` relative to it.
fn envelope(samples: &[f32], points: usize, max_amplitude: u32) -> Vec<u32> {
    let chunk_width = (samples.len() / points).max(1);

    let rms_of = |index: usize| -> f64 {
        let start = (index * chunk_width).min(samples.len());
        let end = if index == points - 1 {
            samples.len()
        } else {
            (start + chunk_width).min(samples.len())
        };
        let chunk = &samples[start..end];
        if chunk.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = chunk
            .iter()
            .map(|&s| {
                let v = s as f64 * I16_FULL_SCALE;
                v * v
            })
            .sum();
        (sum_sq / chunk.len() as f64).sqrt()
    };

    // Pass 1: per-chunk RMS and the maximum across the clip.
    let rms: Vec<f64> = (0..points).map(rms_of).collect();
    let max_rms = rms.iter().copied().fold(1.0f64, f64::max);

    // Pass 2: rescale so the loudest chunk hits max_amplitude and no bar
    // drops below 1.
    rms.into_iter()
        .map(|value| {
            let scaled = (value / max_rms * max_amplitude as f64).round() as u32;
            scaled.clamp(1, max_amplitude)
        })
        .collect()
}

/// Decode an audio file to mono f32 samples in `[-1.0, 1.0]`,
/// down-mixing multi-channel material.
fn decode_mono_samples(path: &Path) -> Result<Vec<f32>, DecodeError> {
    let file = std::fs::File::open(path).map_err(|e| DecodeError::Open(e.to_string()))?;
    let mss = MediaSourceStream::new(Box::new(file), MediaSourceStreamOptions::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DecodeError::Open(e.to_string()))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoAudioTrack)?;

    let track_id = track.id;
    let channels = track
        .codec_params
        .channels
        .map_or(1, symphonia::core::audio::Channels::count);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::Decode(e.to_string()))?;

    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(DecodeError::Decode(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => append_samples(&decoded, channels, &mut samples),
            // A bad frame loses one chunk of resolution, not the envelope.
            Err(symphonia::core::errors::Error::DecodeError(e)) => {
                warn!("Skipping undecodable packet in {:?}: {}", path, e);
            }
            Err(e) => return Err(DecodeError::Decode(e.to_string())),
        }
    }

    Ok(samples)
}

/// Append decoded samples to the output buffer, converting to mono.
fn append_samples(buffer: &AudioBufferRef, channels: usize, output: &mut Vec<f32>) {
    match buffer {
        AudioBufferRef::F32(buf) => {
            if channels == 1 {
                output.extend(buf.chan(0));
            } else {
                let frames = buf.frames();
                for i in 0..frames {
                    let mut sum = 0.0f32;
                    for ch in 0..channels {
                        sum += buf.chan(ch)[i];
                    }
                    output.push(sum / channels as f32);
                }
            }
        }
        AudioBufferRef::S16(buf) => {
            const NORM: f32 = 32768.0;
            if channels == 1 {
                output.extend(buf.chan(0).iter().map(|&s| f32::from(s) / NORM));
            } else {
                let frames = buf.frames();
                for i in 0..frames {
                    let mut sum = 0.0f32;
                    for ch in 0..channels {
                        sum += f32::from(buf.chan(ch)[i]) / NORM;
                    }
                    output.push(sum / channels as f32);
                }
            }
        }
        AudioBufferRef::S32(buf) => {
            const NORM: f32 = 2_147_483_648.0;
            if channels == 1 {
                output.extend(buf.chan(0).iter().map(|&s| s as f32 / NORM));
            } else {
                let frames = buf.frames();
                for i in 0..frames {
                    let mut sum = 0.0f32;
                    for ch in 0..channels {
                        sum += buf.chan(ch)[i] as f32 / NORM;
                    }
                    output.push(sum / channels as f32);
                }
            }
        }
        _ => {
            // Unsupported sample format, skip the packet.
        }
    }
}
