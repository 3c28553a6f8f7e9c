// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{fmt, fs::File, path::Path, sync::Arc, time::Duration};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, warn};

use super::StreamFormat;

/// Sample width used when the codec doesn't report one (lossy codecs, float PCM).
const DEFAULT_BITS_PER_SAMPLE: u32 = 16;

/// Error types for decoding audio files.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported or corrupt audio: {0}")]
    Unsupported(#[from] SymphoniaError),

    #[error("no audio track found in {0}")]
    NoAudioTrack(String),

    #[error("sample rate not specified in {0}")]
    MissingSampleRate(String),

    #[error("invalid sample layout: {0}")]
    InvalidLayout(String),
}

/// A fully decoded PCM buffer. Immutable once built; clones share the sample storage.
#[derive(Clone)]
pub struct DecodedAudio {
    sample_width_bytes: u16,
    channel_count: u16,
    frame_rate_hz: u32,
    /// Interleaved samples at their native width, e.g. 16-bit audio lies in i16 range.
    samples: Arc<[i32]>,
}

impl DecodedAudio {
    /// Creates a new decoded buffer, checking the layout invariants.
    pub fn new(
        sample_width_bytes: u16,
        channel_count: u16,
        frame_rate_hz: u32,
        samples: Vec<i32>,
    ) -> Result<DecodedAudio, DecodeError> {
        if !(1..=4).contains(&sample_width_bytes) {
            return Err(DecodeError::InvalidLayout(format!(
                "sample width of {} bytes",
                sample_width_bytes
            )));
        }
        if channel_count == 0 {
            return Err(DecodeError::InvalidLayout(
                "channel count must be greater than 0".to_string(),
            ));
        }
        if frame_rate_hz == 0 {
            return Err(DecodeError::InvalidLayout(
                "frame rate must be greater than 0".to_string(),
            ));
        }
        if samples.len() % channel_count as usize != 0 {
            return Err(DecodeError::InvalidLayout(format!(
                "{} samples is not a whole number of {}-channel frames",
                samples.len(),
                channel_count
            )));
        }

        Ok(DecodedAudio {
            sample_width_bytes,
            channel_count,
            frame_rate_hz,
            samples: samples.into(),
        })
    }

    /// Decodes the given file in full. Supports WAV, MP3, FLAC, and the other formats symphonia
    /// supports.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<DecodedAudio, DecodeError> {
        let path = path.as_ref();
        let file_path = path.to_string_lossy().to_string();
        let file = File::open(path).map_err(|e| {
            DecodeError::Io(std::io::Error::new(
                e.kind(),
                format!("{}: {}", path.display(), e),
            ))
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(extension);
        }

        let meta_opts: MetadataOptions = Default::default();
        let fmt_opts: FormatOptions = Default::default();
        let probed = get_probe().format(&hint, mss, &fmt_opts, &meta_opts)?;
        let mut format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| DecodeError::NoAudioTrack(file_path.clone()))?;
        let track_id = track.id;
        let params = track.codec_params.clone();

        let frame_rate_hz = params
            .sample_rate
            .ok_or_else(|| DecodeError::MissingSampleRate(file_path.clone()))?;
        let bits = params
            .bits_per_sample
            .filter(|bits| (8..=32).contains(bits))
            .unwrap_or(DEFAULT_BITS_PER_SAMPLE);
        let sample_width_bytes = bits.div_ceil(8) as u16;
        let shift = 32 - sample_width_bytes as u32 * 8;

        let decoder_opts: DecoderOptions = Default::default();
        let mut decoder = get_codecs().make(&params, &decoder_opts)?;

        // A value of 0 means "not reported yet"; the first decoded packet fills it in.
        let mut channel_count = params.channels.map(|c| c.count() as u16).unwrap_or(0);
        let mut samples: Vec<i32> = Vec::new();
        let mut sample_buffer: Option<SampleBuffer<i32>> = None;

        loop {
            let packet = match format_reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => {
                    decoder.reset();
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!(file = file_path, err = e, "Skipping undecodable packet");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let spec = *decoded.spec();
            if channel_count == 0 {
                channel_count = spec.channels.count() as u16;
            }

            let needed = decoded.capacity() * spec.channels.count();
            if sample_buffer
                .as_ref()
                .map_or(true, |buffer| buffer.capacity() < needed)
            {
                sample_buffer = Some(SampleBuffer::<i32>::new(decoded.capacity() as u64, spec));
            }
            if let Some(buffer) = sample_buffer.as_mut() {
                buffer.copy_interleaved_ref(decoded);
                samples.extend(buffer.samples().iter().map(|sample| sample >> shift));
            }
        }

        debug!(
            file = file_path,
            channels = channel_count,
            frame_rate = frame_rate_hz,
            bits = sample_width_bytes * 8,
            samples = samples.len(),
            "Decoded audio file"
        );

        DecodedAudio::new(sample_width_bytes, channel_count, frame_rate_hz, samples)
    }

    /// Bytes per sample.
    pub fn sample_width_bytes(&self) -> u16 {
        self.sample_width_bytes
    }

    /// Number of interleaved channels.
    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    /// Frames per second.
    pub fn frame_rate_hz(&self) -> u32 {
        self.frame_rate_hz
    }

    /// All interleaved samples.
    pub fn samples(&self) -> &[i32] {
        &self.samples
    }

    /// The number of frames (samples per channel).
    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channel_count as usize
    }

    /// The playback length of the buffer.
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_seconds())
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frame_count() as f64 / self.frame_rate_hz as f64
    }

    /// Converts a time offset into a frame index, clamped to the end of the buffer.
    pub fn frame_at(&self, seconds: f64) -> usize {
        if !seconds.is_finite() || seconds <= 0.0 {
            return 0;
        }
        ((seconds * self.frame_rate_hz as f64).floor() as usize).min(self.frame_count())
    }

    /// Converts a frame index back into seconds.
    pub fn time_at_frame(&self, frame: usize) -> f64 {
        frame as f64 / self.frame_rate_hz as f64
    }

    /// The interleaved samples for frames in `start..end`.
    pub fn frames(&self, start: usize, end: usize) -> &[i32] {
        let channels = self.channel_count as usize;
        let end = end.min(self.frame_count());
        let start = start.min(end);
        &self.samples[start * channels..end * channels]
    }

    /// Iterates over the samples of a single channel.
    pub fn channel(&self, channel: u16) -> impl Iterator<Item = i32> + '_ {
        self.samples
            .iter()
            .skip(channel as usize)
            .step_by(self.channel_count as usize)
            .copied()
    }

    /// The format an output device must be opened with to play this buffer.
    pub fn stream_format(&self) -> StreamFormat {
        StreamFormat {
            sample_width_bytes: self.sample_width_bytes,
            channels: self.channel_count,
            frame_rate: self.frame_rate_hz,
        }
    }
}

impl fmt::Debug for DecodedAudio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedAudio")
            .field("sample_width_bytes", &self.sample_width_bytes)
            .field("channel_count", &self.channel_count)
            .field("frame_rate_hz", &self.frame_rate_hz)
            .field("frames", &self.frame_count())
            .finish()
    }
}
