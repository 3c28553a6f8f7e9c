// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
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

use std::{error::Error, f32::consts::PI, fs::File, path::PathBuf};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::audio::DecodedAudio;

mod polling;

pub use polling::eventually;

/// Builds 16-bit audio holding a 440Hz sine on every channel.
pub fn sine_audio(channels: u16, frame_rate: u32, seconds: f64) -> DecodedAudio {
    let frames = (frame_rate as f64 * seconds).round() as usize;
    let mut samples = Vec::with_capacity(frames * channels as usize);
    for frame in 0..frames {
        let t = frame as f32 / frame_rate as f32;
        let sample = ((2.0 * PI * 440.0 * t).sin() * 16000.0) as i32;
        for _ in 0..channels {
            samples.push(sample);
        }
    }
    DecodedAudio::new(2, channels, frame_rate, samples).expect("valid test audio")
}

/// Builds 32-bit mono audio whose sample value is its own frame index, so written chunks can be
/// traced back to the position they came from.
pub fn ramp_audio(frame_rate: u32, seconds: f64) -> DecodedAudio {
    let frames = (frame_rate as f64 * seconds).round() as i32;
    DecodedAudio::new(4, 1, frame_rate, (0..frames).collect()).expect("valid test audio")
}

/// Writes planar per-channel samples to an interleaved integer WAV file.
pub fn write_wav_with_bits(
    path: PathBuf,
    samples: Vec<Vec<i32>>,
    sample_rate: u32,
    bits_per_sample: u16,
) -> Result<(), Box<dyn Error>> {
    let tempwav = File::create(path)?;

    let num_channels = samples.len();
    assert!(num_channels <= u16::MAX.into(), "Too many channels!");
    let mut writer = WavWriter::new(
        tempwav,
        WavSpec {
            channels: num_channels as u16,
            sample_rate,
            bits_per_sample,
            sample_format: SampleFormat::Int,
        },
    )?;

    let frames = samples.iter().map(Vec::len).min().unwrap_or(0);
    for frame in 0..frames {
        for channel_samples in &samples {
            writer.write_sample(channel_samples[frame])?;
        }
    }
    writer.finalize()?;

    Ok(())
}
