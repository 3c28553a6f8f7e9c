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

use std::{fmt, time::Duration};

use super::DeviceError;

/// The parameters an output stream is opened with. Derived from the decoded audio; there is no
/// further negotiation with the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    /// Bytes per sample (1 to 4).
    pub sample_width_bytes: u16,
    /// Number of interleaved channels.
    pub channels: u16,
    /// Frames per second.
    pub frame_rate: u32,
}

impl StreamFormat {
    /// Creates a new StreamFormat
    pub fn new(
        sample_width_bytes: u16,
        channels: u16,
        frame_rate: u32,
    ) -> Result<StreamFormat, DeviceError> {
        if !(1..=4).contains(&sample_width_bytes) {
            return Err(DeviceError::UnsupportedFormat(format!(
                "sample width of {} bytes",
                sample_width_bytes
            )));
        }
        if channels == 0 {
            return Err(DeviceError::UnsupportedFormat(
                "channel count must be greater than 0".to_string(),
            ));
        }
        if frame_rate == 0 {
            return Err(DeviceError::UnsupportedFormat(
                "frame rate must be greater than 0".to_string(),
            ));
        }

        Ok(StreamFormat {
            sample_width_bytes,
            channels,
            frame_rate,
        })
    }

    /// Bits per sample.
    pub fn bits_per_sample(&self) -> u16 {
        self.sample_width_bytes * 8
    }

    /// The magnitude of the most negative sample at this width.
    pub fn full_scale(&self) -> f32 {
        (1u64 << (self.bits_per_sample() - 1)) as f32
    }

    /// Scales a native-width sample into -1.0..1.0.
    #[inline]
    pub fn to_f32(&self, sample: i32) -> f32 {
        (sample as f32 / self.full_scale()).clamp(-1.0, 1.0)
    }

    /// Number of frames that play in the given duration, never less than one.
    pub fn frames_for(&self, duration: Duration) -> usize {
        ((self.frame_rate as f64 * duration.as_secs_f64()).round() as usize).max(1)
    }
}

impl fmt::Display for StreamFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-bit, {} channel(s), {} Hz",
            self.bits_per_sample(),
            self.channels,
            self.frame_rate
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_format_new() {
        let format = StreamFormat::new(2, 2, 44100).unwrap();
        assert_eq!(format.sample_width_bytes, 2);
        assert_eq!(format.channels, 2);
        assert_eq!(format.frame_rate, 44100);
        assert_eq!(format.bits_per_sample(), 16);
    }

    #[test]
    fn test_stream_format_new_invalid() {
        assert!(StreamFormat::new(0, 2, 44100).is_err());
        assert!(StreamFormat::new(5, 2, 44100).is_err());
        assert!(StreamFormat::new(2, 0, 44100).is_err());
        assert!(StreamFormat::new(2, 2, 0).is_err());
    }

    #[test]
    fn test_to_f32() {
        let format = StreamFormat::new(2, 1, 44100).unwrap();
        assert_eq!(format.to_f32(0), 0.0);
        assert_eq!(format.to_f32(-32768), -1.0);
        assert!((format.to_f32(16384) - 0.5).abs() < f32::EPSILON);

        let format = StreamFormat::new(4, 1, 44100).unwrap();
        assert_eq!(format.to_f32(i32::MIN), -1.0);
        assert!(format.to_f32(i32::MAX) <= 1.0);
    }

    #[test]
    fn test_frames_for() {
        let format = StreamFormat::new(2, 2, 44100).unwrap();
        assert_eq!(format.frames_for(Duration::from_millis(50)), 2205);
        assert_eq!(format.frames_for(Duration::from_millis(100)), 4410);
        assert_eq!(format.frames_for(Duration::ZERO), 1);
    }

    #[test]
    fn test_display() {
        let format = StreamFormat::new(2, 2, 48000).unwrap();
        assert_eq!(format.to_string(), "16-bit, 2 channel(s), 48000 Hz");
    }
}
