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
use std::{fmt, sync::Arc};

use crate::config;

pub mod cpal;
pub mod decoded;
pub mod format;
pub mod mock;
pub mod thread_priority;

pub use decoded::{DecodeError, DecodedAudio};
pub use format::StreamFormat;

/// Errors raised by output devices.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("no output device found with name {0}")]
    NotFound(String),

    #[error("unable to open output device {device}: {reason}")]
    Open { device: String, reason: String },

    #[error("error writing to output device: {0}")]
    Write(String),

    #[error("unsupported stream format: {0}")]
    UnsupportedFormat(String),

    #[error("audio backend error: {0}")]
    Backend(String),
}

/// An output device that can be opened for a single stream at a time.
pub trait Device: fmt::Display + Send + Sync {
    /// Opens an output stream with the given format. The stream is closed when dropped.
    fn open(&self, format: &StreamFormat) -> Result<Box<dyn OutputStream>, DeviceError>;
}

/// An open output stream.
pub trait OutputStream: Send {
    /// Writes interleaved, native-width samples to the device. Blocks until the device has
    /// accepted them, which is roughly the playback duration of the previous write.
    fn write(&mut self, samples: &[i32]) -> Result<(), DeviceError>;

    /// Waits, for a bounded time, until everything written has been played. Called when the audio
    /// ends on its own; a stopped stream is dropped without draining.
    fn drain(&mut self) {}
}

/// Lists devices known to cpal.
pub fn list_devices() -> Result<Vec<Box<dyn Device>>, DeviceError> {
    cpal::Device::list()
}

/// Gets a device for the given configuration.
pub fn get_device(config: &config::Audio) -> Result<Arc<dyn Device>, DeviceError> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(device)));
    };

    Ok(Arc::new(cpal::Device::get(device)?))
}
