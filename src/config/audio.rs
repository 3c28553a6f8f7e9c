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
use std::time::Duration;

use duration_string::DurationString;
use serde::Deserialize;

use super::error::ConfigError;
use crate::{
    audio::{cpal::DEFAULT_DEVICE, thread_priority::DEFAULT_PLAYBACK_THREAD_PRIORITY},
    session::{SessionSettings, DEFAULT_CHUNK_DURATION},
};

const MIN_CHUNK_DURATION: Duration = Duration::from_millis(50);
const MAX_CHUNK_DURATION: Duration = Duration::from_millis(100);

/// A YAML representation of the audio configuration.
#[derive(Deserialize, Clone, Debug)]
pub struct Audio {
    /// The audio device.
    #[serde(default = "default_device")]
    device: String,

    /// How much audio each device write carries (default: 50ms, must be 50ms-100ms).
    chunk_duration: Option<String>,

    /// Priority of the playback thread, 0-99 (default: 70).
    thread_priority: Option<u8>,

    /// Request SCHED_FIFO for the playback thread on unix (default: false).
    realtime: Option<bool>,
}

fn default_device() -> String {
    DEFAULT_DEVICE.to_string()
}

impl Default for Audio {
    fn default() -> Self {
        Audio::new(DEFAULT_DEVICE)
    }
}

impl Audio {
    /// New will create a new Audio configuration.
    pub fn new(device: &str) -> Audio {
        Audio {
            device: device.to_string(),
            chunk_duration: None,
            thread_priority: None,
            realtime: None,
        }
    }

    /// Returns a copy of this configuration with a different device.
    pub fn with_device(&self, device: &str) -> Audio {
        Audio {
            device: device.to_string(),
            ..self.clone()
        }
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Returns the chunk duration from the configuration.
    pub fn chunk_duration(&self) -> Result<Duration, ConfigError> {
        let duration: Duration = match &self.chunk_duration {
            Some(chunk_duration) => DurationString::from_string(chunk_duration.clone())
                .map_err(|e| {
                    ConfigError::Invalid(format!(
                        "chunk_duration '{}': {}",
                        chunk_duration, e
                    ))
                })?
                .into(),
            None => DEFAULT_CHUNK_DURATION,
        };

        if !(MIN_CHUNK_DURATION..=MAX_CHUNK_DURATION).contains(&duration) {
            return Err(ConfigError::Invalid(format!(
                "chunk_duration must be between {:?} and {:?}, got {:?}",
                MIN_CHUNK_DURATION, MAX_CHUNK_DURATION, duration
            )));
        }
        Ok(duration)
    }

    /// Returns the playback thread priority (default: 70).
    pub fn thread_priority(&self) -> Result<u8, ConfigError> {
        match self.thread_priority {
            Some(priority) if priority > 99 => Err(ConfigError::Invalid(format!(
                "thread_priority must be between 0 and 99, got {}",
                priority
            ))),
            Some(priority) => Ok(priority),
            None => Ok(DEFAULT_PLAYBACK_THREAD_PRIORITY),
        }
    }

    /// Returns whether the playback thread should request realtime scheduling.
    pub fn realtime(&self) -> bool {
        self.realtime.unwrap_or(false)
    }

    /// Builds the settings every playback session is started with.
    pub fn session_settings(&self) -> Result<SessionSettings, ConfigError> {
        Ok(SessionSettings {
            chunk_duration: self.chunk_duration()?,
            thread_priority: self.thread_priority()?,
            realtime: self.realtime(),
        })
    }
}
