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
use std::path::Path;

use config::{Config, Environment, File};
use serde::Deserialize;

mod audio;
mod error;
mod waveform;

pub use self::audio::Audio;
pub use self::error::ConfigError;
pub use self::waveform::Waveform;

/// Environment variables with this prefix override file settings, e.g. WAVEPLAY_AUDIO__DEVICE.
const ENV_PREFIX: &str = "WAVEPLAY";

/// The configuration for the player.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Player {
    /// The audio configuration.
    #[serde(default)]
    audio: Audio,
    /// The waveform view configuration.
    #[serde(default)]
    waveform: Waveform,
}

impl Player {
    /// Loads the player configuration from an optional YAML file, with environment overrides on
    /// top. Values are validated before returning.
    pub fn load(path: Option<&Path>) -> Result<Player, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let player = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Player>()?;

        player.validate()?;
        Ok(player)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.audio.session_settings()?;
        self.waveform.width()?;
        Ok(())
    }

    /// Returns the audio configuration.
    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    /// Returns the waveform view configuration.
    pub fn waveform(&self) -> &Waveform {
        &self.waveform
    }
}

#[cfg(test)]
mod test {
    use std::{env, fs, time::Duration};

    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn test_load_without_file_uses_defaults() {
        let player = Player::load(None).unwrap();
        assert_eq!(player.audio().device(), "default");
        assert_eq!(
            player.audio().chunk_duration().unwrap(),
            Duration::from_millis(50)
        );
        assert_eq!(player.waveform().width().unwrap(), 100);
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waveplay.yaml");
        fs::write(
            &path,
            r#"
audio:
  device: mock-device
  chunk_duration: 75ms
waveform:
  width: 64
"#,
        )
        .unwrap();

        let player = Player::load(Some(&path)).unwrap();
        assert_eq!(player.audio().device(), "mock-device");
        assert_eq!(
            player.audio().chunk_duration().unwrap(),
            Duration::from_millis(75)
        );
        assert_eq!(player.waveform().width().unwrap(), 64);
    }

    #[test]
    #[serial]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waveplay.yaml");
        fs::write(&path, "audio:\n  chunk_duration: 5ms\n").unwrap();
        assert!(matches!(
            Player::load(Some(&path)),
            Err(ConfigError::Invalid(_))
        ));

        assert!(matches!(
            Player::load(Some(&dir.path().join("missing.yaml"))),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    #[serial]
    fn test_environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waveplay.yaml");
        fs::write(&path, "audio:\n  device: mock-device\n").unwrap();

        env::set_var("WAVEPLAY_AUDIO__DEVICE", "mock-env");
        let result = Player::load(Some(&path));
        env::remove_var("WAVEPLAY_AUDIO__DEVICE");

        assert_eq!(result.unwrap().audio().device(), "mock-env");
    }
}
