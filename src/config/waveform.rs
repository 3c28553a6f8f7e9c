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
use serde::Deserialize;

use super::error::ConfigError;

const DEFAULT_WIDTH: usize = 100;

/// A YAML representation of the waveform view configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Waveform {
    /// The number of columns the waveform is drawn across.
    width: Option<usize>,
}

impl Waveform {
    /// Returns the waveform width in columns (default: 100).
    pub fn width(&self) -> Result<usize, ConfigError> {
        match self.width {
            Some(0) => Err(ConfigError::Invalid(
                "waveform width must be at least one column".to_string(),
            )),
            Some(width) => Ok(width),
            None => Ok(DEFAULT_WIDTH),
        }
    }
}
