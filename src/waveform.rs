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
//! A terminal rendition of the waveform plot, with click, hover and playhead markers.

use std::fmt;

use crate::audio::DecodedAudio;

const GLYPHS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
const CLICK_MARKER: char = '|';
const HOVER_MARKER: char = ':';
const PLAYHEAD_MARKER: char = '^';

/// The sample range within one column, normalized to -1..1.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Peak {
    pub min: f32,
    pub max: f32,
}

impl Peak {
    fn amplitude(&self) -> f32 {
        self.min.abs().max(self.max.abs())
    }
}

/// The waveform of the loaded audio, bucketed into columns.
pub struct Waveform {
    audio: DecodedAudio,
    columns: usize,
    /// One row of peaks per channel.
    peaks: Vec<Vec<Peak>>,
    click: f64,
    hover: f64,
    playhead: f64,
}

impl Waveform {
    /// Computes the peaks of the audio across the given number of columns.
    pub fn render(audio: &DecodedAudio, columns: usize) -> Waveform {
        let mut waveform = Waveform {
            audio: audio.clone(),
            columns: 0,
            peaks: Vec::new(),
            click: 0.0,
            hover: 0.0,
            playhead: 0.0,
        };
        waveform.rescale(columns);
        waveform
    }

    /// Recomputes the peaks for a new width. Markers keep their positions in seconds.
    pub fn rescale(&mut self, columns: usize) {
        let columns = columns.max(1);
        let format = self.audio.stream_format();
        let frames = self.audio.frame_count();

        self.columns = columns;
        self.peaks = (0..self.audio.channel_count())
            .map(|channel| {
                let samples: Vec<i32> = self.audio.channel(channel).collect();
                (0..columns)
                    .map(|column| {
                        let start = column * frames / columns;
                        let end = ((column + 1) * frames / columns).min(frames);
                        samples[start..end]
                            .iter()
                            .map(|&sample| format.to_f32(sample))
                            .fold(None, |peak: Option<Peak>, sample| {
                                Some(match peak {
                                    Some(peak) => Peak {
                                        min: peak.min.min(sample),
                                        max: peak.max.max(sample),
                                    },
                                    None => Peak {
                                        min: sample,
                                        max: sample,
                                    },
                                })
                            })
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .collect();
    }

    /// The number of columns.
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// The peaks of the given channel.
    pub fn peaks(&self, channel: usize) -> Option<&[Peak]> {
        self.peaks.get(channel).map(Vec::as_slice)
    }

    /// Maps a pointer column to seconds. Returns None when the pointer is outside the plot.
    pub fn position_at_pointer(&self, x: i64) -> Option<f64> {
        let column = usize::try_from(x).ok().filter(|&x| x < self.columns)?;
        Some(column as f64 / self.columns as f64 * self.audio.duration_seconds())
    }

    fn column_at(&self, seconds: f64) -> usize {
        let duration = self.audio.duration_seconds();
        if duration <= 0.0 || !seconds.is_finite() {
            return 0;
        }
        let column = (seconds / duration * self.columns as f64).floor().max(0.0) as usize;
        column.min(self.columns - 1)
    }

    /// Moves the playhead marker.
    pub fn update_playhead(&mut self, seconds: f64) {
        self.playhead = seconds;
    }

    /// Moves the hover marker. Outside the plot it goes back to the start.
    pub fn hover(&mut self, x: i64) -> Option<f64> {
        let position = self.position_at_pointer(x);
        self.hover = position.unwrap_or(0.0);
        position
    }

    /// Moves the click marker and returns the position to play from. Clicks outside the plot are
    /// ignored.
    pub fn click(&mut self, x: i64) -> Option<f64> {
        let position = self.position_at_pointer(x)?;
        self.click = position;
        Some(position)
    }

    pub fn playhead(&self) -> f64 {
        self.playhead
    }

    pub fn click_position(&self) -> f64 {
        self.click
    }

    pub fn hover_position(&self) -> f64 {
        self.hover
    }

    /// Renders only the marker line. The playhead wins where markers overlap.
    pub fn marker_line(&self) -> String {
        let mut line = vec![' '; self.columns];
        line[self.column_at(self.hover)] = HOVER_MARKER;
        line[self.column_at(self.click)] = CLICK_MARKER;
        line[self.column_at(self.playhead)] = PLAYHEAD_MARKER;
        line.into_iter().collect()
    }
}

impl fmt::Display for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.peaks {
            let line: String = row
                .iter()
                .map(|peak| {
                    let level = (peak.amplitude() * (GLYPHS.len() - 1) as f32).round() as usize;
                    GLYPHS[level.min(GLYPHS.len() - 1)]
                })
                .collect();
            writeln!(f, "{}", line)?;
        }
        write!(f, "{}", self.marker_line())
    }
}
