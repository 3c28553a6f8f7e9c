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
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::Mutex;
use tracing::{debug, info};

use super::{DeviceError, OutputStream, StreamFormat};

/// A single write received by a mock stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrittenChunk {
    /// The first sample of the write.
    pub first_sample: i32,
    /// The number of samples written.
    pub len: usize,
}

#[derive(Default)]
struct State {
    fail_open: AtomicBool,
    opens: AtomicUsize,
    closes: AtomicUsize,
    drains: AtomicUsize,
    open_streams: AtomicUsize,
    max_open_streams: AtomicUsize,
    writes: Mutex<Vec<WrittenChunk>>,
}

/// A mock device. Doesn't actually play anything, but paces writes like a real device would
/// and keeps track of how it was used.
#[derive(Clone)]
pub struct Device {
    name: String,
    /// Playback speed multiplier. Writes block for chunk duration / speed.
    speed: f64,
    fail_after_writes: Option<usize>,
    state: Arc<State>,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str) -> Device {
        Device {
            name: name.to_string(),
            speed: 1.0,
            fail_after_writes: None,
            state: Arc::new(State::default()),
        }
    }

    /// Plays back faster than real time.
    pub fn with_speed(mut self, speed: f64) -> Device {
        self.speed = speed.max(f64::MIN_POSITIVE);
        self
    }

    /// Makes every open fail, as if the device were unplugged.
    pub fn failing_open(self) -> Device {
        self.set_failing_open(true);
        self
    }

    /// Plugs the device back in, or pulls it out again.
    pub fn set_failing_open(&self, fail: bool) {
        self.state.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Makes streams fail once they have accepted the given number of writes.
    pub fn failing_after_writes(mut self, writes: usize) -> Device {
        self.fail_after_writes = Some(writes);
        self
    }

    /// Returns the number of times a stream was opened.
    pub fn open_count(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    /// Returns the number of times a stream was closed.
    pub fn close_count(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// Returns the number of streams that were drained before closing.
    pub fn drain_count(&self) -> usize {
        self.state.drains.load(Ordering::SeqCst)
    }

    /// Returns true if a stream is currently open.
    pub fn is_playing(&self) -> bool {
        self.state.open_streams.load(Ordering::SeqCst) > 0
    }

    /// Returns the largest number of streams that were ever open at once.
    pub fn max_concurrent_streams(&self) -> usize {
        self.state.max_open_streams.load(Ordering::SeqCst)
    }

    /// Returns every write received so far, in order.
    pub fn writes(&self) -> Vec<WrittenChunk> {
        self.state.writes.lock().clone()
    }
}

impl super::Device for Device {
    fn open(&self, format: &StreamFormat) -> Result<Box<dyn OutputStream>, DeviceError> {
        if self.state.fail_open.load(Ordering::SeqCst) {
            return Err(DeviceError::Open {
                device: self.name.clone(),
                reason: "mock device configured to fail".to_string(),
            });
        }

        info!(device = self.name, format = %format, "Opening stream (mock).");
        self.state.opens.fetch_add(1, Ordering::SeqCst);
        let open = self.state.open_streams.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_open_streams.fetch_max(open, Ordering::SeqCst);

        Ok(Box::new(Stream {
            format: *format,
            speed: self.speed,
            writes_left: self.fail_after_writes,
            state: self.state.clone(),
        }))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

/// A mock output stream.
struct Stream {
    format: StreamFormat,
    speed: f64,
    writes_left: Option<usize>,
    state: Arc<State>,
}

impl OutputStream for Stream {
    fn write(&mut self, samples: &[i32]) -> Result<(), DeviceError> {
        if let Some(writes_left) = self.writes_left.as_mut() {
            if *writes_left == 0 {
                return Err(DeviceError::Write("mock stream configured to fail".into()));
            }
            *writes_left -= 1;
        }

        self.state.writes.lock().push(WrittenChunk {
            first_sample: samples.first().copied().unwrap_or_default(),
            len: samples.len(),
        });

        let frames = samples.len() / self.format.channels as usize;
        let playback = frames as f64 / self.format.frame_rate as f64;
        spin_sleep::sleep(Duration::from_secs_f64(playback / self.speed));
        Ok(())
    }

    fn drain(&mut self) {
        self.state.drains.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        debug!("Closing stream (mock).");
        self.state.open_streams.fetch_sub(1, Ordering::SeqCst);
        self.state.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod test {
    use std::time::Instant;

    use crate::audio::Device as _;

    use super::*;

    #[test]
    fn test_open_write_close() {
        let device = Device::get("mock-device").with_speed(10.0);
        let format = StreamFormat::new(2, 2, 1000).unwrap();

        let mut stream = device.open(&format).unwrap();
        assert!(device.is_playing());
        assert_eq!(device.open_count(), 1);

        let start = Instant::now();
        // 100 frames at 1000Hz is 100ms of audio, 10ms at 10x speed.
        stream.write(&[7; 200]).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(10));

        drop(stream);
        assert!(!device.is_playing());
        assert_eq!(device.close_count(), 1);
        assert_eq!(
            device.writes(),
            vec![WrittenChunk {
                first_sample: 7,
                len: 200
            }]
        );
    }

    #[test]
    fn test_failures() {
        let format = StreamFormat::new(2, 1, 1000).unwrap();
        let device = Device::get("mock-device").failing_open();
        assert!(device.open(&format).is_err());
        assert_eq!(device.open_count(), 0);

        let device = Device::get("mock-device")
            .with_speed(1000.0)
            .failing_after_writes(1);
        let mut stream = device.open(&format).unwrap();
        assert!(stream.write(&[0; 10]).is_ok());
        assert!(stream.write(&[0; 10]).is_err());
    }

    #[test]
    fn test_concurrent_stream_tracking() {
        let device = Device::get("mock-device");
        let format = StreamFormat::new(2, 1, 1000).unwrap();
        let first = device.open(&format).unwrap();
        let second = device.open(&format).unwrap();
        drop(first);
        drop(second);
        assert_eq!(device.max_concurrent_streams(), 2);
        assert_eq!(device.close_count(), 2);
    }
}
