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
use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, SendTimeoutError, Sender};
use tracing::{debug, error, info, span, warn, Level};

use crate::audio::{Device as AudioDevice, DeviceError, OutputStream, StreamFormat};

/// The name that selects the host's default output device.
pub const DEFAULT_DEVICE: &str = "default";

/// A write fails if the callback hasn't taken the queued chunk within this many chunk durations.
const WRITE_TIMEOUT_CHUNKS: u32 = 4;

/// Lower bound for the write timeout, to leave room for the device's own buffer.
const MIN_WRITE_TIMEOUT: Duration = Duration::from_millis(250);

/// Slack added to the drain limit on top of the queued and in-flight chunks.
const DRAIN_SLACK: Duration = Duration::from_millis(50);

/// A small wrapper around a cpal::Device.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The maximum number of channels the device supports.
    max_channels: u16,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The underlying cpal device.
    device: cpal::Device,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.max_channels,
            self.host_id.name()
        )
    }
}

fn backend_error<E: fmt::Display>(e: E) -> DeviceError {
    DeviceError::Backend(e.to_string())
}

impl Device {
    /// Lists cpal devices and produces the Device trait.
    pub fn list() -> Result<Vec<Box<dyn AudioDevice>>, DeviceError> {
        Ok(Device::list_cpal_devices()?
            .into_iter()
            .map(|device| {
                let device: Box<dyn AudioDevice> = Box::new(device);
                device
            })
            .collect())
    }

    fn from_cpal(host_id: cpal::HostId, device: cpal::Device) -> Option<Device> {
        let max_channels = device
            .supported_output_configs()
            .ok()?
            .map(|config| config.channels())
            .max()
            .unwrap_or(0);
        if max_channels == 0 {
            return None;
        }

        Some(Device {
            name: device.name().ok()?,
            max_channels,
            host_id,
            device,
        })
    }

    /// Lists cpal output devices.
    fn list_cpal_devices() -> Result<Vec<Device>, DeviceError> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout().map_err(backend_error)?;
        let _shh_stderr = shh::stderr().map_err(backend_error)?;

        let mut devices: Vec<Device> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)
                .map_err(backend_error)?
                .output_devices()
            {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            devices.extend(host_devices.filter_map(|device| Device::from_cpal(host_id, device)));
        }

        devices.sort_by_key(|device| device.name.to_string());
        Ok(devices)
    }

    /// Gets the given cpal device. "default" selects the default host's default output.
    pub fn get(name: &str) -> Result<Device, DeviceError> {
        if name == DEFAULT_DEVICE {
            let host = cpal::default_host();
            return host
                .default_output_device()
                .and_then(|device| Device::from_cpal(host.id(), device))
                .ok_or_else(|| DeviceError::NotFound(name.to_string()));
        }

        Device::list_cpal_devices()?
            .into_iter()
            .find(|device| device.name.trim() == name)
            .ok_or_else(|| DeviceError::NotFound(name.to_string()))
    }
}

impl AudioDevice for Device {
    /// Opens an output stream. cpal streams can't move between threads, so the stream is built and
    /// held on its own thread for as long as the returned handle lives.
    fn open(&self, format: &StreamFormat) -> Result<Box<dyn OutputStream>, DeviceError> {
        if format.channels > self.max_channels {
            return Err(DeviceError::UnsupportedFormat(format!(
                "{} channels requested, audio device {} only has {}",
                format.channels, self.name, self.max_channels
            )));
        }

        let sample_format = self
            .device
            .default_output_config()
            .map_err(|e| self.open_error(e))?
            .sample_format();

        // A chunk queued while the callback drains the previous one. Writes block on this.
        let (chunk_tx, chunk_rx) = crossbeam_channel::bounded::<Vec<f32>>(1);
        let (error_tx, error_rx) = crossbeam_channel::bounded::<String>(1);
        let played = Arc::new(AtomicUsize::new(0));
        let feed = ChunkFeed::new(chunk_rx, played.clone());
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), DeviceError>>(1);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);

        let device = self.device.clone();
        let name = self.name.clone();
        let config = cpal::StreamConfig {
            channels: format.channels,
            sample_rate: cpal::SampleRate(format.frame_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let owner = thread::Builder::new()
            .name("cpal-stream".to_string())
            .spawn(move || {
                let span = span!(Level::INFO, "cpal stream", device = name);
                let _enter = span.enter();

                let stream = match build_stream(&device, &config, sample_format, feed, error_tx)
                    .and_then(|stream| {
                        stream.play().map_err(backend_error)?;
                        Ok(stream)
                    }) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                info!("CPAL output stream started successfully");

                // Block until the handle is dropped.
                let _ = shutdown_rx.recv();
                drop(stream);
                debug!("CPAL output stream closed");
            })
            .map_err(|e| self.open_error(e))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(Stream {
                format: *format,
                queue: Some(ChunkQueue::new(chunk_tx, error_rx, played)),
                last_chunk: Duration::ZERO,
                shutdown_tx: Some(shutdown_tx),
                owner: Some(owner),
            })),
            Ok(Err(e)) => {
                let _ = owner.join();
                Err(self.open_error(e))
            }
            Err(e) => {
                let _ = owner.join();
                Err(self.open_error(e))
            }
        }
    }
}

impl Device {
    fn open_error<E: fmt::Display>(&self, e: E) -> DeviceError {
        DeviceError::Open {
            device: self.name.clone(),
            reason: e.to_string(),
        }
    }
}

fn build_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    feed: ChunkFeed,
    errors: Sender<String>,
) -> Result<cpal::Stream, DeviceError> {
    match sample_format {
        cpal::SampleFormat::F32 => build_typed_stream::<f32>(device, config, feed, errors),
        cpal::SampleFormat::I16 => build_typed_stream::<i16>(device, config, feed, errors),
        cpal::SampleFormat::I32 => build_typed_stream::<i32>(device, config, feed, errors),
        cpal::SampleFormat::U16 => build_typed_stream::<u16>(device, config, feed, errors),
        other => Err(DeviceError::UnsupportedFormat(format!(
            "device sample format {:?}",
            other
        ))),
    }
}

fn build_typed_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut feed: ChunkFeed,
    errors: Sender<String>,
) -> Result<cpal::Stream, DeviceError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for dst in data.iter_mut() {
                    *dst = T::from_sample(feed.next_sample());
                }
            },
            move |err| {
                error!("CPAL output stream error: {}", err);
                // The writer only needs the first error; it fails the session.
                let _ = errors.try_send(err.to_string());
            },
            None,
        )
        .map_err(backend_error)
}

/// Hands queued chunks to the realtime callback one sample at a time. Never blocks; silence fills
/// any underrun. Counts every chunk it has played out so the writer can tell when playback drained.
struct ChunkFeed {
    chunks: Receiver<Vec<f32>>,
    current: Vec<f32>,
    position: usize,
    played: Arc<AtomicUsize>,
}

impl ChunkFeed {
    fn new(chunks: Receiver<Vec<f32>>, played: Arc<AtomicUsize>) -> ChunkFeed {
        ChunkFeed {
            chunks,
            current: Vec::new(),
            position: 0,
            played,
        }
    }

    #[inline]
    fn next_sample(&mut self) -> f32 {
        while self.position >= self.current.len() {
            match self.chunks.try_recv() {
                Ok(chunk) if chunk.is_empty() => {
                    self.played.fetch_add(1, Ordering::Release);
                }
                Ok(chunk) => {
                    self.current = chunk;
                    self.position = 0;
                }
                Err(_) => return 0.0,
            }
        }
        let sample = self.current[self.position];
        self.position += 1;
        if self.position == self.current.len() {
            self.played.fetch_add(1, Ordering::Release);
        }
        sample
    }
}

/// The writer's side of the chunk queue: sends chunks with a deadline, surfaces errors reported by
/// the stream's error callback, and waits for the feed to play out what was sent.
struct ChunkQueue {
    chunks: Sender<Vec<f32>>,
    errors: Receiver<String>,
    played: Arc<AtomicUsize>,
    sent: usize,
}

impl ChunkQueue {
    fn new(chunks: Sender<Vec<f32>>, errors: Receiver<String>, played: Arc<AtomicUsize>) -> Self {
        ChunkQueue {
            chunks,
            errors,
            played,
            sent: 0,
        }
    }

    fn push(&mut self, chunk: Vec<f32>, timeout: Duration) -> Result<(), DeviceError> {
        if let Ok(err) = self.errors.try_recv() {
            return Err(DeviceError::Write(err));
        }
        match self.chunks.send_timeout(chunk, timeout) {
            Ok(()) => {
                self.sent += 1;
                Ok(())
            }
            Err(SendTimeoutError::Timeout(_)) => {
                let reason = self
                    .errors
                    .try_recv()
                    .unwrap_or_else(|_| format!("output stream stalled for {:?}", timeout));
                Err(DeviceError::Write(reason))
            }
            Err(SendTimeoutError::Disconnected(_)) => {
                Err(DeviceError::Write("output stream closed".to_string()))
            }
        }
    }

    /// Waits until every chunk sent has been played out, up to the limit. Returns whether it did.
    fn drain(&self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        while self.played.load(Ordering::Acquire) < self.sent {
            if Instant::now() >= deadline || !self.errors.is_empty() {
                return false;
            }
            spin_sleep::sleep(Duration::from_millis(1));
        }
        true
    }
}

/// The writer's handle to a cpal stream.
struct Stream {
    format: StreamFormat,
    queue: Option<ChunkQueue>,
    /// Playback duration of the last chunk written.
    last_chunk: Duration,
    shutdown_tx: Option<Sender<()>>,
    owner: Option<JoinHandle<()>>,
}

impl Stream {
    fn playback_duration(&self, samples: usize) -> Duration {
        let frames = samples / usize::from(self.format.channels.max(1));
        Duration::from_secs_f64(frames as f64 / f64::from(self.format.frame_rate.max(1)))
    }
}

impl OutputStream for Stream {
    fn write(&mut self, samples: &[i32]) -> Result<(), DeviceError> {
        let chunk: Vec<f32> = samples
            .iter()
            .map(|&sample| self.format.to_f32(sample))
            .collect();
        self.last_chunk = self.playback_duration(samples.len());
        let timeout = (self.last_chunk * WRITE_TIMEOUT_CHUNKS).max(MIN_WRITE_TIMEOUT);
        match self.queue.as_mut() {
            Some(queue) => queue.push(chunk, timeout),
            None => Err(DeviceError::Write("output stream closed".to_string())),
        }
    }

    fn drain(&mut self) {
        // One chunk queued and one in the callback.
        let limit = self.last_chunk * 2 + DRAIN_SLACK;
        if let Some(queue) = self.queue.as_ref() {
            if !queue.drain(limit) {
                warn!(limit = ?limit, "CPAL output stream did not drain before close");
            }
        }
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        // Disconnecting both channels releases the owner thread and drops the cpal stream.
        self.queue.take();
        self.shutdown_tx.take();
        if let Some(owner) = self.owner.take() {
            if owner.join().is_err() {
                error!("CPAL stream thread panicked");
            }
        }
    }
}
