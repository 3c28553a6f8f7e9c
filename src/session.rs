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
    io,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::Sender;
use tracing::{debug, error, info, span, Level};

use crate::{
    audio::{self, thread_priority, DecodedAudio, OutputStream},
    playsync::{Checkpoint, SessionControl},
    progress::{Completion, FinishReason, ProgressSender, Tick},
};

/// The default chunk duration. Pause and seek take effect at chunk boundaries.
pub const DEFAULT_CHUNK_DURATION: Duration = Duration::from_millis(50);

/// The chunk loop's states. Logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Opening,
    Streaming,
    Paused,
    Restarting,
    Closing,
}

/// Settings that stay fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// How much audio each device write carries.
    pub chunk_duration: Duration,
    /// Priority for the playback thread (0-99).
    pub thread_priority: u8,
    /// Attempt SCHED_FIFO for the playback thread.
    pub realtime: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            chunk_duration: DEFAULT_CHUNK_DURATION,
            thread_priority: thread_priority::DEFAULT_PLAYBACK_THREAD_PRIORITY,
            realtime: false,
        }
    }
}

/// Everything the chunk loop needs, moved onto the session thread.
struct ChunkLoop {
    id: u64,
    device: Arc<dyn audio::Device>,
    audio: DecodedAudio,
    settings: SessionSettings,
    control: Arc<SessionControl>,
    progress: ProgressSender,
    state: SessionState,
}

/// One background playback run, from device open to device close.
pub struct Session {
    id: u64,
    control: Arc<SessionControl>,
    join: JoinHandle<()>,
}

impl Session {
    /// Starts a session thread that plays the audio from the given offset. The device is opened on
    /// the session thread, and exactly one completion is sent once it has been closed again.
    pub fn spawn(
        id: u64,
        device: Arc<dyn audio::Device>,
        audio: DecodedAudio,
        start_seconds: f64,
        settings: SessionSettings,
        progress: ProgressSender,
        completions: Sender<Completion>,
    ) -> Result<Session, io::Error> {
        let control = Arc::new(SessionControl::new(start_seconds.max(0.0)));
        let chunk_loop = ChunkLoop {
            id,
            device,
            audio,
            settings,
            control: control.clone(),
            progress,
            state: SessionState::Idle,
        };

        let join = thread::Builder::new()
            .name(format!("playback-{}", id))
            .spawn(move || {
                let span = span!(Level::INFO, "session", id = id);
                let _enter = span.enter();

                let reason = chunk_loop.run();
                info!(reason = %reason, "Session complete.");
                if completions.send(Completion { session: id, reason }).is_err() {
                    debug!("Nobody is listening for completions.");
                }
            })?;

        Ok(Session { id, control, join })
    }

    /// The session's id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The control shared with the session thread.
    pub fn control(&self) -> &Arc<SessionControl> {
        &self.control
    }

    /// Returns true once the chunk loop has stopped streaming.
    pub fn is_closing(&self) -> bool {
        self.control.is_closing() || self.join.is_finished()
    }

    /// Waits for the session thread to exit.
    pub fn join(self) {
        if let Err(e) = self.join.join() {
            error!(session = self.id, "Playback thread panicked: {:?}", e);
        }
    }
}

impl ChunkLoop {
    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "Session state change.");
            self.state = next;
        }
    }

    fn run(mut self) -> FinishReason {
        thread_priority::configure_playback_thread_priority(
            thread_priority::playback_thread_priority(self.settings.thread_priority),
            self.settings.realtime,
        );

        self.transition(SessionState::Opening);
        let format = self.audio.stream_format();
        let mut stream = match self.device.open(&format) {
            Ok(stream) => stream,
            Err(e) => {
                error!(err = %e, device = %self.device, "Unable to open output device");
                self.control.close();
                self.transition(SessionState::Idle);
                return FinishReason::DeviceOpenFailed(e.to_string());
            }
        };
        info!(device = %self.device, format = %format, "Opened output device.");

        let reason = self.stream_chunks(stream.as_mut());

        self.transition(SessionState::Closing);
        self.control.close();
        if reason == FinishReason::Finished {
            // Let the tail of the audio play out before the device goes away.
            stream.drain();
        }
        drop(stream);
        self.transition(SessionState::Idle);
        reason
    }

    /// Writes the audio one chunk at a time until the end, a stop, or a device failure. The device
    /// write blocks for roughly a chunk's worth of playback, which is what paces the loop.
    fn stream_chunks(&mut self, stream: &mut dyn OutputStream) -> FinishReason {
        let frames_per_chunk = self
            .audio
            .stream_format()
            .frames_for(self.settings.chunk_duration);
        let total_frames = self.audio.frame_count();
        // Nothing plays until the start offset comes through the first checkpoint.
        let mut position = total_frames;

        loop {
            match self.control.checkpoint() {
                Checkpoint::Stop => return FinishReason::Stopped,
                Checkpoint::Seek(seconds) => {
                    if self.state == SessionState::Streaming {
                        self.transition(SessionState::Restarting);
                    }
                    position = self.audio.frame_at(seconds);
                    debug!(seconds, frame = position, "Seeking.");
                    self.transition(SessionState::Streaming);
                    continue;
                }
                Checkpoint::Continue => {}
            }

            if position >= total_frames {
                match self.control.close_unless_redirected() {
                    Some(seconds) => {
                        self.transition(SessionState::Restarting);
                        position = self.audio.frame_at(seconds);
                        self.transition(SessionState::Streaming);
                        continue;
                    }
                    None => return FinishReason::Finished,
                }
            }

            let end = (position + frames_per_chunk).min(total_frames);
            if let Err(e) = stream.write(self.audio.frames(position, end)) {
                error!(err = %e, "Error writing to output device");
                return FinishReason::DeviceWriteFailed(e.to_string());
            }
            position = end;

            self.progress.send(Tick {
                session: self.id,
                seconds: self.audio.time_at_frame(end),
            });

            if self.control.is_paused() {
                self.transition(SessionState::Paused);
                self.control.wait_while_paused();
                self.transition(SessionState::Streaming);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Instant;

    use crossbeam_channel::Receiver;

    use crate::{
        audio::mock,
        playsync::Command,
        progress::{progress_channel, ProgressReceiver},
        testutil::{eventually, ramp_audio},
    };

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn spawn(
        device: &mock::Device,
        audio: DecodedAudio,
        start: f64,
    ) -> (Session, ProgressReceiver, Receiver<Completion>) {
        let (progress_tx, progress_rx) = progress_channel();
        let (completion_tx, completion_rx) = crossbeam_channel::unbounded();
        let session = Session::spawn(
            1,
            Arc::new(device.clone()),
            audio,
            start,
            SessionSettings::default(),
            progress_tx,
            completion_tx,
        )
        .unwrap();
        (session, progress_rx, completion_rx)
    }

    #[test]
    fn test_plays_to_end_in_chunk_order() {
        let device = mock::Device::get("mock-device").with_speed(20.0);
        // 1000 frames/sec -> 50 frames per 50ms chunk.
        let audio = ramp_audio(1000, 1.0);
        let (session, _progress, completions) = spawn(&device, audio, 0.0);

        let completion = completions.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(completion.reason, FinishReason::Finished);
        session.join();

        let writes = device.writes();
        assert_eq!(writes.len(), 20);
        for (i, write) in writes.iter().enumerate() {
            assert_eq!(write.first_sample, i as i32 * 50);
            assert_eq!(write.len, 50);
        }
        assert_eq!(device.open_count(), 1);
        assert_eq!(device.close_count(), 1);
        assert_eq!(device.drain_count(), 1);
    }

    #[test]
    fn test_offset_past_end_writes_nothing() {
        let device = mock::Device::get("mock-device");
        let (session, progress, completions) = spawn(&device, ramp_audio(1000, 4.0), 10.0);

        let completion = completions.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(completion.reason, FinishReason::Finished);
        session.join();

        assert!(device.writes().is_empty());
        assert_eq!(progress.latest(), None);
        assert_eq!(device.close_count(), 1);
    }

    #[test]
    fn test_open_failure_reports_and_closes_nothing() {
        let device = mock::Device::get("mock-device").failing_open();
        let (session, _progress, completions) = spawn(&device, ramp_audio(1000, 1.0), 0.0);

        let completion = completions.recv_timeout(TIMEOUT).unwrap();
        assert!(matches!(
            completion.reason,
            FinishReason::DeviceOpenFailed(_)
        ));
        assert!(session.is_closing());
        session.join();
        assert_eq!(device.close_count(), 0);
    }

    #[test]
    fn test_write_failure_closes_device() {
        let device = mock::Device::get("mock-device")
            .with_speed(20.0)
            .failing_after_writes(3);
        let (session, _progress, completions) = spawn(&device, ramp_audio(1000, 1.0), 0.0);

        let completion = completions.recv_timeout(TIMEOUT).unwrap();
        assert!(matches!(
            completion.reason,
            FinishReason::DeviceWriteFailed(_)
        ));
        session.join();
        assert_eq!(device.writes().len(), 3);
        assert_eq!(device.close_count(), 1);
        assert_eq!(device.drain_count(), 0);
    }

    #[test]
    fn test_stop_while_paused_terminates() {
        let device = mock::Device::get("mock-device");
        let (session, _progress, completions) = spawn(&device, ramp_audio(1000, 60.0), 0.0);
        session.control().send(Command::Pause);

        eventually(|| !device.writes().is_empty(), "Nothing was ever written");
        // Give the loop time to park after its first chunk.
        thread::sleep(Duration::from_millis(150));
        let parked_writes = device.writes().len();

        let start = Instant::now();
        session.control().send(Command::Stop);
        let completion = completions.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(completion.reason, FinishReason::Stopped);
        assert!(start.elapsed() < DEFAULT_CHUNK_DURATION * 3);
        session.join();

        assert_eq!(device.writes().len(), parked_writes);
        assert_eq!(device.close_count(), 1);
        assert_eq!(device.drain_count(), 0);
    }

    #[test]
    fn test_redirect_reuses_stream() {
        let device = mock::Device::get("mock-device").with_speed(4.0);
        let (session, _progress, completions) = spawn(&device, ramp_audio(1000, 10.0), 5.0);

        eventually(|| device.writes().len() >= 2, "Playback never started");
        assert!(session.control().redirect(9.5));

        let completion = completions.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(completion.reason, FinishReason::Finished);
        session.join();

        let writes = device.writes();
        assert_eq!(writes[0].first_sample, 5000);
        assert_eq!(writes.last().unwrap().first_sample, 9950);
        assert!(writes.iter().any(|write| write.first_sample == 9500));
        assert_eq!(device.open_count(), 1);
        assert_eq!(device.close_count(), 1);
    }
}
