// Copyright (C) 2024 Michael Wilson <mike@mdwn.dev>
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
    path::Path,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{info, span, Level, Span};

use crate::{
    audio::{self, DecodeError, DecodedAudio},
    playsync::Command,
    progress::{progress_channel, Completion, ProgressReceiver, ProgressSender, Tick},
    session::{Session, SessionSettings},
};

/// What a play request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// A new session was started.
    Started(u64),
    /// The live session was moved to the new offset.
    Redirected(u64),
}

/// Errors returned by the player.
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error("no audio loaded")]
    NoAudioLoaded,

    #[error("unable to start playback thread: {0}")]
    Spawn(#[from] io::Error),
}

/// Plays decoded audio through an output device, one session at a time.
pub struct Player {
    /// The device to play audio through.
    device: Arc<dyn audio::Device>,
    /// Settings every session is started with.
    settings: SessionSettings,
    /// The loaded audio. Replaced as a whole on load.
    audio: Mutex<Option<DecodedAudio>>,
    /// The current session, if any. There is never more than one.
    session: Mutex<Option<Session>>,
    /// Where play() starts from: the last requested offset.
    start_at: Mutex<f64>,
    next_id: AtomicU64,
    /// The id of the most recently started session, 0 before the first.
    current_id: AtomicU64,
    progress_tx: ProgressSender,
    progress_rx: ProgressReceiver,
    completion_tx: Sender<Completion>,
    completion_rx: Receiver<Completion>,
    /// The logging span.
    span: Span,
}

impl Player {
    /// Creates a new player.
    pub fn new(device: Arc<dyn audio::Device>, settings: SessionSettings) -> Player {
        let (progress_tx, progress_rx) = progress_channel();
        let (completion_tx, completion_rx) = crossbeam_channel::unbounded();
        Player {
            device,
            settings,
            audio: Mutex::new(None),
            session: Mutex::new(None),
            start_at: Mutex::new(0.0),
            next_id: AtomicU64::new(1),
            current_id: AtomicU64::new(0),
            progress_tx,
            progress_rx,
            completion_tx,
            completion_rx,
            span: span!(Level::INFO, "player"),
        }
    }

    /// Decodes the given file and makes it the loaded audio. Any playback is stopped first. If
    /// decoding fails, the previously loaded audio stays loaded. The player stays usable while the
    /// file decodes.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<DecodedAudio, DecodeError> {
        let _enter = self.span.enter();
        let path = path.as_ref();

        let session = self.session.lock().take();
        Player::stop_and_join(session);

        let audio = DecodedAudio::from_file(path)?;
        info!(
            file = %path.display(),
            channels = audio.channel_count(),
            frame_rate = audio.frame_rate_hz(),
            seconds = audio.duration_seconds(),
            "Loaded audio."
        );
        self.set_audio(audio.clone());
        Ok(audio)
    }

    /// Makes already-decoded audio the loaded audio. Any playback is stopped first.
    pub fn set_audio(&self, audio: DecodedAudio) {
        let _enter = self.span.enter();
        let mut session = self.session.lock();
        Player::stop_and_join(session.take());
        *self.audio.lock() = Some(audio);
        *self.start_at.lock() = 0.0;
    }

    /// Returns the loaded audio.
    pub fn audio(&self) -> Option<DecodedAudio> {
        self.audio.lock().clone()
    }

    /// Plays from the last requested offset.
    pub fn play(&self) -> Result<PlayOutcome, PlayerError> {
        let start_at = *self.start_at.lock();
        self.play_from(start_at)
    }

    /// Plays from the given offset in seconds. A live session is redirected to the offset, which
    /// also resumes it if paused; otherwise a new session is started.
    pub fn play_from(&self, offset_seconds: f64) -> Result<PlayOutcome, PlayerError> {
        let _enter = self.span.enter();
        let offset = if offset_seconds.is_finite() {
            offset_seconds.max(0.0)
        } else {
            0.0
        };

        let mut session = self.session.lock();
        let Some(audio) = self.audio.lock().clone() else {
            info!("Nothing to play, no audio loaded.");
            return Err(PlayerError::NoAudioLoaded);
        };
        *self.start_at.lock() = offset;

        if let Some(current) = session.as_ref() {
            if current.control().redirect(offset) {
                info!(session = current.id(), offset, "Redirecting playback.");
                return Ok(PlayOutcome::Redirected(current.id()));
            }
        }

        // Whatever is left is closing or stopped. Wait for it so the device is free. Closing only
        // drains and drops the stream, so this is bounded by a few chunk durations.
        Player::stop_and_join(session.take());
        // The old session's last tick must not show up as the new session's position.
        self.progress_rx.latest();

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        info!(session = id, offset, "Starting playback.");
        *session = Some(Session::spawn(
            id,
            self.device.clone(),
            audio,
            offset,
            self.settings,
            self.progress_tx.clone(),
            self.completion_tx.clone(),
        )?);
        self.current_id.store(id, Ordering::Release);
        Ok(PlayOutcome::Started(id))
    }

    /// Pauses playback at the next chunk boundary.
    pub fn pause(&self) {
        self.send(Command::Pause);
    }

    /// Resumes paused playback.
    pub fn resume(&self) {
        self.send(Command::Resume);
    }

    /// Pauses if playing, resumes if paused.
    pub fn pause_toggle(&self) {
        if self.is_paused() {
            self.resume();
        } else {
            self.pause();
        }
    }

    /// Asks the session to stop. Doesn't wait for it.
    pub fn stop(&self) {
        self.send(Command::Stop);
    }

    /// Stops the session and waits for the device to be closed.
    pub fn stop_and_wait(&self) {
        let _enter = self.span.enter();
        let mut session = self.session.lock();
        Player::stop_and_join(session.take());
    }

    fn send(&self, command: Command) {
        let _enter = self.span.enter();
        let session = self.session.lock();
        match session.as_ref() {
            Some(session) if !session.is_closing() => {
                info!(session = session.id(), command = ?command, "Sending command.");
                session.control().send(command);
            }
            _ => info!(command = ?command, "Player is not active, ignoring command."),
        }
    }

    fn stop_and_join(session: Option<Session>) {
        if let Some(session) = session {
            session.control().send(Command::Stop);
            session.join();
        }
    }

    /// Returns true while a session is streaming or paused.
    pub fn is_playing(&self) -> bool {
        self.session
            .lock()
            .as_ref()
            .is_some_and(|session| !session.is_closing() && !session.control().is_stopped())
    }

    /// Returns true if the live session is paused.
    pub fn is_paused(&self) -> bool {
        self.session
            .lock()
            .as_ref()
            .is_some_and(|session| !session.is_closing() && session.control().is_paused())
    }

    /// Returns the id of the live session.
    pub fn session_id(&self) -> Option<u64> {
        self.session
            .lock()
            .as_ref()
            .filter(|session| !session.is_closing())
            .map(Session::id)
    }

    /// Takes the latest tick, if it belongs to the most recently started session. Ticks from older
    /// sessions are discarded.
    pub fn latest_tick(&self) -> Option<Tick> {
        let current = self.current_id.load(Ordering::Acquire);
        self.progress_rx
            .latest()
            .filter(|tick| tick.session == current)
    }

    /// Returns the receiving end of the progress channel.
    pub fn progress(&self) -> ProgressReceiver {
        self.progress_rx.clone()
    }

    /// Returns the receiving end of the completion channel.
    pub fn completions(&self) -> Receiver<Completion> {
        self.completion_rx.clone()
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        Player::stop_and_join(self.session.get_mut().take());
    }
}
