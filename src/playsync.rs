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
use std::sync::{Condvar, Mutex, MutexGuard};

/// A control intent for a playback session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Park the chunk loop at the next chunk boundary.
    Pause,
    /// Wake a parked chunk loop.
    Resume,
    /// End the session.
    Stop,
}

/// What the chunk loop should do at a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Checkpoint {
    /// Keep writing the current partition.
    Continue,
    /// Discard the rest of the partition and restart at the given offset in seconds.
    Seek(f64),
    /// Leave the loop.
    Stop,
}

/// The control fields shared between the control thread and the chunk loop.
#[derive(Debug)]
struct ControlState {
    /// Cleared by a stop request.
    running: bool,
    /// Owned by the controller; callers only send Pause/Resume.
    paused: bool,
    /// A pending redirect. Only the latest one matters.
    seek: Option<f64>,
    /// Set by the chunk loop once it has stopped streaming. A closing session can't be redirected.
    closing: bool,
}

/// The session control is shared by the player and the chunk loop. Every field lives behind a single
/// mutex, and every change is followed by a broadcast while the mutex is still held, so a waiter that
/// rechecks its predicate after waking can never miss a command.
#[derive(Debug)]
pub struct SessionControl {
    state: Mutex<ControlState>,
    condvar: Condvar,
}

impl SessionControl {
    /// Creates a new session control with a pending seek to the start offset.
    pub fn new(start_seconds: f64) -> SessionControl {
        SessionControl {
            state: Mutex::new(ControlState {
                running: true,
                paused: false,
                seek: Some(start_seconds),
                closing: false,
            }),
            condvar: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ControlState> {
        // Every update is a single field write, so a poisoned state is still consistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Applies a command and wakes any waiter.
    pub fn send(&self, command: Command) {
        let mut state = self.lock();
        match command {
            Command::Pause => state.paused = true,
            Command::Resume => state.paused = false,
            Command::Stop => state.running = false,
        }
        self.condvar.notify_all();
    }

    /// Redirects the session to a new offset. Returns false if the session is already closing, in
    /// which case the caller has to start a new one. A redirect also resumes a paused session.
    pub fn redirect(&self, seconds: f64) -> bool {
        let mut state = self.lock();
        if state.closing || !state.running {
            return false;
        }
        state.seek = Some(seconds);
        state.paused = false;
        self.condvar.notify_all();
        true
    }

    /// Returns true if the session is paused.
    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    /// Returns true if a stop has been requested.
    pub fn is_stopped(&self) -> bool {
        !self.lock().running
    }

    /// Returns true once the chunk loop has left streaming.
    pub fn is_closing(&self) -> bool {
        self.lock().closing
    }

    /// Called by the chunk loop before each chunk. A stop wins over a pending seek.
    pub fn checkpoint(&self) -> Checkpoint {
        let mut state = self.lock();
        if !state.running {
            return Checkpoint::Stop;
        }
        match state.seek.take() {
            Some(seconds) => Checkpoint::Seek(seconds),
            None => Checkpoint::Continue,
        }
    }

    /// Called by the chunk loop after each chunk. Blocks while paused, until resumed, redirected,
    /// or stopped. Returns true if the loop was parked.
    pub fn wait_while_paused(&self) -> bool {
        let state = self.lock();
        if !Self::parked(&state) {
            return false;
        }
        let _unused = self
            .condvar
            .wait_while(state, |state| Self::parked(state))
            .unwrap_or_else(|e| e.into_inner());
        true
    }

    fn parked(state: &ControlState) -> bool {
        state.paused && state.running && state.seek.is_none()
    }

    /// Marks the session as closing. Called by the chunk loop once it has stopped streaming.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closing = true;
        self.condvar.notify_all();
    }

    /// Called by the chunk loop when it runs out of audio. A redirect that raced with the end of
    /// the audio is returned instead of closing, so an accepted redirect is never dropped.
    pub fn close_unless_redirected(&self) -> Option<f64> {
        let mut state = self.lock();
        if state.running {
            if let Some(seconds) = state.seek.take() {
                return Some(seconds);
            }
        }
        state.closing = true;
        self.condvar.notify_all();
        None
    }
}
