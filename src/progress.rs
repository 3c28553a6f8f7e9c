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
//! Notifications flowing from the chunk loop back to the control side.

use std::{fmt, time::Duration};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};

/// The playhead position after a chunk was written.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    /// The session that wrote the chunk.
    pub session: u64,
    /// Seconds from the start of the audio.
    pub seconds: f64,
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    /// The end of the audio was reached.
    Finished,
    /// A stop was requested.
    Stopped,
    /// The output device couldn't be opened.
    DeviceOpenFailed(String),
    /// The output device failed mid-stream.
    DeviceWriteFailed(String),
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinishReason::Finished => write!(f, "finished"),
            FinishReason::Stopped => write!(f, "stopped"),
            FinishReason::DeviceOpenFailed(e) => write!(f, "device open failed: {}", e),
            FinishReason::DeviceWriteFailed(e) => write!(f, "device write failed: {}", e),
        }
    }
}

/// Sent exactly once per session, after the output device has been closed.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub session: u64,
    pub reason: FinishReason,
}

/// Creates a latest-value-wins progress channel.
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = crossbeam_channel::bounded(1);
    (
        ProgressSender {
            tx,
            evict: rx.clone(),
        },
        ProgressReceiver { rx },
    )
}

/// The chunk loop's end of the progress channel. Sending never blocks: a tick nobody has read
/// yet is replaced by the newer one.
#[derive(Clone)]
pub struct ProgressSender {
    tx: Sender<Tick>,
    evict: Receiver<Tick>,
}

impl ProgressSender {
    pub fn send(&self, tick: Tick) {
        let mut tick = tick;
        loop {
            match self.tx.try_send(tick) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    let _ = self.evict.try_recv();
                    tick = rejected;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

/// The observer's end of the progress channel.
#[derive(Clone)]
pub struct ProgressReceiver {
    rx: Receiver<Tick>,
}

impl ProgressReceiver {
    /// Returns the newest tick, if one arrived since the last call.
    pub fn latest(&self) -> Option<Tick> {
        self.rx.try_iter().last()
    }

    /// Waits up to the given timeout for the next tick.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Tick> {
        match self.rx.recv_timeout(timeout) {
            Ok(tick) => Some(tick),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}
