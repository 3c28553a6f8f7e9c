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

use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{debug, info, warn};

/// Default priority for the playback thread.
pub const DEFAULT_PLAYBACK_THREAD_PRIORITY: u8 = 70;

/// Converts a configured priority (0-99) into a thread priority.
pub fn playback_thread_priority(priority: u8) -> Option<ThreadPriorityValue> {
    ThreadPriorityValue::try_from(priority).ok()
}

/// Raises the priority of the calling thread. Failures are logged and otherwise ignored.
pub fn configure_playback_thread_priority(priority: Option<ThreadPriorityValue>, rt_audio: bool) {
    let Some(priority) = priority else {
        warn!("Invalid playback thread priority, leaving it unchanged");
        return;
    };
    let tp = ThreadPriority::Crossplatform(priority);
    if let Err(e) = set_current_thread_priority(tp) {
        debug!(error = ?e, "Unable to raise playback thread priority");
    }

    #[cfg(unix)]
    if rt_audio {
        use thread_priority::unix::{
            set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
            ThreadSchedulePolicy,
        };
        let tid = thread_native_id();
        match set_thread_priority_and_policy(
            tid,
            tp,
            ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
        ) {
            Ok(()) => {
                info!("Enabled RT SCHED_FIFO for playback thread");
            }
            Err(e) => {
                warn!(
                    error = ?e,
                    "Failed to set RT SCHED_FIFO for playback thread"
                );
            }
        }
    }

    #[cfg(not(unix))]
    let _ = rt_audio;
}
