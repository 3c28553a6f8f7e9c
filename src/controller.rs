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
use std::{fmt, io, path::PathBuf, sync::Arc, time::Duration};

use tokio::{
    sync::mpsc::{self, Sender},
    task::{block_in_place, JoinError, JoinHandle},
    time::MissedTickBehavior,
};
use tracing::{error, info, span, warn, Instrument, Level};

use crate::{player::Player, progress::FinishReason, util, waveform::Waveform};

pub mod keyboard;

/// How often the playhead is redrawn while nothing else happens.
const REDRAW_INTERVAL: Duration = Duration::from_millis(50);

/// Controller events that will trigger behavior in the player.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Plays from the given offset, or from the last requested position.
    Play(Option<f64>),

    /// Pauses playback at the next chunk boundary.
    Pause,

    /// Resumes paused playback.
    Resume,

    /// The pause button: pauses if playing, resumes if paused.
    Toggle,

    /// Stops playback. If nothing is playing, does nothing.
    Stop,

    /// Plays from the given offset in seconds.
    Seek(f64),

    /// Clicks the waveform at the given column, which plays from there.
    Click(i64),

    /// Moves the hover marker to the given column.
    Hover(i64),

    /// Loads a new audio file.
    Load(PathBuf),

    /// Redraws the waveform at a new width.
    Width(usize),

    /// Stops playback and exits.
    Quit,
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

/// Which transport buttons are available, and what the pause button says.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Buttons {
    pub play_enabled: bool,
    pub pause_enabled: bool,
    pub pause_label: &'static str,
    pub stop_enabled: bool,
}

impl Buttons {
    fn from_player(player: &Player) -> Buttons {
        let active = player.is_playing();
        Buttons {
            play_enabled: !active,
            pause_enabled: active,
            pause_label: if player.is_paused() { "Resume" } else { "Pause" },
            stop_enabled: active,
        }
    }
}

impl fmt::Display for Buttons {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let button = |label: &str, enabled: bool| {
            if enabled {
                format!("[{}]", label)
            } else {
                format!("({})", label)
            }
        };
        write!(
            f,
            "{} {} {}",
            button("Play", self.play_enabled),
            button(self.pause_label, self.pause_enabled),
            button("Stop", self.stop_enabled)
        )
    }
}

/// The player and its waveform view.
pub struct Console {
    player: Player,
    waveform: Option<Waveform>,
    width: usize,
    exit_on_end: bool,
}

impl Console {
    /// Creates a console for the given player. The waveform is drawn if audio is already loaded.
    pub fn new(player: Player, width: usize, exit_on_end: bool) -> Console {
        let waveform = player
            .audio()
            .map(|audio| Waveform::render(&audio, width));
        Console {
            player,
            waveform,
            width,
            exit_on_end,
        }
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn waveform(&self) -> Option<&Waveform> {
        self.waveform.as_ref()
    }

    /// The current button state.
    pub fn buttons(&self) -> Buttons {
        Buttons::from_player(&self.player)
    }

    /// Applies an event. Returns false once the console should exit.
    pub fn apply(&mut self, event: Event) -> bool {
        match event {
            Event::Play(offset) => self.play(offset),
            Event::Pause => self.player.pause(),
            Event::Resume => self.player.resume(),
            Event::Toggle => self.player.pause_toggle(),
            Event::Stop => self.player.stop(),
            Event::Seek(seconds) => self.play(Some(seconds)),
            Event::Click(x) => match self.waveform.as_mut().map(|waveform| waveform.click(x)) {
                Some(Some(seconds)) => self.play(Some(seconds)),
                Some(None) => info!(column = x, "Click outside of the waveform."),
                None => warn!("Nothing loaded to click on."),
            },
            Event::Hover(x) => {
                if let Some(waveform) = self.waveform.as_mut() {
                    waveform.hover(x);
                    println!("{}", waveform.marker_line());
                }
            }
            Event::Load(path) => match self.player.load(&path) {
                Ok(audio) => {
                    let waveform = Waveform::render(&audio, self.width);
                    println!(
                        "{} ({})",
                        util::filename_display(&path),
                        util::duration_minutes_seconds(audio.duration())
                    );
                    println!("{}", waveform);
                    self.waveform = Some(waveform);
                }
                Err(e) => {
                    error!(err = %e, file = %path.display(), "Unable to load audio.");
                    println!("Unable to load {}: {}", path.display(), e);
                }
            },
            Event::Width(width) => {
                self.width = width.max(1);
                if let Some(waveform) = self.waveform.as_mut() {
                    waveform.rescale(self.width);
                    println!("{}", waveform);
                }
            }
            Event::Quit => {
                self.player.stop_and_wait();
                return false;
            }
        }
        println!("{}", self.buttons());
        true
    }

    fn play(&self, offset: Option<f64>) {
        let result = match offset {
            Some(offset) => self.player.play_from(offset),
            None => self.player.play(),
        };
        match result {
            Ok(outcome) => info!(outcome = ?outcome, "Playing."),
            Err(e) => {
                error!(err = %e, "Unable to play.");
                println!("Unable to play: {}", e);
            }
        }
    }

    /// Moves the playhead to the latest progress and reports finished sessions. Returns false once
    /// the console should exit.
    pub fn poll(&mut self) -> bool {
        if let Some(tick) = self.player.latest_tick() {
            if let (Some(waveform), Some(audio)) = (self.waveform.as_mut(), self.player.audio()) {
                waveform.update_playhead(tick.seconds);
                println!(
                    "{} {}",
                    waveform.marker_line(),
                    util::position_display(tick.seconds, audio.duration())
                );
            }
        }

        let mut keep_going = true;
        for completion in self.player.completions().try_iter() {
            info!(
                session = completion.session,
                reason = %completion.reason,
                "Playback ended."
            );
            println!("Playback {}.", completion.reason);
            println!("{}", self.buttons());
            if self.exit_on_end && completion.reason != FinishReason::Stopped {
                keep_going = false;
            }
        }
        keep_going
    }
}

/// Drives a console from a driver's events.
pub struct Controller {
    handle: JoinHandle<()>,
}

impl Controller {
    /// Creates a new controller with the given driver.
    pub fn new(console: Console, driver: Arc<dyn Driver>) -> Controller {
        Controller {
            handle: tokio::spawn(
                Controller::trigger_events(console, driver)
                    .instrument(span!(Level::INFO, "controller")),
            ),
        }
    }

    /// Join will block until the controller finishes.
    pub async fn join(&mut self) -> Result<(), JoinError> {
        (&mut self.handle).await
    }

    /// Triggers player events by watching the driver and getting events from it. Loading a file and
    /// stopping wait on the player, so the console runs with the worker marked as blocking.
    async fn trigger_events(mut console: Console, driver: Arc<dyn Driver>) {
        let (events_tx, mut events_rx) = mpsc::channel(1);
        let join_handle = driver.monitor_events(events_tx);
        let mut redraw = tokio::time::interval(REDRAW_INTERVAL);
        redraw.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Controller started.");
        if let Some(waveform) = console.waveform() {
            println!("{}", waveform);
        }
        println!("{}", console.buttons());

        loop {
            tokio::select! {
                event = events_rx.recv() => match event {
                    Some(event) => {
                        info!(event = ?event, "Received event.");
                        if !block_in_place(|| console.apply(event)) {
                            break;
                        }
                    }
                    None => {
                        block_in_place(|| console.player().stop_and_wait());
                        break;
                    }
                },
                _ = redraw.tick() => {
                    if !block_in_place(|| console.poll()) {
                        block_in_place(|| console.player().stop_and_wait());
                        break;
                    }
                }
            }
        }

        info!("Controller closing.");
        // The keyboard driver blocks on stdin, so it's left behind rather than awaited.
        drop(events_rx);
        if join_handle.is_finished() {
            match join_handle.await {
                Ok(Err(e)) => error!("Error from event monitor: {}", e),
                Err(e) => error!("Error waiting for event monitor to stop: {}", e),
                Ok(Ok(())) => {}
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::{io, sync::Arc, thread, time::Duration};

    use tokio::{sync::mpsc::Sender, task::JoinHandle};

    use crate::{
        audio::mock,
        player::{PlayOutcome, Player},
        session::SessionSettings,
        testutil::{eventually, ramp_audio, write_wav_with_bits},
    };

    use super::{Console, Driver, Event};

    /// Sends a fixed list of events with a pause between each.
    struct ScriptedDriver {
        events: Vec<Event>,
        delay: Duration,
    }

    impl Driver for ScriptedDriver {
        fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
            let events = self.events.clone();
            let delay = self.delay;
            tokio::task::spawn_blocking(move || {
                for event in events {
                    thread::sleep(delay);
                    if events_tx.blocking_send(event).is_err() {
                        break;
                    }
                }
                Ok(())
            })
        }
    }

    fn console(device: &mock::Device, seconds: f64, width: usize) -> Console {
        let player = Player::new(Arc::new(device.clone()), SessionSettings::default());
        player.set_audio(ramp_audio(1000, seconds));
        Console::new(player, width, false)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_controller() {
        let device = mock::Device::get("mock-device");
        let driver = Arc::new(ScriptedDriver {
            events: vec![
                Event::Hover(2),
                Event::Click(5),
                Event::Toggle,
                Event::Toggle,
                Event::Stop,
                Event::Quit,
            ],
            delay: Duration::from_millis(100),
        });
        let mut controller = super::Controller::new(console(&device, 10.0, 10), driver);

        assert!(
            controller.join().await.is_ok(),
            "Error waiting for controller",
        );

        let writes = device.writes();
        assert_eq!(writes[0].first_sample, 5000);
        assert!(writes
            .windows(2)
            .all(|pair| pair[1].first_sample == pair[0].first_sample + 50));
        assert_eq!(device.open_count(), 1);
        assert_eq!(device.close_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_controller_loads_and_plays() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav_with_bits(path.clone(), vec![(0..8000).collect()], 8000, 16).unwrap();

        let device = mock::Device::get("mock-device");
        let player = Player::new(Arc::new(device.clone()), SessionSettings::default());
        let driver = Arc::new(ScriptedDriver {
            events: vec![Event::Load(path), Event::Play(None), Event::Quit],
            delay: Duration::from_millis(100),
        });
        let mut controller = super::Controller::new(Console::new(player, 10, false), driver);

        assert!(
            controller.join().await.is_ok(),
            "Error waiting for controller",
        );
        let writes = device.writes();
        assert!(!writes.is_empty());
        assert_eq!(writes[0].len, 400);
        assert_eq!(device.open_count(), 1);
        assert_eq!(device.close_count(), 1);
    }

    #[test]
    fn test_buttons() {
        let device = mock::Device::get("mock-device");
        let mut console = console(&device, 60.0, 10);

        let buttons = console.buttons();
        assert!(buttons.play_enabled);
        assert!(!buttons.pause_enabled);
        assert!(!buttons.stop_enabled);
        assert_eq!(buttons.to_string(), "[Play] (Pause) (Stop)");

        assert!(console.apply(Event::Play(None)));
        assert_eq!(console.buttons().to_string(), "(Play) [Pause] [Stop]");

        assert!(console.apply(Event::Toggle));
        assert_eq!(console.buttons().pause_label, "Resume");
        assert!(console.apply(Event::Toggle));
        assert_eq!(console.buttons().pause_label, "Pause");

        assert!(!console.apply(Event::Quit));
        assert!(console.buttons().play_enabled);
    }

    #[test]
    fn test_click_outside_waveform_does_nothing() {
        let device = mock::Device::get("mock-device");
        let mut console = console(&device, 10.0, 10);

        assert!(console.apply(Event::Click(10)));
        assert!(console.apply(Event::Click(-1)));
        assert!(!console.player().is_playing());
        assert_eq!(console.waveform().unwrap().click_position(), 0.0);
    }

    #[test]
    fn test_seek_and_width() {
        let device = mock::Device::get("mock-device").with_speed(2.0);
        let mut console = console(&device, 10.0, 10);

        console.apply(Event::Seek(2.0));
        let id = console.player().session_id().unwrap();
        console.apply(Event::Click(8));
        assert_eq!(console.player().session_id(), Some(id));
        eventually(
            || device.writes().iter().any(|w| w.first_sample == 8000),
            "Click never moved playback",
        );

        console.apply(Event::Width(20));
        assert_eq!(console.waveform().unwrap().columns(), 20);
        assert_eq!(console.waveform().unwrap().click_position(), 8.0);
        console.apply(Event::Quit);
    }

    #[test]
    fn test_poll_moves_playhead_and_exits_on_end() {
        let device = mock::Device::get("mock-device").with_speed(20.0);
        let player = Player::new(Arc::new(device.clone()), SessionSettings::default());
        player.set_audio(ramp_audio(1000, 0.5));
        let mut console = Console::new(player, 10, true);

        assert_eq!(
            console.player().play().unwrap(),
            PlayOutcome::Started(1)
        );
        eventually(|| !device.writes().is_empty(), "Playback never started");
        thread::sleep(Duration::from_millis(100));

        let mut polls = 0;
        while console.poll() {
            polls += 1;
            assert!(polls < 200, "Playback never finished");
            thread::sleep(Duration::from_millis(10));
        }
        assert!(console.waveform().unwrap().playhead() > 0.0);
    }

    #[test]
    fn test_poll_ignores_ticks_from_stopped_session() {
        let device = mock::Device::get("mock-device").with_speed(4.0);
        let mut console = console(&device, 60.0, 10);

        console.apply(Event::Play(Some(40.0)));
        eventually(|| device.writes().len() >= 2, "Playback never started");
        console.apply(Event::Stop);
        eventually(|| !device.is_playing(), "Playback never stopped");

        console.apply(Event::Play(Some(0.0)));
        console.poll();
        let playhead = console.waveform().unwrap().playhead();
        assert!(playhead < 1.0, "playhead at {}", playhead);
        console.apply(Event::Quit);
    }

    #[test]
    fn test_load_failure_keeps_waveform() {
        let device = mock::Device::get("mock-device");
        let mut console = console(&device, 10.0, 10);

        let dir = tempfile::tempdir().unwrap();
        assert!(console.apply(Event::Load(dir.path().join("missing.wav"))));
        assert!(console.waveform().is_some());
        assert_eq!(console.player().audio().unwrap().frame_count(), 10000);
    }
}
