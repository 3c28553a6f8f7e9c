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
use std::{io, path::PathBuf, str::FromStr};

use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, span, warn, Level};

use super::Event;

const PLAY: &str = "play";
const PAUSE: &str = "pause";
const RESUME: &str = "resume";
const TOGGLE: &str = "toggle";
const STOP: &str = "stop";
const SEEK: &str = "seek";
const CLICK: &str = "click";
const HOVER: &str = "hover";
const LOAD: &str = "load";
const WIDTH: &str = "width";
const QUIT: &str = "quit";

/// Input the keyboard driver couldn't turn into an event.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ParseError {
    #[error("unrecognized command {0}")]
    Unrecognized(String),

    #[error("{0} needs an argument")]
    MissingArgument(&'static str),

    #[error("invalid argument for {command}: {value}")]
    InvalidArgument {
        command: &'static str,
        value: String,
    },
}

fn argument<T: FromStr>(command: &'static str, value: Option<&str>) -> Result<T, ParseError> {
    let value = value.ok_or(ParseError::MissingArgument(command))?;
    value.parse().map_err(|_| ParseError::InvalidArgument {
        command,
        value: value.to_string(),
    })
}

/// Parses a line of input. Empty input parses to no event.
pub fn parse(input: &str) -> Result<Option<Event>, ParseError> {
    let input = input.trim();
    let (command, rest) = match input.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, Some(rest.trim()).filter(|rest| !rest.is_empty())),
        None => (input, None),
    };

    Ok(Some(match command.to_lowercase().as_str() {
        "" => return Ok(None),
        PLAY => match rest {
            Some(_) => Event::Play(Some(argument(PLAY, rest)?)),
            None => Event::Play(None),
        },
        PAUSE => Event::Pause,
        RESUME => Event::Resume,
        TOGGLE => Event::Toggle,
        STOP => Event::Stop,
        SEEK => Event::Seek(argument(SEEK, rest)?),
        CLICK => Event::Click(argument(CLICK, rest)?),
        HOVER => Event::Hover(argument(HOVER, rest)?),
        LOAD => Event::Load(PathBuf::from(rest.ok_or(ParseError::MissingArgument(LOAD))?)),
        WIDTH => Event::Width(argument(WIDTH, rest)?),
        QUIT => Event::Quit,
        _ => return Err(ParseError::Unrecognized(command.to_string())),
    }))
}

/// A controller that controls a player using the keyboard.
pub struct Driver {}

impl Driver {
    pub fn new() -> Driver {
        Driver {}
    }

    /// Reads and forwards one command. Returns false at the end of input.
    fn monitor_io<R, W>(events_tx: &Sender<Event>, mut reader: R, mut writer: W) -> io::Result<bool>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(
            writer,
            "Command ({} [SECONDS], {}, {}, {}, {}, {} SECONDS, {} COLUMN, {} COLUMN, {} PATH, {} COLUMNS, {}): ",
            PLAY, PAUSE, RESUME, TOGGLE, STOP, SEEK, CLICK, HOVER, LOAD, WIDTH, QUIT,
        )?;
        writer.flush()?;
        let mut input: String = String::default();
        if reader.read_line(&mut input)? == 0 {
            events_tx
                .blocking_send(Event::Quit)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            return Ok(false);
        }

        match parse(&input) {
            Ok(Some(event)) => events_tx
                .blocking_send(event)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?,
            Ok(None) => {}
            Err(e) => {
                warn!(input = input.trim(), err = %e, "Unrecognized input");
                writeln!(writer, "{}", e)?;
            }
        }
        Ok(true)
    }
}

impl Default for Driver {
    fn default() -> Self {
        Driver::new()
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!("Keyboard driver started.");

            while Self::monitor_io(&events_tx, io::stdin().lock(), io::stdout())? {}
            info!("Keyboard input closed.");
            Ok(())
        })
    }
}

#[cfg(test)]
mod test {
    use std::{
        io::{self, BufReader, BufWriter},
        path::PathBuf,
    };

    use tokio::sync::mpsc;

    use crate::controller::{keyboard::*, Event};

    use super::{Driver, PLAY};

    fn get_event(event: &str) -> Result<Option<Event>, io::Error> {
        let (sender, mut receiver) = mpsc::channel::<Event>(1);

        let reader_bytes = event.as_bytes();
        let reader = BufReader::new(reader_bytes);

        let writer_bytes: Vec<u8> = vec![0; 255];
        let writer = BufWriter::new(writer_bytes);
        Driver::monitor_io(&sender, reader, writer)?;

        // Force the sender to close.
        drop(sender);
        Ok(receiver.blocking_recv())
    }

    #[test]
    fn test_keyboard_events() -> Result<(), io::Error> {
        assert_eq!(Event::Play(None), get_event(PLAY)?.unwrap());
        assert_eq!(Event::Play(Some(1.5)), get_event("play 1.5\n")?.unwrap());
        assert_eq!(Event::Pause, get_event(PAUSE)?.unwrap());
        assert_eq!(Event::Resume, get_event(RESUME)?.unwrap());
        assert_eq!(Event::Toggle, get_event("TOGGLE\n")?.unwrap());
        assert_eq!(Event::Stop, get_event(STOP)?.unwrap());
        assert_eq!(Event::Seek(2.25), get_event("seek 2.25")?.unwrap());
        assert_eq!(Event::Click(12), get_event("click 12")?.unwrap());
        assert_eq!(Event::Hover(-3), get_event("hover -3")?.unwrap());
        assert_eq!(
            Event::Load(PathBuf::from("my song.wav")),
            get_event("load my song.wav\n")?.unwrap()
        );
        assert_eq!(Event::Width(80), get_event("width 80")?.unwrap());
        assert_eq!(Event::Quit, get_event(QUIT)?.unwrap());
        assert_eq!(None, get_event("unrecognized")?);
        assert_eq!(None, get_event("seek")?);
        assert_eq!(None, get_event("\n")?);
        Ok(())
    }

    #[test]
    fn test_end_of_input_quits() -> Result<(), io::Error> {
        assert_eq!(Event::Quit, get_event("")?.unwrap());
        Ok(())
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse("   "), Ok(None));
        assert_eq!(
            parse("rewind"),
            Err(ParseError::Unrecognized("rewind".to_string()))
        );
        assert_eq!(parse("seek"), Err(ParseError::MissingArgument(SEEK)));
        assert_eq!(parse("load  "), Err(ParseError::MissingArgument(LOAD)));
        assert_eq!(
            parse("width wide"),
            Err(ParseError::InvalidArgument {
                command: WIDTH,
                value: "wide".to_string()
            })
        );
        assert_eq!(
            parse("click 1.5"),
            Err(ParseError::InvalidArgument {
                command: CLICK,
                value: "1.5".to_string()
            })
        );
    }
}
