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
use std::{error::Error, path::PathBuf, sync::Arc};

use clap::{crate_version, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use waveplay::{
    audio::{self, DecodedAudio},
    config,
    controller::{keyboard, Console, Controller, Event},
    player::Player,
    util,
    waveform::Waveform,
};

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A waveform viewer and audio player."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plays an audio file and reads transport commands from stdin.
    Play {
        /// The audio file to play.
        file: PathBuf,
        /// Where to start playing, in seconds.
        #[arg(short, long)]
        start: Option<f64>,
        /// The device name to play through. Overrides the config.
        #[arg(short, long)]
        device: Option<String>,
        /// The path to the player config.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Exit once playback reaches the end instead of waiting for more commands.
        #[arg(long)]
        exit_on_end: bool,
    },
    /// Prints the waveform of an audio file.
    Waveform {
        /// The audio file to draw.
        file: PathBuf,
        /// The number of columns to draw across. Overrides the config.
        #[arg(short, long)]
        width: Option<usize>,
        /// The path to the player config.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Lists the available audio output devices.
    Devices {},
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Play {
            file,
            start,
            device,
            config,
            exit_on_end,
        } => {
            let player_config = config::Player::load(config.as_deref())?;
            let audio_config = match device {
                Some(device) => player_config.audio().with_device(&device),
                None => player_config.audio().clone(),
            };

            let device = audio::get_device(&audio_config)?;
            let player = Player::new(device, audio_config.session_settings()?);
            let audio = player.load(&file)?;
            println!(
                "{} ({})",
                util::filename_display(&file),
                util::duration_minutes_seconds(audio.duration())
            );

            let mut console = Console::new(player, player_config.waveform().width()?, exit_on_end);
            console.apply(Event::Play(start));
            Controller::new(console, Arc::new(keyboard::Driver::new()))
                .join()
                .await?;

            // The keyboard driver may still be blocked reading stdin.
            std::process::exit(0);
        }
        Commands::Waveform {
            file,
            width,
            config,
        } => {
            let width = match width {
                Some(width) => width,
                None => config::Player::load(config.as_deref())?.waveform().width()?,
            };
            let audio = DecodedAudio::from_file(&file)?;
            println!(
                "{} ({}, {})",
                util::filename_display(&file),
                util::duration_minutes_seconds(audio.duration()),
                audio.stream_format()
            );
            println!("{}", Waveform::render(&audio, width));
        }
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
    }

    Ok(())
}
