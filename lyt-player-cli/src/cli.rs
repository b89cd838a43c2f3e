use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use clap::{Parser, Subcommand};
use lyt_player_controls::{
    PlayerConfig, Status,
    controls::Controls,
    engine::ItemId,
    interruption::{InterruptionKind, RouteChangeReason},
    notification::{Completion, Notification},
    player::Player,
    remote::RemoteCommand,
    session::{AudioSession, NoopSession, SessionSlot},
    simulated::SimulatedEngine,
};
use lyt_player_models::Playlist;
use snafu::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(short, long, env = "LYT_VERBOSITY")]
    /// Log level
    verbosity: Option<tracing::Level>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a playlist file against the simulated engine.
    Play {
        /// JSON playlist: `{ "tracks": [{ "url", "title", "artist", "album" }] }`
        playlist: PathBuf,

        #[clap(short, long, default_value_t = 0, env = "LYT_START_INDEX")]
        /// Track to start from.
        start_index: usize,

        #[clap(short, long, env = "LYT_RATE")]
        /// Playback rate between 0.5 and 2.0.
        rate: Option<f32>,

        #[clap(long, env = "LYT_LOOKAHEAD")]
        /// Number of upcoming tracks kept loaded.
        lookahead: Option<usize>,

        #[clap(long, env = "LYT_CONFIG")]
        /// JSON player configuration. Flags override its values.
        config: Option<PathBuf>,

        #[clap(long, default_value_t = 10, env = "LYT_TRACK_SECONDS")]
        /// Length of every simulated track.
        track_seconds: u64,

        #[clap(long, default_value_t = 300, env = "LYT_LOAD_MS")]
        /// Time the simulated engine takes to load a track.
        load_ms: u64,
    },
}

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Unable to read {}: {source}", path.display()))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Invalid JSON in {}: {source}", path.display()))]
    ParseFile {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[snafu(display("Unable to read commands: {source}"))]
    Stdin { source: std::io::Error },
    #[snafu(display("{error}"))]
    PlayerError { error: String },
}

impl From<lyt_player_controls::error::Error> for Error {
    fn from(error: lyt_player_controls::error::Error) -> Self {
        Error::PlayerError {
            error: error.to_string(),
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, Error> {
    let contents = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
    serde_json::from_str(&contents).context(ParseFileSnafu { path })
}

pub async fn run() -> Result<(), Error> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .with_target(false)
        .compact()
        .init();

    match cli.command {
        Commands::Play {
            playlist,
            start_index,
            rate,
            lookahead,
            config,
            track_seconds,
            load_ms,
        } => {
            let playlist: Playlist = read_json(&playlist)?;

            let mut config = match config {
                Some(path) => read_json(&path)?,
                None => PlayerConfig::default(),
            };
            if let Some(lookahead) = lookahead {
                config.lookahead = lookahead;
            }

            let (engine, events) = SimulatedEngine::new();
            engine.set_track_duration(Duration::from_secs(track_seconds));

            let session = AudioSession::new(Box::new(NoopSession), SessionSlot::new());
            let mut player = Player::new(engine.clone(), events, session, &config);
            player.on_stalled(|| warn!("track needs authentication, playback paused"));

            let controls = player.controls();
            let mut status = player.status_receiver();

            tokio::spawn(log_notifications(player.notify_receiver()));
            tokio::spawn(drive_engine(engine.clone(), Duration::from_millis(load_ms)));
            let player_handle = tokio::spawn(async move { player.player_loop().await });

            controls.load(playlist, start_index)?;
            if let Some(rate) = rate {
                controls.set_playback_rate(rate)?;
            }
            controls.play()?;

            let quit = read_commands(&controls, &engine).await?;

            // Input closed without `quit`: let the playlist finish.
            if !quit {
                if !status.has_changed().unwrap_or(true) {
                    let _ = status.wait_for(|status| *status != Status::Stopped).await;
                }
                let _ = status.wait_for(|status| *status == Status::Stopped).await;
            }

            controls.quit()?;
            if let Ok(Err(error)) = player_handle.await {
                return Err(error.into());
            }

            Ok(())
        }
    }
}

/// Returns `true` when `quit` was read, `false` when input closed.
async fn read_commands(controls: &Controls, engine: &SimulatedEngine) -> Result<bool, Error> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.context(StdinSnafu)? {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            continue;
        };
        let argument = words.next();

        let result = match (command, argument) {
            ("play", _) => controls.remote(RemoteCommand::Play),
            ("pause", _) => controls.remote(RemoteCommand::Pause),
            ("toggle", _) => controls.remote(RemoteCommand::TogglePlayPause),
            ("next", _) => controls.next(report("next")),
            ("prev" | "previous", _) => controls.previous(report("previous")),
            ("stop", _) => controls.stop(),
            ("skip", Some(index)) => match index.parse() {
                Ok(index) => controls.skip_to(index, report("skip")),
                Err(_) => {
                    println!("skip needs a track number");
                    continue;
                }
            },
            ("seek", Some(seconds)) => match seconds
                .parse::<f64>()
                .ok()
                .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok())
            {
                Some(time) => controls.seek(time, report("seek")),
                None => {
                    println!("seek needs a number of seconds");
                    continue;
                }
            },
            ("rate", Some(rate)) => match rate.parse() {
                Ok(rate) => controls.remote(RemoteCommand::ChangePlaybackRate(rate)),
                Err(_) => {
                    println!("rate needs a number");
                    continue;
                }
            },
            ("interrupt", _) => {
                engine.interrupt(InterruptionKind::Began);
                Ok(())
            }
            ("resume", _) => {
                engine.interrupt(InterruptionKind::Ended);
                Ok(())
            }
            ("unplug", _) => {
                engine.change_route(RouteChangeReason::OldDeviceUnavailable);
                Ok(())
            }
            ("quit" | "exit", _) => return Ok(true),
            _ => {
                println!(
                    "commands: play, pause, toggle, next, prev, skip <n>, seek <s>, rate <r>, \
                     stop, interrupt, resume, unplug, quit"
                );
                continue;
            }
        };

        rejected_command(command, result)?;
    }

    Ok(false)
}

/// A rejected command is printed and input continues; only a stopped
/// player loop ends the session.
fn rejected_command(command: &str, result: lyt_player_controls::Result<()>) -> Result<(), Error> {
    match result {
        Ok(()) => Ok(()),
        Err(error @ lyt_player_controls::error::Error::SendError) => Err(error.into()),
        Err(error) => {
            println!("{command}: {error}");
            Ok(())
        }
    }
}

fn report(command: &'static str) -> Completion {
    Completion::new(move |result| match result {
        Ok(()) => debug!(command, "done"),
        Err(error) => println!("{command}: {error}"),
    })
}

async fn log_notifications(mut receiver: tokio::sync::broadcast::Receiver<Notification>) {
    loop {
        match receiver.recv().await {
            Ok(notification) => match notification {
                Notification::StateChanged { from, to } => info!(?from, ?to, "state"),
                Notification::TrackChanged { track } => {
                    println!("▶ {} - {} ({})", track.artist, track.title, track.album);
                }
                Notification::TrackFinished { track } => info!(title = %track.title, "finished"),
                Notification::DurationFound { duration, track } => {
                    debug!(title = %track.title, ?duration, "duration")
                }
                Notification::BufferingProgress { buffered, track } => {
                    debug!(title = %track.title, ?buffered, "buffered")
                }
                Notification::Stalled { track } => {
                    warn!(title = %track.title, "stalled")
                }
                Notification::Error { error } if error.is_track_local() => warn!(%error),
                Notification::Error { error } => error!(%error),
            },
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "notification listener lagged");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Loads queued tracks after a delay, finishes tracks that have played
/// their length and confirms seeks.
async fn drive_engine(engine: SimulatedEngine, load_delay: Duration) {
    let mut interval = tokio::time::interval(Duration::from_millis(50));
    let mut loading: HashMap<ItemId, Instant> = HashMap::new();

    loop {
        interval.tick().await;

        let pending = engine.loading();
        loading.retain(|item, _| pending.contains(item));
        for item in pending {
            let started = *loading.entry(item).or_insert_with(Instant::now);
            if started.elapsed() >= load_delay {
                engine.make_ready(item);
                loading.remove(&item);
            }
        }

        if engine.pending_seeks() > 0 {
            engine.complete_seeks(true);
        }

        if engine.current_reached_end() {
            engine.finish_current();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lyt_player_controls::error::Error as PlayerError;

    #[test]
    fn invalid_rate_keeps_reading_commands() {
        let result = rejected_command("rate", Err(PlayerError::InvalidRate { rate: f32::NAN }));
        assert!(result.is_ok());
        assert!(rejected_command("next", Ok(())).is_ok());
    }

    #[test]
    fn stopped_player_loop_ends_session() {
        let result = rejected_command("play", Err(PlayerError::SendError));
        assert!(matches!(result, Err(Error::PlayerError { .. })));
    }
}
