use std::time::Duration;

use lyt_player_models::{Artwork, Playlist};
use snafu::prelude::*;
use tokio::sync::mpsc::UnboundedSender;

use crate::{
    PLAYBACK_RATES, Result,
    error::{InvalidIndexSnafu, InvalidRateSnafu},
    notification::Completion,
};

#[derive(Debug)]
pub enum ControlCommand {
    Load { playlist: Playlist, index: usize },
    Play,
    Pause,
    PlayPause,
    Stop,
    Next { completion: Completion },
    Previous { completion: Completion },
    SkipTo { index: usize, completion: Completion },
    Seek { time: Duration, completion: Completion },
    SetPlaybackRate { rate: f32 },
    CacheArtwork { index: usize, artwork: Artwork },
    Quit,
}

/// Handle for sending commands to a running player loop.
#[derive(Debug, Clone)]
pub struct Controls {
    tx: UnboundedSender<ControlCommand>,
}

impl Controls {
    pub fn new(tx: UnboundedSender<ControlCommand>) -> Self {
        Self { tx }
    }

    fn send(&self, command: ControlCommand) -> Result<()> {
        self.tx.send(command)?;
        Ok(())
    }

    /// Replaces the playlist and prepares `index` for playback.
    pub fn load(&self, playlist: Playlist, index: usize) -> Result<()> {
        let count = playlist.len();
        ensure!(index < count, InvalidIndexSnafu { index, count });

        self.send(ControlCommand::Load { playlist, index })
    }

    pub fn play(&self) -> Result<()> {
        self.send(ControlCommand::Play)
    }

    pub fn pause(&self) -> Result<()> {
        self.send(ControlCommand::Pause)
    }

    pub fn play_pause(&self) -> Result<()> {
        self.send(ControlCommand::PlayPause)
    }

    pub fn stop(&self) -> Result<()> {
        self.send(ControlCommand::Stop)
    }

    pub fn next(&self, completion: Completion) -> Result<()> {
        self.send(ControlCommand::Next { completion })
    }

    pub fn previous(&self, completion: Completion) -> Result<()> {
        self.send(ControlCommand::Previous { completion })
    }

    pub fn skip_to(&self, index: usize, completion: Completion) -> Result<()> {
        self.send(ControlCommand::SkipTo { index, completion })
    }

    /// The completion only runs if the current track is ready to seek.
    pub fn seek(&self, time: Duration, completion: Completion) -> Result<()> {
        self.send(ControlCommand::Seek { time, completion })
    }

    pub fn set_playback_rate(&self, rate: f32) -> Result<()> {
        ensure!(PLAYBACK_RATES.contains(&rate), InvalidRateSnafu { rate });

        self.send(ControlCommand::SetPlaybackRate { rate })
    }

    pub fn cache_artwork(&self, index: usize, artwork: Artwork) -> Result<()> {
        self.send(ControlCommand::CacheArtwork { index, artwork })
    }

    pub fn quit(&self) -> Result<()> {
        self.send(ControlCommand::Quit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use lyt_player_models::Track;
    use tokio::sync::mpsc;
    use url::Url;

    fn playlist(count: usize) -> Playlist {
        (0..count)
            .map(|i| {
                Track::new(
                    Url::parse(&format!("file:///{i}.mp3")).unwrap(),
                    format!("Track {i}"),
                    "Artist",
                    "Album",
                    None,
                )
            })
            .collect()
    }

    #[test]
    fn load_checks_index_before_sending() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let controls = Controls::new(tx);

        assert_eq!(
            controls.load(playlist(2), 2),
            Err(Error::InvalidIndex { index: 2, count: 2 })
        );
        assert_eq!(
            controls.load(Playlist::new(), 0),
            Err(Error::InvalidIndex { index: 0, count: 0 })
        );
        assert!(rx.try_recv().is_err());

        controls.load(playlist(2), 1).unwrap();
        assert!(matches!(
            rx.try_recv(),
            Ok(ControlCommand::Load { index: 1, .. })
        ));
    }

    #[test]
    fn rate_outside_range_is_rejected() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let controls = Controls::new(tx);

        assert_eq!(
            controls.set_playback_rate(0.3),
            Err(Error::InvalidRate { rate: 0.3 })
        );
        assert_eq!(
            controls.set_playback_rate(2.5),
            Err(Error::InvalidRate { rate: 2.5 })
        );
        assert!(rx.try_recv().is_err());

        controls.set_playback_rate(1.5).unwrap();
        assert!(matches!(
            rx.try_recv(),
            Ok(ControlCommand::SetPlaybackRate { rate }) if rate == 1.5
        ));
    }

    #[test]
    fn closed_loop_reports_send_error() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        assert_eq!(Controls::new(tx).play(), Err(Error::SendError));
    }
}
