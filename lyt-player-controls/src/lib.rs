use std::{ops::RangeInclusive, time::Duration};

use error::Error;
use now_playing::NowPlaying;
use tokio::sync::watch;

pub use lyt_player_models::{Artwork, Playlist, Track};

pub mod controls;
pub mod engine;
pub mod error;
pub mod event_bus;
pub mod interruption;
pub mod notification;
pub mod now_playing;
pub mod player;
pub mod remote;
pub mod scheduler;
pub mod session;
pub mod simulated;
mod timer;

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub type StatusReceiver = watch::Receiver<Status>;
pub type PositionReceiver = watch::Receiver<Duration>;
pub type NowPlayingReceiver = watch::Receiver<Option<NowPlaying>>;

/// Rates a caller may request.
pub const PLAYBACK_RATES: RangeInclusive<f32> = 0.5..=2.0;

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    #[default]
    Stopped,
    SettingUp,
    Ready,
    Playing,
    Paused,
    Buffering,
    WaitingForConnection,
    Failed,
}

impl Status {
    /// Playing, or about to continue playing once data arrives.
    pub fn is_active(&self) -> bool {
        matches!(self, Status::Playing | Status::Buffering)
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// How many tracks past the current one are kept loaded in the engine.
    pub lookahead: usize,
    pub notification_capacity: usize,
    pub tick_interval: Duration,
    pub initial_rate: f32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            lookahead: 1,
            notification_capacity: 64,
            tick_interval: Duration::from_millis(500),
            initial_rate: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config: PlayerConfig = serde_json::from_str(r#"{ "lookahead": 2 }"#).unwrap();

        assert_eq!(config.lookahead, 2);
        assert_eq!(config.notification_capacity, 64);
        assert_eq!(config.tick_interval, Duration::from_millis(500));
        assert_eq!(config.initial_rate, 1.0);
    }
}
