use crate::notification::Notification;
use snafu::prelude::*;

#[derive(Snafu, Debug, Clone, PartialEq)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Invalid playlist index {index}, playlist has {count} tracks"))]
    InvalidIndex { index: usize, count: usize },
    #[snafu(display("No playlist loaded"))]
    NoPlaylist,
    #[snafu(display("Player is stopped"))]
    Stopped,
    #[snafu(display("Engine is not ready to play"))]
    EngineNotReady,
    #[snafu(display("Authentication required for {url}"))]
    AuthenticationRequired { url: String },
    #[snafu(display("{message}"))]
    Playback { message: String },
    #[snafu(display("Unable to change audio session: {message}"))]
    SessionActivation { message: String },
    #[snafu(display("Invalid playback rate {rate}, must be between 0.5 and 2.0"))]
    InvalidRate { rate: f32 },
    #[snafu(display("Seek did not finish"))]
    SeekInterrupted,
    #[snafu(display("Unable to broadcast notification"))]
    Notification,
    #[snafu(display("Player loop is not running"))]
    SendError,
}

impl Error {
    /// Errors that only concern a single track and leave the player usable.
    pub fn is_track_local(&self) -> bool {
        matches!(
            self,
            Error::AuthenticationRequired { .. } | Error::Playback { .. }
        )
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::SendError
    }
}

impl From<tokio::sync::broadcast::error::SendError<Notification>> for Error {
    fn from(_value: tokio::sync::broadcast::error::SendError<Notification>) -> Self {
        Self::Notification
    }
}
