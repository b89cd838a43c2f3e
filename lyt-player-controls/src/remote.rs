//! Commands arriving from headset buttons, lock screens and other remote
//! surfaces, forwarded to the player loop.

use tracing::{debug, instrument};

use crate::{PLAYBACK_RATES, Result, controls::Controls, notification::Completion};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RemoteCommand {
    Play,
    Pause,
    TogglePlayPause,
    NextTrack,
    PreviousTrack,
    ChangePlaybackRate(f32),
}

impl Controls {
    /// Forwards a remote command. Rates are clamped into the supported range
    /// instead of being rejected.
    #[instrument(skip(self))]
    pub fn remote(&self, command: RemoteCommand) -> Result<()> {
        match command {
            RemoteCommand::Play => self.play(),
            RemoteCommand::Pause => self.pause(),
            RemoteCommand::TogglePlayPause => self.play_pause(),
            RemoteCommand::NextTrack => self.next(Completion::ignore()),
            RemoteCommand::PreviousTrack => self.previous(Completion::ignore()),
            RemoteCommand::ChangePlaybackRate(rate) => {
                let clamped = rate.clamp(*PLAYBACK_RATES.start(), *PLAYBACK_RATES.end());
                debug!(clamped, "remote rate change");
                self.set_playback_rate(clamped)
            }
        }
    }
}
