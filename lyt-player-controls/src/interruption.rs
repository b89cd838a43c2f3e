//! Yielding to other audio (calls, alarms) and reacting to output changes.

use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptionKind {
    Began,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteChangeReason {
    Unknown,
    NewDeviceAvailable,
    OldDeviceUnavailable,
    CategoryChange,
    Override,
    WakeFromSleep,
    NoSuitableRouteForCategory,
    RouteConfigurationChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    Pause,
    Resume,
}

#[derive(Debug, Default)]
pub struct InterruptionRecovery {
    pending: bool,
    resume_after: bool,
}

impl InterruptionRecovery {
    pub fn new() -> Self {
        Default::default()
    }

    /// An interruption has begun and not yet ended.
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn on_interruption(&mut self, kind: InterruptionKind, is_playing: bool) -> Option<Recovery> {
        match kind {
            InterruptionKind::Began => {
                info!(was_playing = is_playing, pending = self.pending, "interruption began");
                // A nested interruption keeps what the first one saw.
                if !self.pending {
                    self.resume_after = false;
                }
                self.resume_after |= is_playing;
                self.pending = true;
                Some(Recovery::Pause)
            }
            InterruptionKind::Ended => {
                let resume = self.resume_after && !is_playing;
                info!(resume, "interruption ended");
                self.pending = false;
                self.resume_after = false;
                resume.then_some(Recovery::Resume)
            }
        }
    }

    pub fn on_route_change(&self, reason: RouteChangeReason) -> Option<Recovery> {
        debug!(?reason, "route changed");
        if reason == RouteChangeReason::CategoryChange {
            return None;
        }

        Some(Recovery::Pause)
    }

    /// Playback was started explicitly, so there is nothing to resume later.
    pub fn forget_resume(&mut self) {
        self.resume_after = false;
    }
}
