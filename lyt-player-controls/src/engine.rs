//! Boundary to the native rendering engine.
//!
//! The player never decodes audio itself. It drives an [`Engine`] through
//! queue-style insert/remove primitives and learns about changes from the
//! [`EngineEvent`]s the engine pushes into the channel handed to the player.

use std::time::Duration;

use url::Url;

use crate::interruption::{InterruptionKind, RouteChangeReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeekId(pub u64);

/// Readiness of a single queued item.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    #[default]
    Unknown,
    Ready,
    Failed,
}

/// Readiness of the engine as a whole.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    #[default]
    Unknown,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemErrorKind {
    AuthenticationRequired,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemError {
    pub kind: ItemErrorKind,
    pub message: String,
}

impl ItemError {
    pub fn authentication_required(message: impl Into<String>) -> Self {
        Self {
            kind: ItemErrorKind::AuthenticationRequired,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self {
            kind: ItemErrorKind::Other,
            message: message.into(),
        }
    }
}

/// Identity of something the player can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Observed {
    Player,
    Item(ItemId),
    Session,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    Status,
    LoadedTimeRanges,
    PlaybackBufferEmpty,
    PlaybackLikelyToKeepUp,
    DidPlayToEnd,
    CurrentItem,
    Rate,
    Interruption,
    RouteChange,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    ItemStatusChanged {
        item: ItemId,
        status: ItemStatus,
        error: Option<ItemError>,
    },
    ItemLoadedRanges {
        item: ItemId,
        buffered: Duration,
    },
    ItemBufferEmpty {
        item: ItemId,
    },
    ItemLikelyToKeepUp {
        item: ItemId,
    },
    ItemDidPlayToEnd {
        item: ItemId,
    },
    CurrentItemChanged {
        item: Option<ItemId>,
    },
    StatusChanged {
        status: EngineStatus,
    },
    RateChanged {
        rate: f32,
    },
    SeekCompleted {
        seek: SeekId,
        finished: bool,
    },
    Interruption {
        kind: InterruptionKind,
    },
    RouteChanged {
        reason: RouteChangeReason,
    },
}

impl EngineEvent {
    /// The observed object and property this event is a change of.
    /// Seek confirmations are answered directly and have no source.
    pub fn source(&self) -> Option<(Observed, Property)> {
        let source = match self {
            EngineEvent::ItemStatusChanged { item, .. } => (Observed::Item(*item), Property::Status),
            EngineEvent::ItemLoadedRanges { item, .. } => {
                (Observed::Item(*item), Property::LoadedTimeRanges)
            }
            EngineEvent::ItemBufferEmpty { item } => {
                (Observed::Item(*item), Property::PlaybackBufferEmpty)
            }
            EngineEvent::ItemLikelyToKeepUp { item } => {
                (Observed::Item(*item), Property::PlaybackLikelyToKeepUp)
            }
            EngineEvent::ItemDidPlayToEnd { item } => {
                (Observed::Item(*item), Property::DidPlayToEnd)
            }
            EngineEvent::CurrentItemChanged { .. } => (Observed::Player, Property::CurrentItem),
            EngineEvent::StatusChanged { .. } => (Observed::Player, Property::Status),
            EngineEvent::RateChanged { .. } => (Observed::Player, Property::Rate),
            EngineEvent::Interruption { .. } => (Observed::Session, Property::Interruption),
            EngineEvent::RouteChanged { .. } => (Observed::Session, Property::RouteChange),
            EngineEvent::SeekCompleted { .. } => return None,
        };

        Some(source)
    }
}

/// Queue-style native player.
///
/// Implementations report every change through the event channel they were
/// built with; the methods here only issue requests or read current values.
pub trait Engine: Send {
    /// Appends an item for `url` at the tail of the play queue.
    fn insert(&mut self, item: ItemId, url: &Url);
    fn remove_all(&mut self);
    fn play(&mut self);
    fn pause(&mut self);
    /// Rate used while playing. Does not start playback by itself.
    fn set_rate(&mut self, rate: f32);
    /// Current playback rate, zero while not rendering.
    fn rate(&self) -> f32;
    fn status(&self) -> EngineStatus;
    fn current_time(&self) -> Option<Duration>;
    fn item_duration(&self, item: ItemId) -> Option<Duration>;
    /// Starts a seek; completion arrives as [`EngineEvent::SeekCompleted`].
    fn seek(&mut self, seek: SeekId, to: Duration);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_events_are_keyed_by_item() {
        let item = ItemId(7);
        let event = EngineEvent::ItemDidPlayToEnd { item };
        assert_eq!(
            event.source(),
            Some((Observed::Item(item), Property::DidPlayToEnd))
        );

        let event = EngineEvent::ItemStatusChanged {
            item,
            status: ItemStatus::Ready,
            error: None,
        };
        assert_eq!(event.source(), Some((Observed::Item(item), Property::Status)));
    }

    #[test]
    fn seek_completion_has_no_source() {
        let event = EngineEvent::SeekCompleted {
            seek: SeekId(1),
            finished: true,
        };
        assert!(event.source().is_none());
    }
}
