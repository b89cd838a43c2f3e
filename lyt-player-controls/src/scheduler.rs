//! Keeps the engine's play queue one step ahead of playback.

use std::{collections::VecDeque, time::Duration};

use lyt_player_models::Playlist;
use tracing::{debug, instrument, warn};

use crate::{
    engine::{
        Engine, EngineEvent, EngineStatus, ItemError, ItemId, ItemStatus, Observed, Property,
    },
    event_bus::EventBus,
    interruption::{InterruptionKind, RouteChangeReason},
};

/// What an observed engine change means to the player.
#[derive(Debug, Clone, PartialEq)]
pub enum Reaction {
    ItemReady { index: usize, item: ItemId },
    ItemFailed { index: usize, item: ItemId, error: ItemError },
    ItemBuffered { index: usize, buffered: Duration },
    ItemStarved { index: usize, item: ItemId },
    ItemKeepingUp { index: usize, item: ItemId },
    ItemEnded { index: usize, item: ItemId },
    CurrentItemChanged { item: Option<ItemId> },
    EngineStatusChanged { status: EngineStatus },
    RateChanged { rate: f32 },
    Interrupted { kind: InterruptionKind },
    RouteChanged { reason: RouteChangeReason },
}

pub type PlayerBus = EventBus<Observed, Property, EngineEvent, Reaction>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueEntry {
    pub index: usize,
    pub item: ItemId,
    pub status: ItemStatus,
}

#[derive(Debug)]
pub struct QueueScheduler {
    entries: VecDeque<QueueEntry>,
    next_item: u64,
    lookahead: usize,
}

impl QueueScheduler {
    pub fn new(lookahead: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            next_item: 1,
            lookahead: lookahead.max(1),
        }
    }

    pub fn entries(&self) -> &VecDeque<QueueEntry> {
        &self.entries
    }

    /// The entry the engine is rendering, or will render first.
    pub fn current(&self) -> Option<&QueueEntry> {
        self.entries.front()
    }

    pub fn entry(&self, item: ItemId) -> Option<&QueueEntry> {
        self.entries.iter().find(|entry| entry.item == item)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_current(&self, item: ItemId) -> bool {
        self.current().is_some_and(|entry| entry.item == item)
    }

    /// Builds an engine item for `index`, observes it and appends it to the
    /// engine queue.
    #[instrument(skip(self, engine, bus, playlist))]
    pub fn enqueue(
        &mut self,
        engine: &mut dyn Engine,
        bus: &mut PlayerBus,
        playlist: &Playlist,
        index: usize,
    ) -> Option<ItemId> {
        let Some(track) = playlist.get(index) else {
            warn!("no track to queue");
            return None;
        };

        let item = ItemId(self.next_item);
        self.next_item += 1;

        observe_item(bus, item, index);
        engine.insert(item, &track.url);
        self.entries.push_back(QueueEntry {
            index,
            item,
            status: ItemStatus::Unknown,
        });

        debug!(?item, url = %track.url, "queued");
        Some(item)
    }

    /// Records that `item` can play and prefetches what follows it.
    pub fn mark_ready(
        &mut self,
        engine: &mut dyn Engine,
        bus: &mut PlayerBus,
        playlist: &Playlist,
        item: ItemId,
    ) {
        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.item == item) {
            entry.status = ItemStatus::Ready;
        }

        self.fill(engine, bus, playlist);
    }

    pub fn mark_failed(&mut self, item: ItemId) {
        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.item == item) {
            entry.status = ItemStatus::Failed;
        }
    }

    /// The current item played to its end. Drops its entry and returns the
    /// finished playlist index; the following item is already queued.
    pub fn advance(
        &mut self,
        engine: &mut dyn Engine,
        bus: &mut PlayerBus,
        playlist: &Playlist,
        item: ItemId,
    ) -> Option<usize> {
        if !self.is_current(item) {
            warn!(?item, "end of an item that is not current");
            return None;
        }

        let finished = self.entries.pop_front()?;
        bus.unsubscribe_all(&Observed::Item(finished.item));
        self.fill(engine, bus, playlist);

        Some(finished.index)
    }

    /// Removes every queued item and its observers.
    pub fn teardown(&mut self, engine: &mut dyn Engine, bus: &mut PlayerBus) {
        for entry in self.entries.drain(..) {
            bus.unsubscribe_all(&Observed::Item(entry.item));
        }

        engine.remove_all();
    }

    // Queue the index after the tail once the tail is ready, as long as it
    // stays within the lookahead of the current entry.
    fn fill(&mut self, engine: &mut dyn Engine, bus: &mut PlayerBus, playlist: &Playlist) {
        loop {
            let (Some(current), Some(tail)) = (self.entries.front(), self.entries.back()) else {
                return;
            };

            if tail.status != ItemStatus::Ready {
                return;
            }

            let next = tail.index + 1;
            if next >= playlist.len() || next - current.index > self.lookahead {
                return;
            }

            if self.enqueue(engine, bus, playlist, next).is_none() {
                return;
            }
        }
    }
}

fn observe_item(bus: &mut PlayerBus, item: ItemId, index: usize) {
    let object = Observed::Item(item);

    bus.subscribe(object, Property::Status, move |event| match event {
        EngineEvent::ItemStatusChanged {
            status: ItemStatus::Ready,
            ..
        } => Some(Reaction::ItemReady { index, item }),
        EngineEvent::ItemStatusChanged {
            status: ItemStatus::Failed,
            error,
            ..
        } => Some(Reaction::ItemFailed {
            index,
            item,
            error: error
                .clone()
                .unwrap_or_else(|| ItemError::other("item failed to load")),
        }),
        _ => None,
    });

    bus.subscribe(object, Property::LoadedTimeRanges, move |event| match event {
        EngineEvent::ItemLoadedRanges { buffered, .. } => Some(Reaction::ItemBuffered {
            index,
            buffered: *buffered,
        }),
        _ => None,
    });

    bus.subscribe(object, Property::PlaybackBufferEmpty, move |_| {
        Some(Reaction::ItemStarved { index, item })
    });

    bus.subscribe(object, Property::PlaybackLikelyToKeepUp, move |_| {
        Some(Reaction::ItemKeepingUp { index, item })
    });

    bus.subscribe(object, Property::DidPlayToEnd, move |_| {
        Some(Reaction::ItemEnded { index, item })
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::SimulatedEngine;
    use lyt_player_models::Track;
    use url::Url;

    fn playlist(count: usize) -> Playlist {
        (0..count)
            .map(|i| {
                Track::new(
                    Url::parse(&format!("file:///music/{i}.mp3")).unwrap(),
                    format!("Track {i}"),
                    "Artist",
                    "Album",
                    None,
                )
            })
            .collect()
    }

    fn indices(scheduler: &QueueScheduler) -> Vec<usize> {
        scheduler.entries().iter().map(|entry| entry.index).collect()
    }

    #[test]
    fn ready_current_item_prefetches_next() {
        let (mut engine, _events) = SimulatedEngine::new();
        let mut bus = PlayerBus::new();
        let playlist = playlist(3);
        let mut scheduler = QueueScheduler::new(1);

        let first = scheduler.enqueue(&mut engine, &mut bus, &playlist, 0).unwrap();
        assert_eq!(indices(&scheduler), [0]);

        scheduler.mark_ready(&mut engine, &mut bus, &playlist, first);
        assert_eq!(indices(&scheduler), [0, 1]);
        assert_eq!(engine.queued().len(), 2);
    }

    #[test]
    fn lookahead_bounds_live_entries() {
        let (mut engine, _events) = SimulatedEngine::new();
        let mut bus = PlayerBus::new();
        let playlist = playlist(4);
        let mut scheduler = QueueScheduler::new(1);

        let first = scheduler.enqueue(&mut engine, &mut bus, &playlist, 0).unwrap();
        scheduler.mark_ready(&mut engine, &mut bus, &playlist, first);
        let second = scheduler.entries()[1].item;
        scheduler.mark_ready(&mut engine, &mut bus, &playlist, second);
        assert_eq!(indices(&scheduler), [0, 1]);

        assert_eq!(
            scheduler.advance(&mut engine, &mut bus, &playlist, first),
            Some(0)
        );
        assert_eq!(indices(&scheduler), [1, 2]);
        assert!(!bus.observes(&Observed::Item(first)));
    }

    #[test]
    fn larger_lookahead_queues_further() {
        let (mut engine, _events) = SimulatedEngine::new();
        let mut bus = PlayerBus::new();
        let playlist = playlist(5);
        let mut scheduler = QueueScheduler::new(2);

        let first = scheduler.enqueue(&mut engine, &mut bus, &playlist, 0).unwrap();
        scheduler.mark_ready(&mut engine, &mut bus, &playlist, first);
        let second = scheduler.entries()[1].item;
        scheduler.mark_ready(&mut engine, &mut bus, &playlist, second);

        assert_eq!(indices(&scheduler), [0, 1, 2]);
    }

    #[test]
    fn last_track_prefetches_nothing() {
        let (mut engine, _events) = SimulatedEngine::new();
        let mut bus = PlayerBus::new();
        let playlist = playlist(2);
        let mut scheduler = QueueScheduler::new(1);

        let item = scheduler.enqueue(&mut engine, &mut bus, &playlist, 1).unwrap();
        scheduler.mark_ready(&mut engine, &mut bus, &playlist, item);
        assert_eq!(indices(&scheduler), [1]);
    }

    #[test]
    fn failed_item_blocks_prefetch() {
        let (mut engine, _events) = SimulatedEngine::new();
        let mut bus = PlayerBus::new();
        let playlist = playlist(3);
        let mut scheduler = QueueScheduler::new(1);

        let item = scheduler.enqueue(&mut engine, &mut bus, &playlist, 0).unwrap();
        scheduler.mark_failed(item);
        assert_eq!(scheduler.current().unwrap().status, ItemStatus::Failed);
        assert_eq!(indices(&scheduler), [0]);
    }

    #[test]
    fn item_observers_translate_events() {
        let (mut engine, _events) = SimulatedEngine::new();
        let mut bus = PlayerBus::new();
        let playlist = playlist(3);
        let mut scheduler = QueueScheduler::new(1);
        let item = scheduler.enqueue(&mut engine, &mut bus, &playlist, 2).unwrap();

        let ready = EngineEvent::ItemStatusChanged {
            item,
            status: ItemStatus::Ready,
            error: None,
        };
        let (object, property) = ready.source().unwrap();
        assert_eq!(
            bus.notify(&object, &property, &ready),
            [Reaction::ItemReady { index: 2, item }]
        );

        let unknown = EngineEvent::ItemStatusChanged {
            item,
            status: ItemStatus::Unknown,
            error: None,
        };
        assert!(bus.notify(&object, &property, &unknown).is_empty());

        let ended = EngineEvent::ItemDidPlayToEnd { item };
        let (object, property) = ended.source().unwrap();
        assert_eq!(
            bus.notify(&object, &property, &ended),
            [Reaction::ItemEnded { index: 2, item }]
        );
    }

    #[test]
    fn teardown_silences_items_and_clears_engine() {
        let (mut engine, _events) = SimulatedEngine::new();
        let mut bus = PlayerBus::new();
        let playlist = playlist(3);
        let mut scheduler = QueueScheduler::new(1);

        let first = scheduler.enqueue(&mut engine, &mut bus, &playlist, 0).unwrap();
        scheduler.mark_ready(&mut engine, &mut bus, &playlist, first);
        scheduler.teardown(&mut engine, &mut bus);

        assert!(scheduler.is_empty());
        assert!(engine.queued().is_empty());
        assert_eq!(bus.observed_count(), 0);

        let ended = EngineEvent::ItemDidPlayToEnd { item: first };
        let (object, property) = ended.source().unwrap();
        assert!(bus.notify(&object, &property, &ended).is_empty());
    }

    #[test]
    fn advance_ignores_items_that_are_not_current() {
        let (mut engine, _events) = SimulatedEngine::new();
        let mut bus = PlayerBus::new();
        let playlist = playlist(3);
        let mut scheduler = QueueScheduler::new(1);

        let first = scheduler.enqueue(&mut engine, &mut bus, &playlist, 0).unwrap();
        scheduler.mark_ready(&mut engine, &mut bus, &playlist, first);
        let second = scheduler.entries()[1].item;

        assert_eq!(
            scheduler.advance(&mut engine, &mut bus, &playlist, second),
            None
        );
        assert_eq!(indices(&scheduler), [0, 1]);
    }
}
