//! In-memory engine for tests and demos.
//!
//! Nothing loads or renders by itself: whoever holds a clone of the engine
//! decides when items become ready, fail, stall or finish, and every change
//! is reported on the event channel like a native engine would.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tokio::sync::mpsc;
use tracing::debug;
use url::Url;

use crate::{
    engine::{Engine, EngineEvent, EngineStatus, ItemError, ItemId, ItemStatus, SeekId},
    interruption::{InterruptionKind, RouteChangeReason},
    timer::Timer,
};

const DEFAULT_TRACK_DURATION: Duration = Duration::from_secs(180);

#[derive(Debug)]
struct SimulatedItem {
    id: ItemId,
    url: Url,
    status: ItemStatus,
    duration: Duration,
}

#[derive(Debug)]
struct SimulatedState {
    queue: VecDeque<SimulatedItem>,
    playing: bool,
    rate: f32,
    status: EngineStatus,
    clock: Timer,
    track_duration: Duration,
    seeks: Vec<(SeekId, Duration)>,
}

#[derive(Debug, Clone)]
pub struct SimulatedEngine {
    state: Arc<Mutex<SimulatedState>>,
    events: mpsc::UnboundedSender<EngineEvent>,
}

impl SimulatedEngine {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let state = SimulatedState {
            queue: VecDeque::new(),
            playing: false,
            rate: 1.0,
            status: EngineStatus::Ready,
            clock: Timer::new(),
            track_duration: DEFAULT_TRACK_DURATION,
            seeks: vec![],
        };

        (
            Self {
                state: Arc::new(Mutex::new(state)),
                events,
            },
            rx,
        )
    }

    fn state(&self) -> MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: EngineEvent) {
        if self.events.send(event).is_err() {
            debug!("engine event dropped, player is gone");
        }
    }

    /// Duration given to items inserted from now on.
    pub fn set_track_duration(&self, duration: Duration) {
        self.state().track_duration = duration;
    }

    pub fn queued(&self) -> Vec<ItemId> {
        self.state().queue.iter().map(|item| item.id).collect()
    }

    pub fn queued_urls(&self) -> Vec<Url> {
        self.state().queue.iter().map(|item| item.url.clone()).collect()
    }

    /// Queued items that have neither become ready nor failed yet.
    pub fn loading(&self) -> Vec<ItemId> {
        self.state()
            .queue
            .iter()
            .filter(|item| item.status == ItemStatus::Unknown)
            .map(|item| item.id)
            .collect()
    }

    pub fn is_rendering(&self) -> bool {
        self.state().playing
    }

    pub fn pending_seeks(&self) -> usize {
        self.state().seeks.len()
    }

    /// Whether the current item has been rendered to its end.
    pub fn current_reached_end(&self) -> bool {
        let state = self.state();
        state
            .queue
            .front()
            .is_some_and(|item| state.playing && state.clock.elapsed() >= item.duration)
    }

    pub fn set_status(&self, status: EngineStatus) {
        self.state().status = status;
        self.emit(EngineEvent::StatusChanged { status });
    }

    pub fn make_ready(&self, item: ItemId) {
        let duration = {
            let mut state = self.state();
            let Some(queued) = state.queue.iter_mut().find(|queued| queued.id == item) else {
                return;
            };
            queued.status = ItemStatus::Ready;
            queued.duration
        };

        self.emit(EngineEvent::ItemStatusChanged {
            item,
            status: ItemStatus::Ready,
            error: None,
        });
        self.emit(EngineEvent::ItemLoadedRanges {
            item,
            buffered: duration,
        });
    }

    pub fn fail(&self, item: ItemId, error: ItemError) {
        {
            let mut state = self.state();
            let Some(queued) = state.queue.iter_mut().find(|queued| queued.id == item) else {
                return;
            };
            queued.status = ItemStatus::Failed;
        }

        self.emit(EngineEvent::ItemStatusChanged {
            item,
            status: ItemStatus::Failed,
            error: Some(error),
        });
    }

    pub fn starve(&self, item: ItemId) {
        self.emit(EngineEvent::ItemBufferEmpty { item });
    }

    pub fn keep_up(&self, item: ItemId) {
        self.emit(EngineEvent::ItemLikelyToKeepUp { item });
    }

    /// Plays the current item to its end and advances to the next one.
    pub fn finish_current(&self) -> Option<ItemId> {
        let (finished, next, stopped) = {
            let mut state = self.state();
            let finished = state.queue.pop_front()?;
            state.clock.clear();

            let next = state.queue.front().map(|item| item.id);
            let stopped = next.is_none() && state.playing;
            if stopped {
                state.playing = false;
            } else if state.playing {
                state.clock.start();
            }

            (finished.id, next, stopped)
        };

        self.emit(EngineEvent::ItemDidPlayToEnd { item: finished });
        self.emit(EngineEvent::CurrentItemChanged { item: next });
        if stopped {
            self.emit(EngineEvent::RateChanged { rate: 0.0 });
        }

        Some(finished)
    }

    /// Confirms every outstanding seek.
    pub fn complete_seeks(&self, finished: bool) {
        let seeks = {
            let mut state = self.state();
            let seeks = std::mem::take(&mut state.seeks);
            if finished && let Some((_, to)) = seeks.last() {
                let to = *to;
                state.clock.set_time(to);
            }
            seeks
        };

        for (seek, _) in seeks {
            self.emit(EngineEvent::SeekCompleted { seek, finished });
        }
    }

    pub fn interrupt(&self, kind: InterruptionKind) {
        self.emit(EngineEvent::Interruption { kind });
    }

    pub fn change_route(&self, reason: RouteChangeReason) {
        self.emit(EngineEvent::RouteChanged { reason });
    }
}

impl Engine for SimulatedEngine {
    fn insert(&mut self, item: ItemId, url: &Url) {
        let was_empty = {
            let mut state = self.state();
            let was_empty = state.queue.is_empty();
            let duration = state.track_duration;
            state.queue.push_back(SimulatedItem {
                id: item,
                url: url.clone(),
                status: ItemStatus::Unknown,
                duration,
            });
            if was_empty {
                state.clock.clear();
            }
            was_empty
        };

        if was_empty {
            self.emit(EngineEvent::CurrentItemChanged { item: Some(item) });
        }
    }

    fn remove_all(&mut self) {
        let had_items = {
            let mut state = self.state();
            let had_items = !state.queue.is_empty();
            state.queue.clear();
            state.clock.clear();
            had_items
        };

        if had_items {
            self.emit(EngineEvent::CurrentItemChanged { item: None });
        }
    }

    fn play(&mut self) {
        let rate = {
            let mut state = self.state();
            state.playing = true;
            state.clock.start();
            state.rate
        };
        self.emit(EngineEvent::RateChanged { rate });
    }

    fn pause(&mut self) {
        let was_playing = {
            let mut state = self.state();
            let was_playing = state.playing;
            state.playing = false;
            state.clock.pause();
            was_playing
        };

        if was_playing {
            self.emit(EngineEvent::RateChanged { rate: 0.0 });
        }
    }

    fn set_rate(&mut self, rate: f32) {
        let playing = {
            let mut state = self.state();
            state.rate = rate;
            state.clock.set_rate(rate);
            state.playing
        };

        if playing {
            self.emit(EngineEvent::RateChanged { rate });
        }
    }

    fn rate(&self) -> f32 {
        let state = self.state();
        if state.playing { state.rate } else { 0.0 }
    }

    fn status(&self) -> EngineStatus {
        self.state().status
    }

    fn current_time(&self) -> Option<Duration> {
        let state = self.state();
        state.queue.front().map(|_| state.clock.elapsed())
    }

    fn item_duration(&self, item: ItemId) -> Option<Duration> {
        self.state()
            .queue
            .iter()
            .find(|queued| queued.id == item && queued.status == ItemStatus::Ready)
            .map(|queued| queued.duration)
    }

    fn seek(&mut self, seek: SeekId, to: Duration) {
        self.state().seeks.push((seek, to));
    }
}
