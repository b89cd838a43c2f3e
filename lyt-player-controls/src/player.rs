use std::{collections::HashMap, sync::Arc, time::Duration};

use lyt_player_models::{Artwork, Playlist, Track};
use snafu::prelude::*;
use tokio::{
    select,
    sync::{broadcast, mpsc, watch},
};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    NowPlayingReceiver, PLAYBACK_RATES, PlayerConfig, PositionReceiver, Result, Status,
    StatusReceiver,
    controls::{ControlCommand, Controls},
    engine::{
        Engine, EngineEvent, EngineStatus, ItemError, ItemErrorKind, ItemId, ItemStatus, Observed,
        Property, SeekId,
    },
    error::{
        EngineNotReadySnafu, Error, InvalidIndexSnafu, InvalidRateSnafu, NoPlaylistSnafu,
        SeekInterruptedSnafu, StoppedSnafu,
    },
    interruption::{InterruptionKind, InterruptionRecovery, Recovery, RouteChangeReason},
    notification::{
        Completion, Dispatcher, Notification, NotificationBroadcast, Outbound, StalledCallback,
    },
    now_playing::NowPlaying,
    scheduler::{PlayerBus, QueueScheduler, Reaction},
    session::AudioSession,
};

/// Sequential playlist player.
///
/// All state lives here and is only touched from [`Player::player_loop`].
/// Callers talk to it through [`Controls`] and listen through the watch and
/// broadcast receivers handed out before the loop starts.
pub struct Player {
    engine: Box<dyn Engine>,
    engine_events: mpsc::UnboundedReceiver<EngineEvent>,
    commands: mpsc::UnboundedReceiver<ControlCommand>,
    controls: Controls,
    bus: PlayerBus,
    scheduler: QueueScheduler,
    interruption: InterruptionRecovery,
    session: AudioSession,
    playlist: Option<Playlist>,
    index: usize,
    status: Status,
    preferred_rate: f32,
    play_when_ready: bool,
    seeks: HashMap<SeekId, Completion>,
    next_seek: u64,
    outbound: mpsc::UnboundedSender<Outbound>,
    outbound_rx: Option<mpsc::UnboundedReceiver<Outbound>>,
    stalled: Option<StalledCallback>,
    broadcast: Arc<NotificationBroadcast>,
    status_tx: watch::Sender<Status>,
    position_tx: watch::Sender<Duration>,
    now_playing_tx: watch::Sender<Option<NowPlaying>>,
    tick_interval: Duration,
}

impl Player {
    pub fn new(
        engine: impl Engine + 'static,
        engine_events: mpsc::UnboundedReceiver<EngineEvent>,
        session: AudioSession,
        config: &PlayerConfig,
    ) -> Self {
        let (tx, commands) = mpsc::unbounded_channel();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (status_tx, _) = watch::channel(Status::default());
        let (position_tx, _) = watch::channel(Duration::default());
        let (now_playing_tx, _) = watch::channel(None);

        let mut bus = PlayerBus::new();
        observe_session(&mut bus);

        Self {
            engine: Box::new(engine),
            engine_events,
            commands,
            controls: Controls::new(tx),
            bus,
            scheduler: QueueScheduler::new(config.lookahead),
            interruption: InterruptionRecovery::new(),
            session,
            playlist: None,
            index: 0,
            status: Status::default(),
            preferred_rate: config.initial_rate,
            play_when_ready: false,
            seeks: HashMap::new(),
            next_seek: 1,
            outbound,
            outbound_rx: Some(outbound_rx),
            stalled: None,
            broadcast: Arc::new(NotificationBroadcast::new(config.notification_capacity)),
            status_tx,
            position_tx,
            now_playing_tx,
            tick_interval: config.tick_interval,
        }
    }

    /// Called when a track needs the user to sign in again. Playback is
    /// paused before it runs.
    pub fn on_stalled(&mut self, callback: impl Fn() + Send + Sync + 'static) {
        self.stalled = Some(Arc::new(callback));
    }

    pub fn controls(&self) -> Controls {
        self.controls.clone()
    }

    pub fn status_receiver(&self) -> StatusReceiver {
        self.status_tx.subscribe()
    }

    pub fn position_receiver(&self) -> PositionReceiver {
        self.position_tx.subscribe()
    }

    pub fn now_playing_receiver(&self) -> NowPlayingReceiver {
        self.now_playing_tx.subscribe()
    }

    pub fn notify_receiver(&self) -> broadcast::Receiver<Notification> {
        self.broadcast.subscribe()
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_playing(&self) -> bool {
        self.engine.rate() > 0.0
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.playlist.as_ref()?.get(self.index)
    }

    pub fn current_index(&self) -> usize {
        self.index
    }

    pub fn current_track_duration(&self) -> Option<Duration> {
        let entry = self.scheduler.current()?;
        if entry.index != self.index {
            return None;
        }

        self.engine.item_duration(entry.item)
    }

    pub fn current_time_millis(&self) -> u64 {
        self.engine
            .current_time()
            .map_or(0, |time| time.as_millis() as u64)
    }

    pub fn playback_rate(&self) -> f32 {
        self.preferred_rate
    }

    fn send(&self, outbound: Outbound) {
        if self.outbound.send(outbound).is_err() {
            debug!("dispatcher stopped, dropping outbound item");
        }
    }

    fn notify(&self, notification: Notification) {
        self.send(Outbound::Notify(notification));
    }

    fn complete(&self, completion: Completion, result: Result<()>) {
        self.send(Outbound::Complete(completion, result));
    }

    fn track(&self, index: usize) -> Option<Track> {
        self.playlist.as_ref()?.get(index).cloned()
    }

    fn set_status(&mut self, status: Status) {
        let from = self.status;
        if from == status && status != Status::WaitingForConnection {
            return;
        }

        info!(?from, to = ?status, "state changed");
        self.status = status;
        self.status_tx.send_replace(status);
        self.notify(Notification::StateChanged { from, to: status });
        self.publish_now_playing();
    }

    fn publish_now_playing(&self) {
        let now_playing = match (&self.playlist, self.status) {
            (None, _) | (_, Status::Stopped) => None,
            (Some(playlist), _) => NowPlaying::new(
                playlist,
                self.index,
                self.engine.current_time(),
                self.current_track_duration(),
                self.engine.rate(),
            ),
        };

        self.now_playing_tx.send_replace(now_playing);
    }

    #[instrument(skip(self, playlist), fields(tracks = playlist.len()))]
    fn load(&mut self, playlist: Playlist, index: usize) -> Result<()> {
        let count = playlist.len();
        ensure!(index < count, InvalidIndexSnafu { index, count });

        self.stop(true);
        self.playlist = Some(playlist);
        self.setup(index);

        Ok(())
    }

    // Start loading `index` as the current track.
    fn setup(&mut self, index: usize) {
        let Some(playlist) = self.playlist.as_ref() else {
            return;
        };

        self.index = index;
        if !self.bus.observes(&Observed::Player) {
            observe_player(&mut self.bus);
        }

        self.scheduler
            .enqueue(self.engine.as_mut(), &mut self.bus, playlist, index);
        self.set_status(Status::SettingUp);
    }

    fn play(&mut self) -> Result<()> {
        ensure!(self.playlist.is_some(), NoPlaylistSnafu);
        ensure!(
            self.engine.status() != EngineStatus::Failed,
            EngineNotReadySnafu
        );

        let entry = self.scheduler.current().context(EngineNotReadySnafu)?;
        match entry.status {
            ItemStatus::Failed => return EngineNotReadySnafu.fail(),
            ItemStatus::Unknown => {
                debug!("current track still loading, playing once ready");
                self.play_when_ready = true;
                return Ok(());
            }
            ItemStatus::Ready => {}
        }

        self.interruption.forget_resume();
        if let Err(error) = self.session.activate() {
            warn!(%error, "playing without an active audio session");
        }

        self.engine.set_rate(self.preferred_rate);
        self.engine.play();
        self.play_when_ready = false;
        self.set_status(Status::Playing);

        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        ensure!(self.playlist.is_some(), NoPlaylistSnafu);
        if self.scheduler.is_empty() {
            debug!("stopped, nothing to pause");
            return Ok(());
        }

        self.engine.pause();
        self.play_when_ready = false;

        if !self.interruption.is_pending()
            && let Err(error) = self.session.deactivate()
        {
            warn!(%error);
        }

        self.set_status(Status::Paused);
        Ok(())
    }

    fn toggle(&mut self) -> Result<()> {
        if self.status.is_active() || self.play_when_ready {
            self.pause()
        } else {
            self.play()
        }
    }

    /// Tears down the engine queue. A full stop also rewinds to the first
    /// track and gives up the audio session.
    #[instrument(skip(self))]
    fn stop(&mut self, full: bool) {
        self.engine.pause();
        self.scheduler.teardown(self.engine.as_mut(), &mut self.bus);
        self.bus.unsubscribe_all(&Observed::Player);
        self.play_when_ready = false;

        for (_, completion) in std::mem::take(&mut self.seeks) {
            self.complete(completion, SeekInterruptedSnafu.fail());
        }

        self.position_tx.send_replace(Duration::ZERO);
        self.set_status(Status::Stopped);

        if full {
            self.index = 0;
            if !self.interruption.is_pending()
                && let Err(error) = self.session.deactivate()
            {
                warn!(%error);
            }
        }
    }

    #[instrument(skip(self))]
    fn skip_to(&mut self, index: usize) -> Result<()> {
        let count = self.playlist.as_ref().context(NoPlaylistSnafu)?.len();
        ensure!(index < count, InvalidIndexSnafu { index, count });

        let was_active = self.status.is_active() || self.play_when_ready;
        self.stop(false);
        self.setup(index);
        self.play_when_ready = was_active;

        Ok(())
    }

    // Nothing to step from after an explicit stop or the end of the playlist.
    fn ensure_queued(&self) -> Result<usize> {
        let count = self.playlist.as_ref().context(NoPlaylistSnafu)?.len();
        ensure!(!self.scheduler.is_empty(), StoppedSnafu);

        Ok(count)
    }

    fn next(&mut self) -> Result<()> {
        let count = self.ensure_queued()?;

        if self.index + 1 >= count {
            info!("end of playlist");
            self.stop(true);
            return Ok(());
        }

        self.skip_to(self.index + 1)
    }

    fn previous(&mut self) -> Result<()> {
        self.ensure_queued()?;
        self.skip_to(self.index.saturating_sub(1))
    }

    fn seek_to(&mut self, time: Duration, completion: Completion) {
        let ready = self
            .scheduler
            .current()
            .is_some_and(|entry| entry.status == ItemStatus::Ready);

        if !ready {
            warn!(?time, "current track is not ready, ignoring seek");
            return;
        }

        let seek = SeekId(self.next_seek);
        self.next_seek += 1;
        self.seeks.insert(seek, completion);
        self.engine.seek(seek, time);
    }

    fn seek_completed(&mut self, seek: SeekId, finished: bool) {
        let Some(completion) = self.seeks.remove(&seek) else {
            debug!(?seek, "completion for an unknown seek");
            return;
        };

        let result = if finished {
            if let Some(position) = self.engine.current_time() {
                self.position_tx.send_replace(position);
            }
            self.publish_now_playing();
            Ok(())
        } else {
            SeekInterruptedSnafu.fail()
        };

        self.complete(completion, result);
    }

    fn set_playback_rate(&mut self, rate: f32) -> Result<()> {
        if !PLAYBACK_RATES.contains(&rate) {
            warn!(rate, "playback rate out of range");
            return InvalidRateSnafu { rate }.fail();
        }

        self.preferred_rate = rate;
        if self.engine.rate() > 0.0 {
            self.engine.set_rate(rate);
        }

        self.publish_now_playing();
        Ok(())
    }

    fn cache_artwork(&mut self, index: usize, artwork: Artwork) {
        let Some(track) = self.playlist.as_ref().and_then(|playlist| playlist.get(index)) else {
            return;
        };

        if track.cache_artwork(artwork) && index == self.index {
            self.publish_now_playing();
        }
    }

    // Playing or ready, whichever the engine is actually doing.
    fn mirror_engine(&mut self) {
        if self.engine.rate() > 0.0 {
            self.set_status(Status::Playing);
        } else {
            self.set_status(Status::Ready);
        }
    }

    fn log_error(result: Result<()>) {
        if let Err(error) = result {
            warn!(%error);
        }
    }

    /// Returns `true` when the loop should exit.
    fn handle_command(&mut self, command: ControlCommand) -> bool {
        match command {
            ControlCommand::Load { playlist, index } => Self::log_error(self.load(playlist, index)),
            ControlCommand::Play => Self::log_error(self.play()),
            ControlCommand::Pause => Self::log_error(self.pause()),
            ControlCommand::PlayPause => Self::log_error(self.toggle()),
            ControlCommand::Stop => self.stop(true),
            ControlCommand::Next { completion } => {
                let result = self.next();
                self.complete(completion, result);
            }
            ControlCommand::Previous { completion } => {
                let result = self.previous();
                self.complete(completion, result);
            }
            ControlCommand::SkipTo { index, completion } => {
                let result = self.skip_to(index);
                self.complete(completion, result);
            }
            ControlCommand::Seek { time, completion } => self.seek_to(time, completion),
            ControlCommand::SetPlaybackRate { rate } => {
                Self::log_error(self.set_playback_rate(rate))
            }
            ControlCommand::CacheArtwork { index, artwork } => self.cache_artwork(index, artwork),
            ControlCommand::Quit => return true,
        }

        false
    }

    fn handle_engine_event(&mut self, event: EngineEvent) {
        if let EngineEvent::SeekCompleted { seek, finished } = event {
            self.seek_completed(seek, finished);
            return;
        }

        let Some((object, property)) = event.source() else {
            return;
        };

        for reaction in self.bus.notify(&object, &property, &event) {
            self.react(reaction);
        }
    }

    fn react(&mut self, reaction: Reaction) {
        match reaction {
            Reaction::ItemReady { index, item } => self.item_ready(index, item),
            Reaction::ItemFailed { index, item, error } => self.item_failed(index, item, error),
            Reaction::ItemBuffered { index, buffered } => {
                if let Some(track) = self.track(index) {
                    self.notify(Notification::BufferingProgress { buffered, track });
                }
            }
            Reaction::ItemStarved { item, .. } => {
                if self.scheduler.is_current(item) && self.status == Status::Playing {
                    info!("buffer ran dry");
                    self.set_status(Status::Buffering);
                }
            }
            Reaction::ItemKeepingUp { item, .. } => {
                if self.scheduler.is_current(item) && self.status == Status::Buffering {
                    self.mirror_engine();
                }
            }
            Reaction::ItemEnded { item, .. } => self.item_ended(item),
            Reaction::CurrentItemChanged { item } => {
                let index = item
                    .and_then(|item| self.scheduler.entry(item))
                    .map(|entry| entry.index);

                if let Some(track) = index.and_then(|index| self.track(index)) {
                    info!(title = %track.title, "now playing");
                    self.notify(Notification::TrackChanged { track });
                    self.publish_now_playing();
                }
            }
            Reaction::EngineStatusChanged { status } => {
                if status == EngineStatus::Failed {
                    error!("engine failed");
                    self.set_status(Status::Failed);
                    self.notify(Notification::Error {
                        error: Error::Playback {
                            message: "engine failed".into(),
                        },
                    });
                }
            }
            Reaction::RateChanged { rate } => {
                debug!(rate, "engine rate changed");
                self.publish_now_playing();
            }
            Reaction::Interrupted { kind } => self.interrupted(kind),
            Reaction::RouteChanged { reason } => self.route_changed(reason),
        }
    }

    fn item_ready(&mut self, index: usize, item: ItemId) {
        let Some(playlist) = self.playlist.as_ref() else {
            return;
        };

        self.scheduler
            .mark_ready(self.engine.as_mut(), &mut self.bus, playlist, item);

        if let (Some(duration), Some(track)) = (self.engine.item_duration(item), self.track(index))
        {
            self.notify(Notification::DurationFound { duration, track });
        }

        if !self.scheduler.is_current(item) {
            return;
        }

        match self.status {
            Status::SettingUp => {
                self.set_status(Status::Ready);
                if self.play_when_ready {
                    Self::log_error(self.play());
                }
            }
            Status::Buffering => self.mirror_engine(),
            // Resumed after an interruption while still loading.
            Status::Paused if self.play_when_ready => Self::log_error(self.play()),
            _ => {}
        }
    }

    fn item_failed(&mut self, index: usize, item: ItemId, item_error: ItemError) {
        self.scheduler.mark_failed(item);
        let track = self.track(index);
        error!(index, message = %item_error.message, "track failed to load");

        match item_error.kind {
            ItemErrorKind::AuthenticationRequired => {
                Self::log_error(self.pause());
                self.send(Outbound::Stalled);
                if let Some(track) = track {
                    self.notify(Notification::Error {
                        error: Error::AuthenticationRequired {
                            url: track.url.to_string(),
                        },
                    });
                    self.notify(Notification::Stalled { track });
                }
            }
            ItemErrorKind::Other => {
                self.notify(Notification::Error {
                    error: Error::Playback {
                        message: item_error.message,
                    },
                });

                if self.scheduler.is_current(item) {
                    self.set_status(Status::Failed);
                }
            }
        }
    }

    fn item_ended(&mut self, item: ItemId) {
        let Some(playlist) = self.playlist.as_ref() else {
            return;
        };

        let Some(finished) =
            self.scheduler
                .advance(self.engine.as_mut(), &mut self.bus, playlist, item)
        else {
            return;
        };

        let count = playlist.len();
        if let Some(track) = self.track(finished) {
            self.notify(Notification::TrackFinished { track });
        }

        let next = finished + 1;
        if next >= count {
            info!("end of playlist");
            self.stop(true);
            return;
        }

        let was_active = self.status.is_active() || self.play_when_ready;
        self.index = next;
        self.set_status(Status::SettingUp);

        match self.scheduler.current().copied() {
            Some(entry) if entry.index == next => match entry.status {
                ItemStatus::Ready => {
                    self.set_status(Status::Ready);
                    if was_active {
                        Self::log_error(self.play());
                    }
                }
                ItemStatus::Failed => self.set_status(Status::Failed),
                ItemStatus::Unknown => self.play_when_ready = was_active,
            },
            _ => {
                debug!(next, "next track was not queued");
                self.scheduler.teardown(self.engine.as_mut(), &mut self.bus);
                self.setup(next);
                self.play_when_ready = was_active;
            }
        }
    }

    fn interrupted(&mut self, kind: InterruptionKind) {
        let is_playing = self.status.is_active() || self.play_when_ready;
        match self.interruption.on_interruption(kind, is_playing) {
            Some(Recovery::Pause) if self.playlist.is_some() => Self::log_error(self.pause()),
            Some(Recovery::Resume) => Self::log_error(self.play()),
            _ => {}
        }
    }

    fn route_changed(&mut self, reason: RouteChangeReason) {
        if self.interruption.on_route_change(reason) == Some(Recovery::Pause)
            && self.playlist.is_some()
        {
            Self::log_error(self.pause());
        }
    }

    fn tick(&mut self) {
        if self.status != Status::Playing {
            return;
        }

        if let Some(position) = self.engine.current_time() {
            self.position_tx.send_replace(position);
        }
    }

    fn quit(&mut self) {
        debug!("stopping player");
        self.stop(true);
        self.bus.unsubscribe_everything();
        Self::log_error(self.session.deactivate());
    }

    /// Runs the player until [`Controls::quit`] is called.
    ///
    /// Notifications and completions are delivered from a separate task so a
    /// slow listener never holds up playback.
    #[instrument(skip(self))]
    pub async fn player_loop(&mut self) -> Result<()> {
        if let Some(rx) = self.outbound_rx.take() {
            let dispatcher = Dispatcher::new(rx, self.broadcast.clone(), self.stalled.take());
            tokio::spawn(dispatcher.run());
        }

        let mut interval = tokio::time::interval(self.tick_interval);

        loop {
            select! {
                _ = interval.tick() => self.tick(),

                Some(command) = self.commands.recv() => {
                    if self.handle_command(command) {
                        break;
                    }
                }

                Some(event) = self.engine_events.recv() => self.handle_engine_event(event),
            }
        }

        self.quit();
        Ok(())
    }
}

fn observe_player(bus: &mut PlayerBus) {
    bus.subscribe(Observed::Player, Property::CurrentItem, |event| match event {
        EngineEvent::CurrentItemChanged { item } => {
            Some(Reaction::CurrentItemChanged { item: *item })
        }
        _ => None,
    });

    bus.subscribe(Observed::Player, Property::Status, |event| match event {
        EngineEvent::StatusChanged { status } => {
            Some(Reaction::EngineStatusChanged { status: *status })
        }
        _ => None,
    });

    bus.subscribe(Observed::Player, Property::Rate, |event| match event {
        EngineEvent::RateChanged { rate } => Some(Reaction::RateChanged { rate: *rate }),
        _ => None,
    });
}

fn observe_session(bus: &mut PlayerBus) {
    bus.subscribe(
        Observed::Session,
        Property::Interruption,
        |event| match event {
            EngineEvent::Interruption { kind } => Some(Reaction::Interrupted { kind: *kind }),
            _ => None,
        },
    );

    bus.subscribe(
        Observed::Session,
        Property::RouteChange,
        |event| match event {
            EngineEvent::RouteChanged { reason } => {
                Some(Reaction::RouteChanged { reason: *reason })
            }
            _ => None,
        },
    );
}
