use std::{fmt, sync::Arc, time::Duration};

use lyt_player_models::Track;
use tokio::sync::{
    broadcast::{self, Receiver, Sender},
    mpsc,
};
use tracing::debug;

use crate::{Result, Status, error::Error};

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    StateChanged { from: Status, to: Status },
    TrackFinished { track: Track },
    DurationFound { duration: Duration, track: Track },
    BufferingProgress { buffered: Duration, track: Track },
    TrackChanged { track: Track },
    Stalled { track: Track },
    Error { error: Error },
}

#[derive(Debug)]
pub struct NotificationBroadcast {
    tx: Sender<Notification>,
    rx: Receiver<Notification>,
}

impl NotificationBroadcast {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = broadcast::channel(capacity);
        Self { tx, rx }
    }

    pub fn send(&self, notification: Notification) -> Result<()> {
        self.tx.send(notification)?;
        Ok(())
    }

    pub fn subscribe(&self) -> Receiver<Notification> {
        self.rx.resubscribe()
    }
}

impl Default for NotificationBroadcast {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Caller supplied callback for an asynchronous command.
pub struct Completion(Box<dyn FnOnce(Result<()>) + Send>);

impl Completion {
    pub fn new(callback: impl FnOnce(Result<()>) + Send + 'static) -> Self {
        Self(Box::new(callback))
    }

    pub fn ignore() -> Self {
        Self::new(|_| {})
    }

    fn call(self, result: Result<()>) {
        (self.0)(result)
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Completion")
    }
}

pub type StalledCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug)]
pub(crate) enum Outbound {
    Notify(Notification),
    Complete(Completion, Result<()>),
    Stalled,
}

/// Delivers everything the player reports, in the order it was produced,
/// away from the player loop.
pub struct Dispatcher {
    rx: mpsc::UnboundedReceiver<Outbound>,
    broadcast: Arc<NotificationBroadcast>,
    stalled: Option<StalledCallback>,
}

impl Dispatcher {
    pub(crate) fn new(
        rx: mpsc::UnboundedReceiver<Outbound>,
        broadcast: Arc<NotificationBroadcast>,
        stalled: Option<StalledCallback>,
    ) -> Self {
        Self {
            rx,
            broadcast,
            stalled,
        }
    }

    pub async fn run(mut self) {
        while let Some(outbound) = self.rx.recv().await {
            match outbound {
                Outbound::Notify(notification) => {
                    // Nobody listening is fine.
                    if self.broadcast.send(notification).is_err() {
                        debug!("no notification receivers");
                    }
                }
                Outbound::Complete(completion, result) => completion.call(result),
                Outbound::Stalled => {
                    if let Some(stalled) = &self.stalled {
                        stalled();
                    }
                }
            }
        }

        debug!("dispatcher stopped");
    }
}
