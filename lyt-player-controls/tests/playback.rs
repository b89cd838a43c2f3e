use std::time::Duration;

use lyt_player_controls::{
    Playlist, PlayerConfig, Status, Track,
    notification::{Completion, Notification},
    player::Player,
    session::{AudioSession, NoopSession, SessionSlot},
    simulated::SimulatedEngine,
};
use tokio::sync::{broadcast, oneshot};
use url::Url;

fn playlist(names: &[&str]) -> Playlist {
    names
        .iter()
        .map(|name| {
            Track::new(
                Url::parse(&format!("https://example.com/{name}.mp3")).unwrap(),
                *name,
                "Artist",
                "Album",
                None,
            )
        })
        .collect()
}

async fn next_notification(
    receiver: &mut broadcast::Receiver<Notification>,
    matches: impl Fn(&Notification) -> bool,
) -> Notification {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let notification = receiver.recv().await.unwrap();
            if matches(&notification) {
                return notification;
            }
        }
    })
    .await
    .unwrap()
}

async fn state(receiver: &mut broadcast::Receiver<Notification>) -> Status {
    match next_notification(receiver, |n| matches!(n, Notification::StateChanged { .. })).await {
        Notification::StateChanged { to, .. } => to,
        _ => unreachable!(),
    }
}

async fn current_item_loaded(engine: &SimulatedEngine) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while engine.loading().is_empty() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn plays_a_playlist_to_the_end() {
    let (engine, events) = SimulatedEngine::new();
    let session = AudioSession::new(Box::new(NoopSession), SessionSlot::new());
    let mut player = Player::new(engine.clone(), events, session, &PlayerConfig::default());

    let controls = player.controls();
    let mut notifications = player.notify_receiver();
    let status = player.status_receiver();
    let handle = tokio::spawn(async move { player.player_loop().await });

    controls.load(playlist(&["A", "B", "C"]), 0).unwrap();
    controls.play().unwrap();

    assert_eq!(state(&mut notifications).await, Status::SettingUp);

    current_item_loaded(&engine).await;
    engine.make_ready(engine.queued()[0]);
    assert_eq!(state(&mut notifications).await, Status::Ready);
    assert_eq!(state(&mut notifications).await, Status::Playing);

    for (finished, following) in [("A", "B"), ("B", "C")] {
        // The following track is in the engine before the current one ends.
        let queued = engine.queued_urls();
        assert_eq!(queued.len(), 2);
        assert!(queued[1].path().ends_with(&format!("{following}.mp3")));

        engine.make_ready(engine.queued()[1]);
        engine.finish_current();

        match next_notification(&mut notifications, |n| {
            matches!(n, Notification::TrackFinished { .. })
        })
        .await
        {
            Notification::TrackFinished { track } => assert_eq!(track.title, finished),
            _ => unreachable!(),
        }
        assert_eq!(state(&mut notifications).await, Status::SettingUp);
        assert_eq!(state(&mut notifications).await, Status::Ready);
        assert_eq!(state(&mut notifications).await, Status::Playing);
    }

    engine.finish_current();
    assert_eq!(state(&mut notifications).await, Status::Stopped);
    assert_eq!(*status.borrow(), Status::Stopped);

    // Nothing left to step forward from.
    let (tx, rx) = oneshot::channel();
    controls
        .next(Completion::new(move |result| tx.send(result).unwrap()))
        .unwrap();
    assert!(rx.await.unwrap().is_err());

    controls.quit().unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn skip_completes_after_swap() {
    let (engine, events) = SimulatedEngine::new();
    let session = AudioSession::new(Box::new(NoopSession), SessionSlot::new());
    let mut player = Player::new(engine.clone(), events, session, &PlayerConfig::default());

    let controls = player.controls();
    let now_playing = player.now_playing_receiver();
    let handle = tokio::spawn(async move { player.player_loop().await });

    controls.load(playlist(&["A", "B", "C"]), 0).unwrap();

    let (tx, rx) = oneshot::channel();
    controls
        .skip_to(2, Completion::new(move |result| tx.send(result).unwrap()))
        .unwrap();
    assert_eq!(rx.await.unwrap(), Ok(()));

    let queued = engine.queued_urls();
    assert_eq!(queued.len(), 1);
    assert!(queued[0].path().ends_with("C.mp3"));

    let info = now_playing.borrow().clone().unwrap();
    assert_eq!(info.track.title, "C");
    assert_eq!(info.chapter_number, 3);

    controls.quit().unwrap();
    handle.await.unwrap().unwrap();
}
