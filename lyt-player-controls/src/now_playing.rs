use std::time::Duration;

use lyt_player_models::{Artwork, Playlist, Track};

/// What a lock-screen style publisher needs to show.
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    pub track: Track,
    pub elapsed: Option<Duration>,
    pub duration: Option<Duration>,
    pub rate: f32,
    /// 1-based position of the track in the playlist.
    pub chapter_number: usize,
    pub chapter_count: usize,
    pub artwork: Option<Artwork>,
}

impl NowPlaying {
    pub(crate) fn new(
        playlist: &Playlist,
        index: usize,
        elapsed: Option<Duration>,
        duration: Option<Duration>,
        rate: f32,
    ) -> Option<Self> {
        let track = playlist.get(index)?;

        Some(Self {
            artwork: track.cached_artwork().cloned(),
            track: track.clone(),
            elapsed,
            duration,
            rate,
            chapter_number: index + 1,
            chapter_count: playlist.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn chapters_are_one_based() {
        let playlist: Playlist = ["a", "b"]
            .into_iter()
            .map(|name| {
                Track::new(
                    Url::parse(&format!("file:///{name}.mp3")).unwrap(),
                    name,
                    "Artist",
                    "Album",
                    None,
                )
            })
            .collect();
        playlist.get(1).unwrap().cache_artwork(Artwork {
            data: vec![9],
            mime_type: None,
        });

        let info = NowPlaying::new(&playlist, 1, None, Some(Duration::from_secs(3)), 1.0).unwrap();
        assert_eq!(info.chapter_number, 2);
        assert_eq!(info.chapter_count, 2);
        assert_eq!(info.track.title, "b");
        assert_eq!(info.artwork.map(|a| a.data), Some(vec![9]));

        assert!(NowPlaying::new(&playlist, 2, None, None, 1.0).is_none());
    }
}
