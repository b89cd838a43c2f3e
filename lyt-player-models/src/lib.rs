use std::sync::{Arc, OnceLock};

use url::Url;

#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Artwork {
    pub data: Vec<u8>,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Track {
    pub url: Url,
    pub title: String,
    pub artist: String,
    pub album: String,
    #[serde(default)]
    pub artwork_url: Option<Url>,
    #[serde(skip)]
    artwork: Arc<OnceLock<Artwork>>,
}

impl Track {
    pub fn new(
        url: Url,
        title: impl Into<String>,
        artist: impl Into<String>,
        album: impl Into<String>,
        artwork_url: Option<Url>,
    ) -> Self {
        Self {
            url,
            title: title.into(),
            artist: artist.into(),
            album: album.into(),
            artwork_url,
            artwork: Default::default(),
        }
    }

    /// Artwork fetched for this track, if any has been cached yet.
    pub fn cached_artwork(&self) -> Option<&Artwork> {
        self.artwork.get()
    }

    /// Stores downloaded artwork. The slot is written at most once and is
    /// shared by every clone of this track; returns `false` when it was
    /// already filled.
    pub fn cache_artwork(&self, artwork: Artwork) -> bool {
        self.artwork.set(artwork).is_ok()
    }
}

#[derive(Default, Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Playlist {
    tracks: Vec<Track>,
}

impl Playlist {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn add_track(&mut self, track: Track) {
        self.tracks.push(track);
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

impl FromIterator<Track> for Playlist {
    fn from_iter<I: IntoIterator<Item = Track>>(iter: I) -> Self {
        Self {
            tracks: iter.into_iter().collect(),
        }
    }
}
