//! Models for the track metadata provider responses.
//!
//! These mirror the subset of the Spotify Web API JSON the review engine
//! needs, and convert into the provider-agnostic [`TrackMetadata`].

use serde::{Deserialize, Serialize};

/// What the review engine needs to know about a track.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub id: String,
    pub album_id: Option<String>,
    pub genres: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ProviderArtist {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub genres: Option<Vec<String>>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ProviderAlbumRef {
    pub id: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ProviderTrack {
    pub id: String,
    #[serde(default)]
    pub artists: Vec<ProviderArtist>,
    pub album: Option<ProviderAlbumRef>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ProviderTrackRef {
    pub id: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ProviderPage<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ProviderAlbum {
    pub id: String,
    pub tracks: ProviderPage<ProviderTrackRef>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ProviderArtists {
    pub artists: Vec<Option<ProviderArtist>>,
}

impl ProviderTrack {
    /// Artist ids whose genres are missing from the embedded artist objects.
    pub fn artists_without_genres(&self) -> Vec<String> {
        self.artists
            .iter()
            .filter(|a| a.genres.is_none())
            .map(|a| a.id.clone())
            .collect()
    }

    /// Builds the metadata, taking genres from `artists` (deduplicated, in
    /// first-seen order).
    pub fn into_metadata(self, artists: &[ProviderArtist]) -> TrackMetadata {
        let mut genres: Vec<String> = Vec::new();
        for genre in self
            .artists
            .iter()
            .chain(artists.iter())
            .filter_map(|a| a.genres.as_ref())
            .flatten()
        {
            if !genres.contains(genre) {
                genres.push(genre.clone());
            }
        }
        TrackMetadata {
            id: self.id,
            album_id: self.album.map(|a| a.id),
            genres,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_track_and_merges_genres() {
        let json = r#"{
            "id": "t1",
            "name": "Song",
            "album": {"id": "alb1", "name": "Album"},
            "artists": [
                {"id": "a1", "name": "One", "genres": ["rock", "indie"]},
                {"id": "a2", "name": "Two"}
            ]
        }"#;
        let track: ProviderTrack = serde_json::from_str(json).unwrap();
        assert_eq!(track.artists_without_genres(), vec!["a2".to_string()]);

        let fetched = vec![ProviderArtist {
            id: "a2".to_string(),
            name: "Two".to_string(),
            genres: Some(vec!["indie".to_string(), "shoegaze".to_string()]),
        }];
        let metadata = track.into_metadata(&fetched);
        assert_eq!(metadata.album_id.as_deref(), Some("alb1"));
        assert_eq!(metadata.genres, vec!["rock", "indie", "shoegaze"]);
    }

    #[test]
    fn parses_album_track_page() {
        let json = r#"{
            "id": "alb1",
            "tracks": {"items": [{"id": "t1"}, {"id": "t2"}], "next": null, "total": 2}
        }"#;
        let album: ProviderAlbum = serde_json::from_str(json).unwrap();
        let ids: Vec<&str> = album.tracks.items.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t2"]);
        assert!(album.tracks.next.is_none());
    }
}
