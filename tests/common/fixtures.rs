//! Fake metadata provider and review manager fixtures

use super::constants::*;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tunedin_reviews::metadata::{MetadataProvider, TrackMetadata};
use tunedin_reviews::review::{ReviewManager, SqliteReviewStore};

/// In-memory metadata catalog. Failures can be switched on per lookup kind.
pub struct FakeMetadataProvider {
    tracks: HashMap<String, TrackMetadata>,
    albums: HashMap<String, Vec<String>>,
    fail_tracks: AtomicBool,
    fail_albums: AtomicBool,
    album_lookups: AtomicUsize,
}

impl FakeMetadataProvider {
    pub fn new() -> Self {
        let mut tracks = HashMap::new();
        let mut albums = HashMap::new();

        let catalog: [(&str, &[&str], &str); 2] = [
            (ALBUM_1_ID, &ALBUM_1_TRACKS, "rock"),
            (ALBUM_2_ID, &ALBUM_2_TRACKS, "jazz"),
        ];
        for (album_id, track_ids, genre) in catalog {
            for track_id in track_ids {
                tracks.insert(
                    track_id.to_string(),
                    TrackMetadata {
                        id: track_id.to_string(),
                        album_id: Some(album_id.to_string()),
                        genres: vec![genre.to_string()],
                    },
                );
            }
            albums.insert(
                album_id.to_string(),
                track_ids.iter().map(|t| t.to_string()).collect(),
            );
        }
        tracks.insert(
            TRACK_7_ID.to_string(),
            TrackMetadata {
                id: TRACK_7_ID.to_string(),
                album_id: None,
                genres: vec!["pop".to_string()],
            },
        );

        Self {
            tracks,
            albums,
            fail_tracks: AtomicBool::new(false),
            fail_albums: AtomicBool::new(false),
            album_lookups: AtomicUsize::new(0),
        }
    }

    pub fn set_fail_tracks(&self, fail: bool) {
        self.fail_tracks.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_albums(&self, fail: bool) {
        self.fail_albums.store(fail, Ordering::SeqCst);
    }

    pub fn album_lookups(&self) -> usize {
        self.album_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataProvider for FakeMetadataProvider {
    async fn get_track(&self, track_id: &str, access_token: &str) -> Result<TrackMetadata> {
        if self.fail_tracks.load(Ordering::SeqCst) {
            anyhow::bail!("metadata provider unavailable");
        }
        if access_token != ACCESS_TOKEN {
            anyhow::bail!("invalid access token");
        }
        self.tracks
            .get(track_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown track {}", track_id))
    }

    async fn get_album_track_ids(&self, album_id: &str, access_token: &str) -> Result<Vec<String>> {
        self.album_lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_albums.load(Ordering::SeqCst) {
            anyhow::bail!("metadata provider unavailable");
        }
        if access_token != ACCESS_TOKEN {
            anyhow::bail!("invalid access token");
        }
        self.albums
            .get(album_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown album {}", album_id))
    }
}

/// A review manager over a fresh SQLite file. The temp dir lives as long as
/// the environment.
pub struct TestEnv {
    pub manager: ReviewManager,
    pub metadata: Arc<FakeMetadataProvider>,
    _dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_strict_metadata(false)
    }

    pub fn with_strict_metadata(strict_metadata: bool) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = SqliteReviewStore::new(dir.path().join("reviews.db"))
            .expect("Failed to create review store");
        let metadata = Arc::new(FakeMetadataProvider::new());
        let manager = ReviewManager::new(Arc::new(store), metadata.clone(), strict_metadata);
        Self {
            manager,
            metadata,
            _dir: dir,
        }
    }
}
