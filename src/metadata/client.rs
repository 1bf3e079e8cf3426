//! HTTP client for the track metadata provider.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use super::models::{
    ProviderAlbum, ProviderArtists, ProviderPage, ProviderTrack, ProviderTrackRef, TrackMetadata,
};
use super::MetadataProvider;

/// Maximum number of artist ids the provider accepts in one request.
const MAX_ARTISTS_PER_REQUEST: usize = 50;

/// Metadata provider speaking the Spotify Web API dialect.
pub struct HttpMetadataProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMetadataProvider {
    /// Create a new metadata client.
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the provider API (e.g., "https://api.spotify.com/v1")
    /// * `timeout_sec` - Request timeout in seconds
    pub fn new(base_url: String, timeout_sec: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .build()
            .context("Failed to create HTTP client")?;

        // Ensure base_url doesn't have trailing slash
        let base_url = base_url.trim_end_matches('/').to_string();

        Ok(Self { client, base_url })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, access_token: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .with_context(|| format!("Failed to connect to metadata provider at {}", url))?;

        if !response.status().is_success() {
            anyhow::bail!("Request to {} failed with status: {}", url, response.status());
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }
}

#[async_trait]
impl MetadataProvider for HttpMetadataProvider {
    async fn get_track(&self, track_id: &str, access_token: &str) -> Result<TrackMetadata> {
        let url = format!("{}/tracks/{}", self.base_url, track_id);
        let track: ProviderTrack = self
            .get_json(&url, access_token)
            .await
            .with_context(|| format!("Failed to fetch track {}", track_id))?;

        // Track payloads embed simplified artists, which carry no genres
        let mut artists = Vec::new();
        for chunk in track.artists_without_genres().chunks(MAX_ARTISTS_PER_REQUEST) {
            let url = format!("{}/artists?ids={}", self.base_url, chunk.join(","));
            let response: ProviderArtists = self
                .get_json(&url, access_token)
                .await
                .with_context(|| format!("Failed to fetch artists of track {}", track_id))?;
            artists.extend(response.artists.into_iter().flatten());
        }

        let metadata = track.into_metadata(&artists);
        debug!(
            "Resolved track {}: album {:?}, {} genres",
            metadata.id,
            metadata.album_id,
            metadata.genres.len()
        );
        Ok(metadata)
    }

    async fn get_album_track_ids(&self, album_id: &str, access_token: &str) -> Result<Vec<String>> {
        let url = format!("{}/albums/{}", self.base_url, album_id);
        let album: ProviderAlbum = self
            .get_json(&url, access_token)
            .await
            .with_context(|| format!("Failed to fetch album {}", album_id))?;

        let mut track_ids: Vec<String> = album.tracks.items.into_iter().map(|t| t.id).collect();
        let mut next = album.tracks.next;
        while let Some(next_url) = next {
            let page: ProviderPage<ProviderTrackRef> = self
                .get_json(&next_url, access_token)
                .await
                .with_context(|| format!("Failed to fetch tracks page of album {}", album_id))?;
            track_ids.extend(page.items.into_iter().map(|t| t.id));
            next = page.next;
        }
        Ok(track_ids)
    }
}
