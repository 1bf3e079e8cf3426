//! Track metadata lookups used to enrich reviews with genres and album ids.

mod client;
mod models;

pub use client::HttpMetadataProvider;
pub use models::{
    ProviderAlbum, ProviderAlbumRef, ProviderArtist, ProviderArtists, ProviderPage, ProviderTrack,
    ProviderTrackRef, TrackMetadata,
};

use anyhow::Result;
use async_trait::async_trait;

/// Source of track and album metadata. Every call is authorized with the
/// caller's provider access token.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn get_track(&self, track_id: &str, access_token: &str) -> Result<TrackMetadata>;

    /// Ordered ids of every track on the album.
    async fn get_album_track_ids(&self, album_id: &str, access_token: &str) -> Result<Vec<String>>;
}

/// Provider used when no metadata service is configured. Every lookup fails.
pub struct NoOpMetadataProvider;

#[async_trait]
impl MetadataProvider for NoOpMetadataProvider {
    async fn get_track(&self, track_id: &str, _access_token: &str) -> Result<TrackMetadata> {
        anyhow::bail!("No metadata provider configured, cannot resolve track {}", track_id)
    }

    async fn get_album_track_ids(&self, album_id: &str, _access_token: &str) -> Result<Vec<String>> {
        anyhow::bail!("No metadata provider configured, cannot resolve album {}", album_id)
    }
}
