//! TunedIn review engine
//!
//! Track reviews ranked inside opinion buckets, ratings derived from ranks,
//! and album reviews aggregated from the track reviews of each album.

pub mod config;
pub mod metadata;
pub mod metrics;
pub mod review;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use metadata::{HttpMetadataProvider, MetadataProvider, NoOpMetadataProvider};
pub use review::{ReviewError, ReviewManager, ReviewStore, SqliteReviewStore};
