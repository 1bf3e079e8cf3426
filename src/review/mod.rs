pub mod album_aggregate;
mod errors;
mod models;
pub mod ranking;
pub mod rescoring;
mod review_manager;
mod review_store;
mod sqlite_review_store;

pub use errors::{ReviewError, ReviewResult};
pub use models::{
    validate_description, AlbumOpinion, AlbumReview, AlbumReviewCommand, AlbumReviewPatch,
    Opinion, TrackReview, TrackReviewCommand, DEFAULT_ALBUM_RATING, MAX_DESCRIPTION_WORDS,
};
pub use ranking::ComparisonSession;
pub use rescoring::ScoreRange;
pub use review_manager::ReviewManager;
pub use review_store::{AlbumReviewStore, ReviewStore, TrackReviewStore};
#[cfg(feature = "mock")]
pub use review_store::{MockAlbumReviewStore, MockTrackReviewStore};
pub use sqlite_review_store::SqliteReviewStore;
