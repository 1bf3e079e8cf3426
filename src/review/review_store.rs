use super::models::{AlbumReview, TrackReview};
use anyhow::Result;

#[cfg_attr(feature = "mock", mockall::automock)]
pub trait TrackReviewStore: Send + Sync {
    /// Returns the review with the given id.
    /// Returns Ok(None) if it does not exist.
    fn get_track_review(&self, id: &str) -> Result<Option<TrackReview>>;

    /// Returns the review a user wrote for a track, if any.
    fn get_user_track_review(&self, user_id: &str, track_id: &str) -> Result<Option<TrackReview>>;

    /// Returns all reviews written by a user, in no particular order.
    fn get_user_track_reviews(&self, user_id: &str) -> Result<Vec<TrackReview>>;

    /// Returns every review of a track, across users.
    fn get_track_reviews(&self, track_id: &str) -> Result<Vec<TrackReview>>;

    /// Inserts or fully overwrites the given reviews and deletes `deleted_ids`,
    /// atomically. All reviews must belong to `user_id`.
    fn save_user_track_reviews(
        &self,
        user_id: &str,
        reviews: &[TrackReview],
        deleted_ids: &[String],
    ) -> Result<()>;
}

#[cfg_attr(feature = "mock", mockall::automock)]
pub trait AlbumReviewStore: Send + Sync {
    fn get_album_review(&self, id: &str) -> Result<Option<AlbumReview>>;

    fn get_user_album_review(
        &self,
        user_id: &str,
        spotify_album_id: &str,
    ) -> Result<Option<AlbumReview>>;

    fn get_user_album_reviews(&self, user_id: &str) -> Result<Vec<AlbumReview>>;

    fn get_album_reviews(&self, spotify_album_id: &str) -> Result<Vec<AlbumReview>>;

    /// Returns every album review in the store.
    fn get_all_album_reviews(&self) -> Result<Vec<AlbumReview>>;

    /// Inserts a new album review. Fails if (user, album) already has one.
    fn insert_album_review(&self, review: &AlbumReview) -> Result<()>;

    /// Overwrites an existing album review, including its track list.
    fn update_album_review(&self, review: &AlbumReview) -> Result<()>;

    /// Returns false if nothing was deleted.
    fn delete_album_review(&self, id: &str) -> Result<bool>;
}

/// Combined trait for stores holding both track and album reviews
pub trait ReviewStore: TrackReviewStore + AlbumReviewStore {}

impl<T: TrackReviewStore + AlbumReviewStore> ReviewStore for T {}
