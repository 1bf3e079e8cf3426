use super::album_aggregate;
use super::errors::{ReviewError, ReviewResult};
use super::models::{
    AlbumOpinion, AlbumReview, AlbumReviewCommand, AlbumReviewPatch, Opinion, TrackReview,
    TrackReviewCommand, DEFAULT_ALBUM_RATING,
};
use super::ranking;
use super::rescoring;
use super::review_store::ReviewStore;
use crate::metadata::{MetadataProvider, TrackMetadata};
use crate::metrics;
use anyhow::anyhow;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Coordinates review mutations across ranking, rescoring and album aggregates.
///
/// Every track review mutation loads the owner's whole review set, applies
/// the rank change in memory, rescores it and writes it back in a single
/// store transaction. Album aggregates are refreshed afterwards on a
/// best-effort basis.
pub struct ReviewManager {
    store: Arc<dyn ReviewStore>,
    metadata: Arc<dyn MetadataProvider>,
    strict_metadata: bool,
}

/// Current time at the resolution the store keeps.
fn now() -> SystemTime {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    UNIX_EPOCH + Duration::from_secs(secs)
}

fn record<T>(operation: &str, result: ReviewResult<T>) -> ReviewResult<T> {
    metrics::record_review_mutation(operation, result.is_ok());
    result
}

fn ensure_owner(owner_id: &str, user_id: &str, resource: String) -> ReviewResult<()> {
    if owner_id != user_id {
        return Err(ReviewError::Unauthorized {
            user_id: user_id.to_string(),
            resource,
        });
    }
    Ok(())
}

fn find_review(reviews: &[TrackReview], id: &str) -> ReviewResult<TrackReview> {
    reviews
        .iter()
        .find(|r| r.id == id)
        .cloned()
        .ok_or_else(|| ReviewError::Store(anyhow!("Review {} vanished while saving", id)))
}

/// Genres of the user's reviews that fall on the album, first seen first.
fn album_genres(user_reviews: &[TrackReview], track_ids: &[String]) -> Vec<String> {
    let mut genres: Vec<String> = Vec::new();
    for review in user_reviews.iter().filter(|r| track_ids.contains(&r.track_id)) {
        for genre in &review.genres {
            if !genres.contains(genre) {
                genres.push(genre.clone());
            }
        }
    }
    genres
}

impl ReviewManager {
    pub fn new(
        store: Arc<dyn ReviewStore>,
        metadata: Arc<dyn MetadataProvider>,
        strict_metadata: bool,
    ) -> Self {
        Self {
            store,
            metadata,
            strict_metadata,
        }
    }

    // Track reviews

    pub fn get_review(&self, id: &str) -> ReviewResult<Option<TrackReview>> {
        Ok(self.store.get_track_review(id)?)
    }

    pub fn get_user_review(&self, user_id: &str, track_id: &str) -> ReviewResult<Option<TrackReview>> {
        Ok(self.store.get_user_track_review(user_id, track_id)?)
    }

    /// The user's reviews in global order, optionally restricted to some
    /// opinions. An empty filter returns every review.
    pub fn get_reviews_by_user(
        &self,
        user_id: &str,
        opinions: Option<&[Opinion]>,
    ) -> ReviewResult<Vec<TrackReview>> {
        let mut reviews = self.store.get_user_track_reviews(user_id)?;
        if let Some(opinions) = opinions.filter(|o| !o.is_empty()) {
            reviews.retain(|r| opinions.contains(&r.opinion));
        }
        ranking::sort_globally(&mut reviews);
        Ok(reviews)
    }

    /// Reviews of each requested track across all users. Tracks nobody
    /// reviewed map to an empty list.
    pub fn get_reviews_by_track_ids(
        &self,
        track_ids: &[String],
    ) -> ReviewResult<HashMap<String, Vec<TrackReview>>> {
        let mut result = HashMap::with_capacity(track_ids.len());
        for track_id in track_ids {
            if result.contains_key(track_id) {
                continue;
            }
            let reviews = self.store.get_track_reviews(track_id)?;
            result.insert(track_id.clone(), reviews);
        }
        Ok(result)
    }

    /// Creates a review, failing with `Conflict` if the user already reviewed
    /// the track.
    pub async fn create_review(
        &self,
        command: TrackReviewCommand,
        access_token: &str,
    ) -> ReviewResult<TrackReview> {
        let result = self.insert_review(command, access_token).await;
        record("create", result)
    }

    /// Creates the review, or updates the user's existing review of the track.
    pub async fn save_review(
        &self,
        command: TrackReviewCommand,
        access_token: &str,
    ) -> ReviewResult<TrackReview> {
        command.validate()?;
        match self
            .store
            .get_user_track_review(&command.user_id, &command.track_id)?
        {
            Some(existing) => {
                debug!(
                    "Routing review of {} by {} to update of {}",
                    command.track_id, command.user_id, existing.id
                );
                self.update_review(&existing.id, command, Some(access_token))
                    .await
            }
            None => self.create_review(command, access_token).await,
        }
    }

    /// Updates opinion, rank, description or track of an existing review.
    ///
    /// Without an access token the album aggregates are recomputed from the
    /// stored album track lists, and a changed track gets no metadata.
    pub async fn update_review(
        &self,
        id: &str,
        command: TrackReviewCommand,
        access_token: Option<&str>,
    ) -> ReviewResult<TrackReview> {
        let result = self.modify_review(id, command, access_token).await;
        record("update", result)
    }

    /// Returns false if the review does not exist.
    pub async fn delete_review(&self, id: &str, access_token: Option<&str>) -> ReviewResult<bool> {
        let result = match self.store.get_track_review(id) {
            Ok(Some(existing)) => self.remove_review(existing, access_token).await.map(|_| true),
            Ok(None) => Ok(false),
            Err(e) => Err(e.into()),
        };
        record("delete", result)
    }

    pub async fn delete_review_owned_by(
        &self,
        id: &str,
        user_id: &str,
        access_token: Option<&str>,
    ) -> ReviewResult<()> {
        let result = self.remove_owned_review(id, user_id, access_token).await;
        record("delete", result)
    }

    /// Returns false if the user has no review of the track.
    pub async fn delete_review_by_user_and_track(
        &self,
        user_id: &str,
        track_id: &str,
        access_token: Option<&str>,
    ) -> ReviewResult<bool> {
        let result = match self.store.get_user_track_review(user_id, track_id) {
            Ok(Some(existing)) => self.remove_review(existing, access_token).await.map(|_| true),
            Ok(None) => Ok(false),
            Err(e) => Err(e.into()),
        };
        record("delete", result)
    }

    /// Recomputes every rating of the user from the current ranks.
    pub fn rescore_reviews(&self, user_id: &str) -> ReviewResult<()> {
        let mut reviews = self.store.get_user_track_reviews(user_id)?;
        if reviews.is_empty() {
            return Ok(());
        }
        self.commit_user_reviews(user_id, &mut reviews, &[])?;
        info!("Rescored {} reviews of user {}", reviews.len(), user_id);
        Ok(())
    }

    /// Makes every bucket of the user dense again, then rescores.
    pub fn renormalize_user(&self, user_id: &str) -> ReviewResult<Vec<TrackReview>> {
        let mut reviews = self.store.get_user_track_reviews(user_id)?;
        ranking::renormalize(&mut reviews);
        self.commit_user_reviews(user_id, &mut reviews, &[])?;
        info!("Renormalized {} reviews of user {}", reviews.len(), user_id);
        Ok(reviews)
    }

    async fn insert_review(
        &self,
        command: TrackReviewCommand,
        access_token: &str,
    ) -> ReviewResult<TrackReview> {
        command.validate()?;
        if self
            .store
            .get_user_track_review(&command.user_id, &command.track_id)?
            .is_some()
        {
            return Err(ReviewError::Conflict(format!(
                "User {} already reviewed track {}",
                command.user_id, command.track_id
            )));
        }

        let (genres, album_id) = self
            .resolve_track(&command.track_id, Some(access_token))
            .await?
            .map(|m| (m.genres, m.album_id))
            .unwrap_or_default();

        let mut reviews = self.store.get_user_track_reviews(&command.user_id)?;
        let now = now();
        let review = TrackReview {
            id: Uuid::new_v4().to_string(),
            user_id: command.user_id.clone(),
            track_id: command.track_id.clone(),
            opinion: command.opinion,
            rank: 0,
            rating: 0.0,
            description: command.description.clone(),
            genres,
            album_id: album_id.clone(),
            created: now,
            updated: now,
        };
        let id = review.id.clone();
        ranking::place_review(&mut reviews, review, command.explicit_rank());
        self.commit_user_reviews(&command.user_id, &mut reviews, &[])?;

        let created = find_review(&reviews, &id)?;
        info!(
            "User {} reviewed track {} as {} (rank {}, rating {:.2})",
            created.user_id, created.track_id, created.opinion, created.rank, created.rating
        );

        if let Some(album_id) = album_id {
            self.recompute_album(&command.user_id, &album_id, Some(access_token))
                .await;
        }
        Ok(created)
    }

    async fn modify_review(
        &self,
        id: &str,
        command: TrackReviewCommand,
        access_token: Option<&str>,
    ) -> ReviewResult<TrackReview> {
        command.validate()?;
        let existing = self
            .store
            .get_track_review(id)?
            .ok_or_else(|| ReviewError::NotFound(format!("Review {}", id)))?;
        ensure_owner(&existing.user_id, &command.user_id, format!("review {}", id))?;

        let track_changed = existing.track_id != command.track_id;
        let mut metadata: Option<TrackMetadata> = None;
        if track_changed {
            if self
                .store
                .get_user_track_review(&command.user_id, &command.track_id)?
                .is_some()
            {
                return Err(ReviewError::Conflict(format!(
                    "User {} already reviewed track {}",
                    command.user_id, command.track_id
                )));
            }
            metadata = self.resolve_track(&command.track_id, access_token).await?;
        }

        let mut reviews = self.store.get_user_track_reviews(&existing.user_id)?;
        let apply_fields = |review: &mut TrackReview| {
            review.description = command.description.clone();
            review.updated = now();
            if track_changed {
                review.track_id = command.track_id.clone();
                match &metadata {
                    Some(m) => {
                        review.genres = m.genres.clone();
                        review.album_id = m.album_id.clone();
                    }
                    None => {
                        review.genres = vec![];
                        review.album_id = None;
                    }
                }
            }
        };

        if existing.opinion != command.opinion {
            let mut review = ranking::remove_review(&mut reviews, id)
                .ok_or_else(|| ReviewError::NotFound(format!("Review {}", id)))?;
            apply_fields(&mut review);
            review.opinion = command.opinion;
            debug!(
                "Moving review {} from {} to {}",
                id, existing.opinion, command.opinion
            );
            ranking::place_review(&mut reviews, review, command.explicit_rank());
        } else {
            if let Some(new_rank) = command.explicit_rank() {
                ranking::move_within_bucket(&mut reviews, id, new_rank);
            }
            if let Some(review) = reviews.iter_mut().find(|r| r.id == id) {
                apply_fields(review);
            }
        }
        self.commit_user_reviews(&existing.user_id, &mut reviews, &[])?;

        let updated = find_review(&reviews, id)?;
        info!(
            "Updated review {} of user {}: {} rank {} rating {:.2}",
            id, updated.user_id, updated.opinion, updated.rank, updated.rating
        );

        let mut albums: Vec<String> = existing.album_id.iter().cloned().collect();
        if let Some(album_id) = &updated.album_id {
            if !albums.contains(album_id) {
                albums.push(album_id.clone());
            }
        }
        for album_id in albums {
            self.recompute_album(&updated.user_id, &album_id, access_token)
                .await;
        }
        Ok(updated)
    }

    async fn remove_owned_review(
        &self,
        id: &str,
        user_id: &str,
        access_token: Option<&str>,
    ) -> ReviewResult<()> {
        let existing = self
            .store
            .get_track_review(id)?
            .ok_or_else(|| ReviewError::NotFound(format!("Review {}", id)))?;
        ensure_owner(&existing.user_id, user_id, format!("review {}", id))?;
        self.remove_review(existing, access_token).await
    }

    async fn remove_review(
        &self,
        existing: TrackReview,
        access_token: Option<&str>,
    ) -> ReviewResult<()> {
        let mut reviews = self.store.get_user_track_reviews(&existing.user_id)?;
        ranking::remove_review(&mut reviews, &existing.id);
        self.commit_user_reviews(&existing.user_id, &mut reviews, &[existing.id.clone()])?;
        info!(
            "Deleted review {} of track {} by user {}",
            existing.id, existing.track_id, existing.user_id
        );

        if let Some(album_id) = &existing.album_id {
            self.recompute_album(&existing.user_id, album_id, access_token)
                .await;
        }
        Ok(())
    }

    /// Rescores the whole set and writes it, together with the deletions,
    /// in one store transaction.
    fn commit_user_reviews(
        &self,
        user_id: &str,
        reviews: &mut [TrackReview],
        deleted_ids: &[String],
    ) -> ReviewResult<()> {
        let started = Instant::now();
        rescoring::rescore(reviews);
        metrics::record_rescore(started.elapsed());
        self.store
            .save_user_track_reviews(user_id, reviews, deleted_ids)?;
        Ok(())
    }

    async fn resolve_track(
        &self,
        track_id: &str,
        access_token: Option<&str>,
    ) -> ReviewResult<Option<TrackMetadata>> {
        let token = match access_token {
            Some(token) => token,
            None => return Ok(None),
        };
        match self.metadata.get_track(track_id, token).await {
            Ok(metadata) => Ok(Some(metadata)),
            Err(e) => {
                metrics::record_metadata_failure("track");
                if self.strict_metadata {
                    return Err(ReviewError::Upstream(e));
                }
                warn!(
                    "Could not resolve metadata of track {}, saving without genres: {:#}",
                    track_id, e
                );
                Ok(None)
            }
        }
    }

    // Album reviews

    pub fn get_album_review(&self, id: &str) -> ReviewResult<Option<AlbumReview>> {
        Ok(self.store.get_album_review(id)?)
    }

    pub fn get_user_album_review(
        &self,
        user_id: &str,
        spotify_album_id: &str,
    ) -> ReviewResult<Option<AlbumReview>> {
        Ok(self
            .store
            .get_user_album_review(user_id, spotify_album_id)?)
    }

    pub fn get_user_album_reviews(&self, user_id: &str) -> ReviewResult<Vec<AlbumReview>> {
        Ok(self.store.get_user_album_reviews(user_id)?)
    }

    pub fn get_album_reviews(&self, spotify_album_id: &str) -> ReviewResult<Vec<AlbumReview>> {
        Ok(self.store.get_album_reviews(spotify_album_id)?)
    }

    pub fn get_all_album_reviews(&self) -> ReviewResult<Vec<AlbumReview>> {
        Ok(self.store.get_all_album_reviews()?)
    }

    pub async fn create_album_review(
        &self,
        command: AlbumReviewCommand,
        access_token: Option<&str>,
    ) -> ReviewResult<AlbumReview> {
        command.validate()?;
        if self
            .store
            .get_user_album_review(&command.user_id, &command.spotify_album_id)?
            .is_some()
        {
            return Err(ReviewError::Conflict(format!(
                "User {} already has a review for album {}",
                command.user_id, command.spotify_album_id
            )));
        }

        let mut album = AlbumReview {
            id: Uuid::new_v4().to_string(),
            user_id: command.user_id,
            spotify_album_id: command.spotify_album_id,
            description: command.description,
            ranking: command.ranking,
            genres: command.genres,
            spotify_track_ids: command.spotify_track_ids,
            rating: DEFAULT_ALBUM_RATING,
            opinion: AlbumOpinion::Undefined,
            created: now(),
        };
        self.refresh_album_tracks(&mut album, access_token).await;
        let user_reviews = self.store.get_user_track_reviews(&album.user_id)?;
        album_aggregate::apply(&mut album, &user_reviews);
        self.store.insert_album_review(&album)?;
        info!(
            "User {} reviewed album {} ({:?}, rating {:.2})",
            album.user_id, album.spotify_album_id, album.opinion, album.rating
        );
        Ok(album)
    }

    /// Applies `patch` to an album review owned by `user_id` and recomputes
    /// its aggregate.
    pub async fn update_album_review(
        &self,
        id: &str,
        user_id: &str,
        patch: AlbumReviewPatch,
        access_token: Option<&str>,
    ) -> ReviewResult<AlbumReview> {
        patch.validate()?;
        let mut album = self
            .store
            .get_album_review(id)?
            .ok_or_else(|| ReviewError::NotFound(format!("Album review {}", id)))?;
        ensure_owner(&album.user_id, user_id, format!("album review {}", id))?;

        let explicit_tracks = patch.spotify_track_ids.is_some();
        patch.apply_to(&mut album);
        if !explicit_tracks {
            self.refresh_album_tracks(&mut album, access_token).await;
        }
        let user_reviews = self.store.get_user_track_reviews(&album.user_id)?;
        album_aggregate::apply(&mut album, &user_reviews);
        self.store.update_album_review(&album)?;
        debug!("Updated album review {}", id);
        Ok(album)
    }

    /// Updates the user's review of the album if there is one, creates it otherwise.
    pub async fn save_album_review(
        &self,
        command: AlbumReviewCommand,
        access_token: Option<&str>,
    ) -> ReviewResult<AlbumReview> {
        command.validate()?;
        match self
            .store
            .get_user_album_review(&command.user_id, &command.spotify_album_id)?
        {
            Some(existing) => {
                let user_id = command.user_id.clone();
                let patch = AlbumReviewPatch {
                    description: Some(command.description),
                    ranking: Some(command.ranking),
                    genres: Some(command.genres),
                    spotify_track_ids: Some(command.spotify_track_ids),
                };
                self.update_album_review(&existing.id, &user_id, patch, access_token)
                    .await
            }
            None => self.create_album_review(command, access_token).await,
        }
    }

    pub fn delete_album_review(&self, id: &str, user_id: &str) -> ReviewResult<()> {
        let album = self
            .store
            .get_album_review(id)?
            .ok_or_else(|| ReviewError::NotFound(format!("Album review {}", id)))?;
        ensure_owner(&album.user_id, user_id, format!("album review {}", id))?;
        self.store.delete_album_review(id)?;
        info!("Deleted album review {} of user {}", id, user_id);
        Ok(())
    }

    async fn refresh_album_tracks(&self, album: &mut AlbumReview, access_token: Option<&str>) {
        let token = match access_token {
            Some(token) => token,
            None => return,
        };
        match self
            .metadata
            .get_album_track_ids(&album.spotify_album_id, token)
            .await
        {
            Ok(track_ids) => album.spotify_track_ids = track_ids,
            Err(e) => {
                metrics::record_metadata_failure("album");
                warn!(
                    "Could not refresh tracks of album {}, keeping {} known tracks: {:#}",
                    album.spotify_album_id,
                    album.spotify_track_ids.len(),
                    e
                );
            }
        }
    }

    /// Best-effort refresh of the user's aggregate for `album_id`. Failures are
    /// logged and leave the aggregate stale.
    async fn recompute_album(&self, user_id: &str, album_id: &str, access_token: Option<&str>) {
        match self.try_recompute_album(user_id, album_id, access_token).await {
            Ok(status) => {
                metrics::record_album_recompute(status);
                debug!("Album {} of user {}: {}", album_id, user_id, status);
            }
            Err(e) => {
                metrics::record_album_recompute("failed");
                warn!(
                    "Failed to recompute album {} for user {}: {}",
                    album_id, user_id, e
                );
            }
        }
    }

    async fn try_recompute_album(
        &self,
        user_id: &str,
        album_id: &str,
        access_token: Option<&str>,
    ) -> ReviewResult<&'static str> {
        let existing = self.store.get_user_album_review(user_id, album_id)?;
        let fresh_track_ids = match access_token {
            Some(token) => Some(
                self.metadata
                    .get_album_track_ids(album_id, token)
                    .await
                    .map_err(|e| {
                        metrics::record_metadata_failure("album");
                        ReviewError::Upstream(e)
                    })?,
            ),
            None => None,
        };
        let user_reviews = self.store.get_user_track_reviews(user_id)?;

        match existing {
            Some(mut album) => {
                if let Some(track_ids) = fresh_track_ids {
                    album.spotify_track_ids = track_ids;
                }
                album_aggregate::apply(&mut album, &user_reviews);
                self.store.update_album_review(&album)?;
                Ok("updated")
            }
            None => {
                let track_ids = match fresh_track_ids {
                    Some(track_ids) => track_ids,
                    None => return Ok("skipped"),
                };
                let mut album = AlbumReview {
                    id: Uuid::new_v4().to_string(),
                    user_id: user_id.to_string(),
                    spotify_album_id: album_id.to_string(),
                    description: String::new(),
                    ranking: 0,
                    genres: album_genres(&user_reviews, &track_ids),
                    spotify_track_ids: track_ids,
                    rating: DEFAULT_ALBUM_RATING,
                    opinion: AlbumOpinion::Undefined,
                    created: now(),
                };
                album_aggregate::apply(&mut album, &user_reviews);
                self.store.insert_album_review(&album)?;
                Ok("created")
            }
        }
    }
}
