//! Album score derived from the user's track reviews.

use std::collections::HashSet;

use super::models::{AlbumOpinion, AlbumReview, TrackReview, DEFAULT_ALBUM_RATING};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlbumAggregate {
    pub rating: f64,
    pub opinion: AlbumOpinion,
    /// How many of the album's tracks the user has reviewed.
    pub covered: usize,
}

/// Reviews needed before an album opinion is considered meaningful.
pub fn required_coverage(track_count: usize) -> usize {
    track_count.div_ceil(2)
}

pub fn opinion_for_rating(rating: f64) -> AlbumOpinion {
    if rating < 4.0 {
        AlbumOpinion::Dislike
    } else if rating < 7.0 {
        AlbumOpinion::Neutral
    } else {
        AlbumOpinion::Liked
    }
}

/// Averages the ratings of `user_reviews` that cover `album_track_ids`.
///
/// The rating is stored even when coverage is too low; callers must look at
/// the opinion, which stays `Undefined` below the coverage threshold.
pub fn compute(album_track_ids: &[String], user_reviews: &[TrackReview]) -> AlbumAggregate {
    if album_track_ids.is_empty() {
        return AlbumAggregate {
            rating: DEFAULT_ALBUM_RATING,
            opinion: AlbumOpinion::Undefined,
            covered: 0,
        };
    }

    let track_ids: HashSet<&str> = album_track_ids.iter().map(String::as_str).collect();
    let ratings: Vec<f64> = user_reviews
        .iter()
        .filter(|r| track_ids.contains(r.track_id.as_str()))
        .map(|r| r.rating)
        .collect();

    let rating = if ratings.is_empty() {
        DEFAULT_ALBUM_RATING
    } else {
        ratings.iter().sum::<f64>() / ratings.len() as f64
    };

    let opinion = if ratings.len() < required_coverage(album_track_ids.len()) {
        AlbumOpinion::Undefined
    } else {
        opinion_for_rating(rating)
    };

    AlbumAggregate {
        rating,
        opinion,
        covered: ratings.len(),
    }
}

/// Recomputes and writes the aggregate into `album`.
pub fn apply(album: &mut AlbumReview, user_reviews: &[TrackReview]) -> AlbumAggregate {
    let aggregate = compute(&album.spotify_track_ids, user_reviews);
    album.rating = aggregate.rating;
    album.opinion = aggregate.opinion;
    aggregate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::models::Opinion;
    use crate::review::ranking::tests::review;

    fn rated(track_id: &str, rating: f64) -> TrackReview {
        let mut r = review(track_id, Opinion::Liked, 1);
        r.track_id = track_id.to_string();
        r.rating = rating;
        r
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn album_without_tracks_is_undefined() {
        let aggregate = compute(&[], &[rated("t1", 9.0)]);
        assert_eq!(aggregate.rating, 5.0);
        assert_eq!(aggregate.opinion, AlbumOpinion::Undefined);
    }

    #[test]
    fn no_coverage_keeps_default_rating() {
        let aggregate = compute(&ids(&["t1", "t2"]), &[rated("other", 9.0)]);
        assert_eq!(aggregate.rating, 5.0);
        assert_eq!(aggregate.opinion, AlbumOpinion::Undefined);
        assert_eq!(aggregate.covered, 0);
    }

    #[test]
    fn low_coverage_stores_rating_but_stays_undefined() {
        let aggregate = compute(&ids(&["t1", "t2", "t3", "t4"]), &[rated("t1", 9.0)]);
        assert_eq!(aggregate.rating, 9.0);
        assert_eq!(aggregate.opinion, AlbumOpinion::Undefined);
    }

    #[test]
    fn coverage_threshold_rounds_up() {
        assert_eq!(required_coverage(4), 2);
        assert_eq!(required_coverage(5), 3);
        assert_eq!(required_coverage(1), 1);

        let tracks = ids(&["t1", "t2", "t3", "t4", "t5"]);
        let two = [rated("t1", 8.0), rated("t2", 8.0)];
        assert_eq!(compute(&tracks, &two).opinion, AlbumOpinion::Undefined);

        let three = [rated("t1", 8.0), rated("t2", 8.0), rated("t3", 8.0)];
        assert_eq!(compute(&tracks, &three).opinion, AlbumOpinion::Liked);
    }

    #[test]
    fn opinion_follows_average_rating() {
        let tracks = ids(&["t1", "t2"]);
        let aggregate = compute(&tracks, &[rated("t1", 10.0), rated("t2", 3.9)]);
        assert!((aggregate.rating - 6.95).abs() < 1e-9);
        assert_eq!(aggregate.opinion, AlbumOpinion::Neutral);

        assert_eq!(opinion_for_rating(3.99), AlbumOpinion::Dislike);
        assert_eq!(opinion_for_rating(4.0), AlbumOpinion::Neutral);
        assert_eq!(opinion_for_rating(7.0), AlbumOpinion::Liked);
    }
}
