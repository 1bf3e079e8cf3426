//! Maps bucket ranks onto the 0-10 rating scale.

use super::models::{Opinion, TrackReview};
use super::ranking;

/// Closed rating interval assigned to an opinion bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreRange {
    pub min: f64,
    pub max: f64,
}

impl ScoreRange {
    pub fn for_opinion(opinion: Opinion) -> Self {
        match opinion {
            Opinion::Liked => ScoreRange { min: 7.0, max: 10.0 },
            Opinion::Neutral => ScoreRange { min: 4.0, max: 6.9 },
            Opinion::Dislike => ScoreRange { min: 0.0, max: 3.9 },
        }
    }

    pub fn contains(&self, rating: f64) -> bool {
        rating >= self.min && rating <= self.max
    }

    /// Rating of the item at `index` (0 = best) in a bucket of `len` items.
    pub fn rating_at(&self, index: usize, len: usize) -> f64 {
        if len <= 1 {
            return self.max;
        }
        if index + 1 >= len {
            return self.min;
        }
        let step = (self.max - self.min) / (len - 1) as f64;
        (self.max - index as f64 * step).max(self.min)
    }
}

/// Recomputes every rating from the current ranks, bucket by bucket.
///
/// Deterministic and idempotent: the result depends only on opinions and ranks.
pub fn rescore(reviews: &mut [TrackReview]) {
    ranking::sort_globally(reviews);
    for opinion in Opinion::ALL {
        let range = ScoreRange::for_opinion(opinion);
        let len = reviews.iter().filter(|r| r.opinion == opinion).count();
        for (index, review) in reviews
            .iter_mut()
            .filter(|r| r.opinion == opinion)
            .enumerate()
        {
            review.rating = range.rating_at(index, len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::ranking::tests::review;

    fn rating_of(reviews: &[TrackReview], id: &str) -> f64 {
        reviews.iter().find(|r| r.id == id).unwrap().rating
    }

    #[test]
    fn lone_review_gets_the_top_of_its_range() {
        for (opinion, expected) in [
            (Opinion::Liked, 10.0),
            (Opinion::Neutral, 6.9),
            (Opinion::Dislike, 3.9),
        ] {
            let mut reviews = vec![review("only", opinion, 1)];
            rescore(&mut reviews);
            assert_eq!(reviews[0].rating, expected);
        }
    }

    #[test]
    fn two_liked_reviews_span_the_whole_range() {
        let mut reviews = vec![review("b", Opinion::Liked, 2), review("a", Opinion::Liked, 1)];
        rescore(&mut reviews);
        assert_eq!(rating_of(&reviews, "a"), 10.0);
        assert_eq!(rating_of(&reviews, "b"), 7.0);
    }

    #[test]
    fn ratings_are_linearly_spaced() {
        let mut reviews = vec![
            review("a", Opinion::Dislike, 1),
            review("b", Opinion::Dislike, 2),
            review("c", Opinion::Dislike, 3),
            review("d", Opinion::Dislike, 4),
        ];
        rescore(&mut reviews);
        let step = 3.9 / 3.0;
        assert!((rating_of(&reviews, "b") - (3.9 - step)).abs() < 1e-9);
        assert!((rating_of(&reviews, "c") - (3.9 - 2.0 * step)).abs() < 1e-9);
        assert_eq!(rating_of(&reviews, "d"), 0.0);
    }

    #[test]
    fn ratings_stay_in_range_and_decrease_with_rank() {
        let mut reviews = Vec::new();
        for (i, opinion) in Opinion::ALL.iter().cycle().take(31).enumerate() {
            reviews.push(review(&format!("r{}", i), *opinion, i as u32 + 1));
        }
        ranking::renormalize(&mut reviews);
        rescore(&mut reviews);

        for opinion in Opinion::ALL {
            let range = ScoreRange::for_opinion(opinion);
            let bucket = ranking::bucket(&reviews, opinion);
            for pair in bucket.windows(2) {
                assert!(pair[0].rating >= pair[1].rating);
            }
            for r in bucket {
                assert!(range.contains(r.rating), "{} out of range", r.rating);
            }
        }
    }

    #[test]
    fn rescoring_twice_is_idempotent() {
        let mut reviews = vec![
            review("a", Opinion::Liked, 1),
            review("b", Opinion::Liked, 2),
            review("c", Opinion::Neutral, 1),
            review("d", Opinion::Neutral, 2),
            review("e", Opinion::Neutral, 3),
        ];
        rescore(&mut reviews);
        let first: Vec<f64> = reviews.iter().map(|r| r.rating).collect();
        rescore(&mut reviews);
        let second: Vec<f64> = reviews.iter().map(|r| r.rating).collect();
        assert_eq!(first, second);
    }
}
