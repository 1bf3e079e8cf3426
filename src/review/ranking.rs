//! Rank maintenance for a single user's track reviews.
//!
//! Every function here works on the in-memory review set of one user. Callers
//! load the set, apply one mutation, and persist the whole result; after any
//! public function returns, each opinion bucket holds the dense ranks `1..N`.

use std::cmp::Ordering;

use super::models::{Opinion, TrackReview};

fn global_order(a: &TrackReview, b: &TrackReview) -> Ordering {
    a.opinion
        .priority()
        .cmp(&b.opinion.priority())
        .then(a.rank.cmp(&b.rank))
        .then(a.created.cmp(&b.created))
        .then(a.id.cmp(&b.id))
}

/// Sorts by (opinion priority, rank): liked reviews first, best rank first.
pub fn sort_globally(reviews: &mut [TrackReview]) {
    reviews.sort_by(global_order);
}

/// Sorts and reassigns ranks so every bucket reads 1, 2, ..., N.
pub fn renormalize(reviews: &mut [TrackReview]) {
    sort_globally(reviews);
    let mut current: Option<Opinion> = None;
    let mut next_rank = 1;
    for review in reviews.iter_mut() {
        if current != Some(review.opinion) {
            current = Some(review.opinion);
            next_rank = 1;
        }
        review.rank = next_rank;
        next_rank += 1;
    }
}

/// Rank for a review appended to the end of `opinion`'s bucket.
///
/// The value is an index into the global ordering, so it can leave a gap in
/// the bucket until the set is renormalized.
pub fn insertion_rank(reviews: &[TrackReview], opinion: Opinion) -> u32 {
    if reviews.is_empty() {
        return 1;
    }
    let mut sorted: Vec<&TrackReview> = reviews.iter().collect();
    sorted.sort_by(|a, b| global_order(a, b));

    let last_in_bucket = sorted.iter().rposition(|r| r.opinion == opinion);
    let anchor = last_in_bucket.or_else(|| {
        sorted
            .iter()
            .rposition(|r| r.opinion.priority() < opinion.priority())
    });
    match anchor {
        Some(index) => index as u32 + 2,
        None => 1,
    }
}

/// Places `review` into its bucket, either at `requested_rank` (shifting the
/// reviews at or below that position down by one) or at the end.
pub fn place_review(reviews: &mut Vec<TrackReview>, mut review: TrackReview, requested_rank: Option<u32>) {
    match requested_rank {
        Some(requested) => {
            let mut colliding: Vec<&mut TrackReview> = reviews
                .iter_mut()
                .filter(|r| r.opinion == review.opinion && r.rank >= requested)
                .collect();
            colliding.sort_by_key(|r| r.rank);
            for other in colliding {
                other.rank += 1;
            }
            review.rank = requested;
        }
        None => {
            review.rank = insertion_rank(reviews, review.opinion);
        }
    }
    reviews.push(review);
    renormalize(reviews);
}

/// Moves a review to `new_rank` inside its current bucket with
/// remove-and-reinsert semantics. Returns false if the review is not in the set.
pub fn move_within_bucket(reviews: &mut [TrackReview], review_id: &str, new_rank: u32) -> bool {
    let (old_rank, opinion) = match reviews.iter().find(|r| r.id == review_id) {
        Some(review) => (review.rank, review.opinion),
        None => return false,
    };

    if old_rank != new_rank {
        for other in reviews
            .iter_mut()
            .filter(|r| r.opinion == opinion && r.id != review_id)
        {
            if old_rank < new_rank && other.rank > old_rank && other.rank <= new_rank {
                other.rank -= 1;
            } else if old_rank > new_rank && other.rank >= new_rank && other.rank < old_rank {
                other.rank += 1;
            }
        }
        if let Some(moved) = reviews.iter_mut().find(|r| r.id == review_id) {
            moved.rank = new_rank;
        }
    }
    renormalize(reviews);
    true
}

/// Removes a review from the set and closes the gap it leaves.
pub fn remove_review(reviews: &mut Vec<TrackReview>, review_id: &str) -> Option<TrackReview> {
    let index = reviews.iter().position(|r| r.id == review_id)?;
    let removed = reviews.remove(index);
    renormalize(reviews);
    Some(removed)
}

/// Reviews of a single bucket, best first.
pub fn bucket<'a>(reviews: &'a [TrackReview], opinion: Opinion) -> Vec<&'a TrackReview> {
    let mut items: Vec<&TrackReview> = reviews.iter().filter(|r| r.opinion == opinion).collect();
    items.sort_by(|a, b| global_order(a, b));
    items
}

/// Pairwise-comparison search for the position of a new review in a bucket.
///
/// Each answer to "is the new track better than `current()`?" halves the
/// remaining interval; when it closes, `requested_rank()` is the position to
/// pass to create/update.
#[derive(Debug, Clone)]
pub struct ComparisonSession {
    candidates: Vec<TrackReview>,
    low: usize,
    high: usize,
}

impl ComparisonSession {
    /// `candidates` is the target bucket without the review being placed.
    pub fn new(mut candidates: Vec<TrackReview>) -> Self {
        candidates.sort_by(global_order);
        let high = candidates.len();
        Self {
            candidates,
            low: 0,
            high,
        }
    }

    pub fn for_bucket(reviews: &[TrackReview], opinion: Opinion, excluding_track_id: Option<&str>) -> Self {
        let candidates = reviews
            .iter()
            .filter(|r| r.opinion == opinion)
            .filter(|r| Some(r.track_id.as_str()) != excluding_track_id)
            .cloned()
            .collect();
        Self::new(candidates)
    }

    pub fn is_finished(&self) -> bool {
        self.low >= self.high
    }

    /// The review to compare against next, `None` once finished.
    pub fn current(&self) -> Option<&TrackReview> {
        if self.is_finished() {
            None
        } else {
            self.candidates.get((self.low + self.high) / 2)
        }
    }

    pub fn record(&mut self, new_is_better: bool) {
        if self.is_finished() {
            return;
        }
        let mid = (self.low + self.high) / 2;
        if new_is_better {
            self.high = mid;
        } else {
            self.low = mid + 1;
        }
    }

    /// Remaining comparisons in the worst case.
    pub fn remaining_steps(&self) -> u32 {
        let span = self.high - self.low;
        usize::BITS - span.leading_zeros()
    }

    pub fn requested_rank(&self) -> Option<u32> {
        if self.is_finished() {
            Some(self.low as u32 + 1)
        } else {
            None
        }
    }
}
