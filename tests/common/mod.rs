//! Common test infrastructure
//!
//! End-to-end tests drive a `ReviewManager` over a real SQLite file and a
//! fake metadata catalog. Tests should only import from this module.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{track_command, TestEnv, ACCESS_TOKEN, TRACK_1_ID, USER_1};
//! use tunedin_reviews::review::Opinion;
//!
//! #[tokio::test]
//! async fn test_create_review() {
//!     let env = TestEnv::new();
//!     let review = env
//!         .manager
//!         .create_review(track_command(USER_1, TRACK_1_ID, Opinion::Liked), ACCESS_TOKEN)
//!         .await
//!         .unwrap();
//!     assert_eq!(review.rank, 1);
//! }
//! ```

mod constants;
mod fixtures;

pub use constants::*;
pub use fixtures::{FakeMetadataProvider, TestEnv};

use tunedin_reviews::review::{
    Opinion, ReviewManager, ScoreRange, TrackReview, TrackReviewCommand,
};

pub fn track_command(user_id: &str, track_id: &str, opinion: Opinion) -> TrackReviewCommand {
    ranked_command(user_id, track_id, opinion, 0)
}

pub fn ranked_command(
    user_id: &str,
    track_id: &str,
    opinion: Opinion,
    requested_rank: i64,
) -> TrackReviewCommand {
    TrackReviewCommand {
        user_id: user_id.to_string(),
        track_id: track_id.to_string(),
        opinion,
        description: String::new(),
        requested_rank,
    }
}

/// Reviews of the user in global order.
pub fn user_reviews(manager: &ReviewManager, user_id: &str) -> Vec<TrackReview> {
    manager.get_reviews_by_user(user_id, None).unwrap()
}

pub fn review_of(manager: &ReviewManager, user_id: &str, track_id: &str) -> TrackReview {
    manager
        .get_user_review(user_id, track_id)
        .unwrap()
        .unwrap_or_else(|| panic!("{} has no review of {}", user_id, track_id))
}

/// Asserts dense ranks, bucket ordering, rating ranges and monotonic ratings
/// for every review of the user.
pub fn assert_ranking_invariants(manager: &ReviewManager, user_id: &str) {
    let reviews = user_reviews(manager, user_id);

    let priorities: Vec<u8> = reviews.iter().map(|r| r.opinion.priority()).collect();
    let mut sorted = priorities.clone();
    sorted.sort();
    assert_eq!(priorities, sorted, "buckets out of order for {}", user_id);

    for opinion in Opinion::ALL {
        let bucket: Vec<&TrackReview> = reviews.iter().filter(|r| r.opinion == opinion).collect();
        let ranks: Vec<u32> = bucket.iter().map(|r| r.rank).collect();
        let expected: Vec<u32> = (1..=bucket.len() as u32).collect();
        assert_eq!(ranks, expected, "{} ranks not dense for {}", opinion, user_id);

        let range = ScoreRange::for_opinion(opinion);
        for review in &bucket {
            assert!(
                range.contains(review.rating),
                "rating {} outside {:?} for {}",
                review.rating,
                range,
                review.id
            );
        }
        for pair in bucket.windows(2) {
            assert!(
                pair[0].rating >= pair[1].rating,
                "ratings increase with rank in {}",
                opinion
            );
        }
    }
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {}, got {}",
        expected,
        actual
    );
}
