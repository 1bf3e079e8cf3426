//! Review data models

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use super::errors::ReviewError;

/// Maximum number of whitespace-separated words allowed in a description.
pub const MAX_DESCRIPTION_WORDS: usize = 200;

/// Rating given to albums that cannot be derived from any track review.
pub const DEFAULT_ALBUM_RATING: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Opinion {
    Liked,
    Neutral,
    Dislike,
}

impl Opinion {
    pub const ALL: [Opinion; 3] = [Opinion::Liked, Opinion::Neutral, Opinion::Dislike];

    /// Position of the bucket in the global ordering, liked reviews first.
    pub fn priority(&self) -> u8 {
        match self {
            Opinion::Liked => 0,
            Opinion::Neutral => 1,
            Opinion::Dislike => 2,
        }
    }

    pub fn to_int(&self) -> i32 {
        self.priority() as i32
    }

    pub fn from_int(value: i32) -> Option<Self> {
        match value {
            0 => Some(Opinion::Liked),
            1 => Some(Opinion::Neutral),
            2 => Some(Opinion::Dislike),
            _ => None,
        }
    }
}

impl fmt::Display for Opinion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Opinion::Liked => "LIKED",
            Opinion::Neutral => "NEUTRAL",
            Opinion::Dislike => "DISLIKE",
        };
        f.write_str(s)
    }
}

impl FromStr for Opinion {
    type Err = ReviewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LIKED" | "LIKE" => Ok(Opinion::Liked),
            "NEUTRAL" => Ok(Opinion::Neutral),
            "DISLIKE" | "DISLIKED" => Ok(Opinion::Dislike),
            other => Err(ReviewError::InvalidInput(format!(
                "Unknown opinion '{}'",
                other
            ))),
        }
    }
}

/// Album-level opinion, `Undefined` until enough of the album has been reviewed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlbumOpinion {
    Liked,
    Neutral,
    Dislike,
    Undefined,
}

impl AlbumOpinion {
    pub fn to_int(&self) -> i32 {
        match self {
            AlbumOpinion::Liked => 0,
            AlbumOpinion::Neutral => 1,
            AlbumOpinion::Dislike => 2,
            AlbumOpinion::Undefined => 3,
        }
    }

    pub fn from_int(value: i32) -> Self {
        match value {
            0 => AlbumOpinion::Liked,
            1 => AlbumOpinion::Neutral,
            2 => AlbumOpinion::Dislike,
            _ => AlbumOpinion::Undefined,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackReview {
    pub id: String,
    pub user_id: String,
    pub track_id: String,
    pub opinion: Opinion,
    /// Position inside the opinion bucket, 1 is the most preferred.
    pub rank: u32,
    /// Derived from `rank`, always rewritten by the rescoring step.
    pub rating: f64,
    pub description: String,
    pub genres: Vec<String>,
    /// Album the track belongs to, resolved from the metadata provider.
    pub album_id: Option<String>,
    pub created: SystemTime,
    pub updated: SystemTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlbumReview {
    pub id: String,
    pub user_id: String,
    pub spotify_album_id: String,
    pub description: String,
    /// User-settable ordering, unrelated to track ranks.
    pub ranking: u32,
    pub genres: Vec<String>,
    pub spotify_track_ids: Vec<String>,
    pub rating: f64,
    pub opinion: AlbumOpinion,
    pub created: SystemTime,
}

/// Create/update request for a track review, validated before it reaches the
/// ranking engine.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackReviewCommand {
    pub user_id: String,
    pub track_id: String,
    pub opinion: Opinion,
    #[serde(default)]
    pub description: String,
    /// Requested position in the bucket; 0 or less appends at the end.
    #[serde(default)]
    pub requested_rank: i64,
}

impl TrackReviewCommand {
    pub fn validate(&self) -> Result<(), ReviewError> {
        require_non_empty("user_id", &self.user_id)?;
        require_non_empty("track_id", &self.track_id)?;
        validate_description(&self.description)
    }

    /// The explicit position asked for, if any.
    pub fn explicit_rank(&self) -> Option<u32> {
        if self.requested_rank > 0 {
            Some(self.requested_rank.min(u32::MAX as i64) as u32)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlbumReviewCommand {
    pub user_id: String,
    pub spotify_album_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub ranking: u32,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub spotify_track_ids: Vec<String>,
}

impl AlbumReviewCommand {
    pub fn validate(&self) -> Result<(), ReviewError> {
        require_non_empty("user_id", &self.user_id)?;
        require_non_empty("spotify_album_id", &self.spotify_album_id)?;
        validate_description(&self.description)
    }
}

/// Partial album review update, absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlbumReviewPatch {
    pub description: Option<String>,
    pub ranking: Option<u32>,
    pub genres: Option<Vec<String>>,
    pub spotify_track_ids: Option<Vec<String>>,
}

impl AlbumReviewPatch {
    pub fn validate(&self) -> Result<(), ReviewError> {
        match &self.description {
            Some(description) => validate_description(description),
            None => Ok(()),
        }
    }

    pub fn apply_to(self, review: &mut AlbumReview) {
        if let Some(description) = self.description {
            review.description = description;
        }
        if let Some(ranking) = self.ranking {
            review.ranking = ranking;
        }
        if let Some(genres) = self.genres {
            review.genres = genres;
        }
        if let Some(track_ids) = self.spotify_track_ids {
            review.spotify_track_ids = track_ids;
        }
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), ReviewError> {
    if value.trim().is_empty() {
        return Err(ReviewError::InvalidInput(format!("{} cannot be empty", field)));
    }
    Ok(())
}

pub fn validate_description(description: &str) -> Result<(), ReviewError> {
    let words = description.split_whitespace().count();
    if words > MAX_DESCRIPTION_WORDS {
        return Err(ReviewError::InvalidInput(format!(
            "Description must not exceed {} words (got {})",
            MAX_DESCRIPTION_WORDS, words
        )));
    }
    Ok(())
}
