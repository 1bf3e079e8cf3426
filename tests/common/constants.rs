//! Shared constants for end-to-end tests
//!
//! The fake metadata catalog is described here. When test data changes,
//! update only this file.

// ============================================================================
// Users
// ============================================================================

pub const USER_1: &str = "user-1";

pub const USER_2: &str = "user-2";

/// Token accepted by the fake metadata provider
pub const ACCESS_TOKEN: &str = "test-access-token";

// ============================================================================
// Fake catalog
// ============================================================================

/// Four track album
pub const ALBUM_1_ID: &str = "album-1";

/// Two track album
pub const ALBUM_2_ID: &str = "album-2";

pub const TRACK_1_ID: &str = "track-1";
pub const TRACK_2_ID: &str = "track-2";
pub const TRACK_3_ID: &str = "track-3";
pub const TRACK_4_ID: &str = "track-4";

pub const TRACK_5_ID: &str = "track-5";
pub const TRACK_6_ID: &str = "track-6";

/// Single without an album
pub const TRACK_7_ID: &str = "track-7";

pub const ALBUM_1_TRACKS: [&str; 4] = [TRACK_1_ID, TRACK_2_ID, TRACK_3_ID, TRACK_4_ID];
pub const ALBUM_2_TRACKS: [&str; 2] = [TRACK_5_ID, TRACK_6_ID];
