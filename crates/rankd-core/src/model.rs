//! Data model for the leaderboard domain.
//!
//! Rank is never stored as ground truth. A [`RankedPlayer`] carries the
//! dense rank computed at query time: players with equal totals share a
//! rank, and the next distinct total advances the rank by exactly one.

use serde::{Deserialize, Serialize};

/// Opaque player identifier (positive integer, assigned by the store).
pub type PlayerId = i64;

/// Game mode recorded on score events when the caller does not specify one.
pub const DEFAULT_GAME_MODE: &str = "solo";

/// One row of a ranking query result.
///
/// `rank` is the global dense rank over all leaderboard entries at the time
/// the query ran, not the position within the returned page — a top-N page
/// may legitimately contain several rows with the same rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedPlayer {
    /// Player identifier.
    pub player_id: PlayerId,
    /// Display name (unique across players).
    pub username: String,
    /// Sum of all the player's score event deltas.
    pub total_score: i64,
    /// Dense rank over `total_score` descending, starting at 1.
    pub rank: i64,
}
