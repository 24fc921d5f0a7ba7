//! Wire protocol for the daemon's Unix-socket API.
//!
//! Requests and responses are newline-delimited JSON. The transport is
//! deliberately thin: all semantics live in the service layer, and this
//! module only fixes the externally visible shapes and error codes.

use rankd_core::model::{PlayerId, RankedPlayer};
use serde::{Deserialize, Serialize};

/// API request from client to daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApiRequest {
    /// Liveness probe.
    Ping,

    /// Create a player.
    CreatePlayer {
        /// Display name, unique across players.
        username: String,
    },

    /// Submit a score for a player.
    SubmitScore {
        /// Player identifier (positive integer).
        player_id: PlayerId,
        /// Score delta (positive integer).
        delta: i64,
    },

    /// Get the top 10 players.
    GetTopPlayers,

    /// Get a single player's rank.
    GetPlayerRank {
        /// Player identifier (positive integer).
        player_id: PlayerId,
    },
}

/// API response from daemon to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApiResponse {
    /// Liveness response.
    Pong {
        /// Daemon version.
        version: String,
        /// Daemon uptime in seconds.
        uptime_secs: u64,
    },

    /// Player created.
    PlayerCreated {
        /// Assigned player identifier.
        player_id: PlayerId,
    },

    /// Score accepted; event recorded and total updated.
    Submitted {
        /// Confirmation message.
        message: String,
    },

    /// Top players, ordered by total score descending.
    TopPlayers {
        /// At most 10 ranked rows; ties share a rank.
        players: Vec<RankedPlayer>,
    },

    /// A single player's ranked row.
    PlayerRank {
        /// The player's row with its globally computed dense rank.
        player: RankedPlayer,
    },

    /// Request failed.
    Error {
        /// Stable error kind.
        code: ErrorCode,
        /// Human-readable message.
        message: String,
    },
}

/// Stable error kinds exposed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed or out-of-range input.
    InvalidArgument,
    /// Referenced player does not exist (or has no leaderboard entry).
    PlayerNotFound,
    /// Username uniqueness violation.
    UsernameTaken,
    /// Store or transaction failure; the caller may retry.
    Internal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_wire_format_is_tagged_snake_case() {
        let req: ApiRequest =
            serde_json::from_str(r#"{"type":"submit_score","player_id":42,"delta":500}"#).unwrap();
        assert!(matches!(
            req,
            ApiRequest::SubmitScore {
                player_id: 42,
                delta: 500
            }
        ));
    }

    #[test]
    fn error_response_serializes_stable_code() {
        let resp = ApiResponse::Error {
            code: ErrorCode::PlayerNotFound,
            message: "player 7 not found".to_string(),
        };
        let json: serde_json::Value = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "player_not_found");
    }

    #[test]
    fn top_players_roundtrip() {
        let resp = ApiResponse::TopPlayers {
            players: vec![RankedPlayer {
                player_id: 1,
                username: "ada".to_string(),
                total_score: 100,
                rank: 1,
            }],
        };
        let bytes = serde_json::to_vec(&resp).unwrap();
        let back: ApiResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(matches!(back, ApiResponse::TopPlayers { players } if players.len() == 1));
    }
}
