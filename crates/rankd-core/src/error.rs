//! Domain error taxonomy.
//!
//! Every externally visible failure maps onto one of these variants with a
//! stable message. Cache failures are deliberately absent: the cache layer
//! absorbs its own errors (see [`crate::cache`]) and no caller above it
//! ever observes a cache-specific error type.

use crate::model::PlayerId;

/// Errors surfaced by the leaderboard service and its score store.
#[derive(Debug, thiserror::Error)]
pub enum LeaderboardError {
    /// Malformed or out-of-range input. Caller's fault, not retryable.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The referenced player does not exist.
    #[error("player {0} not found")]
    PlayerNotFound(PlayerId),

    /// Username uniqueness violation on player creation.
    #[error("username '{0}' is already taken")]
    UsernameTaken(String),

    /// Connection, timeout, or transaction failure in the score store.
    ///
    /// May be retried by the caller; never retried internally, since score
    /// submission carries no idempotency key and a blind retry risks
    /// double-counting.
    #[error("score store error: {0}")]
    Store(String),
}

impl LeaderboardError {
    /// True for transient store failures a caller may reasonably retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}
