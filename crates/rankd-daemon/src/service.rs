//! Consistency coordinator: the service-level API consumed by the
//! transport layer.
//!
//! Orchestrates the write path (atomic store transaction, then targeted
//! cache invalidation) and the read path (cache lookup, fallback to the
//! store's ranking query, cache populate). Cache trouble anywhere on these
//! paths is invisible to the caller beyond added latency; store failures
//! propagate unchanged and are never retried here, since submissions carry
//! no idempotency key.

use std::time::Duration;

use rankd_core::cache::{Cache, TOP_PLAYERS_KEY, player_rank_key};
use rankd_core::error::LeaderboardError;
use rankd_core::model::{DEFAULT_GAME_MODE, PlayerId, RankedPlayer};
use tracing::{debug, warn};

use crate::store::ScoreStore;

/// Page size for the top-players query; also the scope of the singleton
/// cache key.
const TOP_PLAYERS_LIMIT: i64 = 10;

/// Maximum accepted username length in bytes. `SQLite` TEXT is unbounded,
/// so this is enforced here at the service boundary.
const MAX_USERNAME_LEN: usize = 255;

/// The leaderboard service.
pub struct Leaderboard {
    store: ScoreStore,
    cache: Cache,
    top_ttl: Duration,
    rank_ttl: Duration,
}

impl Leaderboard {
    /// Build the service over a store and a cache, with the two configured
    /// projection TTLs.
    #[must_use]
    pub fn new(store: ScoreStore, cache: Cache, top_ttl: Duration, rank_ttl: Duration) -> Self {
        Self {
            store,
            cache,
            top_ttl,
            rank_ttl,
        }
    }

    /// Create a player with a unique display name.
    ///
    /// # Errors
    ///
    /// - [`LeaderboardError::Validation`] for an empty or oversized name.
    /// - [`LeaderboardError::UsernameTaken`] if the name exists.
    /// - [`LeaderboardError::Store`] on store failure.
    pub async fn create_player(&self, username: &str) -> Result<PlayerId, LeaderboardError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(LeaderboardError::Validation(
                "username must not be empty".to_string(),
            ));
        }
        if username.len() > MAX_USERNAME_LEN {
            return Err(LeaderboardError::Validation(format!(
                "username must be at most {MAX_USERNAME_LEN} bytes"
            )));
        }
        self.store.create_player(username).await
    }

    /// Submit a score for a player.
    ///
    /// On success, exactly two cache keys are invalidated: the singleton
    /// top-10 key (any write can reorder the global ranking) and this
    /// player's rank key. On store failure the transaction has already
    /// rolled back, no invalidation happens, and the error propagates
    /// unchanged.
    ///
    /// # Errors
    ///
    /// - [`LeaderboardError::Validation`] unless both `player_id` and
    ///   `delta` are positive integers.
    /// - [`LeaderboardError::PlayerNotFound`] for an unknown player.
    /// - [`LeaderboardError::Store`] on transaction failure.
    pub async fn submit_score(
        &self,
        player_id: PlayerId,
        delta: i64,
    ) -> Result<(), LeaderboardError> {
        if player_id < 1 {
            return Err(LeaderboardError::Validation(
                "player_id must be a positive integer".to_string(),
            ));
        }
        if delta < 1 {
            return Err(LeaderboardError::Validation(
                "score delta must be a positive integer".to_string(),
            ));
        }

        self.store
            .record_score(player_id, delta, DEFAULT_GAME_MODE)
            .await?;

        self.cache
            .invalidate(&[TOP_PLAYERS_KEY.to_string(), player_rank_key(player_id)])
            .await;

        debug!(player_id, delta, "score submitted");
        Ok(())
    }

    /// The top 10 players, read through the cache.
    ///
    /// # Errors
    ///
    /// Returns [`LeaderboardError::Store`] on store failure; cache errors
    /// never surface.
    pub async fn top_players(&self) -> Result<Vec<RankedPlayer>, LeaderboardError> {
        if let Some(rows) = self.cached_rows(TOP_PLAYERS_KEY).await {
            return Ok(rows);
        }

        let rows = self.store.top_n(TOP_PLAYERS_LIMIT).await?;
        if let Ok(bytes) = serde_json::to_vec(&rows) {
            self.cache.set(TOP_PLAYERS_KEY, bytes, self.top_ttl).await;
        }
        Ok(rows)
    }

    /// A single player's ranked row, read through the cache.
    ///
    /// Returns `Ok(None)` if the player has no leaderboard entry. Negative
    /// results are NOT cached: a not-yet-existent player is re-checked on
    /// every request, so a just-created player is never masked by a stale
    /// absence marker.
    ///
    /// # Errors
    ///
    /// - [`LeaderboardError::Validation`] unless `player_id` is positive.
    /// - [`LeaderboardError::Store`] on store failure.
    pub async fn player_rank(
        &self,
        player_id: PlayerId,
    ) -> Result<Option<RankedPlayer>, LeaderboardError> {
        if player_id < 1 {
            return Err(LeaderboardError::Validation(
                "player_id must be a positive integer".to_string(),
            ));
        }

        let key = player_rank_key(player_id);
        if let Some(rows) = self.cached_row(&key).await {
            return Ok(Some(rows));
        }

        let Some(row) = self.store.player_rank(player_id).await? else {
            return Ok(None);
        };

        if let Ok(bytes) = serde_json::to_vec(&row) {
            self.cache.set(&key, bytes, self.rank_ttl).await;
        }
        Ok(Some(row))
    }

    async fn cached_rows(&self, key: &str) -> Option<Vec<RankedPlayer>> {
        let bytes = self.cache.get(key).await?;
        match serde_json::from_slice(&bytes) {
            Ok(rows) => Some(rows),
            Err(e) => {
                // A corrupt payload is treated as a miss and dropped, so
                // the next read repopulates it.
                warn!(key, error = %e, "dropping undecodable cache entry");
                self.cache.invalidate(&[key.to_string()]).await;
                None
            },
        }
    }

    async fn cached_row(&self, key: &str) -> Option<RankedPlayer> {
        let bytes = self.cache.get(key).await?;
        match serde_json::from_slice(&bytes) {
            Ok(row) => Some(row),
            Err(e) => {
                warn!(key, error = %e, "dropping undecodable cache entry");
                self.cache.invalidate(&[key.to_string()]).await;
                None
            },
        }
    }
}
