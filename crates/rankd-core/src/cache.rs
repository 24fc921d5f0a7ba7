//! Cache layer: a read-through accelerator for ranking queries.
//!
//! The cache is split into two pieces:
//!
//! - [`CacheStore`]: the fallible backend trait. Backends may fail; they
//!   report failures honestly through [`CacheError`].
//! - [`Cache`]: the fail-open wrapper the service talks to. It absorbs
//!   every backend error — a failed `get` becomes a miss, a failed `set`
//!   or `invalidate` becomes a no-op — and logs it, suppressing duplicate
//!   consecutive error messages so a flapping backend cannot flood the log.
//!
//! The cache owns only derived, disposable projections. Every caller must
//! have a complete fallback that recomputes from the score store, so the
//! system stays correct (if slower) with the cache entirely disabled.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::model::PlayerId;

/// Cache key for the singleton top-10 leaderboard projection.
pub const TOP_PLAYERS_KEY: &str = "leaderboard:top10";

/// Cache key for a single player's rank projection.
#[must_use]
pub fn player_rank_key(player_id: PlayerId) -> String {
    format!("leaderboard:rank:{player_id}")
}

/// Error reported by a cache backend.
///
/// This type never crosses the [`Cache`] boundary.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The backend could not serve the request.
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}

/// A key/value backend holding serialized query results with a TTL.
///
/// Implementations must treat every operation as best-effort storage of
/// disposable data; durability is never expected. Backends are injected so
/// tests can substitute a fake with controllable failure injection.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up a key. `Ok(None)` is a miss.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store a value under `key`, expiring after `ttl`.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    /// Delete zero or more keys. Missing keys are not an error.
    async fn delete(&self, keys: &[String]) -> Result<(), CacheError>;
}

/// In-process TTL cache backend.
///
/// Entries carry an expiry instant and are evicted lazily: an expired entry
/// encountered by `get` is removed and reported as a miss. TTL expiry is the
/// backstop against missed invalidations, so correctness only needs expired
/// entries to be invisible, not promptly reclaimed.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

#[derive(Debug)]
struct MemoryEntry {
    value: Vec<u8>,
    /// `None` when `now + ttl` overflows `Instant`; such an entry never
    /// expires on its own and waits for invalidation.
    expires_at: Option<Instant>,
}

impl MemoryCacheStore {
    /// Create an empty in-process cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, MemoryEntry>>, CacheError> {
        self.entries
            .lock()
            .map_err(|e| CacheError::Unavailable(format!("mutex poisoned: {e}")))
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut entries = self.lock()?;
        match entries.get(key) {
            Some(entry) if entry.expires_at.map_or(true, |at| at > Instant::now()) => {
                Ok(Some(entry.value.clone()))
            },
            Some(_) => {
                entries.remove(key);
                Ok(None)
            },
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let mut entries = self.lock()?;
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value,
                expires_at: Instant::now().checked_add(ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<(), CacheError> {
        let mut entries = self.lock()?;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }
}

/// Fail-open cache facade used by the service layer.
///
/// All three operations swallow backend errors: `get` degrades to a miss,
/// `set` and `invalidate` to no-ops. The swallowed error is logged at WARN,
/// but a repeat of the immediately preceding error message is downgraded to
/// DEBUG so a dead backend does not flood the log on every request. The
/// first success after a failure clears the suppression state.
pub struct Cache {
    store: Arc<dyn CacheStore>,
    last_error: Mutex<Option<String>>,
}

impl Cache {
    /// Wrap a backend in the fail-open facade.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            last_error: Mutex::new(None),
        }
    }

    /// Look up a key. Returns `None` on miss or on any backend failure.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        match self.store.get(key).await {
            Ok(hit) => {
                self.note_success();
                hit
            },
            Err(e) => {
                self.note_failure("get", key, &e);
                None
            },
        }
    }

    /// Store a value. Best-effort; failure is absorbed.
    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        match self.store.set(key, value, ttl).await {
            Ok(()) => self.note_success(),
            Err(e) => self.note_failure("set", key, &e),
        }
    }

    /// Delete the given keys. No-op on empty input; failure is absorbed.
    pub async fn invalidate(&self, keys: &[String]) {
        if keys.is_empty() {
            return;
        }
        match self.store.delete(keys).await {
            Ok(()) => self.note_success(),
            Err(e) => self.note_failure("invalidate", &keys.join(","), &e),
        }
    }

    fn note_success(&self) {
        if let Ok(mut last) = self.last_error.lock() {
            *last = None;
        }
    }

    fn note_failure(&self, op: &str, key: &str, err: &CacheError) {
        let message = err.to_string();
        let repeated = self
            .last_error
            .lock()
            .map(|mut last| {
                if last.as_deref() == Some(message.as_str()) {
                    true
                } else {
                    *last = Some(message.clone());
                    false
                }
            })
            .unwrap_or(false);

        if repeated {
            debug!(op, key, error = %message, "cache operation failed (repeat, suppressed)");
        } else {
            warn!(op, key, error = %message, "cache operation failed; continuing without cache");
        }
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache").finish_non_exhaustive()
    }
}
