//! Durable score store backed by `SQLite`.
//!
//! # Schema
//!
//! Three relations: `players` (identity, unique username), `score_events`
//! (append-only log of scoring actions), and `leaderboard` (materialized
//! per-player total, at most one row per player). Rank is NOT persisted;
//! it is computed at query time with a `DENSE_RANK()` window over
//! `total_score` descending, so the materialized total is the only derived
//! state the write path has to keep consistent.
//!
//! # Consistency
//!
//! [`ScoreStore::record_score`] appends the event and upserts the total
//! inside one `BEGIN IMMEDIATE` transaction — both visible or neither. The
//! add-to-total semantics live in the upsert's `ON CONFLICT .. DO UPDATE
//! SET total_score = total_score + excluded.total_score` clause, so
//! concurrent submissions for the same player serialize at the storage
//! layer and never lose an update.
//!
//! # Blocking model
//!
//! `SQLite` calls are blocking; the public API wraps them in
//! `tokio::task::spawn_blocking` around an `Arc<Mutex<Connection>>` so the
//! async runtime is never stalled on database I/O.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rankd_core::error::LeaderboardError;
use rankd_core::model::{PlayerId, RankedPlayer};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tracing::info;

/// Schema applied on every open; all statements are idempotent.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS players (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    username   TEXT NOT NULL UNIQUE,
    join_date  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS score_events (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    player_id   INTEGER NOT NULL REFERENCES players(id) ON DELETE CASCADE,
    delta       INTEGER NOT NULL CHECK (delta >= 0),
    mode        TEXT NOT NULL,
    recorded_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS leaderboard (
    player_id   INTEGER PRIMARY KEY REFERENCES players(id) ON DELETE CASCADE,
    total_score INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_score_events_player ON score_events(player_id);
CREATE INDEX IF NOT EXISTS idx_leaderboard_total ON leaderboard(total_score DESC);
";

/// Global dense ranking, then the top-`n` slice. The window runs over the
/// entire entry set before `LIMIT` applies, so returned ranks are absolute.
const TOP_N_SQL: &str = "
SELECT l.player_id, p.username, l.total_score,
       DENSE_RANK() OVER (ORDER BY l.total_score DESC) AS rank
FROM leaderboard l
JOIN players p ON p.id = l.player_id
ORDER BY l.total_score DESC
LIMIT ?1
";

/// Same global ranking, filtered to one player by the outer query.
const PLAYER_RANK_SQL: &str = "
SELECT player_id, username, total_score, rank
FROM (
    SELECT l.player_id, p.username, l.total_score,
           DENSE_RANK() OVER (ORDER BY l.total_score DESC) AS rank
    FROM leaderboard l
    JOIN players p ON p.id = l.player_id
) ranked
WHERE player_id = ?1
";

/// Durable score store handle. Cheap to clone; clones share the underlying
/// connection.
#[derive(Debug, Clone)]
pub struct ScoreStore {
    conn: Arc<Mutex<Connection>>,
}

impl ScoreStore {
    /// Open (or create) the store at `path`.
    ///
    /// `busy_timeout` bounds how long a call may wait for the database
    /// lock before its transaction aborts.
    ///
    /// # Errors
    ///
    /// Returns [`LeaderboardError::Store`] if the database cannot be
    /// opened or the schema cannot be applied.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, LeaderboardError> {
        let conn = Connection::open(path).map_err(store_err)?;
        Self::init(&conn, busy_timeout).map_err(store_err)?;
        info!(db = %path.display(), "score store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory store. Used by tests and throwaway setups.
    ///
    /// # Errors
    ///
    /// Returns [`LeaderboardError::Store`] if initialization fails.
    pub fn open_in_memory() -> Result<Self, LeaderboardError> {
        let conn = Connection::open_in_memory().map_err(store_err)?;
        Self::init(&conn, Duration::from_millis(5000)).map_err(store_err)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
        // journal_mode returns a row ("wal", or "memory" for in-memory
        // databases), so it cannot go through pragma_update.
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| {
            row.get::<_, String>(0)
        })?;
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(SCHEMA)
    }

    /// Create a player with a unique username and return its id.
    ///
    /// # Errors
    ///
    /// - [`LeaderboardError::UsernameTaken`] if the username exists.
    /// - [`LeaderboardError::Store`] on any other database failure.
    pub async fn create_player(&self, username: &str) -> Result<PlayerId, LeaderboardError> {
        let conn = Arc::clone(&self.conn);
        let username = username.to_string();
        tokio::task::spawn_blocking(move || Self::create_player_sync(&conn, &username))
            .await
            .map_err(join_err)?
    }

    /// Record a score event and fold its delta into the player's total,
    /// atomically.
    ///
    /// # Errors
    ///
    /// - [`LeaderboardError::Validation`] if `delta` is negative.
    /// - [`LeaderboardError::PlayerNotFound`] if `player_id` references no
    ///   existing player (foreign-key constraint).
    /// - [`LeaderboardError::Store`] on any other database failure; the
    ///   transaction is rolled back and the total is left exactly at its
    ///   pre-call value.
    pub async fn record_score(
        &self,
        player_id: PlayerId,
        delta: i64,
        mode: &str,
    ) -> Result<(), LeaderboardError> {
        let conn = Arc::clone(&self.conn);
        let mode = mode.to_string();
        tokio::task::spawn_blocking(move || Self::record_score_sync(&conn, player_id, delta, &mode))
            .await
            .map_err(join_err)?
    }

    /// Top `n` entries by total score, ranked densely over the entire
    /// entry set.
    ///
    /// # Errors
    ///
    /// Returns [`LeaderboardError::Store`] on database failure.
    pub async fn top_n(&self, n: i64) -> Result<Vec<RankedPlayer>, LeaderboardError> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || Self::top_n_sync(&conn, n))
            .await
            .map_err(join_err)?
    }

    /// A single player's ranked row, or `None` if the player has no
    /// leaderboard entry.
    ///
    /// # Errors
    ///
    /// Returns [`LeaderboardError::Store`] on database failure.
    pub async fn player_rank(
        &self,
        player_id: PlayerId,
    ) -> Result<Option<RankedPlayer>, LeaderboardError> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || Self::player_rank_sync(&conn, player_id))
            .await
            .map_err(join_err)?
    }

    fn create_player_sync(
        conn: &Arc<Mutex<Connection>>,
        username: &str,
    ) -> Result<PlayerId, LeaderboardError> {
        let conn = lock_conn(conn)?;
        conn.execute(
            "INSERT INTO players (username, join_date) VALUES (?1, ?2)",
            params![username, chrono::Utc::now().timestamp()],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                LeaderboardError::UsernameTaken(username.to_string())
            } else {
                store_err(e)
            }
        })?;
        Ok(conn.last_insert_rowid())
    }

    fn record_score_sync(
        conn: &Arc<Mutex<Connection>>,
        player_id: PlayerId,
        delta: i64,
        mode: &str,
    ) -> Result<(), LeaderboardError> {
        if delta < 0 {
            return Err(LeaderboardError::Validation(
                "score delta must be non-negative".to_string(),
            ));
        }

        let mut conn = lock_conn(conn)?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(store_err)?;

        tx.execute(
            "INSERT INTO score_events (player_id, delta, mode, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![player_id, delta, mode, chrono::Utc::now().timestamp()],
        )
        .map_err(|e| {
            if is_fk_violation(&e) {
                LeaderboardError::PlayerNotFound(player_id)
            } else {
                store_err(e)
            }
        })?;

        tx.execute(
            "INSERT INTO leaderboard (player_id, total_score) VALUES (?1, ?2)
             ON CONFLICT(player_id)
             DO UPDATE SET total_score = total_score + excluded.total_score",
            params![player_id, delta],
        )
        .map_err(|e| {
            if is_fk_violation(&e) {
                LeaderboardError::PlayerNotFound(player_id)
            } else {
                store_err(e)
            }
        })?;

        // Dropping the transaction without committing rolls both
        // statements back, so any error path above leaves the total
        // untouched.
        tx.commit().map_err(store_err)
    }

    fn top_n_sync(
        conn: &Arc<Mutex<Connection>>,
        n: i64,
    ) -> Result<Vec<RankedPlayer>, LeaderboardError> {
        let conn = lock_conn(conn)?;
        let mut stmt = conn.prepare_cached(TOP_N_SQL).map_err(store_err)?;
        let rows = stmt
            .query_map(params![n], row_to_ranked_player)
            .map_err(store_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(store_err)?;
        Ok(rows)
    }

    fn player_rank_sync(
        conn: &Arc<Mutex<Connection>>,
        player_id: PlayerId,
    ) -> Result<Option<RankedPlayer>, LeaderboardError> {
        let conn = lock_conn(conn)?;
        let mut stmt = conn.prepare_cached(PLAYER_RANK_SQL).map_err(store_err)?;
        stmt.query_row(params![player_id], row_to_ranked_player)
            .optional()
            .map_err(store_err)
    }

    #[cfg(test)]
    fn raw(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }
}

fn row_to_ranked_player(row: &rusqlite::Row<'_>) -> rusqlite::Result<RankedPlayer> {
    Ok(RankedPlayer {
        player_id: row.get(0)?,
        username: row.get(1)?,
        total_score: row.get(2)?,
        rank: row.get(3)?,
    })
}

fn lock_conn(
    conn: &Arc<Mutex<Connection>>,
) -> Result<std::sync::MutexGuard<'_, Connection>, LeaderboardError> {
    conn.lock()
        .map_err(|e| LeaderboardError::Store(format!("connection mutex poisoned: {e}")))
}

fn store_err(e: rusqlite::Error) -> LeaderboardError {
    LeaderboardError::Store(e.to_string())
}

fn join_err(e: tokio::task::JoinError) -> LeaderboardError {
    LeaderboardError::Store(format!("spawn_blocking failed: {e}"))
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(ffi, _)
            if ffi.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn is_fk_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(ffi, _)
            if ffi.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use proptest::prelude::*;

    use super::*;

    fn store() -> ScoreStore {
        ScoreStore::open_in_memory().unwrap()
    }

    fn count(store: &ScoreStore, sql: &str) -> i64 {
        let conn = store.raw();
        let conn = conn.lock().unwrap();
        conn.query_row(sql, [], |row| row.get(0)).unwrap()
    }

    #[tokio::test]
    async fn create_player_assigns_ids() {
        let store = store();
        let a = store.create_player("ada").await.unwrap();
        let b = store.create_player("grace").await.unwrap();
        assert!(a >= 1);
        assert!(b > a);
    }

    #[tokio::test]
    async fn duplicate_username_is_conflict() {
        let store = store();
        store.create_player("ada").await.unwrap();
        let err = store.create_player("ada").await.unwrap_err();
        assert!(matches!(err, LeaderboardError::UsernameTaken(u) if u == "ada"));
    }

    #[tokio::test]
    async fn record_score_for_unknown_player_is_not_found() {
        let store = store();
        let err = store.record_score(999, 100, "solo").await.unwrap_err();
        assert!(matches!(err, LeaderboardError::PlayerNotFound(999)));
        // Nothing committed.
        assert_eq!(count(&store, "SELECT COUNT(*) FROM score_events"), 0);
        assert_eq!(count(&store, "SELECT COUNT(*) FROM leaderboard"), 0);
    }

    #[tokio::test]
    async fn negative_delta_rejected_before_touching_store() {
        let store = store();
        let id = store.create_player("ada").await.unwrap();
        let err = store.record_score(id, -5, "solo").await.unwrap_err();
        assert!(matches!(err, LeaderboardError::Validation(_)));
        assert_eq!(count(&store, "SELECT COUNT(*) FROM score_events"), 0);
    }

    #[tokio::test]
    async fn totals_accumulate_across_submissions() {
        let store = store();
        let id = store.create_player("ada").await.unwrap();

        store.record_score(id, 500, "solo").await.unwrap();
        store.record_score(id, 300, "solo").await.unwrap();

        let row = store.player_rank(id).await.unwrap().unwrap();
        assert_eq!(row.total_score, 800);
        assert_eq!(row.rank, 1);
        assert_eq!(count(&store, "SELECT COUNT(*) FROM score_events"), 2);
    }

    #[tokio::test]
    async fn ties_share_a_dense_rank() {
        let store = store();
        let a = store.create_player("a").await.unwrap();
        let b = store.create_player("b").await.unwrap();
        let c = store.create_player("c").await.unwrap();

        store.record_score(a, 100, "solo").await.unwrap();
        store.record_score(b, 100, "solo").await.unwrap();
        store.record_score(c, 50, "solo").await.unwrap();

        let rows = store.top_n(10).await.unwrap();
        assert_eq!(rows.len(), 3);
        // Two tied players at rank 1, next distinct total at rank 2 — no gap.
        assert_eq!(rows[0].rank, 1);
        assert_eq!(rows[1].rank, 1);
        assert_eq!(rows[2].rank, 2);
        assert_eq!(rows[2].player_id, c);
    }

    #[tokio::test]
    async fn top_n_slices_after_global_ranking() {
        let store = store();
        let mut ids = Vec::new();
        for (name, score) in [("a", 300), ("b", 200), ("c", 200), ("d", 100)] {
            let id = store.create_player(name).await.unwrap();
            store.record_score(id, score, "solo").await.unwrap();
            ids.push(id);
        }

        let page = store.top_n(2).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].rank, 1);
        assert_eq!(page[1].rank, 2);

        // The player outside the page still holds the globally computed
        // rank, unaffected by the slice.
        let d = store.player_rank(ids[3]).await.unwrap().unwrap();
        assert_eq!(d.rank, 3);
    }

    #[tokio::test]
    async fn player_without_entry_has_no_rank() {
        let store = store();
        let id = store.create_player("ada").await.unwrap();
        // Created but never scored: no leaderboard entry, no rank.
        assert!(store.player_rank(id).await.unwrap().is_none());
        // Never created at all.
        assert!(store.player_rank(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_upsert_rolls_back_the_event_insert() {
        let store = store();
        let id = store.create_player("ada").await.unwrap();
        store.record_score(id, 500, "solo").await.unwrap();

        // Simulated store fault between the event insert and the upsert.
        {
            let conn = store.raw();
            let conn = conn.lock().unwrap();
            conn.execute_batch(
                "CREATE TRIGGER fault_insert BEFORE INSERT ON leaderboard
                 BEGIN SELECT RAISE(ABORT, 'injected fault'); END;
                 CREATE TRIGGER fault_update BEFORE UPDATE ON leaderboard
                 BEGIN SELECT RAISE(ABORT, 'injected fault'); END;",
            )
            .unwrap();
        }

        let err = store.record_score(id, 300, "solo").await.unwrap_err();
        assert!(matches!(err, LeaderboardError::Store(_)));

        // The event insert must have been rolled back with the upsert.
        assert_eq!(count(&store, "SELECT COUNT(*) FROM score_events"), 1);
        let row = store.player_rank(id).await.unwrap().unwrap();
        assert_eq!(row.total_score, 500);
    }

    #[tokio::test]
    async fn zero_delta_creates_entry_without_changing_order() {
        let store = store();
        let id = store.create_player("ada").await.unwrap();
        store.record_score(id, 0, "solo").await.unwrap();

        let row = store.player_rank(id).await.unwrap().unwrap();
        assert_eq!(row.total_score, 0);
        assert_eq!(row.rank, 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// After any submission sequence, every total equals the sum of
        /// that player's deltas, and the computed ranks obey the dense-rank
        /// law: ties share a rank, strictly greater totals get strictly
        /// smaller ranks, and rank values are contiguous from 1.
        #[test]
        fn totals_and_dense_ranks_hold_for_random_histories(
            submissions in proptest::collection::vec((0usize..4, 0i64..1000), 1..40)
        ) {
            let store = ScoreStore::open_in_memory().unwrap();
            let conn = store.raw();

            let mut ids = Vec::new();
            for name in ["p0", "p1", "p2", "p3"] {
                ids.push(ScoreStore::create_player_sync(&conn, name).unwrap());
            }

            let mut expected: HashMap<PlayerId, i64> = HashMap::new();
            for (slot, delta) in submissions {
                let id = ids[slot];
                ScoreStore::record_score_sync(&conn, id, delta, "solo").unwrap();
                *expected.entry(id).or_insert(0) += delta;
            }

            let mut rows = Vec::new();
            for id in &ids {
                if let Some(row) = ScoreStore::player_rank_sync(&conn, *id).unwrap() {
                    prop_assert_eq!(row.total_score, expected[id]);
                    rows.push(row);
                }
            }

            for a in &rows {
                for b in &rows {
                    if a.total_score == b.total_score {
                        prop_assert_eq!(a.rank, b.rank);
                    } else if a.total_score > b.total_score {
                        prop_assert!(a.rank < b.rank);
                    }
                }
            }

            let mut ranks: Vec<i64> = rows.iter().map(|r| r.rank).collect();
            ranks.sort_unstable();
            ranks.dedup();
            let distinct = ranks.len() as i64;
            prop_assert_eq!(ranks, (1..=distinct).collect::<Vec<_>>());
        }
    }
}
