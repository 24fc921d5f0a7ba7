//! rankd-core - domain library for the rankd leaderboard service.
//!
//! This crate holds everything the service layer needs that is independent
//! of the storage backend and the transport:
//!
//! - [`model`]: the data model (players, ranked rows) and dense-rank
//!   semantics shared by store and cache.
//! - [`error`]: the domain error taxonomy surfaced to callers.
//! - [`cache`]: the cache abstraction — a fallible backend trait, an
//!   in-process TTL backend, and the fail-open wrapper that absorbs every
//!   backend error so cache trouble never surfaces to callers.
//! - [`config`]: TOML configuration parsing for the daemon.

pub mod cache;
pub mod config;
pub mod error;
pub mod model;

pub use error::LeaderboardError;
pub use model::{PlayerId, RankedPlayer};
