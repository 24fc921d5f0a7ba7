//! rankd-daemon - leaderboard service daemon.
//!
//! Layers, leaf-first:
//!
//! - [`store`]: durable truth in `SQLite` — players, the append-only score
//!   event log, and the materialized per-player total. Ranking queries run
//!   here (dense rank computed at query time, never persisted).
//! - [`service`]: the consistency coordinator. Writes go through one
//!   atomic store transaction followed by targeted cache invalidation;
//!   reads go cache-first with a complete store fallback.
//! - [`protocol`] / [`handlers`] / [`server`]: the thin Unix-socket API
//!   seam consumed by external transports.
//!
//! The cache abstraction itself lives in `rankd-core` so the service layer
//! stays independent of any particular backend.

pub mod handlers;
pub mod protocol;
pub mod server;
pub mod service;
pub mod store;
