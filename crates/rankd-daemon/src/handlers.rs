//! Request handlers.
//!
//! Maps each [`ApiRequest`] onto the service layer and translates the
//! domain error taxonomy into stable wire error codes.

use std::time::Instant;

use rankd_core::error::LeaderboardError;
use tracing::warn;

use crate::protocol::{ApiRequest, ApiResponse, ErrorCode};
use crate::service::Leaderboard;

/// Daemon version (from Cargo.toml).
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Shared per-daemon context handed to every request.
pub struct ServerContext {
    /// The leaderboard service.
    pub leaderboard: Leaderboard,
    /// Daemon start time, for the liveness probe.
    pub started_at: Instant,
}

impl ServerContext {
    /// Wrap a service for serving.
    #[must_use]
    pub fn new(leaderboard: Leaderboard) -> Self {
        Self {
            leaderboard,
            started_at: Instant::now(),
        }
    }
}

/// Dispatch an API request to the appropriate handler.
pub async fn dispatch(request: ApiRequest, ctx: &ServerContext) -> ApiResponse {
    match request {
        ApiRequest::Ping => ApiResponse::Pong {
            version: VERSION.to_string(),
            uptime_secs: ctx.started_at.elapsed().as_secs(),
        },
        ApiRequest::CreatePlayer { username } => handle_create_player(ctx, &username).await,
        ApiRequest::SubmitScore { player_id, delta } => {
            handle_submit_score(ctx, player_id, delta).await
        },
        ApiRequest::GetTopPlayers => handle_top_players(ctx).await,
        ApiRequest::GetPlayerRank { player_id } => handle_player_rank(ctx, player_id).await,
    }
}

async fn handle_create_player(ctx: &ServerContext, username: &str) -> ApiResponse {
    match ctx.leaderboard.create_player(username).await {
        Ok(player_id) => ApiResponse::PlayerCreated { player_id },
        Err(e) => error_response(&e),
    }
}

async fn handle_submit_score(ctx: &ServerContext, player_id: i64, delta: i64) -> ApiResponse {
    match ctx.leaderboard.submit_score(player_id, delta).await {
        Ok(()) => ApiResponse::Submitted {
            message: "score submitted".to_string(),
        },
        Err(e) => error_response(&e),
    }
}

async fn handle_top_players(ctx: &ServerContext) -> ApiResponse {
    match ctx.leaderboard.top_players().await {
        Ok(players) => ApiResponse::TopPlayers { players },
        Err(e) => error_response(&e),
    }
}

async fn handle_player_rank(ctx: &ServerContext, player_id: i64) -> ApiResponse {
    match ctx.leaderboard.player_rank(player_id).await {
        Ok(Some(player)) => ApiResponse::PlayerRank { player },
        Ok(None) => ApiResponse::Error {
            code: ErrorCode::PlayerNotFound,
            message: format!("player {player_id} has no leaderboard entry"),
        },
        Err(e) => error_response(&e),
    }
}

/// Translate a domain error into its stable wire representation.
fn error_response(err: &LeaderboardError) -> ApiResponse {
    let code = match err {
        LeaderboardError::Validation(_) => ErrorCode::InvalidArgument,
        LeaderboardError::PlayerNotFound(_) => ErrorCode::PlayerNotFound,
        LeaderboardError::UsernameTaken(_) => ErrorCode::UsernameTaken,
        LeaderboardError::Store(_) => {
            warn!(error = %err, "request failed on store error");
            ErrorCode::Internal
        },
    };
    ApiResponse::Error {
        code,
        message: err.to_string(),
    }
}
