//! Unix-socket server: newline-delimited JSON over a local socket.
//!
//! One task per connection; each line is parsed as an [`ApiRequest`],
//! dispatched, and answered with one JSON line. The server carries no
//! business logic — the transport is an external collaborator of the core
//! and this module is wiring only.

use std::io::{Error, ErrorKind};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info};

use crate::handlers::{ServerContext, dispatch};
use crate::protocol::{ApiRequest, ApiResponse, ErrorCode};

/// Accept connections until the listener fails or the task is dropped.
///
/// # Errors
///
/// Returns the underlying I/O error if `accept` fails.
pub async fn serve(listener: UnixListener, ctx: Arc<ServerContext>) -> std::io::Result<()> {
    info!("listening for requests");
    loop {
        let (stream, _addr) = listener.accept().await?;
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, &ctx).await {
                debug!(error = %e, "connection closed with error");
            }
        });
    }
}

async fn handle_connection(stream: UnixStream, ctx: &ServerContext) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<ApiRequest>(&line) {
            Ok(request) => dispatch(request, ctx).await,
            Err(e) => ApiResponse::Error {
                code: ErrorCode::InvalidArgument,
                message: format!("malformed request: {e}"),
            },
        };

        let mut payload = serde_json::to_vec(&response)
            .map_err(|e| Error::new(ErrorKind::InvalidData, e.to_string()))?;
        payload.push(b'\n');
        writer.write_all(&payload).await?;
    }

    Ok(())
}
