//! Boundary between the supervisor and the connection protocol.

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::session::SessionId;
use crate::Result;

/// What a session task receives from the supervisor.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub id: SessionId,
    pub peer: Option<SocketAddr>,
    /// Fires once when the server starts shutting down.
    pub shutdown: CancellationToken,
}

/// Turns an accepted connection into a running session.
///
/// Implementations authenticate the peer, establish its principal and byte
/// stream, and run a [`SessionHandler`](crate::session::SessionHandler)
/// over it. They must return promptly once `ctx.shutdown` fires; the
/// supervisor aborts anything still running at the shutdown deadline.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Serve one connection to completion.
    async fn serve(&self, stream: TcpStream, ctx: SessionContext) -> Result<()>;
}
