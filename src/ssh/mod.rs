//! SSH transport built on `russh`.
//!
//! The transport authenticates the peer, captures the SSH user name as the
//! session principal, and hands the first session channel's byte stream to
//! a [`SessionHandler`](crate::session::SessionHandler). Interactive
//! `shell` requests get the full loop; `exec` requests run one command.

mod handler;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::server::Handle;
use russh::Disconnect;
use russh_keys::key::KeyPair;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::SandboxError;
use crate::server::{SessionContext, Transport};
use crate::session::SessionHandler;
use crate::Result;

use handler::SshConnection;

/// Delay before answering a rejected authentication attempt.
const AUTH_REJECTION_TIME: Duration = Duration::from_secs(1);

/// Reason sent to clients disconnected by the server.
const DISCONNECT_REASON: &str = "server shutting down";

/// Load the server's private host key.
pub fn load_host_key(path: &Path) -> Result<KeyPair> {
    russh_keys::load_secret_key(path, None).map_err(|e| SandboxError::HostKey {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// [`Transport`] speaking SSH.
pub struct SshTransport {
    config: Arc<russh::server::Config>,
}

impl SshTransport {
    pub fn new(host_key: KeyPair) -> Self {
        let config = russh::server::Config {
            keys: vec![host_key],
            auth_rejection_time: AUTH_REJECTION_TIME,
            ..Default::default()
        };

        Self {
            config: Arc::new(config),
        }
    }
}

/// Disconnects the client unless the connection already ended.
///
/// `run_stream` drives the connection in a task of its own, so ending or
/// aborting the session task alone would leave the socket open.
struct ConnectionGuard {
    handle: Handle,
    ended: bool,
}

impl ConnectionGuard {
    fn new(handle: Handle) -> Self {
        Self {
            handle,
            ended: false,
        }
    }

    /// The connection task finished on its own.
    fn ended(&mut self) {
        self.ended = true;
    }

    async fn disconnect(&mut self) {
        if std::mem::replace(&mut self.ended, true) {
            return;
        }
        if let Err(e) = self
            .handle
            .disconnect(
                Disconnect::ByApplication,
                DISCONNECT_REASON.to_string(),
                "en".to_string(),
            )
            .await
        {
            debug!("disconnect not delivered: {}", e);
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if self.ended {
            return;
        }
        // reached when the session task is aborted at the shutdown deadline
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let handle = self.handle.clone();
            runtime.spawn(async move {
                let _ = handle
                    .disconnect(
                        Disconnect::ByApplication,
                        DISCONNECT_REASON.to_string(),
                        "en".to_string(),
                    )
                    .await;
            });
        }
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn serve(&self, stream: TcpStream, ctx: SessionContext) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        let connection = SshConnection::new(tx);

        let running = tokio::select! {
            running = russh::server::run_stream(Arc::clone(&self.config), stream, connection) => running?,
            _ = ctx.shutdown.cancelled() => return Ok(()),
        };
        let mut guard = ConnectionGuard::new(running.handle());
        tokio::pin!(running);

        let request = tokio::select! {
            request = rx => {
                match request {
                    Ok(request) => request,
                    Err(_) => {
                        // the handler is only dropped with the connection task
                        debug!("connection closed before a session was requested");
                        guard.ended();
                        return Ok(());
                    }
                }
            }
            _ = ctx.shutdown.cancelled() => {
                debug!("shutdown before a session was requested");
                guard.disconnect().await;
                return Ok(());
            }
        };

        let handler = SessionHandler::new(
            ctx.id,
            request.principal,
            request.mode,
            ctx.shutdown.clone(),
        );
        let report = match request.command.as_deref() {
            Some(command) => handler.run_command(request.stream, command).await,
            None => handler.run(request.stream).await,
        };

        let _ = request
            .handle
            .exit_status_request(request.channel, report.end.exit_status())
            .await;
        let _ = request.handle.close(request.channel).await;

        // let the client hang up once its channel is closed
        tokio::select! {
            result = &mut running => {
                guard.ended();
                if let Err(e) = result {
                    debug!("connection ended: {:?}", e);
                }
            }
            _ = ctx.shutdown.cancelled() => guard.disconnect().await,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_missing_key() {
        let err = load_host_key(Path::new("/nonexistent/id_ed25519")).unwrap_err();
        assert!(matches!(err, SandboxError::HostKey { .. }));
        assert!(err.to_string().contains("/nonexistent/id_ed25519"));
    }

    #[test]
    fn test_garbage_key() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"this is not a private key").unwrap();

        let err = load_host_key(file.path()).unwrap_err();
        assert!(matches!(err, SandboxError::HostKey { .. }));
    }
}
