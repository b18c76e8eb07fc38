//! Per-connection `russh` handler.

use std::pin::Pin;

use async_trait::async_trait;
use russh::server::{Auth, Handle, Handler, Msg, Session};
use russh::{Channel, ChannelId, Pty};
use russh_keys::key::PublicKey;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;
use tracing::debug;

use crate::input::InputSanitizer;
use crate::session::TerminalMode;

/// Principal used when the SSH user name is empty after sanitizing.
const ANONYMOUS: &str = "guest";

pub(crate) trait SessionStream: AsyncRead + AsyncWrite + Send {}

impl<T: AsyncRead + AsyncWrite + Send> SessionStream for T {}

pub(crate) type BoxedStream = Pin<Box<dyn SessionStream>>;

/// A session channel ready to be served.
pub(crate) struct SessionRequest {
    pub principal: String,
    pub channel: ChannelId,
    pub stream: BoxedStream,
    pub mode: TerminalMode,
    /// Command line of an `exec` request; `None` for an interactive shell.
    pub command: Option<String>,
    pub handle: Handle,
}

/// Accepts any user and forwards the first session channel.
pub(crate) struct SshConnection {
    principal: Option<String>,
    channel: Option<Channel<Msg>>,
    mode: TerminalMode,
    requests: Option<oneshot::Sender<SessionRequest>>,
}

impl SshConnection {
    pub fn new(requests: oneshot::Sender<SessionRequest>) -> Self {
        Self {
            principal: None,
            channel: None,
            mode: TerminalMode::Line,
            requests: Some(requests),
        }
    }

    fn accept(&mut self, user: &str, method: &str) -> Auth {
        let principal = InputSanitizer::sanitize(user);
        let principal = if principal.is_empty() {
            ANONYMOUS.to_string()
        } else {
            principal
        };
        debug!(%principal, method, "authenticated");
        self.principal = Some(principal);
        Auth::Accept
    }

    fn start(&mut self, channel: ChannelId, command: Option<String>, session: &mut Session) {
        let pending = self.channel.as_ref().map(|c| c.id()) == Some(channel);
        let (open, requests) = match (pending, self.channel.take(), self.requests.take()) {
            (true, Some(open), Some(requests)) => (open, requests),
            (_, open, requests) => {
                self.channel = open;
                self.requests = requests;
                session.channel_failure(channel);
                return;
            }
        };

        let request = SessionRequest {
            principal: self
                .principal
                .clone()
                .unwrap_or_else(|| ANONYMOUS.to_string()),
            channel,
            stream: Box::pin(open.into_stream()),
            mode: self.mode,
            command,
            handle: session.handle(),
        };

        if requests.send(request).is_err() {
            debug!("session request dropped, connection is closing");
            session.channel_failure(channel);
            return;
        }
        session.channel_success(channel);
    }
}

#[async_trait]
impl Handler for SshConnection {
    type Error = russh::Error;

    async fn auth_none(&mut self, user: &str) -> Result<Auth, Self::Error> {
        Ok(self.accept(user, "none"))
    }

    async fn auth_publickey(
        &mut self,
        user: &str,
        _public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        Ok(self.accept(user, "publickey"))
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        // one session per connection
        if self.channel.is_some() || self.requests.is_none() {
            debug!("refusing additional session channel");
            return Ok(false);
        }
        self.channel = Some(channel);
        Ok(true)
    }

    #[allow(clippy::too_many_arguments)]
    async fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(Pty, u32)],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        debug!(term, col_width, row_height, "pty requested");
        self.mode = TerminalMode::Pty;
        session.channel_success(channel);
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.start(channel, None, session);
        Ok(())
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let command = String::from_utf8_lossy(data).into_owned();
        self.start(channel, Some(command), session);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_principal_from_user() {
        let (tx, _rx) = oneshot::channel();
        let mut connection = SshConnection::new(tx);

        assert!(matches!(connection.accept("alice", "none"), Auth::Accept));
        assert_eq!(connection.principal.as_deref(), Some("alice"));
    }

    #[test]
    fn test_principal_sanitized() {
        let (tx, _rx) = oneshot::channel();
        let mut connection = SshConnection::new(tx);

        connection.accept("\x1b[2Jmallory\x07", "none");
        assert_eq!(connection.principal.as_deref(), Some("mallory"));
    }

    #[test]
    fn test_empty_principal_is_guest() {
        let (tx, _rx) = oneshot::channel();
        let mut connection = SshConnection::new(tx);

        connection.accept("\x1b[0m", "publickey");
        assert_eq!(connection.principal.as_deref(), Some("guest"));
    }

    #[test]
    fn test_starts_in_line_mode() {
        let (tx, _rx) = oneshot::channel();
        let connection = SshConnection::new(tx);
        assert_eq!(connection.mode, TerminalMode::Line);
    }
}
