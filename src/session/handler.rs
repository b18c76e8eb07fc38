//! Per-connection read/dispatch/write loop.

use std::io;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::terminal::{LineReader, TerminalMode};
use super::{SessionId, SessionState};
use crate::commands::{self, FAREWELL};
use crate::input::InputSanitizer;

/// Written once the session becomes active.
pub const WELCOME: &str =
    "Welcome to the sandboxed SSH server!\nType 'help' for a list of commands.\n";

/// Written for `clear`: cursor home, erase display.
pub const CLEAR_SCREEN: &str = "\x1b[H\x1b[2J";

/// Best-effort notice when the server shuts a session down.
pub const SHUTDOWN_NOTICE: &str = "\nServer is shutting down. Goodbye!\n";

/// Upper bound for writing [`SHUTDOWN_NOTICE`].
const NOTICE_TIMEOUT: Duration = Duration::from_secs(1);

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The peer typed `exit`, or a one-shot command finished.
    Exit,
    /// The peer closed its side of the stream.
    Disconnected,
    /// Reading or writing the stream failed.
    Failed,
    /// The server is shutting down.
    Shutdown,
}

impl SessionEnd {
    /// Exit status reported to transports that carry one.
    pub fn exit_status(&self) -> u32 {
        match self {
            SessionEnd::Failed => 1,
            _ => 0,
        }
    }
}

/// Summary of a finished session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub id: SessionId,
    pub principal: String,
    pub end: SessionEnd,
    /// Lines dispatched, blank lines excluded.
    pub commands: usize,
    pub duration: Duration,
}

/// Session-level handling of a sanitized line, ahead of the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Directive {
    Exit,
    Clear,
    Resolve,
}

impl Directive {
    fn classify(input: &str) -> Self {
        match input {
            "exit" => Directive::Exit,
            "clear" => Directive::Clear,
            _ => Directive::Resolve,
        }
    }
}

/// Drives one session over a duplex byte stream.
///
/// The handler owns everything about its session; nothing is shared with
/// other sessions except the shutdown token it observes.
#[derive(Debug)]
pub struct SessionHandler {
    id: SessionId,
    principal: String,
    mode: TerminalMode,
    shutdown: CancellationToken,
    state: SessionState,
    commands: usize,
    /// A write was cut short; the peer may hold part of a line.
    torn: bool,
}

impl SessionHandler {
    pub fn new(
        id: SessionId,
        principal: impl Into<String>,
        mode: TerminalMode,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            id,
            principal: principal.into(),
            mode,
            shutdown,
            state: SessionState::Initializing,
            commands: 0,
            torn: false,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the interactive loop until exit, disconnect, failure or shutdown.
    ///
    /// The stream is shut down and dropped before this returns, whatever
    /// ended the session.
    pub async fn run<S>(mut self, mut io: S) -> SessionReport
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let started = Instant::now();
        info!(session = %self.id, principal = %self.principal, mode = ?self.mode, "session started");

        let end = self.interact(&mut io).await;
        self.finish(io, end, started).await
    }

    /// Dispatch a single command line and close, as for an SSH `exec` request.
    pub async fn run_command<S>(mut self, mut io: S, command: &str) -> SessionReport
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let started = Instant::now();
        info!(session = %self.id, principal = %self.principal, "exec request");

        self.advance(SessionState::Active);
        let end = match self.dispatch(&mut io, command).await {
            Ok(_) => SessionEnd::Exit,
            Err(end) => end,
        };
        self.finish(io, end, started).await
    }

    async fn interact<S>(&mut self, io: &mut S) -> SessionEnd
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if let Err(end) = self.emit(io, WELCOME).await {
            return end;
        }
        self.advance(SessionState::Active);

        let mut reader = LineReader::new(self.mode);
        loop {
            if let Some(prompt) = self.mode.prompt() {
                if let Err(end) = self.emit(io, prompt).await {
                    return end;
                }
            }

            let read = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return SessionEnd::Shutdown,
                read = reader.read_line(io) => read,
            };

            let line = match read {
                Ok(Some(line)) => line,
                Ok(None) => return SessionEnd::Disconnected,
                Err(e) => {
                    debug!(session = %self.id, "read failed: {}", e);
                    return SessionEnd::Failed;
                }
            };

            match self.dispatch(io, &line).await {
                Ok(true) => continue,
                Ok(false) => return SessionEnd::Exit,
                Err(end) => return end,
            }
        }
    }

    /// Handle one raw line. Returns `Ok(false)` when the session should end.
    async fn dispatch<S>(&mut self, io: &mut S, line: &str) -> Result<bool, SessionEnd>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let input = InputSanitizer::sanitize(line);
        if input.is_empty() {
            return Ok(true);
        }
        self.commands += 1;

        match Directive::classify(&input) {
            Directive::Exit => {
                self.emit(io, FAREWELL).await?;
                Ok(false)
            }
            Directive::Clear => {
                self.emit(io, CLEAR_SCREEN).await?;
                Ok(true)
            }
            Directive::Resolve => {
                let output = commands::resolve(&input, &self.principal);
                if !output.is_empty() {
                    self.emit(io, &output).await?;
                }
                Ok(true)
            }
        }
    }

    /// Write one piece of output as a single write.
    ///
    /// Nothing new is started once shutdown has fired. A write already in
    /// flight when it fires gets up to [`NOTICE_TIMEOUT`] to complete; if it
    /// cannot, the session is marked torn and no further bytes are written.
    async fn emit<S>(&mut self, io: &mut S, text: &str) -> Result<(), SessionEnd>
    where
        S: AsyncWrite + Unpin,
    {
        if self.shutdown.is_cancelled() {
            return Err(SessionEnd::Shutdown);
        }

        let bytes = self.mode.render(text);
        let write = async {
            io.write_all(bytes.as_bytes()).await?;
            io.flush().await
        };
        tokio::pin!(write);

        let result = tokio::select! {
            result = &mut write => result,
            _ = self.shutdown.cancelled() => {
                match tokio::time::timeout(NOTICE_TIMEOUT, &mut write).await {
                    Ok(Ok(())) => return Err(SessionEnd::Shutdown),
                    Ok(Err(e)) => Err(e),
                    Err(_) => {
                        debug!(session = %self.id, "in-flight write abandoned at shutdown");
                        self.torn = true;
                        return Err(SessionEnd::Shutdown);
                    }
                }
            }
        };

        result.map_err(|e| {
            debug!(session = %self.id, "write failed: {}", e);
            self.torn = true;
            match e.kind() {
                io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset => {
                    SessionEnd::Disconnected
                }
                _ => SessionEnd::Failed,
            }
        })
    }

    async fn finish<S>(mut self, mut io: S, end: SessionEnd, started: Instant) -> SessionReport
    where
        S: AsyncWrite + Unpin,
    {
        self.advance(SessionState::Terminating);

        if end == SessionEnd::Shutdown && !self.torn {
            let notice = self.mode.render(SHUTDOWN_NOTICE);
            let write = async {
                io.write_all(notice.as_bytes()).await?;
                io.flush().await
            };
            match tokio::time::timeout(NOTICE_TIMEOUT, write).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(session = %self.id, "shutdown notice not delivered: {}", e),
                Err(_) => debug!(session = %self.id, "shutdown notice timed out"),
            }
        }

        if let Err(e) = io.shutdown().await {
            debug!(session = %self.id, "stream shutdown failed: {}", e);
        }
        drop(io);
        self.advance(SessionState::Closed);

        let report = SessionReport {
            id: self.id,
            principal: self.principal,
            end,
            commands: self.commands,
            duration: started.elapsed(),
        };
        info!(
            session = %report.id,
            principal = %report.principal,
            end = ?report.end,
            commands = report.commands,
            "session closed"
        );
        report
    }

    fn advance(&mut self, target: SessionState) {
        if let Err(e) = self.state.transition_to(target) {
            warn!(session = %self.id, "{}", e);
        }
    }
}
