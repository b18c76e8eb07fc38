//! Accept loop and shutdown coordination.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::registry::{CompletionGuard, SessionRegistry};
use super::shutdown::Shutdown;
use super::transport::{SessionContext, Transport};
use crate::error::SandboxError;
use crate::session::SessionId;
use crate::Result;

/// Pause after a failed accept.
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Consecutive accept failures after which the listener is given up.
pub const MAX_ACCEPT_FAILURES: u32 = 16;

/// Consecutive accept failures and the pause they impose.
///
/// While paused the accept branch is disabled, so the shutdown signal and
/// session completions are still served.
#[derive(Debug, Default)]
struct AcceptBackoff {
    failures: u32,
    resume_at: Option<Instant>,
}

impl AcceptBackoff {
    fn is_paused(&self) -> bool {
        self.resume_at.is_some()
    }

    fn resume_at(&self) -> Instant {
        self.resume_at.unwrap_or_else(Instant::now)
    }

    fn resume(&mut self) {
        self.resume_at = None;
    }

    fn succeeded(&mut self) {
        self.failures = 0;
    }

    /// Record a failed accept. Returns `false` once the listener is given up.
    fn failed(&mut self) -> bool {
        self.failures += 1;
        if self.failures >= MAX_ACCEPT_FAILURES {
            return false;
        }
        self.resume_at = Some(Instant::now() + ACCEPT_BACKOFF);
        true
    }
}

/// Outcome of a shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Sessions that finished on their own before the deadline.
    pub completed: usize,
    /// Sessions aborted at the deadline.
    pub forced: usize,
    pub elapsed: Duration,
}

/// Owns the session registry and the shutdown signal.
///
/// Sessions are spawned through [`Supervisor::launch`] (or by
/// [`Supervisor::serve`] for each accepted connection) and report back
/// through a completion channel; the supervisor is the only owner of the
/// registry.
#[derive(Debug)]
pub struct Supervisor {
    registry: SessionRegistry,
    completions_tx: mpsc::UnboundedSender<SessionId>,
    completions_rx: mpsc::UnboundedReceiver<SessionId>,
    shutdown: Shutdown,
}

impl Supervisor {
    /// Create a supervisor whose sessions get `grace` to finish on shutdown.
    pub fn new(grace: Duration) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            registry: SessionRegistry::new(),
            completions_tx,
            completions_rx,
            shutdown: Shutdown::new(grace),
        }
    }

    pub fn shutdown_signal(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Sessions spawned and not yet reaped.
    pub fn active_sessions(&self) -> usize {
        self.registry.len()
    }

    /// Spawn a session task and register it.
    ///
    /// `session` receives a context whose shutdown token fires when the
    /// supervisor shuts down.
    pub fn launch<F, Fut>(&mut self, peer: Option<SocketAddr>, session: F) -> SessionId
    where
        F: FnOnce(SessionContext) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = SessionId::next();
        let ctx = SessionContext {
            id,
            peer,
            shutdown: self.shutdown.subscribe(),
        };
        let guard = CompletionGuard::new(id, self.completions_tx.clone());
        let span = match peer {
            Some(peer) => info_span!("session", %id, %peer),
            None => info_span!("session", %id),
        };

        let task = session(ctx);
        let handle = tokio::spawn(
            async move {
                let _guard = guard;
                task.await;
            }
            .instrument(span),
        );

        self.registry.insert(id, peer, handle);
        debug!(session = %id, active = self.registry.len(), "session registered");
        id
    }

    /// Accept connections until `signal` resolves, then shut down.
    ///
    /// Each connection is served by `transport` in its own task. Accept
    /// errors are logged and retried; once the listener fails
    /// [`MAX_ACCEPT_FAILURES`] times in a row, sessions are drained and
    /// [`SandboxError::Listener`] is returned.
    pub async fn serve<T, S>(
        mut self,
        listener: TcpListener,
        transport: Arc<T>,
        signal: S,
    ) -> Result<ShutdownReport>
    where
        T: Transport,
        S: Future<Output = ()>,
    {
        tokio::pin!(signal);
        let mut backoff = AcceptBackoff::default();

        let failure = loop {
            tokio::select! {
                _ = &mut signal => {
                    info!("Stopping SSH server");
                    break None;
                }
                Some(id) = self.completions_rx.recv() => {
                    self.reap(id);
                }
                _ = tokio::time::sleep_until(backoff.resume_at()), if backoff.is_paused() => {
                    backoff.resume();
                }
                accepted = listener.accept(), if !backoff.is_paused() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            backoff.succeeded();
                            debug!(%peer, "connection accepted");
                            let transport = Arc::clone(&transport);
                            self.launch(Some(peer), move |ctx| async move {
                                if let Err(e) = transport.serve(stream, ctx).await {
                                    warn!("connection ended with error: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            if !backoff.failed() {
                                error!("accept failed {} times in a row, giving up: {}", backoff.failures, e);
                                break Some(e);
                            }
                            warn!("accept failed: {}", e);
                        }
                    }
                }
            }
        };

        drop(listener);
        let report = self.shutdown_and_drain().await;

        match failure {
            Some(e) => Err(SandboxError::Listener(e)),
            None => Ok(report),
        }
    }

    /// Trigger shutdown and wait for sessions until the deadline.
    ///
    /// Sessions still running at the deadline are aborted.
    pub async fn shutdown_and_drain(mut self) -> ShutdownReport {
        let started = Instant::now();
        let deadline = self.shutdown.trigger();
        info!(
            sessions = self.registry.len(),
            grace = ?self.shutdown.grace(),
            "waiting for active sessions"
        );

        let mut completed = 0;
        while !self.registry.is_empty() {
            match tokio::time::timeout_at(deadline, self.completions_rx.recv()).await {
                Ok(Some(id)) => {
                    if self.reap(id) {
                        completed += 1;
                    }
                }
                // unreachable while we hold a sender
                Ok(None) => break,
                Err(_) => break,
            }
        }

        let forced = self.registry.abort_all();
        if forced > 0 {
            warn!(forced, "shutdown deadline exceeded, terminating remaining sessions");
        }

        let report = ShutdownReport {
            completed,
            forced,
            elapsed: started.elapsed(),
        };
        info!(
            completed = report.completed,
            forced = report.forced,
            "SSH server stopped"
        );
        report
    }

    fn reap(&mut self, id: SessionId) -> bool {
        match self.registry.remove(&id) {
            Some(entry) => {
                debug!(
                    session = %id,
                    lifetime = ?entry.started_at.elapsed(),
                    active = self.registry.len(),
                    "session reaped"
                );
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_drain_empty() {
        let supervisor = Supervisor::new(Duration::from_secs(1));
        let report = supervisor.shutdown_and_drain().await;
        assert_eq!(report.completed, 0);
        assert_eq!(report.forced, 0);
    }

    #[tokio::test]
    async fn test_cooperative_sessions_complete() {
        let mut supervisor = Supervisor::new(Duration::from_secs(5));
        for _ in 0..5 {
            supervisor.launch(None, |ctx| async move {
                ctx.shutdown.cancelled().await;
            });
        }
        assert_eq!(supervisor.active_sessions(), 5);

        let report = supervisor.shutdown_and_drain().await;
        assert_eq!(report.completed, 5);
        assert_eq!(report.forced, 0);
        assert!(report.elapsed < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_stuck_session_forced_at_deadline() {
        let mut supervisor = Supervisor::new(Duration::from_millis(200));
        supervisor.launch(None, |ctx| async move {
            ctx.shutdown.cancelled().await;
        });
        supervisor.launch(None, |_ctx| std::future::pending::<()>());

        let started = std::time::Instant::now();
        let report = supervisor.shutdown_and_drain().await;

        assert_eq!(report.completed, 1);
        assert_eq!(report.forced, 1);
        assert!(started.elapsed() >= Duration::from_millis(150));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_finished_sessions_counted_once() {
        let mut supervisor = Supervisor::new(Duration::from_secs(1));
        supervisor.launch(None, |_ctx| async {});
        tokio::time::sleep(Duration::from_millis(50)).await;

        let report = supervisor.shutdown_and_drain().await;
        assert_eq!(report.completed, 1);
        assert_eq!(report.forced, 0);
    }

    #[tokio::test]
    async fn test_panicking_session_reaped() {
        let mut supervisor = Supervisor::new(Duration::from_secs(1));
        supervisor.launch(None, |_ctx| async {
            panic!("session failure");
        });

        let report = supervisor.shutdown_and_drain().await;
        assert_eq!(report.completed, 1);
        assert_eq!(report.forced, 0);
    }

    #[tokio::test]
    async fn test_backoff_pauses_after_failure() {
        let mut backoff = AcceptBackoff::default();
        assert!(!backoff.is_paused());

        assert!(backoff.failed());
        assert!(backoff.is_paused());
        assert!(backoff.resume_at() > Instant::now());

        tokio::time::sleep_until(backoff.resume_at()).await;
        backoff.resume();
        assert!(!backoff.is_paused());
    }

    #[tokio::test]
    async fn test_signal_observed_during_backoff() {
        let mut backoff = AcceptBackoff::default();
        backoff.failed();

        let started = Instant::now();
        let stopped = tokio::select! {
            _ = tokio::time::sleep_until(backoff.resume_at()), if backoff.is_paused() => false,
            _ = tokio::time::sleep(Duration::from_millis(5)) => true,
        };
        assert!(stopped);
        assert!(started.elapsed() < ACCEPT_BACKOFF);
        assert!(backoff.is_paused());
    }

    #[test]
    fn test_backoff_gives_up_after_consecutive_failures() {
        let mut backoff = AcceptBackoff::default();
        for _ in 1..MAX_ACCEPT_FAILURES {
            assert!(backoff.failed());
        }
        backoff.succeeded();
        for _ in 1..MAX_ACCEPT_FAILURES {
            assert!(backoff.failed());
        }
        assert!(!backoff.failed());
    }

    #[tokio::test]
    async fn test_sessions_get_distinct_ids() {
        let mut supervisor = Supervisor::new(Duration::from_secs(1));
        let a = supervisor.launch(None, |_ctx| async {});
        let b = supervisor.launch(None, |_ctx| async {});
        assert_ne!(a, b);
        supervisor.shutdown_and_drain().await;
    }
}
