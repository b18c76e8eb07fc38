//! Process-wide shutdown signal.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Default time sessions get to finish after shutdown starts.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(30);

/// One-shot, broadcast shutdown request with a deadline.
///
/// Sessions receive child tokens from [`Shutdown::subscribe`]; cancelling the
/// root reaches all of them at once. Triggering more than once is harmless
/// and keeps the first deadline.
#[derive(Debug, Clone)]
pub struct Shutdown {
    token: CancellationToken,
    grace: Duration,
    deadline: Arc<OnceLock<Instant>>,
}

impl Shutdown {
    pub fn new(grace: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            grace,
            deadline: Arc::new(OnceLock::new()),
        }
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// A token that fires when shutdown is triggered.
    pub fn subscribe(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Start shutting down and return the deadline for active sessions.
    pub fn trigger(&self) -> Instant {
        let deadline = *self.deadline.get_or_init(|| Instant::now() + self.grace);
        self.token.cancel();
        deadline
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE)
    }
}

/// Wait for SIGINT or, on Unix, SIGTERM.
///
/// Returns the name of the signal received.
pub async fn wait_for_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = interrupt() => "SIGINT",
                    _ = term.recv() => "SIGTERM",
                }
            }
            Err(e) => {
                warn!("cannot listen for SIGTERM: {}", e);
                interrupt().await;
                "SIGINT"
            }
        }
    }

    #[cfg(not(unix))]
    {
        interrupt().await;
        "Ctrl-C"
    }
}

async fn interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
