//! Listener, session supervision and graceful shutdown.
//!
//! The [`Supervisor`] accepts connections, runs each one through a
//! [`Transport`] in its own task, and on shutdown cancels every session and
//! waits for them up to a deadline before aborting the rest.
//!
//! ## Example
//!
//! ```no_run
//! use ssh_sandbox::server::{self, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> ssh_sandbox::Result<()> {
//!     let config = ServerConfig::new("0.0.0.0", 2222);
//!     let report = server::run(config).await?;
//!     println!("{} sessions drained", report.completed);
//!     Ok(())
//! }
//! ```

mod registry;
mod shutdown;
mod supervisor;
mod transport;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::info;

use crate::error::SandboxError;
use crate::ssh::{self, SshTransport};
use crate::Result;

pub use registry::{CompletionGuard, SessionEntry, SessionRegistry};
pub use shutdown::{wait_for_signal, Shutdown, DEFAULT_GRACE};
pub use supervisor::{ShutdownReport, Supervisor, ACCEPT_BACKOFF, MAX_ACCEPT_FAILURES};
pub use transport::{SessionContext, Transport};

/// Default host key location.
pub const DEFAULT_HOST_KEY_PATH: &str = "id_ed25519";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Private host key (OpenSSH or PEM format).
    pub host_key_path: PathBuf,
    /// How long sessions get to finish after a shutdown signal.
    pub shutdown_timeout: Duration,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_host_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.host_key_path = path.into();
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 2222,
            host_key_path: PathBuf::from(DEFAULT_HOST_KEY_PATH),
            shutdown_timeout: DEFAULT_GRACE,
        }
    }
}

/// Bind the listening socket.
pub async fn bind(config: &ServerConfig) -> Result<TcpListener> {
    let addr = config.bind_address();
    TcpListener::bind(&addr)
        .await
        .map_err(|source| SandboxError::Bind { addr, source })
}

/// Run the SSH server until SIGINT or SIGTERM.
///
/// Host key and bind failures are returned before any connection is
/// accepted.
pub async fn run(config: ServerConfig) -> Result<ShutdownReport> {
    let host_key = ssh::load_host_key(&config.host_key_path)?;
    let transport = Arc::new(SshTransport::new(host_key));
    let listener = bind(&config).await?;

    info!("Starting SSH server on {}", config.bind_address());

    let supervisor = Supervisor::new(config.shutdown_timeout);
    supervisor
        .serve(listener, transport, async {
            let signal = wait_for_signal().await;
            info!("received {}", signal);
        })
        .await
}
